//! Expected shapes of each LLM response and the validation applied to them.
//!
//! A required field that is absent fails the stage; fields with a sensible
//! neutral value default instead.

use serde::Deserialize;
use subforge_core::{CommentIdea, CoreError, PostIdea};
use tracing::warn;
use uuid::Uuid;

pub const DEFAULT_ENGAGEMENT_SCORE: f64 = 7.5;
pub const DEFAULT_RELEVANCE: f64 = 8.0;
pub const POST_IDEA_COUNT: usize = 4;
pub const POST_IDEA_BULLETS: usize = 3;
pub const COMMENT_IDEA_COUNT: usize = 3;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPostIdeas {
    pub ideas: Vec<RawPostIdea>,
    pub engagement_score: Option<f64>,
    pub relevance: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawPostIdea {
    pub title: String,
    pub bullets: Vec<String>,
    pub inspiration: String,
    pub format: String,
    #[serde(alias = "noveltySignal")]
    pub novelty_note: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCommentIdeas {
    pub ideas: Vec<RawCommentIdea>,
    pub engagement_score: Option<f64>,
    pub relevance: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawCommentIdea {
    pub content: String,
    pub reasoning: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawGuidelines {
    pub recommendations: Vec<String>,
    pub structures: Vec<String>,
    pub tone_tips: Vec<String>,
    pub posting_times: Vec<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawGapAnalysis {
    pub underrepresented_angles: Vec<String>,
    pub tension_hooks: Vec<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExplorationSeeds {
    pub tensions: Vec<String>,
    pub what_ifs: Vec<String>,
}

impl ExplorationSeeds {
    pub fn is_empty(&self) -> bool {
        self.tensions.is_empty() && self.what_ifs.is_empty()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawNoveltyAssessment {
    pub scores: Vec<RawIdeaScore>,
    pub average_score: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawIdeaScore {
    /// 1-based position of the idea in the prompt; the entry's own position when absent.
    pub index: Option<usize>,
    pub score: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawInsights {
    pub instructions: Vec<String>,
    pub respected_qualities: Vec<String>,
    pub pitfalls: Vec<String>,
    pub example_comment_styles: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFullPost {
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
    #[serde(default)]
    pub word_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPostIdeas {
    pub ideas: Vec<PostIdea>,
    pub engagement_score: f64,
    pub relevance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoveltyAssessment {
    /// Per-idea scores aligned with the assessed ideas; `None` where the model gave none.
    pub scores: Vec<Option<f64>>,
    pub average: f64,
}

pub fn validate_post_ideas(
    raw: RawPostIdeas,
    stage: &str,
) -> Result<ValidatedPostIdeas, CoreError> {
    let ideas: Vec<PostIdea> = raw
        .ideas
        .into_iter()
        .filter(|idea| !idea.title.trim().is_empty())
        .take(POST_IDEA_COUNT)
        .map(|idea| {
            let title = idea.title.trim().to_string();
            let mut bullets = clean_list(idea.bullets);
            if bullets.len() < POST_IDEA_BULLETS {
                warn!(
                    "{}: idea '{}' has {} of {} outline bullets",
                    stage,
                    title,
                    bullets.len(),
                    POST_IDEA_BULLETS
                );
            }
            bullets.truncate(POST_IDEA_BULLETS);
            PostIdea {
                id: Uuid::new_v4(),
                title,
                bullets,
                inspiration: idea.inspiration.trim().to_string(),
                format: idea.format.trim().to_string(),
                novelty_note: idea.novelty_note.trim().to_string(),
                novelty_score: None,
            }
        })
        .collect();

    if ideas.is_empty() {
        return Err(CoreError::generation_failed(stage, "no usable ideas in response"));
    }

    Ok(ValidatedPostIdeas {
        ideas,
        engagement_score: score_or(raw.engagement_score, DEFAULT_ENGAGEMENT_SCORE),
        relevance: score_or(raw.relevance, DEFAULT_RELEVANCE),
    })
}

pub fn validate_comment_ideas(
    raw: RawCommentIdeas,
    stage: &str,
) -> Result<(Vec<CommentIdea>, f64, f64), CoreError> {
    let ideas: Vec<CommentIdea> = raw
        .ideas
        .into_iter()
        .filter(|idea| !idea.content.trim().is_empty())
        .take(COMMENT_IDEA_COUNT)
        .map(|idea| CommentIdea {
            id: Uuid::new_v4(),
            content: idea.content.trim().to_string(),
            reasoning: idea.reasoning.trim().to_string(),
        })
        .collect();

    if ideas.is_empty() {
        return Err(CoreError::generation_failed(
            stage,
            "no usable comment ideas in response",
        ));
    }

    Ok((
        ideas,
        score_or(raw.engagement_score, DEFAULT_ENGAGEMENT_SCORE),
        score_or(raw.relevance, DEFAULT_RELEVANCE),
    ))
}

pub fn validate_guidelines(raw: RawGuidelines, stage: &str) -> Result<RawGuidelines, CoreError> {
    let guidelines = RawGuidelines {
        recommendations: clean_list(raw.recommendations),
        structures: clean_list(raw.structures),
        tone_tips: clean_list(raw.tone_tips),
        posting_times: clean_list(raw.posting_times),
    };

    if guidelines.recommendations.is_empty()
        && guidelines.structures.is_empty()
        && guidelines.tone_tips.is_empty()
    {
        return Err(CoreError::generation_failed(stage, "guidelines response was empty"));
    }
    Ok(guidelines)
}

pub fn validate_insights(raw: RawInsights, stage: &str) -> Result<RawInsights, CoreError> {
    let insights = RawInsights {
        instructions: clean_list(raw.instructions),
        respected_qualities: clean_list(raw.respected_qualities),
        pitfalls: clean_list(raw.pitfalls),
        example_comment_styles: clean_list(raw.example_comment_styles),
    };

    if insights.instructions.is_empty() && insights.respected_qualities.is_empty() {
        return Err(CoreError::generation_failed(stage, "insights response was empty"));
    }
    Ok(insights)
}

/// Aligns scores with `idea_count` ideas, clamps them to 1..=10 and derives the
/// average when the model omitted it.
pub fn validate_novelty(
    raw: RawNoveltyAssessment,
    idea_count: usize,
    stage: &str,
) -> Result<NoveltyAssessment, CoreError> {
    let mut scores = vec![None; idea_count];
    for (position, entry) in raw.scores.into_iter().enumerate() {
        let index = entry.index.unwrap_or(position + 1);
        if index >= 1 && index <= idea_count && entry.score.is_finite() {
            scores[index - 1] = Some(entry.score.clamp(1.0, 10.0));
        }
    }

    let average = match raw.average_score.filter(|avg| avg.is_finite()) {
        Some(avg) => avg.clamp(1.0, 10.0),
        None => {
            let known: Vec<f64> = scores.iter().flatten().copied().collect();
            if known.is_empty() {
                return Err(CoreError::generation_failed(
                    stage,
                    "no novelty scores in response",
                ));
            }
            known.iter().sum::<f64>() / known.len() as f64
        }
    };

    Ok(NoveltyAssessment { scores, average })
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn score_or(value: Option<f64>, default: f64) -> f64 {
    value
        .filter(|score| score.is_finite() && *score > 0.0)
        .unwrap_or(default)
}
