//! Prompt builders for every LLM stage. Each prompt names the exact JSON
//! object it expects back; the matching shapes live in [`crate::schema`].

use crate::schema::{ExplorationSeeds, RawGapAnalysis, RawGuidelines};
use subforge_core::{FullPostRequest, PostGuidelines, PostIdea, RedditPost};

pub const STRATEGIST_SYSTEM_PROMPT: &str = "You are an expert Reddit strategist who studies what \
content performs well in specific communities. You always answer with a single JSON object and \
nothing else.";

pub const VETERAN_SYSTEM_PROMPT: &str = "You are a long-time member of this community who has seen \
every recurring post a hundred times. You are hard to impress. Answer with a single JSON object.";

const EXCERPT_CHARS: usize = 280;
const QUESTION_WORD_RANGE: (usize, usize) = (100, 200);
const NARRATIVE_WORD_RANGE: (usize, usize) = (250, 500);
const QUESTION_OPENERS: &[&str] = &[
    "what", "why", "how", "who", "when", "where", "which", "is", "are", "do", "does", "did",
    "should", "would", "could", "can", "anyone", "has", "have",
];

/// Cuts `text` to at most `max_chars` characters, marking the cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", trimmed[..cut].trim_end()),
        None => trimmed.to_string(),
    }
}

pub fn post_dataset(posts: &[RedditPost]) -> String {
    let mut dataset = String::new();
    for (i, post) in posts.iter().enumerate() {
        dataset.push_str(&format!(
            "{}. \"{}\" ({} upvotes, {} comments)\n",
            i + 1,
            post.title,
            post.upvotes,
            post.comments
        ));
        if !post.content.trim().is_empty() {
            dataset.push_str(&format!("   {}\n", excerpt(&post.content, EXCERPT_CHARS)));
        }
    }
    dataset
}

pub fn reference_highlight(post: &RedditPost) -> String {
    format!(
        "\"{}\" - {} upvotes, {} comments",
        post.title, post.upvotes, post.comments
    )
}

/// Titles phrased as a question get a short body; everything else reads as a narrative.
pub fn is_question(title: &str) -> bool {
    let title = title.trim();
    if title.ends_with('?') {
        return true;
    }
    title
        .split_whitespace()
        .next()
        .map(|first| {
            let first = first
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            QUESTION_OPENERS.contains(&first.as_str())
        })
        .unwrap_or(false)
}

pub fn word_range(title: &str) -> (usize, usize) {
    if is_question(title) {
        QUESTION_WORD_RANGE
    } else {
        NARRATIVE_WORD_RANGE
    }
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- (none)\n".to_string();
    }
    items.iter().map(|item| format!("- {}\n", item)).collect()
}

pub fn guidelines_prompt(subreddit: &str, dataset: &str) -> String {
    format!(
        r#"Here are the top posts from r/{subreddit} over the last 14 days:

{dataset}
Study what these posts have in common and derive posting guidelines for r/{subreddit}.

Respond with a JSON object:
{{
  "recommendations": ["specific, actionable advice"],
  "structures": ["post structures that perform well"],
  "toneTips": ["notes on voice and tone"],
  "postingTimes": ["observations about timing"]
}}"#
    )
}

pub fn gap_analysis_prompt(subreddit: &str, dataset: &str, guidelines: &RawGuidelines) -> String {
    format!(
        r#"These are the top recent posts from r/{subreddit}:

{dataset}
Known patterns:
{patterns}
Find what this community is NOT talking about yet: angles nobody covers and tensions
members feel but rarely voice.

Respond with a JSON object:
{{
  "underrepresentedAngles": ["angle the top posts leave out"],
  "tensionHooks": ["a disagreement or unspoken belief worth poking"]
}}"#,
        patterns = bullet_list(&guidelines.recommendations),
    )
}

pub fn exploration_prompt(subreddit: &str, gaps: &RawGapAnalysis, context: Option<&str>) -> String {
    let mut prompt = format!(
        "Brainstorm fresh territory for r/{}.\n\nUnderrepresented angles:\n{}\nTension hooks:\n{}",
        subreddit,
        bullet_list(&gaps.underrepresented_angles),
        bullet_list(&gaps.tension_hooks)
    );
    if let Some(context) = context {
        prompt.push_str(&format!("\nThe poster adds: {}\n", context));
    }
    prompt.push_str(
        r#"
Push past the obvious. Respond with a JSON object:
{
  "tensions": ["a conflict members live with"],
  "whatIfs": ["a provocative what-if scenario"]
}"#,
    );
    prompt
}

pub struct PostIdeaPrompt<'a> {
    pub subreddit: &'a str,
    pub guidelines: &'a PostGuidelines,
    pub reference_highlights: &'a [String],
    pub seeds: &'a ExplorationSeeds,
    pub context: Option<&'a str>,
    pub tone: Option<&'a str>,
    pub bold: bool,
}

pub fn post_ideas_prompt(input: &PostIdeaPrompt<'_>) -> String {
    let guidelines = input.guidelines;
    let mut prompt = format!(
        "Create original post ideas for r/{}.\n\n\
         What works here:\n{}\nStructures:\n{}\nTone:\n{}\n\
         Top posts right now:\n{}\n\
         Underrepresented angles:\n{}\nTension hooks:\n{}",
        input.subreddit,
        bullet_list(&guidelines.recommendations),
        bullet_list(&guidelines.structures),
        bullet_list(&guidelines.tone_tips),
        bullet_list(input.reference_highlights),
        bullet_list(&guidelines.underrepresented_angles),
        bullet_list(&guidelines.tension_hooks),
    );

    if !input.seeds.is_empty() {
        prompt.push_str(&format!(
            "\nExploration seeds:\n{}{}",
            bullet_list(&input.seeds.tensions),
            bullet_list(&input.seeds.what_ifs)
        ));
    }
    if let Some(context) = input.context {
        prompt.push_str(&format!("\nWhat the poster wants to talk about: {}\n", context));
    }
    prompt.push_str(&format!(
        "\nTone directive: {}\n",
        input.tone.unwrap_or("authentic and conversational")
    ));
    if input.bold {
        prompt.push_str(
            "\nThe previous batch was too safe and too familiar to regulars. Be bolder: \
             take real positions, pick unexpected angles, and avoid anything that reads like \
             a post this community has already seen.\n",
        );
    }

    prompt.push_str(
        r#"
Requirements:
- Exactly 4 ideas.
- Each idea has exactly three bullets: the hook, the payoff, and the call to action.
- At least one idea contradicts a belief this community holds.
- At least one idea is framed as a personal confession.

Respond with a JSON object:
{
  "ideas": [
    {
      "title": "post title",
      "bullets": ["hook", "payoff", "call to action"],
      "inspiration": "which observation inspired it",
      "format": "story | question | guide | confession | debate",
      "noveltyNote": "why regulars have not seen this before"
    }
  ],
  "engagementScore": 8.5,
  "relevance": 9.0
}"#,
    );
    prompt
}

pub fn novelty_assessment_prompt(subreddit: &str, ideas: &[PostIdea]) -> String {
    let mut listing = String::new();
    for (i, idea) in ideas.iter().enumerate() {
        listing.push_str(&format!("{}. {}\n", i + 1, idea.title));
        for bullet in &idea.bullets {
            listing.push_str(&format!("   - {}\n", bullet));
        }
    }

    format!(
        r#"You have been reading r/{subreddit} for years. Rate how surprising each of these post
ideas would feel to you, from 1 (seen it a hundred times) to 10 (never seen anything like it).

{listing}
Respond with a JSON object:
{{
  "scores": [{{ "index": 1, "score": 6 }}],
  "averageScore": 6.0
}}"#
    )
}

pub fn comment_ideas_prompt(
    post: &RedditPost,
    top_comments: &[String],
    context: Option<&str>,
    tone: Option<&str>,
) -> String {
    let body = if post.content.trim().is_empty() {
        "N/A".to_string()
    } else {
        excerpt(&post.content, 1200)
    };
    let mut prompt = format!(
        "Post title: \"{}\"\nPost content: {}\nCurrent score: {} upvotes\nNumber of comments: {}\n\n\
         Top comments (for reference):\n{}",
        post.title,
        body,
        post.score,
        post.comments,
        bullet_list(top_comments)
    );
    if let Some(context) = context {
        prompt.push_str(&format!("\nAdditional context: {}\n", context));
    }

    prompt.push_str(&format!(
        r#"
Write exactly 3 comment ideas likely to be upvoted in this thread. Add genuine value,
respect the community, and use humour or relatability where it fits.
Tone: {}

Respond with a JSON object:
{{
  "ideas": [{{ "content": "the comment", "reasoning": "why it will land" }}],
  "engagementScore": 8.5,
  "relevance": 9.0
}}"#,
        tone.unwrap_or("match the thread")
    ));
    prompt
}

pub fn insights_prompt(subreddit: &str, dataset: &str) -> String {
    format!(
        r#"Below are the most upvoted comments from popular r/{subreddit} threads:

{dataset}
Describe what earns upvotes in the comment sections of this community.

Respond with a JSON object:
{{
  "instructions": ["how to write a comment that lands here"],
  "respectedQualities": ["qualities this community rewards"],
  "pitfalls": ["things that get downvoted"],
  "exampleCommentStyles": ["a short description of a style that works"]
}}"#
    )
}

pub fn full_post_prompt(request: &FullPostRequest, guidelines: Option<&PostGuidelines>) -> String {
    let idea = &request.idea;
    let (min_words, max_words) = word_range(&idea.title);
    let mut prompt = format!(
        "Write a complete post for r/{}.\n\nTitle: {}\nOutline:\n{}",
        request.subreddit,
        idea.title,
        bullet_list(&idea.bullets)
    );
    if let Some(inspiration) = idea.inspiration.as_deref() {
        prompt.push_str(&format!("Inspiration: {}\n", inspiration));
    }
    if let Some(guidelines) = guidelines {
        prompt.push_str(&format!(
            "\nCommunity guidelines:\n{}Tone notes:\n{}",
            bullet_list(&guidelines.recommendations),
            bullet_list(&guidelines.tone_tips)
        ));
    }
    if let Some(context) = request.context.as_deref() {
        prompt.push_str(&format!("\nExtra context: {}\n", context));
    }
    if let Some(instructions) = request.instructions.as_deref() {
        prompt.push_str(&format!("\nAuthor instructions: {}\n", instructions));
    }

    prompt.push_str(&format!(
        r#"
Tone: {tone}
Length: between {min_words} and {max_words} words. Write it as a real member would, with no
headings and no hashtags.

Respond with a JSON object:
{{
  "title": "final title",
  "content": "the full post body",
  "wordCount": 0
}}"#,
        tone = request.tone.as_deref().unwrap_or("authentic and conversational"),
    ));
    prompt
}
