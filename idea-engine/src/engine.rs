use crate::novelty::NoveltyCache;
use crate::prompts::{
    comment_ideas_prompt, excerpt, exploration_prompt, full_post_prompt, gap_analysis_prompt,
    guidelines_prompt, insights_prompt, novelty_assessment_prompt, post_dataset,
    post_ideas_prompt, reference_highlight, PostIdeaPrompt, STRATEGIST_SYSTEM_PROMPT,
    VETERAN_SYSTEM_PROMPT,
};
use crate::schema::{
    validate_comment_ideas, validate_guidelines, validate_insights, validate_novelty,
    validate_post_ideas, word_count, ExplorationSeeds, NoveltyAssessment, RawCommentIdeas,
    RawFullPost, RawGapAnalysis, RawGuidelines, RawInsights, RawNoveltyAssessment, RawPostIdeas,
};
use chrono::Utc;
use llm_interface::{parse_json_response, CompletionOptions, LlmProvider};
use reddit_client::CommunitySource;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use subforge_core::{
    AppConfig, CommentIdeaRequest, CommentIdeaResult, CommentInsights, CoreError, ErrorExt,
    FullPostRequest, FullPostResult, GuidelinesCache, InsightsCache, PostGuidelines, PostIdea,
    PostIdeaRequest, PostIdeaResult, PostThread, RedditComment, TimeWindow,
};
use tracing::{debug, info, warn};

pub const GUIDELINE_POST_LIMIT: usize = 20;
pub const REFERENCE_HIGHLIGHTS: usize = 5;
pub const INSIGHT_POST_LIMIT: usize = 5;
pub const COMMENTS_PER_INSIGHT_POST: usize = 3;
pub const COMMENT_REFERENCE_LIMIT: usize = 5;
pub const MAX_POST_IDEA_ATTEMPTS: u32 = 2;
const COMMENT_EXCERPT_CHARS: usize = 500;

const STAGE_GUIDELINES: &str = "posting guidelines";
const STAGE_GAPS: &str = "gap analysis";
const STAGE_SEEDS: &str = "exploration seeds";
const STAGE_POST_IDEAS: &str = "post ideas";
const STAGE_NOVELTY: &str = "novelty assessment";
const STAGE_COMMENT_IDEAS: &str = "comment ideas";
const STAGE_INSIGHTS: &str = "comment insights";
const STAGE_FULL_POST: &str = "full post";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sampling temperature for creative stages on the first attempt.
    pub base_temperature: f32,
    /// Added to the base temperature on the bold attempt.
    pub bold_temperature_boost: f32,
    pub max_temperature: f32,
    /// Temperature for analysis stages (guidelines, gaps, insights, novelty).
    pub analysis_temperature: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    /// Average novelty below this on the first attempt triggers the bold attempt.
    pub novelty_threshold: f64,
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_temperature: 0.85,
            bold_temperature_boost: 0.2,
            max_temperature: 1.05,
            analysis_temperature: 0.4,
            presence_penalty: 0.6,
            frequency_penalty: 0.4,
            novelty_threshold: 7.0,
            request_timeout: Duration::from_secs(180),
        }
    }
}

impl EngineConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            ..Self::default()
        }
    }

    pub fn temperature_for_attempt(&self, attempt: u32) -> f32 {
        if attempt > 1 {
            (self.base_temperature + self.bold_temperature_boost).min(self.max_temperature)
        } else {
            self.base_temperature
        }
    }
}

/// Grounding material shared by every generation attempt of one request.
#[derive(Debug, Clone)]
struct Grounding {
    guidelines: PostGuidelines,
    reference_highlights: Vec<String>,
    seeds: ExplorationSeeds,
}

#[derive(Debug)]
struct Generation {
    ideas: Vec<PostIdea>,
    engagement_score: f64,
    relevance: f64,
}

/// Post-idea pipeline states. `Commit` is always reached within
/// [`MAX_POST_IDEA_ATTEMPTS`] generations.
#[derive(Debug)]
enum PostIdeaStage {
    Grounding,
    Attempt {
        grounding: Grounding,
        number: u32,
    },
    Evaluate {
        grounding: Grounding,
        number: u32,
        generation: Generation,
    },
    Commit {
        grounding: Grounding,
        generation: Generation,
        novelty_score: Option<f64>,
    },
}

pub struct IdeaEngine {
    source: Arc<dyn CommunitySource>,
    llm: Arc<dyn LlmProvider>,
    guidelines: GuidelinesCache,
    insights: InsightsCache,
    novelty: NoveltyCache,
    config: EngineConfig,
}

impl IdeaEngine {
    pub fn new(
        source: Arc<dyn CommunitySource>,
        llm: Arc<dyn LlmProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            source,
            llm,
            guidelines: GuidelinesCache::guidelines(),
            insights: InsightsCache::insights(),
            novelty: NoveltyCache::new(),
            config,
        }
    }

    pub fn source(&self) -> &Arc<dyn CommunitySource> {
        &self.source
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    pub fn novelty_cache(&self) -> &NoveltyCache {
        &self.novelty
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Guidelines derived from the last 14 days of top posts, cached for 48 hours.
    pub async fn get_posting_guidelines(&self, subreddit: &str) -> Result<PostGuidelines, CoreError> {
        let subreddit = community_name(subreddit)?;
        self.with_deadline(STAGE_GUIDELINES, self.posting_guidelines(subreddit))
            .await
    }

    pub async fn generate_post_ideas(
        &self,
        request: &PostIdeaRequest,
    ) -> Result<PostIdeaResult, CoreError> {
        request.validate()?;
        self.with_deadline(STAGE_POST_IDEAS, self.post_idea_pipeline(request))
            .await
    }

    pub async fn generate_comment_ideas(
        &self,
        request: &CommentIdeaRequest,
    ) -> Result<CommentIdeaResult, CoreError> {
        let post_ref = request.validate()?;
        self.with_deadline(STAGE_COMMENT_IDEAS, self.comment_ideas(request, post_ref))
            .await
    }

    pub async fn get_comment_insights(&self, subreddit: &str) -> Result<CommentInsights, CoreError> {
        let subreddit = community_name(subreddit)?;
        self.with_deadline(STAGE_INSIGHTS, self.comment_insights(subreddit))
            .await
    }

    pub async fn generate_full_post(
        &self,
        request: &FullPostRequest,
    ) -> Result<FullPostResult, CoreError> {
        request.validate()?;
        self.with_deadline(STAGE_FULL_POST, self.full_post(request))
            .await
    }

    async fn with_deadline<T>(
        &self,
        operation: &str,
        work: impl Future<Output = Result<T, CoreError>>,
    ) -> Result<T, CoreError> {
        match tokio::time::timeout(self.config.request_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "{} did not finish within {:?}",
                    operation, self.config.request_timeout
                );
                Err(CoreError::Timeout {
                    seconds: self.config.request_timeout.as_secs(),
                })
            }
        }
    }

    async fn complete_json<T: DeserializeOwned>(
        &self,
        stage: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<T, CoreError> {
        debug!("Running {} stage ({} char prompt)", stage, prompt.len());
        let text = self.llm.complete(prompt, options).await?;
        parse_json_response(&text, stage)
    }

    fn analysis_options(&self, system_prompt: &str) -> CompletionOptions {
        CompletionOptions::default()
            .with_temperature(self.config.analysis_temperature)
            .with_max_tokens(1500)
            .with_system_prompt(system_prompt)
    }

    fn creative_options(&self, temperature: f32, max_tokens: u32) -> CompletionOptions {
        CompletionOptions::default()
            .with_temperature(temperature)
            .with_max_tokens(max_tokens)
            .with_system_prompt(STRATEGIST_SYSTEM_PROMPT)
            .with_penalties(self.config.presence_penalty, self.config.frequency_penalty)
    }

    async fn posting_guidelines(&self, subreddit: &str) -> Result<PostGuidelines, CoreError> {
        if let Some(cached) = self.guidelines.get(subreddit) {
            debug!("Using cached posting guidelines for r/{}", subreddit);
            return Ok(cached);
        }

        let posts = self
            .source
            .fetch_top_posts_last_14_days(subreddit, GUIDELINE_POST_LIMIT)
            .await?;
        if posts.is_empty() {
            return Err(CoreError::InsufficientData {
                message: format!("No top posts from the last 14 days in r/{}", subreddit),
            });
        }

        let dataset = post_dataset(&posts);
        let raw: RawGuidelines = self
            .complete_json(
                STAGE_GUIDELINES,
                &guidelines_prompt(subreddit, &dataset),
                &self.analysis_options(STRATEGIST_SYSTEM_PROMPT),
            )
            .await?;
        let base = validate_guidelines(raw, STAGE_GUIDELINES)?;
        let gaps = self.gap_analysis(subreddit, &dataset, &base).await;

        let guidelines = PostGuidelines {
            subreddit: subreddit.to_string(),
            source_posts: posts,
            recommendations: base.recommendations,
            structures: base.structures,
            tone_tips: base.tone_tips,
            posting_times: base.posting_times,
            underrepresented_angles: gaps.underrepresented_angles,
            tension_hooks: gaps.tension_hooks,
            generated_at: Utc::now(),
        };
        self.guidelines.set(subreddit, guidelines.clone());
        info!(
            "Derived posting guidelines for r/{} from {} posts",
            subreddit,
            guidelines.source_posts.len()
        );
        Ok(guidelines)
    }

    async fn gap_analysis(
        &self,
        subreddit: &str,
        dataset: &str,
        base: &RawGuidelines,
    ) -> RawGapAnalysis {
        let result = self
            .complete_json::<RawGapAnalysis>(
                STAGE_GAPS,
                &gap_analysis_prompt(subreddit, dataset, base),
                &self.analysis_options(STRATEGIST_SYSTEM_PROMPT),
            )
            .await;

        match result {
            Ok(gaps) => gaps,
            Err(e) => {
                warn!("Gap analysis for r/{} unavailable, continuing without it: {}", subreddit, e);
                RawGapAnalysis::default()
            }
        }
    }

    async fn exploration_seeds(
        &self,
        subreddit: &str,
        gaps: &RawGapAnalysis,
        context: Option<&str>,
    ) -> ExplorationSeeds {
        let result = self
            .complete_json::<ExplorationSeeds>(
                STAGE_SEEDS,
                &exploration_prompt(subreddit, gaps, context),
                &self.creative_options(self.config.base_temperature, 800),
            )
            .await;

        match result {
            Ok(seeds) => seeds,
            Err(e) => {
                warn!(
                    "Exploration seeds for r/{} unavailable, continuing without them: {}",
                    subreddit,
                    e,
                );
                ExplorationSeeds::default()
            }
        }
    }

    async fn assess_novelty(&self, subreddit: &str, ideas: &[PostIdea]) -> Option<NoveltyAssessment> {
        let result = self
            .complete_json::<RawNoveltyAssessment>(
                STAGE_NOVELTY,
                &novelty_assessment_prompt(subreddit, ideas),
                &self.analysis_options(VETERAN_SYSTEM_PROMPT),
            )
            .await
            .and_then(|raw| validate_novelty(raw, ideas.len(), STAGE_NOVELTY));

        match result {
            Ok(assessment) => Some(assessment),
            Err(e) => {
                warn!(
                    "Novelty assessment for r/{} unavailable, committing without a score: {}",
                    subreddit,
                    e,
                );
                None
            }
        }
    }

    async fn post_idea_pipeline(&self, request: &PostIdeaRequest) -> Result<PostIdeaResult, CoreError> {
        let subreddit = request.subreddit.trim();
        let mut stage = PostIdeaStage::Grounding;

        loop {
            stage = match stage {
                PostIdeaStage::Grounding => PostIdeaStage::Attempt {
                    grounding: self.ground_post_ideas(subreddit, request).await?,
                    number: 1,
                },
                PostIdeaStage::Attempt { grounding, number } => {
                    let generation = self
                        .attempt_post_ideas(subreddit, request, &grounding, number)
                        .await?;
                    PostIdeaStage::Evaluate {
                        grounding,
                        number,
                        generation,
                    }
                }
                PostIdeaStage::Evaluate {
                    grounding,
                    number,
                    mut generation,
                } => {
                    let assessment = self.assess_novelty(subreddit, &generation.ideas).await;
                    if let Some(assessment) = &assessment {
                        for (idea, score) in generation.ideas.iter_mut().zip(&assessment.scores) {
                            idea.novelty_score = *score;
                        }
                    }
                    let average = assessment.map(|a| a.average);

                    match average {
                        Some(average)
                            if average < self.config.novelty_threshold
                                && number < MAX_POST_IDEA_ATTEMPTS =>
                        {
                            info!(
                                "Novelty average {:.1} for r/{} is below {:.1}, trying a bolder attempt",
                                average, subreddit, self.config.novelty_threshold
                            );
                            PostIdeaStage::Attempt {
                                grounding,
                                number: number + 1,
                            }
                        }
                        _ => PostIdeaStage::Commit {
                            grounding,
                            generation,
                            novelty_score: average,
                        },
                    }
                }
                PostIdeaStage::Commit {
                    grounding,
                    generation,
                    novelty_score,
                } => {
                    self.novelty.remember_ideas(subreddit, &generation.ideas);
                    info!(
                        "Returning {} post ideas for r/{} (novelty {:?})",
                        generation.ideas.len(),
                        subreddit,
                        novelty_score
                    );
                    return Ok(PostIdeaResult {
                        subreddit: subreddit.to_string(),
                        ideas: generation.ideas,
                        engagement_score: generation.engagement_score,
                        relevance: generation.relevance,
                        novelty_score,
                        guidelines: grounding.guidelines,
                    });
                }
            };
        }
    }

    async fn ground_post_ideas(
        &self,
        subreddit: &str,
        request: &PostIdeaRequest,
    ) -> Result<Grounding, CoreError> {
        let guidelines = self.posting_guidelines(subreddit).await?;
        let reference_highlights = guidelines
            .source_posts
            .iter()
            .take(REFERENCE_HIGHLIGHTS)
            .map(reference_highlight)
            .collect();
        let gaps = RawGapAnalysis {
            underrepresented_angles: guidelines.underrepresented_angles.clone(),
            tension_hooks: guidelines.tension_hooks.clone(),
        };
        let seeds = self
            .exploration_seeds(subreddit, &gaps, request.context.as_deref())
            .await;

        Ok(Grounding {
            guidelines,
            reference_highlights,
            seeds,
        })
    }

    async fn attempt_post_ideas(
        &self,
        subreddit: &str,
        request: &PostIdeaRequest,
        grounding: &Grounding,
        number: u32,
    ) -> Result<Generation, CoreError> {
        let temperature = self.config.temperature_for_attempt(number);
        let prompt = post_ideas_prompt(&PostIdeaPrompt {
            subreddit,
            guidelines: &grounding.guidelines,
            reference_highlights: &grounding.reference_highlights,
            seeds: &grounding.seeds,
            context: request.context.as_deref(),
            tone: request.tone.as_deref(),
            bold: number > 1,
        });
        info!(
            "Generating post ideas for r/{} (attempt {}, temperature {:.2})",
            subreddit, number, temperature
        );

        let raw: RawPostIdeas = self
            .complete_json(
                STAGE_POST_IDEAS,
                &prompt,
                &self.creative_options(temperature, 2048),
            )
            .await?;
        let validated = validate_post_ideas(raw, STAGE_POST_IDEAS)?;

        let partition = self.novelty.filter_novel_ideas(subreddit, validated.ideas);
        let ideas = if partition.novel.is_empty() {
            warn!(
                "All {} ideas for r/{} were surfaced before, evaluating them anyway",
                partition.duplicates.len(),
                subreddit
            );
            partition.duplicates
        } else {
            partition.novel
        };

        Ok(Generation {
            ideas,
            engagement_score: validated.engagement_score,
            relevance: validated.relevance,
        })
    }

    async fn comment_ideas(
        &self,
        request: &CommentIdeaRequest,
        post_ref: &str,
    ) -> Result<CommentIdeaResult, CoreError> {
        let subreddit = request.subreddit.trim();
        let PostThread { post, comments } = self
            .source
            .fetch_post_with_comments(subreddit, post_ref)
            .await
            .map_err(|e| missing_post(e, post_ref))?;
        let post = post.ok_or_else(|| CoreError::NotFound {
            resource: format!("Post {}", post_ref),
        })?;

        let references = top_comment_bodies(&comments, COMMENT_REFERENCE_LIMIT);
        let prompt = comment_ideas_prompt(
            &post,
            &references,
            request.context.as_deref(),
            request.tone.as_deref(),
        );
        let raw: RawCommentIdeas = self
            .complete_json(
                STAGE_COMMENT_IDEAS,
                &prompt,
                &self.creative_options(self.config.base_temperature, 1500),
            )
            .await?;
        let (ideas, engagement_score, relevance) =
            validate_comment_ideas(raw, STAGE_COMMENT_IDEAS)?;

        info!(
            "Generated {} comment ideas for post {} in r/{}",
            ideas.len(),
            post.id,
            subreddit
        );
        Ok(CommentIdeaResult {
            subreddit: subreddit.to_string(),
            post_id: post.id,
            ideas,
            engagement_score,
            relevance,
        })
    }

    async fn comment_insights(&self, subreddit: &str) -> Result<CommentInsights, CoreError> {
        if let Some(cached) = self.insights.get(subreddit) {
            debug!("Using cached comment insights for r/{}", subreddit);
            return Ok(cached);
        }

        let posts = self
            .source
            .fetch_top_posts(subreddit, TimeWindow::Week, INSIGHT_POST_LIMIT)
            .await?;

        // Serial on purpose: every fetch shares the community API budget.
        let mut dataset = String::new();
        let mut analyzed_posts = 0;
        for post in &posts {
            let thread = match self.source.fetch_post_with_comments(subreddit, &post.id).await {
                Ok(thread) => thread,
                Err(e) => {
                    warn!("Skipping post {} in r/{} for insights: {}", post.id, subreddit, e);
                    continue;
                }
            };

            let top = top_comment_bodies(&thread.comments, COMMENTS_PER_INSIGHT_POST);
            if top.is_empty() {
                continue;
            }
            analyzed_posts += 1;
            dataset.push_str(&insight_section(&post.title, &top));
        }

        if analyzed_posts == 0 {
            return Err(CoreError::InsufficientData {
                message: format!("No usable comments found in top posts of r/{}", subreddit),
            });
        }

        let raw: RawInsights = self
            .complete_json(
                STAGE_INSIGHTS,
                &insights_prompt(subreddit, &dataset),
                &self.analysis_options(STRATEGIST_SYSTEM_PROMPT),
            )
            .await?;
        let raw = validate_insights(raw, STAGE_INSIGHTS)?;

        let insights = CommentInsights {
            subreddit: subreddit.to_string(),
            instructions: raw.instructions,
            respected_qualities: raw.respected_qualities,
            pitfalls: raw.pitfalls,
            example_comment_styles: raw.example_comment_styles,
            analyzed_posts,
            generated_at: Utc::now(),
        };
        self.insights.set(subreddit, insights.clone());
        info!(
            "Derived comment insights for r/{} from {} posts",
            subreddit, analyzed_posts
        );
        Ok(insights)
    }

    async fn full_post(&self, request: &FullPostRequest) -> Result<FullPostResult, CoreError> {
        let subreddit = request.subreddit.trim();
        let guidelines = match self.posting_guidelines(subreddit).await {
            Ok(guidelines) => Some(guidelines),
            Err(e) => {
                warn!("Writing full post for r/{} without guidelines: {}", subreddit, e);
                None
            }
        };

        let raw: RawFullPost = self
            .complete_json(
                STAGE_FULL_POST,
                &full_post_prompt(request, guidelines.as_ref()),
                &self.creative_options(self.config.base_temperature, 1500),
            )
            .await?;

        let content = raw.content.trim().to_string();
        if content.is_empty() {
            return Err(CoreError::generation_failed(
                STAGE_FULL_POST,
                "response had no post content",
            ));
        }
        let title = raw
            .title
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| request.idea.title.trim().to_string());
        let word_count = raw
            .word_count
            .filter(|count| *count > 0)
            .unwrap_or_else(|| word_count(&content));

        Ok(FullPostResult {
            title,
            content,
            word_count,
        })
    }
}

fn community_name(subreddit: &str) -> Result<&str, CoreError> {
    let subreddit = subreddit.trim();
    if subreddit.is_empty() {
        return Err(CoreError::invalid_input("Subreddit is required"));
    }
    Ok(subreddit)
}

/// A thread fetch that failed with 404 means the post does not exist.
fn missing_post(error: CoreError, post_ref: &str) -> CoreError {
    if error.status_code() == Some(404) {
        CoreError::NotFound {
            resource: format!("Post {}", post_ref),
        }
    } else {
        error
    }
}

/// Highest-voted non-empty comment bodies, trimmed for prompting.
fn top_comment_bodies(comments: &[RedditComment], limit: usize) -> Vec<String> {
    let mut ranked: Vec<&RedditComment> = comments
        .iter()
        .filter(|c| {
            let body = c.body.trim();
            !body.is_empty() && body != "[deleted]" && body != "[removed]"
        })
        .collect();
    ranked.sort_by(|a, b| b.upvotes.cmp(&a.upvotes));
    ranked
        .into_iter()
        .take(limit)
        .map(|c| excerpt(&c.body, COMMENT_EXCERPT_CHARS))
        .collect()
}

fn insight_section(title: &str, bodies: &[String]) -> String {
    let mut section = format!("Post: \"{}\"\n", title);
    for body in bodies {
        section.push_str(&format!("- {}\n", body));
    }
    section.push('\n');
    section
}
