use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub subreddit: String,
    pub upvotes: i64,
    pub downvotes: i64,
    pub comments: u64,
    pub created_at: DateTime<Utc>,
    pub url: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedditComment {
    pub id: String,
    pub body: String,
    pub author: String,
    pub post_id: String,
    pub upvotes: i64,
    pub downvotes: i64,
    pub created_at: DateTime<Utc>,
    pub score: i64,
}

/// A post together with its comment tree flattened to comment-kind entries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PostThread {
    pub post: Option<RedditPost>,
    pub comments: Vec<RedditComment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementPatterns {
    pub avg_upvotes: f64,
    pub avg_comments: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubredditAnalysis {
    pub subreddit: String,
    pub recent_posts: Vec<RedditPost>,
    pub common_topics: Vec<String>,
    pub engagement_patterns: EngagementPatterns,
    pub analyzed_at: DateTime<Utc>,
}

/// Ranking window for top-post listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Hour,
    Day,
    #[default]
    Week,
    Month,
    Year,
    All,
}

impl TimeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Hour => "hour",
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
            TimeWindow::Year => "year",
            TimeWindow::All => "all",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hour" => Some(TimeWindow::Hour),
            "day" => Some(TimeWindow::Day),
            "week" => Some(TimeWindow::Week),
            "month" => Some(TimeWindow::Month),
            "year" => Some(TimeWindow::Year),
            "all" => Some(TimeWindow::All),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostGuidelines {
    pub subreddit: String,
    pub source_posts: Vec<RedditPost>,
    pub recommendations: Vec<String>,
    pub structures: Vec<String>,
    pub tone_tips: Vec<String>,
    pub posting_times: Vec<String>,
    pub underrepresented_angles: Vec<String>,
    pub tension_hooks: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentInsights {
    pub subreddit: String,
    pub instructions: Vec<String>,
    pub respected_qualities: Vec<String>,
    pub pitfalls: Vec<String>,
    pub example_comment_styles: Vec<String>,
    pub analyzed_posts: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostIdea {
    pub id: Uuid,
    pub title: String,
    /// Hook, payoff and call-to-action, in that order.
    pub bullets: Vec<String>,
    pub inspiration: String,
    pub format: String,
    pub novelty_note: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub novelty_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentIdea {
    pub id: Uuid,
    pub content: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostIdeaResult {
    pub subreddit: String,
    pub ideas: Vec<PostIdea>,
    pub engagement_score: f64,
    pub relevance: f64,
    pub novelty_score: Option<f64>,
    pub guidelines: PostGuidelines,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentIdeaResult {
    pub subreddit: String,
    pub post_id: String,
    pub ideas: Vec<CommentIdea>,
    pub engagement_score: f64,
    pub relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullPostResult {
    pub title: String,
    pub content: String,
    pub word_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostIdeaRequest {
    #[serde(default)]
    pub subreddit: String,
    pub context: Option<String>,
    pub tone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentIdeaRequest {
    #[serde(default)]
    pub subreddit: String,
    /// Raw id, permalink, short link or `t3_` fullname.
    pub post_id: Option<String>,
    pub context: Option<String>,
    pub tone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeaSummary {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub bullets: Vec<String>,
    pub inspiration: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullPostRequest {
    #[serde(default)]
    pub subreddit: String,
    pub tone: Option<String>,
    #[serde(default)]
    pub idea: IdeaSummary,
    pub instructions: Option<String>,
    pub context: Option<String>,
}

fn require_subreddit(subreddit: &str) -> Result<(), crate::CoreError> {
    if subreddit.trim().is_empty() {
        return Err(crate::CoreError::invalid_input("Subreddit is required"));
    }
    Ok(())
}

impl PostIdeaRequest {
    pub fn validate(&self) -> Result<(), crate::CoreError> {
        require_subreddit(&self.subreddit)
    }
}

impl CommentIdeaRequest {
    pub fn validate(&self) -> Result<&str, crate::CoreError> {
        require_subreddit(&self.subreddit)?;
        match self.post_id.as_deref().map(str::trim) {
            Some(post_id) if !post_id.is_empty() => Ok(post_id),
            _ => Err(crate::CoreError::invalid_input(
                "Subreddit and postId are required",
            )),
        }
    }
}

impl FullPostRequest {
    pub fn validate(&self) -> Result<(), crate::CoreError> {
        require_subreddit(&self.subreddit)?;
        if self.idea.title.trim().is_empty() {
            return Err(crate::CoreError::invalid_input("Idea title is required"));
        }
        Ok(())
    }
}
