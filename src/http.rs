use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use idea_engine::IdeaEngine;
use reddit_client::{RateLimitStatus, RedditClient};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use subforge_core::{
    CommentIdeaRequest, CoreError, ErrorExt, FullPostRequest, PostIdeaRequest, TimeWindow,
};
use tower_http::trace::TraceLayer;

const DEFAULT_TOP_LIMIT: usize = 25;
const MAX_TOP_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<IdeaEngine>,
    pub reddit: Arc<RedditClient>,
}

pub fn create_router(state: AppState) -> Router {
    let reddit_routes = Router::new()
        .route("/subreddit/:name/analysis", get(subreddit_analysis))
        .route("/subreddit/:name/search", get(subreddit_search))
        .route("/subreddit/:name/top", get(subreddit_top))
        .route("/subreddit/:name/post/:post_id/comments", get(post_comments))
        .route("/rate-limit", get(rate_limit));

    let ai_routes = Router::new()
        .route("/generate-post-ideas", post(generate_post_ideas))
        .route("/generate-comment-ideas", post(generate_comment_ideas))
        .route("/comment-insights/:subreddit", get(comment_insights))
        .route("/post-guidelines/:subreddit", get(post_guidelines))
        .route("/generate-full-post", post(generate_full_post));

    Router::new()
        .route("/health", get(health))
        .nest("/api/reddit", reddit_routes)
        .nest("/api/ai", ai_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Renders a `CoreError` as `{ "error": ..., "code": ... }` with its mapped status.
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            self.0.log_error();
        } else {
            self.0.log_warn();
        }

        let body = Json(json!({
            "error": self.0.user_friendly_message(),
            "code": self.0.error_code(),
        }));
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Tags a generation result with the kind of idea it carries.
#[derive(Serialize)]
struct Tagged<T> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    body: T,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

#[derive(Deserialize)]
struct TopQuery {
    t: Option<String>,
    limit: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitReport {
    requests_per_window: u32,
    window_seconds: u64,
    current_window_requests: u32,
    requests_remaining: u32,
    utilization_percent: f64,
    time_until_next_slot_ms: u128,
}

impl From<RateLimitStatus> for RateLimitReport {
    fn from(status: RateLimitStatus) -> Self {
        Self {
            requests_per_window: status.requests_per_window,
            window_seconds: status.window_seconds,
            current_window_requests: status.current_window_requests,
            requests_remaining: status.requests_remaining_in_window(),
            utilization_percent: status.window_utilization_percentage(),
            time_until_next_slot_ms: status.time_until_next_slot.as_millis(),
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "llmProvider": state.engine.llm().name(),
    }))
}

async fn subreddit_analysis(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<subforge_core::SubredditAnalysis> {
    let analysis = state.engine.source().fetch_community_overview(&name).await?;
    Ok(Json(analysis))
}

async fn subreddit_search(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<serde_json::Value> {
    let q = query
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| CoreError::invalid_input("Search query (q) is required"))?;
    let posts = state.engine.source().search_subreddit(&name, &q).await?;
    Ok(Json(json!({ "subreddit": name, "query": q, "results": posts })))
}

async fn subreddit_top(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<TopQuery>,
) -> ApiResult<serde_json::Value> {
    let window = match query.t.as_deref() {
        None => TimeWindow::Week,
        Some(raw) => TimeWindow::parse(raw).ok_or_else(|| {
            CoreError::invalid_input(format!("Unknown time window: {}", raw))
        })?,
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TOP_LIMIT)
        .clamp(1, MAX_TOP_LIMIT);

    let posts = state
        .engine
        .source()
        .fetch_top_posts(&name, window, limit)
        .await?;
    Ok(Json(json!({
        "subreddit": name,
        "timeWindow": window.as_str(),
        "posts": posts,
    })))
}

async fn post_comments(
    State(state): State<AppState>,
    Path((name, post_id)): Path<(String, String)>,
) -> ApiResult<subforge_core::PostThread> {
    let thread = state
        .engine
        .source()
        .fetch_post_with_comments(&name, &post_id)
        .await?;
    Ok(Json(thread))
}

async fn rate_limit(State(state): State<AppState>) -> Json<RateLimitReport> {
    Json(state.reddit.rate_limit_status().await.into())
}

async fn generate_post_ideas(
    State(state): State<AppState>,
    Json(request): Json<PostIdeaRequest>,
) -> ApiResult<Tagged<subforge_core::PostIdeaResult>> {
    let result = state.engine.generate_post_ideas(&request).await?;
    Ok(Json(Tagged {
        kind: "post",
        body: result,
    }))
}

async fn generate_comment_ideas(
    State(state): State<AppState>,
    Json(request): Json<CommentIdeaRequest>,
) -> ApiResult<Tagged<subforge_core::CommentIdeaResult>> {
    let result = state.engine.generate_comment_ideas(&request).await?;
    Ok(Json(Tagged {
        kind: "comment",
        body: result,
    }))
}

async fn comment_insights(
    State(state): State<AppState>,
    Path(subreddit): Path<String>,
) -> ApiResult<subforge_core::CommentInsights> {
    Ok(Json(state.engine.get_comment_insights(&subreddit).await?))
}

async fn post_guidelines(
    State(state): State<AppState>,
    Path(subreddit): Path<String>,
) -> ApiResult<subforge_core::PostGuidelines> {
    Ok(Json(state.engine.get_posting_guidelines(&subreddit).await?))
}

async fn generate_full_post(
    State(state): State<AppState>,
    Json(request): Json<FullPostRequest>,
) -> ApiResult<subforge_core::FullPostResult> {
    Ok(Json(state.engine.generate_full_post(&request).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use idea_engine::EngineConfig;
    use llm_interface::{CompletionOptions, LlmProvider};
    use reddit_client::{CommunitySource, RateLimitConfig, RedditCredentials};
    use subforge_core::{
        EngagementPatterns, PostThread, RedditApiError, RedditPost, RetryConfig,
        SubredditAnalysis,
    };
    use tower::ServiceExt;

    struct StubSource {
        posts: Vec<RedditPost>,
    }

    #[async_trait]
    impl CommunitySource for StubSource {
        async fn fetch_community_overview(
            &self,
            subreddit: &str,
        ) -> Result<SubredditAnalysis, CoreError> {
            Ok(SubredditAnalysis {
                subreddit: subreddit.to_string(),
                recent_posts: self.posts.clone(),
                common_topics: vec!["lifetimes".to_string()],
                engagement_patterns: EngagementPatterns {
                    avg_upvotes: 10.0,
                    avg_comments: 2.0,
                },
                analyzed_at: Utc::now(),
            })
        }

        async fn fetch_top_posts(
            &self,
            _subreddit: &str,
            _window: TimeWindow,
            limit: usize,
        ) -> Result<Vec<RedditPost>, CoreError> {
            Ok(self.posts.iter().take(limit).cloned().collect())
        }

        async fn fetch_top_posts_last_14_days(
            &self,
            _subreddit: &str,
            limit: usize,
        ) -> Result<Vec<RedditPost>, CoreError> {
            Ok(self.posts.iter().take(limit).cloned().collect())
        }

        async fn search_subreddit(
            &self,
            _subreddit: &str,
            _query: &str,
        ) -> Result<Vec<RedditPost>, CoreError> {
            Ok(self.posts.clone())
        }

        async fn fetch_post_with_comments(
            &self,
            _subreddit: &str,
            post_ref: &str,
        ) -> Result<PostThread, CoreError> {
            Err(CoreError::RedditApi(RedditApiError::NotFound {
                resource: post_ref.to_string(),
            }))
        }
    }

    struct StubLlm;

    #[async_trait]
    impl LlmProvider for StubLlm {
        fn name(&self) -> &str {
            "stub"
        }

        async fn complete(
            &self,
            prompt: &str,
            _options: &CompletionOptions,
        ) -> Result<String, CoreError> {
            let reply = if prompt.contains("averageScore") {
                r#"{"scores":[{"index":1,"score":9}],"averageScore":9}"#
            } else if prompt.contains("toneTips") {
                r#"{"recommendations":["Show benchmarks"],"structures":["Story"],"toneTips":["Be humble"]}"#
            } else {
                r#"{"ideas":[{"title":"Borrowck confessions","bullets":["a","b","c"]}]}"#
            };
            Ok(reply.to_string())
        }
    }

    fn post(id: &str) -> RedditPost {
        RedditPost {
            id: id.to_string(),
            title: format!("Post {}", id),
            content: String::new(),
            author: "ferris".to_string(),
            subreddit: "rust".to_string(),
            upvotes: 10,
            downvotes: 0,
            comments: 2,
            created_at: Utc::now(),
            url: String::new(),
            score: 10,
        }
    }

    fn app(posts: Vec<RedditPost>) -> Router {
        let engine = IdeaEngine::new(
            Arc::new(StubSource { posts }),
            Arc::new(StubLlm),
            EngineConfig::default(),
        );
        let reddit = RedditClient::new(
            RedditCredentials::new("id".into(), "secret".into(), "subforge-test/0.1".into()),
            RateLimitConfig::reddit_oauth(),
            RetryConfig::default(),
        )
        .unwrap();
        create_router(AppState {
            engine: Arc::new(engine),
            reddit: Arc::new(reddit),
        })
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_names_provider() {
        let (status, body) = send(app(vec![]), get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["llmProvider"], "stub");
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let (status, body) = send(
            app(vec![post("a")]),
            get_request("/api/reddit/subreddit/rust/search"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_top_rejects_unknown_window() {
        let (status, _) = send(
            app(vec![post("a")]),
            get_request("/api/reddit/subreddit/rust/top?t=decade"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            app(vec![post("a"), post("b")]),
            get_request("/api/reddit/subreddit/rust/top?t=month&limit=1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["timeWindow"], "month");
        assert_eq!(body["posts"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_thread_is_not_found() {
        let (status, body) = send(
            app(vec![]),
            get_request("/api/reddit/subreddit/rust/post/abc123/comments"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_comment_ideas_without_post_id() {
        let (status, body) = send(
            app(vec![post("a")]),
            post_json("/api/ai/generate-comment-ideas", json!({ "subreddit": "rust" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Subreddit and postId are required");
    }

    #[tokio::test]
    async fn test_post_ideas_response_is_tagged() {
        let (status, body) = send(
            app(vec![post("a"), post("b")]),
            post_json("/api/ai/generate-post-ideas", json!({ "subreddit": "rust" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "post");
        assert_eq!(body["subreddit"], "rust");

        let idea = &body["ideas"][0];
        assert_eq!(idea["title"], "Borrowck confessions");
        let id = idea["id"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn test_guidelines_without_posts_is_unprocessable() {
        let (status, body) =
            send(app(vec![]), get_request("/api/ai/post-guidelines/rust")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "INSUFFICIENT_DATA");
    }

    #[tokio::test]
    async fn test_rate_limit_report_starts_empty() {
        let (status, body) = send(app(vec![]), get_request("/api/reddit/rate-limit")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["currentWindowRequests"], 0);
        assert_eq!(body["requestsRemaining"], body["requestsPerWindow"]);
    }
}
