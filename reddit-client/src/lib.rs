pub mod analysis;
pub mod api;
pub mod auth;
pub mod post_ref;
pub mod rate_limiter;

pub use analysis::*;
pub use api::*;
pub use auth::*;
pub use post_ref::*;
pub use rate_limiter::*;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use subforge_core::{
    CoreError, ErrorExt, PostThread, PostThreadCache, RedditApiError, RedditPost, RetryConfig,
    RetryExecutor, RetryMetrics, SubredditAnalysis, TimeWindow,
};
use tracing::{debug, info, warn};

pub const OVERVIEW_POST_LIMIT: usize = 50;
pub const SEARCH_RESULT_LIMIT: usize = 25;
pub const THREAD_COMMENT_LIMIT: usize = 100;

/// Read access to a community's posts and comments.
#[async_trait]
pub trait CommunitySource: Send + Sync {
    /// Recent posts plus derived topic and engagement statistics.
    async fn fetch_community_overview(&self, subreddit: &str)
        -> Result<SubredditAnalysis, CoreError>;

    async fn fetch_top_posts(
        &self,
        subreddit: &str,
        window: TimeWindow,
        limit: usize,
    ) -> Result<Vec<RedditPost>, CoreError>;

    async fn fetch_top_posts_last_14_days(
        &self,
        subreddit: &str,
        limit: usize,
    ) -> Result<Vec<RedditPost>, CoreError>;

    async fn search_subreddit(
        &self,
        subreddit: &str,
        query: &str,
    ) -> Result<Vec<RedditPost>, CoreError>;

    /// `post_ref` may be a raw id, a permalink, a short link or a `t3_` fullname.
    async fn fetch_post_with_comments(
        &self,
        subreddit: &str,
        post_ref: &str,
    ) -> Result<PostThread, CoreError>;
}

#[derive(Debug)]
pub struct RedditClient {
    tokens: TokenManager,
    api: Arc<RedditApiClient>,
    retry: RetryExecutor,
    thread_cache: PostThreadCache,
}

impl RedditClient {
    pub fn new(
        credentials: RedditCredentials,
        rate_config: RateLimitConfig,
        retry_config: RetryConfig,
    ) -> Result<Self, CoreError> {
        let api = RedditApiClient::new(credentials.user_agent.clone(), rate_config)?;
        Ok(Self::with_api(credentials, api, retry_config))
    }

    pub fn with_api(
        credentials: RedditCredentials,
        api: RedditApiClient,
        retry_config: RetryConfig,
    ) -> Self {
        let tokens = TokenManager::new(credentials, api.http_client().clone());
        Self {
            tokens,
            api: Arc::new(api),
            retry: RetryExecutor::new(retry_config),
            thread_cache: PostThreadCache::post_threads(),
        }
    }

    /// Installs a bearer token so no client-credentials exchange is needed until it expires.
    pub async fn set_token(&self, token: RedditToken) {
        self.tokens.set_token(token).await;
    }

    /// Acquires a bearer token, or reuses the cached one until shortly before it expires.
    pub async fn authenticate(&self) -> Result<String, CoreError> {
        self.tokens.access_token().await
    }

    pub async fn rate_limit_status(&self) -> RateLimitStatus {
        self.api.get_rate_limit_status().await
    }

    pub fn retry_metrics(&self) -> RetryMetrics {
        self.retry.get_metrics()
    }

    /// Every attempt takes its own rate-limit slot inside the retry loop.
    async fn fetch_posts(
        &self,
        operation: &str,
        subreddit: &str,
        endpoint: String,
        params: Vec<(&'static str, String)>,
    ) -> Result<Vec<RedditPost>, CoreError> {
        let token = self.authenticate().await?;
        let api = &self.api;
        let result = self
            .retry
            .execute(operation, || api.get_posts(&endpoint, &token, &params))
            .await;
        result.map_err(|e| fetch_failed(operation, subreddit, e))
    }
}

#[async_trait]
impl CommunitySource for RedditClient {
    async fn fetch_community_overview(
        &self,
        subreddit: &str,
    ) -> Result<SubredditAnalysis, CoreError> {
        let posts = self
            .fetch_posts(
                "fetch recent posts",
                subreddit,
                format!("/r/{}/new", subreddit),
                vec![("limit", OVERVIEW_POST_LIMIT.to_string())],
            )
            .await?;

        info!("Analyzing {} recent posts from r/{}", posts.len(), subreddit);
        Ok(SubredditAnalysis {
            subreddit: subreddit.to_string(),
            common_topics: extract_topics(&posts),
            engagement_patterns: analyze_engagement(&posts),
            recent_posts: posts,
            analyzed_at: Utc::now(),
        })
    }

    async fn fetch_top_posts(
        &self,
        subreddit: &str,
        window: TimeWindow,
        limit: usize,
    ) -> Result<Vec<RedditPost>, CoreError> {
        self.fetch_posts(
            "fetch top posts",
            subreddit,
            format!("/r/{}/top", subreddit),
            vec![
                ("t", window.as_str().to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn fetch_top_posts_last_14_days(
        &self,
        subreddit: &str,
        limit: usize,
    ) -> Result<Vec<RedditPost>, CoreError> {
        let candidates = self
            .fetch_top_posts(subreddit, TimeWindow::Month, limit * 2)
            .await?;
        let fetched = candidates.len();
        let recent = filter_recent_posts(candidates, Utc::now(), RECENT_WINDOW_DAYS, limit);
        debug!(
            "Kept {} of {} top posts from the last {} days in r/{}",
            recent.len(),
            fetched,
            RECENT_WINDOW_DAYS,
            subreddit
        );
        Ok(recent)
    }

    async fn search_subreddit(
        &self,
        subreddit: &str,
        query: &str,
    ) -> Result<Vec<RedditPost>, CoreError> {
        self.fetch_posts(
            "search posts",
            subreddit,
            format!("/r/{}/search", subreddit),
            vec![
                ("q", query.to_string()),
                ("restrict_sr", "1".to_string()),
                ("sort", "relevance".to_string()),
                ("limit", SEARCH_RESULT_LIMIT.to_string()),
            ],
        )
        .await
    }

    async fn fetch_post_with_comments(
        &self,
        subreddit: &str,
        post_ref: &str,
    ) -> Result<PostThread, CoreError> {
        let post_id = normalize_post_id(post_ref);
        let cache_key = PostThreadCache::thread_key(subreddit, &post_id);
        if let Some(thread) = self.thread_cache.get(&cache_key) {
            debug!("Post thread cache hit for {}", cache_key);
            return Ok(thread);
        }

        let operation = "fetch post comments";
        let token = self.authenticate().await?;
        let endpoint = format!("/r/{}/comments/{}", subreddit, post_id);
        let params = vec![
            ("limit", THREAD_COMMENT_LIMIT.to_string()),
            ("sort", "top".to_string()),
        ];
        let api = &self.api;
        let raw = self
            .retry
            .execute(operation, || api.get_json::<serde_json::Value>(&endpoint, &token, &params))
            .await
            .map_err(|e| fetch_failed(operation, subreddit, e))?;

        let thread =
            parse_thread(raw, &post_id).map_err(|e| fetch_failed(operation, subreddit, e))?;
        info!(
            "Fetched post {} with {} comments from r/{}",
            post_id,
            thread.comments.len(),
            subreddit
        );
        self.thread_cache.set(&cache_key, thread.clone());
        Ok(thread)
    }
}

/// Names the failed operation and community; authentication failures pass through unchanged.
pub fn fetch_failed(operation: &str, subreddit: &str, error: CoreError) -> CoreError {
    match error {
        CoreError::RedditApi(RedditApiError::AuthenticationFailed { .. }) => error,
        CoreError::RedditApi(RedditApiError::FetchFailed { .. }) => error,
        other => {
            warn!("Failed to {} for r/{}: {}", operation, subreddit, other);
            CoreError::RedditApi(RedditApiError::FetchFailed {
                operation: operation.to_string(),
                subreddit: subreddit.to_string(),
                status_code: other.status_code(),
                reason: other.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::SystemTime;

    #[test]
    fn test_fetch_failure_names_operation_and_community() {
        let error = fetch_failed(
            "fetch top posts",
            "rust",
            CoreError::RedditApi(RedditApiError::ServerError { status_code: 503 }),
        );

        match &error {
            CoreError::RedditApi(RedditApiError::FetchFailed {
                operation,
                subreddit,
                status_code,
                ..
            }) => {
                assert_eq!(operation, "fetch top posts");
                assert_eq!(subreddit, "rust");
                assert_eq!(*status_code, Some(503));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(error.to_string().contains("fetch top posts for r/rust"));
    }

    #[test]
    fn test_authentication_failure_stays_distinct() {
        let error = fetch_failed(
            "search posts",
            "rust",
            CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                reason: "bad secret".to_string(),
            }),
        );
        assert!(matches!(
            error,
            CoreError::RedditApi(RedditApiError::AuthenticationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_client_construction() {
        let client = RedditClient::new(
            RedditCredentials::new(
                "id".to_string(),
                "secret".to_string(),
                "subforge-test/0.1".to_string(),
            ),
            RateLimitConfig::reddit_oauth(),
            RetryConfig::default(),
        )
        .unwrap();

        let status = client.rate_limit_status().await;
        assert_eq!(status.requests_per_window, 45);
        assert_eq!(client.retry_metrics().total_retries, 0);
    }

    fn listing_post(id: &str, age_days: i64) -> serde_json::Value {
        let created = Utc::now() - chrono::Duration::days(age_days);
        json!({
            "kind": "t3",
            "data": {
                "id": id,
                "title": format!("Post {}", id),
                "selftext": "",
                "author": "user",
                "subreddit": "rust",
                "ups": 10,
                "num_comments": 2,
                "created_utc": created.timestamp() as f64,
                "url": "https://reddit.com",
                "permalink": format!("/r/rust/comments/{}/post/", id),
                "score": 10
            }
        })
    }

    fn thread_body() -> serde_json::Value {
        json!([
            {
                "kind": "Listing",
                "data": {
                    "children": [{
                        "kind": "t3",
                        "data": {
                            "id": "abc",
                            "title": "Example",
                            "selftext": "Body",
                            "author": "user",
                            "subreddit": "AskReddit",
                            "ups": 5,
                            "num_comments": 1,
                            "created_utc": 1_700_000_000.0,
                            "permalink": "/r/AskReddit/comments/abc/example/",
                            "score": 5
                        }
                    }]
                }
            },
            {
                "kind": "Listing",
                "data": {
                    "children": [{
                        "kind": "t1",
                        "data": {
                            "id": "c1",
                            "body": "First",
                            "author": "a",
                            "ups": 3,
                            "score": 3,
                            "created_utc": 1_700_000_100.0,
                            "replies": ""
                        }
                    }]
                }
            }
        ])
    }

    #[derive(Clone, Default)]
    struct Upstream {
        thread_calls: Arc<AtomicUsize>,
        requested_limit: Arc<Mutex<Option<String>>>,
    }

    async fn thread_handler(State(upstream): State<Upstream>) -> Json<serde_json::Value> {
        upstream.thread_calls.fetch_add(1, Ordering::SeqCst);
        Json(thread_body())
    }

    async fn top_handler(
        State(upstream): State<Upstream>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<serde_json::Value> {
        *upstream.requested_limit.lock().unwrap() = params.get("limit").cloned();
        // Month window sorted by score: stale posts are interleaved with recent ones.
        let children = vec![
            listing_post("old1", 25),
            listing_post("new1", 1),
            listing_post("new2", 3),
            listing_post("old2", 20),
            listing_post("new3", 5),
            listing_post("new4", 13),
        ];
        Json(json!({ "kind": "Listing", "data": { "children": children } }))
    }

    async fn client_against(upstream: Upstream) -> RedditClient {
        let router = Router::new()
            .route("/r/:subreddit/comments/:id", get(thread_handler))
            .route("/r/:subreddit/top", get(top_handler))
            .with_state(upstream);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let credentials = RedditCredentials::new(
            "id".to_string(),
            "secret".to_string(),
            "subforge-test/0.1".to_string(),
        );
        let api = RedditApiClient::new(
            credentials.user_agent.clone(),
            RateLimitConfig::reddit_oauth(),
        )
        .unwrap()
        .with_base_url(format!("http://{}", addr));
        let client = RedditClient::with_api(credentials, api, RetryConfig::default());
        client
            .set_token(RedditToken {
                access_token: "local".to_string(),
                expires_at: SystemTime::now() + std::time::Duration::from_secs(3600),
            })
            .await;
        client
    }

    #[tokio::test]
    async fn test_thread_is_cached_across_reference_forms() {
        let upstream = Upstream::default();
        let client = client_against(upstream.clone()).await;

        let first = client
            .fetch_post_with_comments("AskReddit", "t3_abc")
            .await
            .unwrap();
        let second = client
            .fetch_post_with_comments("askreddit", "https://redd.it/abc")
            .await
            .unwrap();

        assert_eq!(upstream.thread_calls.load(Ordering::SeqCst), 1);
        let id = |thread: &PostThread| thread.post.as_ref().map(|p| p.id.clone());
        assert_eq!(id(&first).as_deref(), Some("abc"));
        assert_eq!(id(&first), id(&second));
        assert_eq!(second.comments.len(), 1);
    }

    #[tokio::test]
    async fn test_recent_top_posts_overfetch_then_trim() {
        let upstream = Upstream::default();
        let client = client_against(upstream.clone()).await;

        let posts = client.fetch_top_posts_last_14_days("rust", 3).await.unwrap();

        assert_eq!(upstream.requested_limit.lock().unwrap().as_deref(), Some("6"));
        let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["new1", "new2", "new3"]);
    }
}
