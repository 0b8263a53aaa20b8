use crate::rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use subforge_core::{CoreError, PostThread, RedditApiError, RedditComment, RedditPost};
use tracing::{debug, error, info, warn};

const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
const POST_KIND: &str = "t3";
const COMMENT_KIND: &str = "t1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    pub selftext: String,
    pub author: String,
    pub subreddit: String,
    pub url: String,
    pub permalink: String,
    pub created_utc: f64,
    pub score: i64,
    pub num_comments: u64,
    pub ups: i64,
    pub downs: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditCommentData {
    pub id: String,
    pub body: String,
    pub author: String,
    pub created_utc: f64,
    pub score: i64,
    pub ups: i64,
    pub downs: i64,
    /// Either an empty string or a nested listing.
    pub replies: serde_json::Value,
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: RateLimiter,
    user_agent: String,
    base_url: String,
}

impl RedditApiClient {
    pub fn new(user_agent: String, rate_config: RateLimitConfig) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::new(rate_config),
            user_agent,
            base_url: REDDIT_API_BASE.to_string(),
        })
    }

    /// Points requests at another host, such as a local stand-in for `oauth.reddit.com`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Takes a rate-limit slot, sends the request and maps failure statuses to typed errors.
    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: &[(&str, String)],
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let start_time = Instant::now();

        let permit = self.rate_limiter.acquire_permit().await;
        if permit.queue_wait_time > Duration::from_millis(10) {
            debug!(
                "Waited {:?} for a rate limit slot for {} {}",
                permit.queue_wait_time, method, endpoint
            );
        }

        info!("Making Reddit API request: {} {}", method, endpoint);
        let response = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(access_token)
            .query(query_params)
            .send()
            .await
            .map_err(|e| {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    CoreError::RedditApi(RedditApiError::RequestTimeout)
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(
                "Request successful: {} {} in {:?}",
                status,
                endpoint,
                start_time.elapsed()
            );
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        let error = match status.as_u16() {
            429 => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.trim().parse::<f64>().ok())
                    .map(|seconds| seconds.ceil() as u64)
                    .unwrap_or(0);
                warn!("Rate limited, retry after {} seconds", retry_after);
                RedditApiError::RateLimitExceeded { retry_after }
            }
            401 => RedditApiError::InvalidToken,
            403 => RedditApiError::Forbidden {
                resource: endpoint.to_string(),
            },
            404 => RedditApiError::NotFound {
                resource: endpoint.to_string(),
            },
            code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
            code => RedditApiError::RequestFailed {
                endpoint: endpoint.to_string(),
                status_code: code,
            },
        };
        Err(CoreError::RedditApi(error))
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        access_token: &str,
        query_params: &[(&str, String)],
    ) -> Result<T, CoreError> {
        let response = self
            .make_request(Method::GET, endpoint, access_token, query_params)
            .await?;

        response.json::<T>().await.map_err(|e| {
            error!("Failed to parse response from {}: {}", endpoint, e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse response from {}", endpoint),
            })
        })
    }

    pub async fn get_posts(
        &self,
        endpoint: &str,
        access_token: &str,
        query_params: &[(&str, String)],
    ) -> Result<Vec<RedditPost>, CoreError> {
        let listing: RedditListing<RedditPostData> =
            self.get_json(endpoint, access_token, query_params).await?;
        Ok(posts_from_listing(listing))
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        self.rate_limiter.get_rate_limit_status().await
    }
}

pub fn posts_from_listing(listing: RedditListing<RedditPostData>) -> Vec<RedditPost> {
    listing
        .data
        .children
        .into_iter()
        .filter(|child| child.kind == POST_KIND)
        .map(|child| child.data.into())
        .collect()
}

/// Parses the two-listing response of `/comments/{id}`: the post, then its comment tree.
pub fn parse_thread(value: serde_json::Value, post_id: &str) -> Result<PostThread, CoreError> {
    let invalid = |details: &str| {
        CoreError::RedditApi(RedditApiError::InvalidResponse {
            details: format!("{} for post {}", details, post_id),
        })
    };

    let listings = value
        .as_array()
        .ok_or_else(|| invalid("Expected an array of listings"))?;

    let post = match listings.first() {
        Some(listing) => {
            let listing: RedditListing<serde_json::Value> = serde_json::from_value(listing.clone())
                .map_err(|_| invalid("Malformed post listing"))?;
            listing
                .data
                .children
                .into_iter()
                .find(|child| child.kind == POST_KIND)
                .and_then(|child| serde_json::from_value::<RedditPostData>(child.data).ok())
                .map(RedditPost::from)
        }
        None => None,
    };

    let mut comments = Vec::new();
    if let Some(listing) = listings.get(1) {
        collect_comments(listing, post_id, &mut comments);
    }

    Ok(PostThread { post, comments })
}

fn collect_comments(listing: &serde_json::Value, post_id: &str, out: &mut Vec<RedditComment>) {
    let Some(children) = listing
        .get("data")
        .and_then(|data| data.get("children"))
        .and_then(|children| children.as_array())
    else {
        return;
    };

    for child in children {
        if child.get("kind").and_then(|k| k.as_str()) != Some(COMMENT_KIND) {
            continue;
        }
        let Some(data) = child.get("data") else {
            continue;
        };
        let Ok(comment) = serde_json::from_value::<RedditCommentData>(data.clone()) else {
            continue;
        };

        if comment.replies.is_object() {
            let replies = comment.replies.clone();
            out.push(comment_from_data(comment, post_id));
            collect_comments(&replies, post_id, out);
        } else {
            out.push(comment_from_data(comment, post_id));
        }
    }
}

fn comment_from_data(data: RedditCommentData, post_id: &str) -> RedditComment {
    RedditComment {
        id: data.id,
        body: data.body,
        author: data.author,
        post_id: post_id.to_string(),
        upvotes: data.ups,
        downvotes: data.downs,
        created_at: timestamp(data.created_utc),
        score: data.score,
    }
}

fn timestamp(created_utc: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(created_utc as i64, 0)
        .single()
        .unwrap_or_default()
}

impl From<RedditPostData> for RedditPost {
    fn from(post_data: RedditPostData) -> Self {
        let url = if post_data.permalink.is_empty() {
            post_data.url
        } else {
            format!("https://www.reddit.com{}", post_data.permalink)
        };

        Self {
            id: post_data.id,
            title: post_data.title,
            content: post_data.selftext,
            author: post_data.author,
            subreddit: post_data.subreddit,
            upvotes: post_data.ups,
            downvotes: post_data.downs,
            comments: post_data.num_comments,
            created_at: timestamp(post_data.created_utc),
            url,
            score: post_data.score,
        }
    }
}
