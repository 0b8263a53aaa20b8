use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, TokenResponse, TokenUrl};
use std::time::{Duration, SystemTime};
use subforge_core::{CoreError, RedditApiError};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

const REDDIT_AUTHORIZE_URL: &str = "https://www.reddit.com/api/v1/authorize";
const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Tokens are refreshed this long before their declared expiry.
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl RedditCredentials {
    pub fn new(client_id: String, client_secret: String, user_agent: String) -> Self {
        Self {
            client_id,
            client_secret,
            user_agent,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: SystemTime,
}

impl RedditToken {
    pub fn needs_refresh(&self) -> bool {
        match self.expires_at.checked_sub(TOKEN_REFRESH_MARGIN) {
            Some(refresh_at) => SystemTime::now() >= refresh_at,
            None => true,
        }
    }
}

/// Application-only (client credentials) authentication with a cached bearer token.
#[derive(Debug)]
pub struct TokenManager {
    credentials: RedditCredentials,
    http_client: reqwest::Client,
    token: Mutex<Option<RedditToken>>,
}

impl TokenManager {
    pub fn new(credentials: RedditCredentials, http_client: reqwest::Client) -> Self {
        Self {
            credentials,
            http_client,
            token: Mutex::new(None),
        }
    }

    /// Returns the cached token, acquiring a new one once it is within a minute of expiry.
    pub async fn access_token(&self) -> Result<String, CoreError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.needs_refresh() {
                return Ok(token.access_token.clone());
            }
            debug!("Reddit access token is about to expire, refreshing");
        }

        let token = self.request_token().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    pub async fn set_token(&self, token: RedditToken) {
        *self.token.lock().await = Some(token);
    }

    async fn request_token(&self) -> Result<RedditToken, CoreError> {
        let auth_failed = |reason: String| {
            error!("Failed to get Reddit access token: {}", reason);
            CoreError::RedditApi(RedditApiError::AuthenticationFailed { reason })
        };

        let client = BasicClient::new(
            ClientId::new(self.credentials.client_id.clone()),
            Some(ClientSecret::new(self.credentials.client_secret.clone())),
            AuthUrl::new(REDDIT_AUTHORIZE_URL.to_string()).map_err(|e| auth_failed(e.to_string()))?,
            Some(TokenUrl::new(REDDIT_TOKEN_URL.to_string()).map_err(|e| auth_failed(e.to_string()))?),
        );

        let http_client = self.http_client.clone();
        let user_agent = self.credentials.user_agent.clone();
        let response = client
            .exchange_client_credentials()
            .request_async(|request| send_token_request(http_client, user_agent, request))
            .await
            .map_err(|e| auth_failed(e.to_string()))?;

        let expires_in = response
            .expires_in()
            .unwrap_or_else(|| Duration::from_secs(3600));
        info!("Obtained Reddit access token valid for {:?}", expires_in);

        Ok(RedditToken {
            access_token: response.access_token().secret().clone(),
            expires_at: SystemTime::now() + expires_in,
        })
    }
}

/// Reddit rejects token requests without a descriptive User-Agent, so the
/// exchange goes through our own client rather than oauth2's default one.
async fn send_token_request(
    http_client: reqwest::Client,
    user_agent: String,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let response = http_client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .header(reqwest::header::USER_AGENT, user_agent)
        .timeout(Duration::from_secs(30))
        .body(request.body)
        .send()
        .await?;
    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}
