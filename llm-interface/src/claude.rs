use crate::{error_from_response, send_error, CompletionOptions, LlmProvider};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use subforge_core::{CoreError, LlmError, RetryConfig, RetryExecutor};
use tracing::{debug, info};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const PROVIDER: &str = "anthropic";
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-3-5-sonnet-20241022";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic messages API. There is no JSON response mode, so callers rely on
/// outermost-object extraction.
#[derive(Debug)]
pub struct ClaudeProvider {
    api_key: String,
    http: Client,
    base_url: String,
    default_model: String,
    retry: RetryExecutor,
}

impl ClaudeProvider {
    pub fn new(api_key: String, retry_config: RetryConfig) -> Result<Self, CoreError> {
        let http = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            api_key,
            http,
            base_url: ANTHROPIC_API_URL.to_string(),
            default_model: DEFAULT_CLAUDE_MODEL.to_string(),
            retry: RetryExecutor::new(retry_config),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_default_model(mut self, model: &str) -> Self {
        self.default_model = model.to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap, CoreError> {
        let mut headers = HeaderMap::new();
        let api_key = HeaderValue::from_str(&self.api_key).map_err(|_| {
            CoreError::Llm(LlmError::InvalidApiKey {
                provider: PROVIDER.to_string(),
            })
        })?;
        headers.insert("x-api-key", api_key);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn send(&self, request: &MessagesRequest<'_>) -> Result<String, CoreError> {
        let url = format!("{}/messages", self.base_url);
        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(request)
            .send()
            .await
            .map_err(|e| send_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response).await);
        }

        let body: MessagesResponse = response.json().await.map_err(|_| {
            CoreError::Llm(LlmError::InvalidResponseFormat {
                provider: PROVIDER.to_string(),
            })
        })?;

        let text = body
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(CoreError::Llm(LlmError::EmptyCompletion {
                provider: PROVIDER.to_string(),
            }));
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, CoreError> {
        let request = MessagesRequest {
            model: options.model.as_deref().unwrap_or(&self.default_model),
            max_tokens: options.max_tokens,
            // The messages API caps temperature at 1.0.
            temperature: options.temperature.min(1.0),
            system: options.system_prompt.as_deref(),
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };
        debug!(
            "Claude request: model={} temperature={}",
            request.model, request.temperature
        );

        let content = self
            .retry
            .execute("claude completion", || self.send(&request))
            .await?;
        info!("Claude completion returned {} chars", content.len());
        Ok(content)
    }
}
