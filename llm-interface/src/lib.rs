pub mod claude;
pub mod json;
pub mod openai;

pub use claude::ClaudeProvider;
pub use json::{extract_json_object, parse_json_response};
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use std::sync::Arc;
use subforge_core::{AppConfig, CoreError, LlmError, LlmProviderKind, RetryConfig};

/// Sampling parameters for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    /// Falls back to the provider's default model when empty.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    /// Ask for a JSON-object response where the provider supports it.
    pub json_mode: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.7,
            max_tokens: 2048,
            system_prompt: None,
            presence_penalty: None,
            frequency_penalty: None,
            json_mode: true,
        }
    }
}

impl CompletionOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_penalties(mut self, presence: f32, frequency: f32) -> Self {
        self.presence_penalty = Some(presence);
        self.frequency_penalty = Some(frequency);
        self
    }
}

/// Text completion: a prompt plus generation parameters in, raw model text out.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str, options: &CompletionOptions)
        -> Result<String, CoreError>;
}

/// Builds the provider selected in the configuration.
pub fn provider_from_config(config: &AppConfig) -> Result<Arc<dyn LlmProvider>, CoreError> {
    let api_key = config
        .llm_api_key()
        .ok_or_else(|| LlmError::InvalidApiKey {
            provider: config.llm_provider.as_str().to_string(),
        })?
        .to_string();

    let provider: Arc<dyn LlmProvider> = match config.llm_provider {
        LlmProviderKind::OpenAi => {
            let mut provider = OpenAiProvider::new(api_key, RetryConfig::default())?;
            if let Some(base_url) = &config.llm_base_url {
                provider = provider.with_base_url(base_url);
            }
            if let Some(model) = &config.llm_model {
                provider = provider.with_default_model(model);
            }
            Arc::new(provider)
        }
        LlmProviderKind::Anthropic => {
            let mut provider = ClaudeProvider::new(api_key, RetryConfig::default())?;
            if let Some(base_url) = &config.llm_base_url {
                provider = provider.with_base_url(base_url);
            }
            if let Some(model) = &config.llm_model {
                provider = provider.with_default_model(model);
            }
            Arc::new(provider)
        }
    };

    Ok(provider)
}

/// Maps a non-success provider response onto the error kinds the retry controller classifies.
pub(crate) async fn error_from_response(provider: &str, response: Response) -> CoreError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .map(|seconds| seconds.ceil() as u64);
    let body = response.text().await.unwrap_or_default();

    let provider = provider.to_string();
    let error = match status {
        StatusCode::UNAUTHORIZED => LlmError::InvalidApiKey { provider },
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimitExceeded {
            provider,
            retry_after: retry_after.unwrap_or(0),
        },
        StatusCode::SERVICE_UNAVAILABLE => LlmError::ServiceUnavailable { provider },
        _ => LlmError::RequestFailed {
            provider,
            status_code: status.as_u16(),
            message: truncate(&body, 300).to_string(),
        },
    };
    CoreError::Llm(error)
}

pub(crate) fn send_error(provider: &str, error: reqwest::Error) -> CoreError {
    if error.is_timeout() {
        CoreError::Llm(LlmError::RequestTimeout {
            provider: provider.to_string(),
        })
    } else {
        CoreError::Network(error)
    }
}

pub(crate) fn truncate(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "naïve café";
        let cut = truncate(text, 3);
        assert!(text.starts_with(cut));
        assert!(cut.len() <= 3);
        assert_eq!(truncate("short", 300), "short");
    }

    #[test]
    fn test_provider_requires_key() {
        let config = AppConfig::default();
        let result = provider_from_config(&config);
        assert!(matches!(
            result,
            Err(CoreError::Llm(LlmError::InvalidApiKey { .. }))
        ));
    }

    #[test]
    fn test_provider_follows_configured_kind() {
        let mut config = AppConfig::default();
        config.llm_provider = LlmProviderKind::Anthropic;
        config
            .llm_api_keys
            .insert("anthropic".to_string(), "sk-ant".to_string());

        let provider = provider_from_config(&config).unwrap();
        assert_eq!(provider.name(), "anthropic");
    }
}
