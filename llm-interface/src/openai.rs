use crate::{error_from_response, send_error, CompletionOptions, LlmProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use subforge_core::{CoreError, LlmError, RetryConfig, RetryExecutor};
use tracing::{debug, info};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const PROVIDER: &str = "openai";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions.
#[derive(Debug)]
pub struct OpenAiProvider {
    api_key: String,
    http: Client,
    base_url: String,
    default_model: String,
    retry: RetryExecutor,
}

impl OpenAiProvider {
    pub fn new(api_key: String, retry_config: RetryConfig) -> Result<Self, CoreError> {
        let http = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            api_key,
            http,
            base_url: OPENAI_API_URL.to_string(),
            default_model: DEFAULT_OPENAI_MODEL.to_string(),
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

    async fn send(&self, request: &ChatRequest<'_>) -> Result<String, CoreError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| send_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response).await);
        }

        let body: ChatResponse = response.json().await.map_err(|_| {
            CoreError::Llm(LlmError::InvalidResponseFormat {
                provider: PROVIDER.to_string(),
            })
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                CoreError::Llm(LlmError::EmptyCompletion {
                    provider: PROVIDER.to_string(),
                })
            })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, CoreError> {
        let request = build_request(&self.default_model, prompt, options);
        debug!(
            "OpenAI request: model={} temperature={} max_tokens={}",
            request.model, request.temperature, request.max_tokens
        );

        let content = self
            .retry
            .execute("openai completion", || self.send(&request))
            .await?;
        info!("OpenAI completion returned {} chars", content.len());
        Ok(content)
    }
}

fn build_request<'a>(
    default_model: &'a str,
    prompt: &'a str,
    options: &'a CompletionOptions,
) -> ChatRequest<'a> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system_prompt) = &options.system_prompt {
        messages.push(ChatMessage {
            role: "system",
            content: system_prompt,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: prompt,
    });

    ChatRequest {
        model: options.model.as_deref().unwrap_or(default_model),
        messages,
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        presence_penalty: options.presence_penalty,
        frequency_penalty: options.frequency_penalty,
        response_format: options.json_mode.then_some(ResponseFormat {
            kind: "json_object",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let options = CompletionOptions::default()
            .with_temperature(0.9)
            .with_system_prompt("You are a community strategist.")
            .with_penalties(0.4, 0.3);

        let request = build_request(DEFAULT_OPENAI_MODEL, "Give me ideas", &options);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["model"], DEFAULT_OPENAI_MODEL);
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "Give me ideas");
        assert_eq!(value["response_format"]["type"], "json_object");
        assert!(value["presence_penalty"].as_f64().unwrap() > 0.39);
    }

    #[test]
    fn test_plain_text_request_omits_optional_fields() {
        let options = CompletionOptions {
            model: Some("gpt-4o".to_string()),
            json_mode: false,
            ..CompletionOptions::default()
        };

        let request = build_request(DEFAULT_OPENAI_MODEL, "hello", &options);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["model"], "gpt-4o");
        assert_eq!(value["messages"].as_array().unwrap().len(), 1);
        assert!(value.get("response_format").is_none());
        assert!(value.get("frequency_penalty").is_none());
    }
}
