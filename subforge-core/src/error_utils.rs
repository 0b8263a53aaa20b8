use crate::error::*;
use std::fmt::Display;
use std::time::Duration;
use tracing::{error, warn};

/// Classification and presentation shared by every error in the workspace.
pub trait ErrorExt: Display {
    fn log_error(&self) -> &Self
    where
        Self: Sized,
    {
        error!(code = self.error_code(), "{}", self);
        self
    }

    fn log_warn(&self) -> &Self
    where
        Self: Sized,
    {
        warn!(code = self.error_code(), "{}", self);
        self
    }

    /// Upstream HTTP status carried by the failure, if any.
    fn status_code(&self) -> Option<u16> {
        None
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    /// Network-class failure that never reached a status line.
    fn is_transient(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String;

    fn error_code(&self) -> &'static str;
}

impl ErrorExt for CoreError {
    fn status_code(&self) -> Option<u16> {
        match self {
            CoreError::RedditApi(e) => e.status_code(),
            CoreError::Llm(e) => e.status_code(),
            CoreError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::RedditApi(e) => e.retry_after(),
            CoreError::Llm(e) => e.retry_after(),
            _ => None,
        }
    }

    fn is_transient(&self) -> bool {
        match self {
            CoreError::RedditApi(e) => e.is_transient(),
            CoreError::Llm(e) => e.is_transient(),
            CoreError::Network(e) => {
                e.status().is_none() && (e.is_timeout() || e.is_connect() || e.is_request())
            }
            _ => false,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::RedditApi(e) => e.user_friendly_message(),
            CoreError::Llm(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::InvalidInput { message } | CoreError::InsufficientData { message } => {
                message.clone()
            }
            CoreError::NotFound { resource } => format!("{} does not exist.", resource),
            CoreError::GenerationFailed { stage, .. } => {
                format!("Could not produce {}. Try again in a moment.", stage)
            }
            CoreError::Timeout { seconds } => {
                format!("Generation did not finish within {} seconds.", seconds)
            }
            CoreError::Network(_) => "Could not reach an upstream service.".to_string(),
            CoreError::Serialization(_) | CoreError::Internal { .. } => {
                "Something went wrong on our side.".to_string()
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            CoreError::RedditApi(e) => e.error_code(),
            CoreError::Llm(e) => e.error_code(),
            CoreError::Config(e) => e.error_code(),
            CoreError::Serialization(_) => "SERIALIZATION",
            CoreError::Network(_) => "NETWORK",
            CoreError::InvalidInput { .. } => "INVALID_INPUT",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::InsufficientData { .. } => "INSUFFICIENT_DATA",
            CoreError::GenerationFailed { .. } => "GENERATION_FAILED",
            CoreError::Timeout { .. } => "TIMEOUT",
            CoreError::Internal { .. } => "INTERNAL",
        }
    }
}

impl CoreError {
    /// HTTP status a transport layer should answer with for this failure.
    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::InvalidInput { .. } => 400,
            CoreError::NotFound { .. } => 404,
            CoreError::RedditApi(RedditApiError::NotFound { .. }) => 404,
            CoreError::InsufficientData { .. } => 422,
            CoreError::Timeout { .. } => 504,
            CoreError::RedditApi(_)
            | CoreError::Llm(_)
            | CoreError::Network(_)
            | CoreError::GenerationFailed { .. } => 502,
            _ => 500,
        }
    }
}

impl ErrorExt for RedditApiError {
    fn status_code(&self) -> Option<u16> {
        match self {
            RedditApiError::RateLimitExceeded { .. } => Some(429),
            RedditApiError::InvalidToken => Some(401),
            RedditApiError::Forbidden { .. } => Some(403),
            RedditApiError::NotFound { .. } => Some(404),
            RedditApiError::RequestFailed { status_code, .. }
            | RedditApiError::ServerError { status_code } => Some(*status_code),
            RedditApiError::FetchFailed { status_code, .. } => *status_code,
            _ => None,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            RedditApiError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }

    fn is_transient(&self) -> bool {
        matches!(self, RedditApiError::RequestTimeout)
    }

    fn user_friendly_message(&self) -> String {
        match self {
            RedditApiError::AuthenticationFailed { .. } | RedditApiError::InvalidToken => {
                "Reddit rejected the app credentials.".to_string()
            }
            RedditApiError::FetchFailed {
                operation,
                subreddit,
                ..
            } => format!("Failed to {} for r/{}.", operation, subreddit),
            RedditApiError::RateLimitExceeded { retry_after } => {
                format!("Reddit is throttling requests. Retry in {}s.", retry_after)
            }
            RedditApiError::Forbidden { resource } => {
                format!("{} is private or quarantined.", resource)
            }
            RedditApiError::NotFound { resource } => {
                format!("'{}' was not found on Reddit.", resource)
            }
            RedditApiError::RequestTimeout => "Reddit did not answer in time.".to_string(),
            RedditApiError::RequestFailed { .. }
            | RedditApiError::ServerError { .. }
            | RedditApiError::InvalidResponse { .. } => {
                "Reddit returned an unexpected response.".to_string()
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            RedditApiError::AuthenticationFailed { .. } => "REDDIT_AUTH_FAILED",
            RedditApiError::FetchFailed { .. } => "REDDIT_FETCH_FAILED",
            RedditApiError::RateLimitExceeded { .. } => "REDDIT_RATE_LIMIT",
            RedditApiError::InvalidToken => "REDDIT_INVALID_TOKEN",
            RedditApiError::Forbidden { .. } => "REDDIT_FORBIDDEN",
            RedditApiError::NotFound { .. } => "REDDIT_NOT_FOUND",
            RedditApiError::RequestTimeout => "REDDIT_TIMEOUT",
            RedditApiError::RequestFailed { .. } => "REDDIT_REQUEST_FAILED",
            RedditApiError::ServerError { .. } => "REDDIT_SERVER_ERROR",
            RedditApiError::InvalidResponse { .. } => "REDDIT_INVALID_RESPONSE",
        }
    }
}

impl ErrorExt for LlmError {
    fn status_code(&self) -> Option<u16> {
        match self {
            LlmError::InvalidApiKey { .. } => Some(401),
            LlmError::RateLimitExceeded { .. } => Some(429),
            LlmError::ServiceUnavailable { .. } => Some(503),
            LlmError::RequestFailed { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimitExceeded { retry_after, .. } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }

    fn is_transient(&self) -> bool {
        matches!(self, LlmError::RequestTimeout { .. })
    }

    fn user_friendly_message(&self) -> String {
        match self {
            LlmError::InvalidApiKey { provider } => {
                format!("The {} API key was rejected.", provider)
            }
            LlmError::RateLimitExceeded {
                provider,
                retry_after,
            } => format!("{} is throttling requests. Retry in {}s.", provider, retry_after),
            LlmError::ServiceUnavailable { provider } => {
                format!("{} is temporarily unavailable.", provider)
            }
            LlmError::RequestTimeout { provider } => format!("{} did not answer in time.", provider),
            LlmError::RequestFailed { provider, .. }
            | LlmError::InvalidResponseFormat { provider }
            | LlmError::EmptyCompletion { provider } => {
                format!("{} returned an unusable completion.", provider)
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            LlmError::InvalidApiKey { .. } => "LLM_INVALID_API_KEY",
            LlmError::RateLimitExceeded { .. } => "LLM_RATE_LIMIT",
            LlmError::RequestFailed { .. } => "LLM_REQUEST_FAILED",
            LlmError::ServiceUnavailable { .. } => "LLM_SERVICE_UNAVAILABLE",
            LlmError::RequestTimeout { .. } => "LLM_TIMEOUT",
            LlmError::InvalidResponseFormat { .. } => "LLM_INVALID_RESPONSE",
            LlmError::EmptyCompletion { .. } => "LLM_EMPTY_COMPLETION",
        }
    }
}

impl ErrorExt for ConfigError {
    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => format!("Config file {} does not exist.", path),
            ConfigError::MissingField { field } => format!("Config field '{}' must be set.", field),
            ConfigError::InvalidValue { field, value } => {
                format!("'{}' is not a valid value for {}.", value, field)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => {
                format!("Set {} in the environment or .env file.", var_name)
            }
            ConfigError::ValidationFailed { reason } => reason.clone(),
            ConfigError::Parse(e) => format!("Config file is not valid TOML: {}", e),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND",
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD",
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE",
            ConfigError::MissingEnvironmentVariable { .. } => "CONFIG_MISSING_ENV_VAR",
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED",
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR",
        }
    }
}
