use std::time::Duration;
use subforge_core::{ConfigError, CoreError, ErrorExt, LlmError, RedditApiError};

#[test]
fn test_error_codes() {
    let reddit_error = CoreError::RedditApi(RedditApiError::InvalidToken);
    assert_eq!(reddit_error.error_code(), "REDDIT_INVALID_TOKEN");

    let llm_error = CoreError::Llm(LlmError::InvalidApiKey {
        provider: "openai".to_string(),
    });
    assert_eq!(llm_error.error_code(), "LLM_INVALID_API_KEY");

    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "api_key".to_string(),
    });
    assert_eq!(config_error.error_code(), "CONFIG_MISSING_FIELD");

    let insufficient = CoreError::InsufficientData {
        message: "No recent posts".to_string(),
    };
    assert_eq!(insufficient.error_code(), "INSUFFICIENT_DATA");
}

#[test]
fn test_http_status_mapping() {
    assert_eq!(CoreError::invalid_input("Subreddit is required").http_status(), 400);
    assert_eq!(
        CoreError::NotFound {
            resource: "post abc123".to_string()
        }
        .http_status(),
        404
    );
    assert_eq!(
        CoreError::RedditApi(RedditApiError::FetchFailed {
            operation: "fetch top posts".to_string(),
            subreddit: "rust".to_string(),
            reason: "Server error: 503".to_string(),
            status_code: Some(503),
        })
        .http_status(),
        502
    );
    assert_eq!(
        CoreError::generation_failed("post ideas", "not JSON").http_status(),
        502
    );
    assert_eq!(CoreError::Timeout { seconds: 180 }.http_status(), 504);
}

#[test]
fn test_status_codes_carried_through() {
    let rate_limited = CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 60 });
    assert_eq!(rate_limited.status_code(), Some(429));
    assert_eq!(rate_limited.retry_after(), Some(Duration::from_secs(60)));

    let auth = CoreError::RedditApi(RedditApiError::AuthenticationFailed {
        reason: "401".to_string(),
    });
    assert_eq!(auth.status_code(), None);
    assert!(!auth.is_transient());

    let timeout = CoreError::RedditApi(RedditApiError::RequestTimeout);
    assert!(timeout.is_transient());
}

#[test]
fn test_fetch_failure_names_operation_and_community() {
    let error = CoreError::RedditApi(RedditApiError::FetchFailed {
        operation: "search posts".to_string(),
        subreddit: "AskReddit".to_string(),
        reason: "Request timeout".to_string(),
        status_code: None,
    });
    let message = error.to_string();
    assert!(message.contains("search posts"));
    assert!(message.contains("r/AskReddit"));
    assert!(error
        .user_friendly_message()
        .contains("Failed to search posts for r/AskReddit"));
}

#[test]
fn test_user_friendly_messages() {
    let reddit_error = CoreError::RedditApi(RedditApiError::InvalidToken);
    assert!(reddit_error
        .user_friendly_message()
        .contains("rejected the app credentials"));

    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "api_key".to_string(),
    });
    assert!(config_error.user_friendly_message().contains("api_key"));

    let validation = CoreError::invalid_input("Subreddit is required");
    assert_eq!(validation.user_friendly_message(), "Subreddit is required");
}
