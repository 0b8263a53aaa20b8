use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "subforge.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    #[default]
    OpenAi,
    Anthropic,
}

impl LlmProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProviderKind::OpenAi => "openai",
            LlmProviderKind::Anthropic => "anthropic",
        }
    }

    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(LlmProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(LlmProviderKind::Anthropic),
            other => Err(ConfigError::InvalidValue {
                field: "llm_provider".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub reddit_client_id: Option<String>,
    pub reddit_client_secret: Option<String>,
    pub reddit_user_agent: String,
    pub reddit_requests_per_minute: u32,
    pub llm_provider: LlmProviderKind,
    pub llm_api_keys: HashMap<String, String>,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    pub bind_address: String,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reddit_client_id: None,
            reddit_client_secret: None,
            reddit_user_agent: "subforge/0.1".to_string(),
            reddit_requests_per_minute: 45,
            llm_provider: LlmProviderKind::default(),
            llm_api_keys: HashMap::new(),
            llm_model: None,
            llm_base_url: None,
            bind_address: "127.0.0.1:3001".to_string(),
            request_timeout_secs: 180,
        }
    }
}

impl AppConfig {
    /// Reads `SUBFORGE_CONFIG` (or `subforge.toml` if present), then applies env overrides.
    /// The returned config has already passed [`AppConfig::validate`].
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("SUBFORGE_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Applies environment-style overrides through `lookup` so tests need not touch the process env.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("REDDIT_CLIENT_ID") {
            self.reddit_client_id = Some(value);
        }
        if let Some(value) = lookup("REDDIT_CLIENT_SECRET") {
            self.reddit_client_secret = Some(value);
        }
        if let Some(value) = lookup("REDDIT_USER_AGENT") {
            self.reddit_user_agent = value;
        }
        if let Some(value) = lookup("REDDIT_REQUESTS_PER_MINUTE") {
            self.reddit_requests_per_minute = parse_number("REDDIT_REQUESTS_PER_MINUTE", &value)?;
        }
        if let Some(value) = lookup("LLM_PROVIDER") {
            self.llm_provider = LlmProviderKind::parse(&value)?;
        }
        if let Some(value) = lookup("OPENAI_API_KEY") {
            self.llm_api_keys.insert("openai".to_string(), value);
        }
        if let Some(value) = lookup("ANTHROPIC_API_KEY") {
            self.llm_api_keys.insert("anthropic".to_string(), value);
        }
        if let Some(value) = lookup("LLM_MODEL") {
            self.llm_model = Some(value);
        }
        if let Some(value) = lookup("LLM_BASE_URL") {
            self.llm_base_url = Some(value);
        }
        if let Some(value) = lookup("BIND_ADDRESS") {
            self.bind_address = value;
        } else if let Some(port) = lookup("PORT") {
            let port: u16 = parse_number("PORT", &port)?;
            self.bind_address = format!("0.0.0.0:{}", port);
        }
        if let Some(value) = lookup("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_number("REQUEST_TIMEOUT_SECS", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reddit_client_id.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingEnvironmentVariable {
                var_name: "REDDIT_CLIENT_ID".to_string(),
            });
        }
        if self.reddit_client_secret.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingEnvironmentVariable {
                var_name: "REDDIT_CLIENT_SECRET".to_string(),
            });
        }
        if self.llm_api_key().is_none() {
            return Err(ConfigError::MissingField {
                field: format!("llm_api_keys.{}", self.llm_provider.as_str()),
            });
        }
        if self.reddit_requests_per_minute == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "reddit_requests_per_minute must be at least 1".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "request_timeout_secs must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Key for the selected provider.
    pub fn llm_api_key(&self) -> Option<&str> {
        self.llm_api_keys
            .get(self.llm_provider.as_str())
            .map(String::as_str)
            .filter(|key| !key.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}
