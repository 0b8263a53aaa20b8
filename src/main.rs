mod http;

use anyhow::Context;
use idea_engine::{EngineConfig, IdeaEngine};
use llm_interface::provider_from_config;
use reddit_client::{RateLimitConfig, RedditClient, RedditCredentials};
use std::sync::Arc;
use subforge_core::{AppConfig, RetryConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "subforge=info,idea_engine=info,reddit_client=info,llm_interface=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    info!("Starting Subforge v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("failed to load configuration")?;

    let credentials = RedditCredentials::new(
        config
            .reddit_client_id
            .clone()
            .context("REDDIT_CLIENT_ID is required")?,
        config
            .reddit_client_secret
            .clone()
            .context("REDDIT_CLIENT_SECRET is required")?,
        config.reddit_user_agent.clone(),
    );
    let reddit = Arc::new(RedditClient::new(
        credentials,
        RateLimitConfig::reddit_oauth().with_max_requests(config.reddit_requests_per_minute),
        RetryConfig::default(),
    )?);

    let llm = provider_from_config(&config)?;
    info!("Using LLM provider {}", llm.name());

    let engine = Arc::new(IdeaEngine::new(
        reddit.clone(),
        llm,
        EngineConfig::from_app_config(&config),
    ));

    let app = http::create_router(http::AppState { engine, reddit });
    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    info!("HTTP API listening on {}", config.bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
