// SPDX-License-Identifier: MIT

//! Parceld API server.

use parceld::{
    cache::{MemorySessionCache, RedisSessionCache, SessionCache},
    config::Config,
    services::{HttpMailer, OAuthClient},
    store::MemoryUserStore,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Parceld API");

    // Session cache: Redis when configured, in-memory otherwise
    let cache: Arc<dyn SessionCache> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisSessionCache::connect(url)
                .await
                .expect("Failed to connect to Redis"),
        ),
        None => {
            tracing::warn!("REDIS_URL not set, using in-memory session cache");
            Arc::new(MemorySessionCache::new())
        }
    };

    let users = Arc::new(MemoryUserStore::new());
    let mailer = Arc::new(HttpMailer::from_config(&config));

    let state = Arc::new(AppState::new(
        config.clone(),
        users,
        cache,
        mailer,
        OAuthClient::new(),
    ));

    // Build router
    let app = parceld::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("parceld=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
