mod auth;
mod competency;
mod config;
mod db;
mod errors;
mod feedback;
#[cfg(test)]
mod fixtures;
mod models;
mod notify;
mod pipeline;
mod question;
mod room;
mod routes;
mod service_client;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::http::Method;
use tokio::sync::Semaphore;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::token::TokenService;
use crate::config::Config;
use crate::db::create_pool;
use crate::notify::LogNotifier;
use crate::pipeline::retrain::run_retrain_scheduler;
use crate::routes::build_router;
use crate::service_client::ServiceClient;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Hiremif API v{}", env!("CARGO_PKG_VERSION"));

    let db = create_pool(&config.database_url).await?;

    let tokens = TokenService::new(
        &config.token_secret,
        chrono::Duration::minutes(config.access_token_expire),
        chrono::Duration::hours(config.refresh_token_expire),
    )?;

    let services =
        ServiceClient::new()?.with_backoff(Duration::from_millis(config.service_backoff_ms));
    info!(
        "Model services: scoring EN={} ID={}",
        config.scoring_host_en, config.scoring_host_id
    );

    let state = AppState {
        db,
        tokens,
        services,
        notifier: Arc::new(LogNotifier),
        pipeline: Arc::new(Semaphore::new(config.pipeline_concurrency.max(1))),
        config: config.clone(),
    };

    tokio::spawn(run_retrain_scheduler(state.clone()));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ]);

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
