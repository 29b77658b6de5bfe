use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::Semaphore;

use crate::auth::token::TokenService;
use crate::config::Config;
use crate::notify::Notifier;
use crate::service_client::ServiceClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub tokens: TokenService,
    /// Speech-to-text and scoring model client.
    pub services: ServiceClient,
    pub notifier: Arc<dyn Notifier>,
    /// Permits for concurrently running answer jobs.
    pub pipeline: Arc<Semaphore>,
}
