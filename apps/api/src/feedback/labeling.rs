use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::feedback::store;
use crate::models::feedback::FeedbackStatus;
use crate::state::AppState;

/// Asks the model which rows to label next when the review queue is empty.
///
/// Returns how many rows were queued.
pub async fn refill_queue(state: &AppState) -> Result<u64> {
    if store::count_with_status(&state.db, FeedbackStatus::ToLabel).await? > 0 {
        return Ok(0);
    }

    let wanted = state
        .services
        .to_label(state.config.labeling_host())
        .await
        .context("to-label request failed")?;
    if wanted.id.is_empty() {
        return Ok(0);
    }

    debug!(scores = ?wanted.scores, "Model confidence for suggested rows");
    let queued = store::mark_to_label(&state.db, &wanted.id).await?;
    info!("Queued {queued} of {} suggested rows for labeling", wanted.id.len());
    Ok(queued)
}

/// Retrains in the background once the last queued row has been labeled.
pub fn spawn_retrain_when_queue_empty(state: AppState) {
    tokio::spawn(async move {
        if let Err(e) = retrain_when_queue_empty(&state).await {
            error!("Retrain after labeling failed: {e:?}");
        }
    });
}

async fn retrain_when_queue_empty(state: &AppState) -> Result<()> {
    let remaining = store::count_with_status(&state.db, FeedbackStatus::ToLabel).await?;
    if remaining > 0 {
        return Ok(());
    }
    info!("Labeling queue empty, retraining");
    train_exclusively(state, state.config.labeling_host()).await?;
    Ok(())
}

/// Posts `/train` to `host` unless a run against it is already in flight.
///
/// Returns `false` when the run was skipped.
pub async fn train_exclusively(state: &AppState, host: &str) -> Result<bool> {
    if !store::claim_training(&state.db, host).await? {
        info!("Training on {host} already running, skipping");
        return Ok(false);
    }
    let trained = state
        .services
        .train(host)
        .await
        .context("Train request failed");
    if let Err(e) = store::release_training(&state.db, host).await {
        warn!("Failed to release training claim on {host}: {e:?}");
    }
    trained?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sqlx::PgPool;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::fixtures::test_state;

    #[sqlx::test]
    async fn test_concurrent_retrains_post_once(pool: PgPool) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/train"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .expect(1)
            .mount(&server)
            .await;
        let state = test_state(pool, &server.uri());
        let host = state.config.labeling_host().to_string();

        let (a, b) = tokio::join!(
            train_exclusively(&state, &host),
            train_exclusively(&state, &host)
        );
        assert_ne!(a.unwrap(), b.unwrap());

        // Released afterwards, so the next run goes through.
        assert!(store::claim_training(&state.db, &host).await.unwrap());
    }

    #[sqlx::test]
    async fn test_failed_train_releases_claim(pool: PgPool) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/train"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let state = test_state(pool, &server.uri());
        let host = state.config.labeling_host().to_string();

        assert!(train_exclusively(&state, &host).await.is_err());
        assert!(store::claim_training(&state.db, &host).await.unwrap());
    }
}
