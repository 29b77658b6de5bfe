use anyhow::Result;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::feedback::{Feedback, FeedbackStatus, NewFeedback};

pub async fn insert_feedback(conn: &mut PgConnection, row: &NewFeedback) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO feedback_results (id, competency_id, room_id, transcript, status, label_result)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(row.competency_id)
    .bind(row.room_id)
    .bind(&row.transcript)
    .bind(FeedbackStatus::Unlabeled.as_str())
    .bind(row.label_result)
    .execute(conn)
    .await?;
    Ok(id)
}

pub async fn list_with_status(pool: &PgPool, status: FeedbackStatus) -> Result<Vec<Feedback>> {
    Ok(sqlx::query_as::<_, Feedback>(
        r#"
        SELECT id, competency_id, room_id, transcript, status, label_result, label_feedback,
               created_at
        FROM feedback_results
        WHERE status = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(status.as_str())
    .fetch_all(pool)
    .await?)
}

pub async fn count_with_status(pool: &PgPool, status: FeedbackStatus) -> Result<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM feedback_results WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(pool)
            .await?,
    )
}

/// Queues unlabeled rows for human review. Returns how many rows moved.
pub async fn mark_to_label(pool: &PgPool, ids: &[Uuid]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        r#"
        UPDATE feedback_results
        SET status = $2, updated_at = NOW()
        WHERE id = ANY($1) AND status = $3
        "#,
    )
    .bind(ids)
    .bind(FeedbackStatus::ToLabel.as_str())
    .bind(FeedbackStatus::Unlabeled.as_str())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(result.rows_affected())
}

/// Stores a reviewer's label. Returns `false` if the row does not exist.
pub async fn label_feedback(
    pool: &PgPool,
    id: Uuid,
    transcript: &str,
    label: Uuid,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE feedback_results
        SET transcript = $2, label_feedback = $3, status = $4, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(transcript)
    .bind(label)
    .bind(FeedbackStatus::Labeled.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Marks a `/train` call against `host` as in flight.
///
/// Succeeds for one caller at a time; a claim older than an hour counts as abandoned.
pub async fn claim_training(pool: &PgPool, host: &str) -> Result<bool> {
    let claimed: Option<String> = sqlx::query_scalar(
        r#"
        INSERT INTO training_runs (host, started_at) VALUES ($1, NOW())
        ON CONFLICT (host) DO UPDATE SET started_at = NOW()
        WHERE training_runs.started_at IS NULL
           OR training_runs.started_at < NOW() - INTERVAL '1 hour'
        RETURNING host
        "#,
    )
    .bind(host)
    .fetch_optional(pool)
    .await?;
    Ok(claimed.is_some())
}

pub async fn release_training(pool: &PgPool, host: &str) -> Result<()> {
    sqlx::query("UPDATE training_runs SET started_at = NULL WHERE host = $1")
        .bind(host)
        .execute(pool)
        .await?;
    Ok(())
}
