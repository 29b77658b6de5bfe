use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::auth::middleware::Staff;
use crate::errors::{ok_message, AppError};
use crate::feedback::labeling::{refill_queue, spawn_retrain_when_queue_empty};
use crate::feedback::store;
use crate::models::feedback::{Feedback, FeedbackStatus, NewFeedback};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateFeedbackRequest {
    pub competency_id: Uuid,
    pub transcript: String,
    pub label_result: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct LabelRequest {
    pub transcript: String,
    pub label_feedback: Uuid,
}

/// GET /api/v1/feedback
pub async fn handle_list_feedback(
    State(state): State<AppState>,
    _staff: Staff,
) -> Result<Json<Vec<Feedback>>, AppError> {
    if let Err(e) = refill_queue(&state).await {
        warn!("Could not refill labeling queue: {e:?}");
    }
    Ok(Json(
        store::list_with_status(&state.db, FeedbackStatus::ToLabel).await?,
    ))
}

/// POST /api/v1/feedback
pub async fn handle_create_feedback(
    State(state): State<AppState>,
    _staff: Staff,
    Json(req): Json<CreateFeedbackRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if req.transcript.trim().is_empty() {
        return Err(AppError::Validation("Transcript is required".to_string()));
    }
    let mut conn = state.db.acquire().await?;
    let id = store::insert_feedback(
        &mut *conn,
        &NewFeedback {
            competency_id: req.competency_id,
            room_id: None,
            transcript: req.transcript,
            label_result: req.label_result,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

/// PUT /api/v1/feedback/:id
pub async fn handle_label_feedback(
    State(state): State<AppState>,
    _staff: Staff,
    Path(id): Path<Uuid>,
    Json(req): Json<LabelRequest>,
) -> Result<Json<Value>, AppError> {
    if !store::label_feedback(&state.db, id, &req.transcript, req.label_feedback).await? {
        return Err(AppError::NotFound(format!("Feedback {id} not found")));
    }
    spawn_retrain_when_queue_empty(state);
    Ok(ok_message())
}
