use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::middleware::Staff;
use crate::errors::{ok_message, AppError};
use crate::models::question::Question;
use crate::question::store::{self, QuestionInput};
use crate::state::AppState;

fn validate(input: &QuestionInput) -> Result<(), AppError> {
    if input.question.trim().is_empty() {
        return Err(AppError::Validation("Question text is required".to_string()));
    }
    if input.duration_limit <= 0 {
        return Err(AppError::Validation(
            "duration_limit must be a positive number of seconds".to_string(),
        ));
    }
    Ok(())
}

/// POST /api/v1/questions
pub async fn handle_create_question(
    State(state): State<AppState>,
    _staff: Staff,
    Json(input): Json<QuestionInput>,
) -> Result<(StatusCode, Json<Question>), AppError> {
    validate(&input)?;
    let question = store::create_question(&state.db, &input).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

/// GET /api/v1/questions
pub async fn handle_list_questions(
    State(state): State<AppState>,
    _staff: Staff,
) -> Result<Json<Vec<Question>>, AppError> {
    Ok(Json(store::list_questions(&state.db).await?))
}

/// GET /api/v1/questions/:id
pub async fn handle_get_question(
    State(state): State<AppState>,
    _staff: Staff,
    Path(id): Path<Uuid>,
) -> Result<Json<Question>, AppError> {
    store::get_question(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Question {id} not found")))
}

/// PUT /api/v1/questions/:id
pub async fn handle_update_question(
    State(state): State<AppState>,
    _staff: Staff,
    Path(id): Path<Uuid>,
    Json(input): Json<QuestionInput>,
) -> Result<Json<Question>, AppError> {
    validate(&input)?;
    store::update_question(&state.db, id, &input)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Question {id} not found")))
}

/// DELETE /api/v1/questions/:id
pub async fn handle_delete_question(
    State(state): State<AppState>,
    _staff: Staff,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !store::delete_question(&state.db, id).await? {
        return Err(AppError::NotFound(format!("Question {id} not found")));
    }
    Ok(ok_message())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(text: &str, duration_limit: i32) -> QuestionInput {
        QuestionInput {
            question: text.to_string(),
            duration_limit,
            org_position: None,
            labels: vec![],
        }
    }

    #[test]
    fn test_validation() {
        assert!(validate(&input("Tell us about a conflict you resolved", 120)).is_ok());
        assert!(validate(&input("   ", 120)).is_err());
        assert!(validate(&input("Why us?", 0)).is_err());
    }

    #[test]
    fn test_labels_default_to_empty() {
        let parsed: QuestionInput =
            serde_json::from_str(r#"{"question":"Q","duration_limit":60,"org_position":null}"#)
                .unwrap();
        assert!(parsed.labels.is_empty());
    }
}
