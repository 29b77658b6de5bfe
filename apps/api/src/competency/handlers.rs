use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::middleware::Staff;
use crate::competency::store::{self, CompetencyInput};
use crate::errors::{ok_message, AppError};
use crate::models::competency::Competency;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Names only, without levels.
    #[serde(default)]
    pub only: bool,
}

fn validate(input: &CompetencyInput) -> Result<(), AppError> {
    if input.competency.trim().is_empty() {
        return Err(AppError::Validation("Competency name is required".to_string()));
    }
    if input.levels.is_empty() {
        return Err(AppError::Validation(
            "A competency needs at least one level".to_string(),
        ));
    }
    if input.levels.iter().any(|l| l.level.trim().is_empty()) {
        return Err(AppError::Validation("Level names must not be empty".to_string()));
    }
    Ok(())
}

/// POST /api/v1/competencies
pub async fn handle_create_competency(
    State(state): State<AppState>,
    _staff: Staff,
    Json(input): Json<CompetencyInput>,
) -> Result<(StatusCode, Json<Competency>), AppError> {
    validate(&input)?;
    let competency = store::create_competency(&state.db, &input).await?;
    Ok((StatusCode::CREATED, Json(competency)))
}

/// GET /api/v1/competencies
pub async fn handle_list_competencies(
    State(state): State<AppState>,
    _staff: Staff,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    if query.only {
        let rows = store::list_competency_rows(&state.db).await?;
        return Ok(Json(rows).into_response());
    }
    Ok(Json(store::list_competencies(&state.db).await?).into_response())
}

/// GET /api/v1/competencies/:id
pub async fn handle_get_competency(
    State(state): State<AppState>,
    _staff: Staff,
    Path(id): Path<Uuid>,
) -> Result<Json<Competency>, AppError> {
    store::get_competency(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Competency {id} not found")))
}

/// PUT /api/v1/competencies/:id
pub async fn handle_update_competency(
    State(state): State<AppState>,
    _staff: Staff,
    Path(id): Path<Uuid>,
    Json(input): Json<CompetencyInput>,
) -> Result<Json<Competency>, AppError> {
    validate(&input)?;
    store::update_competency(&state.db, id, &input)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Competency {id} not found")))
}

/// DELETE /api/v1/competencies/:id
pub async fn handle_delete_competency(
    State(state): State<AppState>,
    _staff: Staff,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !store::delete_competency(&state.db, id).await? {
        return Err(AppError::NotFound(format!("Competency {id} not found")));
    }
    Ok(ok_message())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> CompetencyInput {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_valid_competency() {
        let input = parse(
            r#"{"competency":"Teamwork","description":null,
                "levels":[{"level":"Low","description":"Works alone"},{"level":"High"}]}"#,
        );
        assert!(validate(&input).is_ok());
        assert_eq!(input.levels[1].description, "");
    }

    #[test]
    fn test_competency_needs_levels() {
        let input = parse(r#"{"competency":"Teamwork","description":null}"#);
        assert!(validate(&input).is_err());
    }

    #[test]
    fn test_blank_level_rejected() {
        let input = parse(r#"{"competency":"Teamwork","description":null,"levels":[{"level":" "}]}"#);
        assert!(validate(&input).is_err());
    }
}
