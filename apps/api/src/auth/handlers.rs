use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::auth::middleware::{AuthUser, Staff};
use crate::auth::password::{hash_password, verify_password, MIN_PASSWORD_LEN};
use crate::auth::token::{IssuedToken, TokenPurpose};
use crate::auth::users::{self, NewUser};
use crate::errors::{ok_message, AppError};
use crate::models::user::{UserRole, UserStatus, UserSummary};
use crate::notify::{dispatch, Notification};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: IssuedToken,
    pub refresh_token: IssuedToken,
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: String,
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct Profile {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub name: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleQuery {
    pub role: Option<String>,
}

fn validate_registration(req: &RegisterRequest) -> Result<UserRole, AppError> {
    let role: UserRole = req
        .role
        .parse()
        .map_err(|_| AppError::Validation("Invalid role".to_string()))?;
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    if !req.email.contains('@') {
        return Err(AppError::Validation("A valid email is required".to_string()));
    }
    validate_password(&req.password)?;
    Ok(role)
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// POST /api/v1/auth/register
pub async fn handle_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let role = validate_registration(&req)?;
    let email = req.email.trim().to_lowercase();

    if users::find_by_email(&state.db, &email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let password_hash = hash_password(req.password).await?;
    let user_id = users::insert_user(
        &state.db,
        NewUser {
            name: req.name.trim(),
            phone: req.phone.trim(),
            email: &email,
            password_hash: &password_hash,
            role,
        },
    )
    .await
    .map_err(|e| {
        if users::is_unique_violation(&e) {
            AppError::Conflict("Email already registered".to_string())
        } else {
            AppError::Internal(e)
        }
    })?;
    info!("Registered {role} {user_id}");

    let token = state.tokens.create_verification_token(user_id)?;
    dispatch(
        state.notifier.clone(),
        Notification::VerifyEmail {
            to: email,
            verify_url: format!(
                "{}/auth/verify-email?token={}&user_id={user_id}",
                state.config.frontend_url, token.token
            ),
        },
    );

    Ok((StatusCode::CREATED, ok_message()))
}

/// POST /api/v1/auth/login
pub async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());

    let user = users::find_by_email(&state.db, &req.email.trim().to_lowercase())
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(req.password, user.password_hash).await? {
        return Err(invalid());
    }
    if user.status != UserStatus::Verified {
        return Err(AppError::Unauthorized("User is not verified".to_string()));
    }

    Ok(Json(LoginResponse {
        access_token: state.tokens.create_access_token(user.id, user.role)?,
        refresh_token: state.tokens.create_refresh_token(user.id)?,
        role: user.role,
    }))
}

/// GET /api/v1/auth/verify
pub async fn handle_verify_token(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<Value>, AppError> {
    state
        .tokens
        .claims(&query.token)
        .map_err(|e| AppError::Validation(e.to_string()))?;
    Ok(Json(json!({ "message": "User Verified" })))
}

/// GET /api/v1/auth/verify-email
pub async fn handle_verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<Json<Value>, AppError> {
    let claims = state
        .tokens
        .claims(&query.token)
        .map_err(|e| AppError::Validation(e.to_string()))?;
    if claims.purpose != TokenPurpose::VerifyEmail || claims.user_id != query.user_id {
        return Err(AppError::Validation("Token does not match user".to_string()));
    }
    if !users::update_status(&state.db, query.user_id, UserStatus::Verified).await? {
        return Err(AppError::NotFound(format!("User {} not found", query.user_id)));
    }
    info!("Verified user {}", query.user_id);
    Ok(Json(json!({ "message": "User Verified" })))
}

/// GET /api/v1/auth/me
pub async fn handle_get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Profile>, AppError> {
    let found = users::find_by_id(&state.db, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(Profile {
        name: found.name,
        phone: found.phone,
        email: found.email,
        role: found.role,
        created_at: found.created_at,
    }))
}

/// PUT /api/v1/auth/me
pub async fn handle_update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ProfileUpdate>,
) -> Result<Json<Value>, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    if !users::update_profile(&state.db, user.id, req.name.trim(), req.phone.trim()).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    Ok(ok_message())
}

/// PUT /api/v1/auth/me/password
pub async fn handle_change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<PasswordChange>,
) -> Result<Json<Value>, AppError> {
    validate_password(&req.new_password)?;
    let found = users::find_by_id(&state.db, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    if !verify_password(req.current_password, found.password_hash).await? {
        return Err(AppError::Unauthorized("Current password is incorrect".to_string()));
    }
    let password_hash = hash_password(req.new_password).await?;
    users::update_password(&state.db, user.id, &password_hash).await?;
    info!("User {} changed password", user.id);
    Ok(ok_message())
}

/// GET /api/v1/auth/emails
pub async fn handle_list_emails(
    State(state): State<AppState>,
    _staff: Staff,
    Query(query): Query<RoleQuery>,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    let role = query
        .role
        .as_deref()
        .map(str::parse::<UserRole>)
        .transpose()
        .map_err(|_| AppError::Validation("Invalid role".to_string()))?;
    Ok(Json(users::list_users(&state.db, role).await?))
}

/// GET /api/v1/auth/check/:email
pub async fn handle_check_email(
    State(state): State<AppState>,
    _staff: Staff,
    Path(email): Path<String>,
) -> Result<Json<UserSummary>, AppError> {
    let user = users::find_by_email(&state.db, &email.trim().to_lowercase())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with email {email} not found")))?;
    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(role: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Ada Lovelace".into(),
            phone: String::new(),
            email: email.into(),
            password: password.into(),
            role: role.into(),
        }
    }

    #[test]
    fn test_registration_accepts_known_role() {
        let role = validate_registration(&request("INTERVIEWEE", "ada@x.io", "long enough")).unwrap();
        assert_eq!(role, UserRole::Interviewee);
    }

    #[test]
    fn test_registration_rejects_bad_input() {
        let err = validate_registration(&request("ADMIN", "ada@x.io", "long enough")).unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Invalid role");
        assert!(validate_registration(&request("HRD", "no-at-sign", "long enough")).is_err());
        assert!(validate_registration(&request("HRD", "ada@x.io", "short")).is_err());
    }
}
