use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::debug;
use uuid::Uuid;

use crate::auth::token::{TokenPurpose, TokenService};
use crate::errors::AppError;
use crate::models::user::UserRole;
use crate::state::AppState;

/// The caller of an authenticated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: UserRole,
}

/// An authenticated caller with an interviewer or HR role.
#[derive(Debug, Clone, Copy)]
pub struct Staff(pub AuthUser);

/// Rejects requests without a valid bearer access token and records the caller for extractors.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = bearer_user(request.headers(), &state.tokens)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

fn bearer_user(headers: &HeaderMap, tokens: &TokenService) -> Result<AuthUser, AppError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    let claims = tokens.claims(token).map_err(|e| {
        debug!("Rejected bearer token: {e}");
        AppError::Unauthorized("Invalid token".to_string())
    })?;

    match (claims.purpose, claims.role) {
        (TokenPurpose::Access, Some(role)) => Ok(AuthUser {
            id: claims.user_id,
            role,
        }),
        _ => Err(AppError::Unauthorized("Invalid token".to_string())),
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Staff {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role.is_staff() {
            Ok(Staff(user))
        } else {
            Err(AppError::Forbidden)
        }
    }
}
