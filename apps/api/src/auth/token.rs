//! JWT issuance and validation.
//!
//! Tokens are HS256-signed JWTs. Besides the registered `iat`/`exp` claims they carry the user id,
//! the user's role (access tokens only) and a `purpose` so that a refresh or email-verification
//! token can never be replayed as an access token.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use jwt::{SignWithKey, VerifyWithKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use crate::models::user::UserRole;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid signing key: {0}")]
    Key(#[from] hmac::digest::InvalidLength),

    #[error("Failed to sign token: {0}")]
    Sign(#[source] jwt::Error),

    #[error("Token rejected: {0}")]
    Invalid(#[source] jwt::Error),

    #[error("Token expired at {0}")]
    Expired(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Access,
    Refresh,
    VerifyEmail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    pub purpose: TokenPurpose,
    pub iat: i64,
    pub exp: i64,
}

/// A signed token as handed to clients.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub scheme: &'static str,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenService {
    key: Hmac<Sha256>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Result<Self, TokenError> {
        Ok(Self {
            key: Hmac::new_from_slice(secret.as_bytes())?,
            access_ttl,
            refresh_ttl,
        })
    }

    pub fn create_access_token(
        &self,
        user_id: Uuid,
        role: UserRole,
    ) -> Result<IssuedToken, TokenError> {
        self.issue(user_id, Some(role), TokenPurpose::Access, self.access_ttl)
    }

    pub fn create_refresh_token(&self, user_id: Uuid) -> Result<IssuedToken, TokenError> {
        self.issue(user_id, None, TokenPurpose::Refresh, self.refresh_ttl)
    }

    pub fn create_verification_token(&self, user_id: Uuid) -> Result<IssuedToken, TokenError> {
        self.issue(user_id, None, TokenPurpose::VerifyEmail, self.access_ttl)
    }

    /// Verifies signature and expiry and returns the claims.
    pub fn claims(&self, token: &str) -> Result<Claims, TokenError> {
        let claims: Claims = token.verify_with_key(&self.key).map_err(TokenError::Invalid)?;
        let expires = DateTime::<Utc>::from_timestamp(claims.exp, 0).unwrap_or_default();
        if expires <= Utc::now() {
            return Err(TokenError::Expired(expires));
        }
        Ok(claims)
    }

    fn issue(
        &self,
        user_id: Uuid,
        role: Option<UserRole>,
        purpose: TokenPurpose,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenError> {
        let now = Utc::now();
        let expires_at = now + ttl;
        let claims = Claims {
            user_id,
            role,
            purpose,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = claims.sign_with_key(&self.key).map_err(TokenError::Sign)?;
        Ok(IssuedToken {
            token,
            scheme: "Bearer",
            expires_at,
        })
    }
}
