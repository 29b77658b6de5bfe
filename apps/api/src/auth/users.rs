use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::user::{User, UserRole, UserStatus, UserSummary};

pub struct NewUser<'a> {
    pub name: &'a str,
    pub phone: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: UserRole,
}

const USER_COLUMNS: &str = "id, name, phone, email, password, role, status, created_at";

/// Inserts an unverified user and returns its id.
pub async fn insert_user(pool: &PgPool, user: NewUser<'_>) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO users (id, name, phone, email, password, role, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(user.name)
    .bind(user.phone)
    .bind(user.email)
    .bind(user.password_hash)
    .bind(user.role.as_str())
    .bind(UserStatus::Unverified.as_str())
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
    Ok(sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND deleted = FALSE"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?)
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>> {
    Ok(sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted = FALSE"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?)
}

pub async fn find_summaries_by_emails(pool: &PgPool, emails: &[String]) -> Result<Vec<UserSummary>> {
    Ok(sqlx::query_as::<_, UserSummary>(
        "SELECT id, name, email, phone, role FROM users WHERE email = ANY($1) AND deleted = FALSE",
    )
    .bind(emails)
    .fetch_all(pool)
    .await?)
}

/// Orders `found` like `emails`; fails with the emails that matched no user.
pub fn order_by_emails(
    found: Vec<UserSummary>,
    emails: &[String],
) -> std::result::Result<Vec<UserSummary>, Vec<String>> {
    let mut ordered = Vec::with_capacity(emails.len());
    let mut missing = Vec::new();
    for email in emails {
        match found.iter().find(|u| &u.email == email) {
            Some(user) => ordered.push(user.clone()),
            None => missing.push(email.clone()),
        }
    }
    if missing.is_empty() {
        Ok(ordered)
    } else {
        Err(missing)
    }
}

pub async fn list_users(pool: &PgPool, role: Option<UserRole>) -> Result<Vec<UserSummary>> {
    Ok(sqlx::query_as::<_, UserSummary>(
        r#"
        SELECT id, name, email, phone, role
        FROM users
        WHERE deleted = FALSE AND ($1::TEXT IS NULL OR role = $1)
        ORDER BY name
        "#,
    )
    .bind(role.map(|r| r.as_str()))
    .fetch_all(pool)
    .await?)
}

/// Returns `false` when no such user exists.
pub async fn update_profile(pool: &PgPool, id: Uuid, name: &str, phone: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE users SET name = $2, phone = $3, updated_at = NOW() WHERE id = $1 AND deleted = FALSE",
    )
    .bind(id)
    .bind(name)
    .bind(phone)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn update_password(pool: &PgPool, id: Uuid, password_hash: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE users SET password = $2, updated_at = NOW() WHERE id = $1 AND deleted = FALSE",
    )
    .bind(id)
    .bind(password_hash)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn update_status(pool: &PgPool, id: Uuid, status: UserStatus) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE users SET status = $2, updated_at = NOW() WHERE id = $1 AND deleted = FALSE",
    )
    .bind(id)
    .bind(status.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Whether an error came from a unique-constraint violation.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<sqlx::Error>(),
        Some(sqlx::Error::Database(db)) if db.is_unique_violation()
    )
}
