use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

text_enum! {
    pub enum UserRole ("role") {
        Interviewer => "INTERVIEWER",
        Interviewee => "INTERVIEWEE",
        Hrd => "HRD",
    }
}

impl UserRole {
    /// Interviewers and HR staff manage questions, competencies, rooms and feedback.
    pub fn is_staff(&self) -> bool {
        matches!(self, UserRole::Interviewer | UserRole::Hrd)
    }
}

text_enum! {
    pub enum UserStatus ("user status") {
        Unverified => "UNVERIFIED",
        Verified => "VERIFIED",
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: String,
    #[sqlx(rename = "password")]
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: UserRole,
    #[sqlx(try_from = "String")]
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

/// Public projection of a user used in listings and room details.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[sqlx(try_from = "String")]
    pub role: UserRole,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        UserSummary {
            id: user.id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            role: user.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_wire_spelling() {
        let role: UserRole = "HRD".parse().unwrap();
        assert_eq!(role, UserRole::Hrd);
        assert_eq!(role.to_string(), "HRD");
        assert_eq!(
            serde_json::to_string(&UserRole::Interviewee).unwrap(),
            "\"INTERVIEWEE\""
        );
    }

    #[test]
    fn test_unknown_role_rejected() {
        let err = "ADMIN".parse::<UserRole>().unwrap_err();
        assert_eq!(err.kind, "role");
        assert_eq!(err.value, "ADMIN");
    }

    #[test]
    fn test_staff_roles() {
        assert!(UserRole::Interviewer.is_staff());
        assert!(UserRole::Hrd.is_staff());
        assert!(!UserRole::Interviewee.is_staff());
    }
}
