use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

text_enum! {
    pub enum RoomStatus ("room status") {
        WaitingAnswer => "WAITING ANSWER",
        WaitingReview => "WAITING REVIEW",
        Accepted => "ACCEPTED",
        Rejected => "REJECTED",
    }
}

impl RoomStatus {
    /// Statuses a reviewer may hand down.
    pub fn is_decision(&self) -> bool {
        matches!(self, RoomStatus::Accepted | RoomStatus::Rejected)
    }
}

text_enum! {
    /// Interview language; selects the speech-to-text and scoring hosts.
    pub enum Language ("language") {
        En => "EN",
        Id => "ID",
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RoomGroupRow {
    pub id: Uuid,
    pub title: String,
    pub org_position: String,
    pub interviewee_id: Uuid,
    pub interviewee_name: String,
    pub interviewee_email: String,
    pub interviewee_phone: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RoomRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub submission: Option<DateTime<Utc>>,
    #[sqlx(try_from = "String")]
    pub status: RoomStatus,
    pub note: Option<String>,
    #[sqlx(try_from = "String")]
    pub language: Language,
    pub preparation_time: i32,
    pub is_started: bool,
    pub current_question: i32,
    pub room_group_id: Uuid,
    pub interviewer_id: Uuid,
    pub interviewer_name: String,
    pub interviewer_email: String,
    pub interviewee_id: Uuid,
}

/// Per-question answer state of a room.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RoomQuestionRow {
    pub id: Uuid,
    pub question: String,
    pub duration_limit: i32,
    pub position: i32,
    pub file_link: Option<String>,
    pub transcript: Option<String>,
    pub start_answer: Option<DateTime<Utc>>,
}

/// A scored level of one competency in a room.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct LevelResult {
    pub competency_id: Uuid,
    pub level_id: Uuid,
    pub result: f64,
}

/// Fields needed to create a room.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub id: Uuid,
    pub room_group_id: Uuid,
    pub interviewer_id: Uuid,
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub language: Language,
    pub preparation_time: i32,
    pub question_ids: Vec<Uuid>,
    pub competency_ids: Vec<Uuid>,
}
