use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

text_enum! {
    /// Lifecycle of a scored transcript in the active-learning loop.
    pub enum FeedbackStatus ("feedback status") {
        Unlabeled => "UNLABELED",
        ToLabel => "TO_LABEL",
        Labeled => "LABELED",
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Feedback {
    pub id: Uuid,
    pub competency_id: Uuid,
    pub room_id: Option<Uuid>,
    pub transcript: String,
    #[sqlx(try_from = "String")]
    pub status: FeedbackStatus,
    /// Level the model picked.
    pub label_result: Option<Uuid>,
    /// Level the reviewer picked.
    pub label_feedback: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A feedback row about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFeedback {
    pub competency_id: Uuid,
    pub room_id: Option<Uuid>,
    pub transcript: String,
    pub label_result: Option<Uuid>,
}
