use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct QuestionRow {
    pub id: Uuid,
    pub question: String,
    pub duration_limit: i32,
    pub org_position: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuestionLabel {
    pub id: Uuid,
    pub question_id: Uuid,
    pub competency_id: Uuid,
}

/// A question with its competency labels stitched on.
#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub id: Uuid,
    pub question: String,
    pub duration_limit: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_position: Option<String>,
    pub labels: Vec<QuestionLabel>,
}

impl Question {
    pub fn from_parts(row: QuestionRow, labels: Vec<QuestionLabel>) -> Self {
        Question {
            id: row.id,
            question: row.question,
            duration_limit: row.duration_limit,
            org_position: row.org_position,
            labels,
        }
    }
}
