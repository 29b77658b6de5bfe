use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CompetencyRow {
    pub id: Uuid,
    pub competency: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CompetencyLevel {
    pub id: Uuid,
    pub competency_id: Uuid,
    pub level: String,
    pub description: String,
}

/// A competency with its proficiency levels, ordered as stored.
#[derive(Debug, Clone, Serialize)]
pub struct Competency {
    pub id: Uuid,
    pub competency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub levels: Vec<CompetencyLevel>,
}

impl Competency {
    pub fn from_parts(row: CompetencyRow, levels: Vec<CompetencyLevel>) -> Self {
        Competency {
            id: row.id,
            competency: row.competency,
            description: row.description,
            levels,
        }
    }
}
