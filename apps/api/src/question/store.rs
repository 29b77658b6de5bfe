use anyhow::Result;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::db::group_by_parent;
use crate::models::question::{Question, QuestionLabel, QuestionRow};

/// Body of question create and update requests.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionInput {
    pub question: String,
    pub duration_limit: i32,
    pub org_position: Option<String>,
    #[serde(default)]
    pub labels: Vec<LabelInput>,
}

/// A label without `id` is new; one with `id` updates that label.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelInput {
    pub id: Option<Uuid>,
    pub competency_id: Uuid,
}

pub async fn create_question(pool: &PgPool, input: &QuestionInput) -> Result<Question> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO questions (id, question, duration_limit, org_position) VALUES ($1, $2, $3, $4)",
    )
    .bind(id)
    .bind(input.question.trim())
    .bind(input.duration_limit)
    .bind(input.org_position.as_deref())
    .execute(&mut *tx)
    .await?;

    let mut labels = Vec::with_capacity(input.labels.len());
    for label in &input.labels {
        let label_id = Uuid::new_v4();
        insert_label(&mut *tx, label_id, id, label.competency_id).await?;
        labels.push(QuestionLabel {
            id: label_id,
            question_id: id,
            competency_id: label.competency_id,
        });
    }

    tx.commit().await?;
    info!("Created question {id} with {} labels", labels.len());

    Ok(Question {
        id,
        question: input.question.trim().to_string(),
        duration_limit: input.duration_limit,
        org_position: input.org_position.clone(),
        labels,
    })
}

pub async fn list_questions(pool: &PgPool) -> Result<Vec<Question>> {
    let rows = sqlx::query_as::<_, QuestionRow>(
        r#"
        SELECT id, question, duration_limit, org_position
        FROM questions
        WHERE deleted = FALSE
        ORDER BY created_at, id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut labels = group_by_parent(labels_for(pool, &ids).await?, |l| l.question_id);

    Ok(rows
        .into_iter()
        .map(|row| {
            let own = labels.remove(&row.id).unwrap_or_default();
            Question::from_parts(row, own)
        })
        .collect())
}

pub async fn get_question(pool: &PgPool, id: Uuid) -> Result<Option<Question>> {
    let row = sqlx::query_as::<_, QuestionRow>(
        "SELECT id, question, duration_limit, org_position FROM questions WHERE id = $1 AND deleted = FALSE",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let labels = labels_for(pool, &[id]).await?;
            Ok(Some(Question::from_parts(row, labels)))
        }
        None => Ok(None),
    }
}

/// Updates a question and reconciles its labels. Returns `None` if the question does not exist.
pub async fn update_question(
    pool: &PgPool,
    id: Uuid,
    input: &QuestionInput,
) -> Result<Option<Question>> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE questions
        SET question = $2, duration_limit = $3, org_position = $4, updated_at = NOW()
        WHERE id = $1 AND deleted = FALSE
        "#,
    )
    .bind(id)
    .bind(input.question.trim())
    .bind(input.duration_limit)
    .bind(input.org_position.as_deref())
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Ok(None);
    }

    let mut kept = Vec::with_capacity(input.labels.len());
    for label in &input.labels {
        let label_id = label.id.unwrap_or_else(Uuid::new_v4);
        insert_label(&mut *tx, label_id, id, label.competency_id).await?;
        kept.push(label_id);
    }

    sqlx::query(
        r#"
        UPDATE questions_labels
        SET deleted = TRUE, deleted_at = NOW()
        WHERE question_id = $1 AND deleted = FALSE AND NOT (id = ANY($2))
        "#,
    )
    .bind(id)
    .bind(&kept)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!("Updated question {id}");

    get_question(pool, id).await
}

/// Soft-deletes a question and its labels. Returns `false` if it did not exist.
pub async fn delete_question(pool: &PgPool, id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let deleted = sqlx::query(
        "UPDATE questions SET deleted = TRUE, deleted_at = NOW() WHERE id = $1 AND deleted = FALSE",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;
    if deleted.rows_affected() == 0 {
        return Ok(false);
    }

    sqlx::query(
        "UPDATE questions_labels SET deleted = TRUE, deleted_at = NOW() WHERE question_id = $1 AND deleted = FALSE",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!("Deleted question {id}");
    Ok(true)
}

/// Live labels of the given questions.
pub async fn labels_for(pool: &PgPool, question_ids: &[Uuid]) -> Result<Vec<QuestionLabel>> {
    Ok(sqlx::query_as::<_, QuestionLabel>(
        r#"
        SELECT id, question_id, competency_id
        FROM questions_labels
        WHERE question_id = ANY($1) AND deleted = FALSE
        ORDER BY created_at, id
        "#,
    )
    .bind(question_ids)
    .fetch_all(pool)
    .await?)
}

/// Inserts a label, or revives and repoints an existing one of the same question.
async fn insert_label(
    conn: &mut PgConnection,
    label_id: Uuid,
    question_id: Uuid,
    competency_id: Uuid,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO questions_labels (id, question_id, competency_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (id) DO UPDATE
        SET competency_id = EXCLUDED.competency_id,
            deleted = FALSE,
            deleted_at = NULL,
            updated_at = NOW()
        WHERE questions_labels.question_id = EXCLUDED.question_id
        "#,
    )
    .bind(label_id)
    .bind(question_id)
    .bind(competency_id)
    .execute(conn)
    .await?;
    Ok(())
}
