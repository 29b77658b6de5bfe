use anyhow::Result;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::db::group_by_parent;
use crate::models::room::{
    LevelResult, NewRoom, RoomGroupRow, RoomQuestionRow, RoomRow, RoomStatus,
};

const GROUP_SELECT: &str = r#"
    SELECT g.id, g.title, g.org_position, g.interviewee_id,
           u.name AS interviewee_name, u.email AS interviewee_email, u.phone AS interviewee_phone
    FROM room_groups g
    JOIN users u ON u.id = g.interviewee_id
"#;

const ROOM_SELECT: &str = r#"
    SELECT r.id, r.title, r.description, r."start", r."end", r.submission, r.status, r.note,
           r.language, r.preparation_time, r.is_started, r.current_question, r.room_group_id,
           r.interviewer_id, u.name AS interviewer_name, u.email AS interviewer_email,
           g.interviewee_id
    FROM rooms r
    JOIN users u ON u.id = r.interviewer_id
    JOIN room_groups g ON g.id = r.room_group_id
"#;

/// A new group together with its first room.
pub struct GroupPlan {
    pub group_id: Uuid,
    pub title: String,
    pub org_position: String,
    pub interviewee_id: Uuid,
    pub room: NewRoom,
}

/// Which groups a caller may list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupScope {
    All,
    ConductedBy(Uuid),
    OwnedBy(Uuid),
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomGroupView {
    #[serde(flatten)]
    pub group: RoomGroupRow,
    pub rooms: Vec<RoomRow>,
}

/// Creates every group and its room in one transaction.
pub async fn create_groups(pool: &PgPool, plans: &[GroupPlan]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for plan in plans {
        sqlx::query(
            "INSERT INTO room_groups (id, title, org_position, interviewee_id) VALUES ($1, $2, $3, $4)",
        )
        .bind(plan.group_id)
        .bind(&plan.title)
        .bind(&plan.org_position)
        .bind(plan.interviewee_id)
        .execute(&mut *tx)
        .await?;
        insert_room(&mut *tx, &plan.room).await?;
    }
    tx.commit().await?;
    info!("Created {} room groups", plans.len());
    Ok(())
}

pub async fn create_room(pool: &PgPool, room: &NewRoom) -> Result<()> {
    let mut tx = pool.begin().await?;
    insert_room(&mut *tx, room).await?;
    tx.commit().await?;
    info!("Created room {} in group {}", room.id, room.room_group_id);
    Ok(())
}

async fn insert_room(conn: &mut PgConnection, room: &NewRoom) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO rooms
            (id, title, description, "start", "end", status, language, preparation_time,
             interviewer_id, room_group_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(room.id)
    .bind(&room.title)
    .bind(&room.description)
    .bind(room.start)
    .bind(room.end)
    .bind(RoomStatus::WaitingAnswer.as_str())
    .bind(room.language.as_str())
    .bind(room.preparation_time)
    .bind(room.interviewer_id)
    .bind(room.room_group_id)
    .execute(&mut *conn)
    .await?;

    link_content(conn, room.id, &room.question_ids, &room.competency_ids).await
}

/// Links questions (in the given order) and competencies to a room.
async fn link_content(
    conn: &mut PgConnection,
    room_id: Uuid,
    question_ids: &[Uuid],
    competency_ids: &[Uuid],
) -> Result<()> {
    let positions: Vec<i32> = (0..question_ids.len() as i32).collect();
    sqlx::query(
        r#"
        INSERT INTO rooms_has_questions (room_id, question_id, position)
        SELECT $1, q.id, q.position
        FROM UNNEST($2::UUID[], $3::INT4[]) AS q(id, position)
        "#,
    )
    .bind(room_id)
    .bind(question_ids)
    .bind(&positions)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO rooms_has_competencies (room_id, competency_id)
        SELECT $1, c.id FROM UNNEST($2::UUID[]) AS c(id)
        "#,
    )
    .bind(room_id)
    .bind(competency_ids)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get_group(pool: &PgPool, id: Uuid) -> Result<Option<RoomGroupRow>> {
    Ok(sqlx::query_as::<_, RoomGroupRow>(&format!(
        "{GROUP_SELECT} WHERE g.id = $1 AND g.deleted = FALSE"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?)
}

pub async fn list_groups(pool: &PgPool, scope: GroupScope) -> Result<Vec<RoomGroupView>> {
    let (interviewee, interviewer) = match scope {
        GroupScope::All => (None, None),
        GroupScope::OwnedBy(id) => (Some(id), None),
        GroupScope::ConductedBy(id) => (None, Some(id)),
    };

    let groups = sqlx::query_as::<_, RoomGroupRow>(&format!(
        r#"{GROUP_SELECT}
        WHERE g.deleted = FALSE
          AND ($1::UUID IS NULL OR g.interviewee_id = $1)
          AND ($2::UUID IS NULL OR EXISTS (
                SELECT 1 FROM rooms r
                WHERE r.room_group_id = g.id AND r.interviewer_id = $2 AND r.deleted = FALSE))
        ORDER BY g.created_at DESC, g.id
        "#
    ))
    .bind(interviewee)
    .bind(interviewer)
    .fetch_all(pool)
    .await?;

    let ids: Vec<Uuid> = groups.iter().map(|g| g.id).collect();
    let mut rooms = group_by_parent(rooms_in_groups(pool, &ids).await?, |r| r.room_group_id);

    Ok(groups
        .into_iter()
        .map(|group| RoomGroupView {
            rooms: rooms.remove(&group.id).unwrap_or_default(),
            group,
        })
        .collect())
}

pub async fn rooms_in_groups(pool: &PgPool, group_ids: &[Uuid]) -> Result<Vec<RoomRow>> {
    Ok(sqlx::query_as::<_, RoomRow>(&format!(
        r#"{ROOM_SELECT} WHERE r.room_group_id = ANY($1) AND r.deleted = FALSE ORDER BY r."start", r.id"#
    ))
    .bind(group_ids)
    .fetch_all(pool)
    .await?)
}

pub async fn get_room(pool: &PgPool, id: Uuid) -> Result<Option<RoomRow>> {
    Ok(sqlx::query_as::<_, RoomRow>(&format!(
        "{ROOM_SELECT} WHERE r.id = $1 AND r.deleted = FALSE"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?)
}

const ROOM_QUESTION_SELECT: &str = r#"
    SELECT q.id, q.question, q.duration_limit, rq.position, rq.file_link, rq.transcript,
           rq.start_answer
    FROM rooms_has_questions rq
    JOIN questions q ON q.id = rq.question_id
"#;

/// Questions of a room in answering order.
pub async fn room_questions(pool: &PgPool, room_id: Uuid) -> Result<Vec<RoomQuestionRow>> {
    Ok(sqlx::query_as::<_, RoomQuestionRow>(&format!(
        "{ROOM_QUESTION_SELECT} WHERE rq.room_id = $1 ORDER BY rq.position, q.id"
    ))
    .bind(room_id)
    .fetch_all(pool)
    .await?)
}

pub async fn room_question(
    pool: &PgPool,
    room_id: Uuid,
    question_id: Uuid,
) -> Result<Option<RoomQuestionRow>> {
    Ok(sqlx::query_as::<_, RoomQuestionRow>(&format!(
        "{ROOM_QUESTION_SELECT} WHERE rq.room_id = $1 AND rq.question_id = $2"
    ))
    .bind(room_id)
    .bind(question_id)
    .fetch_optional(pool)
    .await?)
}

pub async fn room_competency_ids(pool: &PgPool, room_id: Uuid) -> Result<Vec<Uuid>> {
    Ok(sqlx::query_scalar(
        "SELECT competency_id FROM rooms_has_competencies WHERE room_id = $1 ORDER BY competency_id",
    )
    .bind(room_id)
    .fetch_all(pool)
    .await?)
}

pub async fn level_results(pool: &PgPool, room_id: Uuid) -> Result<Vec<LevelResult>> {
    Ok(sqlx::query_as::<_, LevelResult>(
        "SELECT competency_id, level_id, result FROM results_competencies WHERE room_id = $1",
    )
    .bind(room_id)
    .fetch_all(pool)
    .await?)
}

/// Records answering progress. Returns `false` if the room or its question link is missing.
pub async fn update_progress(
    pool: &PgPool,
    room_id: Uuid,
    question_id: Uuid,
    start_answer: Option<chrono::DateTime<chrono::Utc>>,
    current_question: i32,
    is_started: bool,
) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let link = sqlx::query(
        r#"
        UPDATE rooms_has_questions
        SET start_answer = COALESCE($3, start_answer)
        WHERE room_id = $1 AND question_id = $2
        "#,
    )
    .bind(room_id)
    .bind(question_id)
    .bind(start_answer)
    .execute(&mut *tx)
    .await?;
    if link.rows_affected() == 0 {
        return Ok(false);
    }

    let room = sqlx::query(
        r#"
        UPDATE rooms
        SET current_question = $2, is_started = $3, updated_at = NOW()
        WHERE id = $1 AND deleted = FALSE
        "#,
    )
    .bind(room_id)
    .bind(current_question)
    .bind(is_started)
    .execute(&mut *tx)
    .await?;
    if room.rows_affected() == 0 {
        return Ok(false);
    }

    tx.commit().await?;
    Ok(true)
}

/// Moves a room that is still collecting answers to review.
pub async fn finish_room(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE rooms
        SET status = $2, submission = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = $3 AND deleted = FALSE
        "#,
    )
    .bind(id)
    .bind(RoomStatus::WaitingReview.as_str())
    .bind(RoomStatus::WaitingAnswer.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn review_room(
    pool: &PgPool,
    id: Uuid,
    status: RoomStatus,
    note: Option<&str>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE rooms SET status = $2, note = $3, updated_at = NOW() WHERE id = $1 AND deleted = FALSE",
    )
    .bind(id)
    .bind(status.as_str())
    .bind(note)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Swaps the question and competency sets of a room and reopens it for answers.
pub async fn replace_room_content(
    pool: &PgPool,
    id: Uuid,
    question_ids: &[Uuid],
    competency_ids: &[Uuid],
) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let reopened = sqlx::query(
        r#"
        UPDATE rooms
        SET status = $2, submission = NULL, note = NULL, is_started = FALSE,
            current_question = 0, scoring_started_at = NULL, updated_at = NOW()
        WHERE id = $1 AND deleted = FALSE
        "#,
    )
    .bind(id)
    .bind(RoomStatus::WaitingAnswer.as_str())
    .execute(&mut *tx)
    .await?;
    if reopened.rows_affected() == 0 {
        return Ok(false);
    }

    clear_content(&mut *tx, id).await?;
    link_content(&mut *tx, id, question_ids, competency_ids).await?;

    tx.commit().await?;
    info!("Replaced questions and competencies of room {id}");
    Ok(true)
}

/// Soft-deletes a room and drops its links and results; the group goes once it is empty.
pub async fn delete_room(pool: &PgPool, id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let group_id: Option<Uuid> = sqlx::query_scalar(
        r#"
        UPDATE rooms SET deleted = TRUE, deleted_at = NOW()
        WHERE id = $1 AND deleted = FALSE
        RETURNING room_group_id
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(group_id) = group_id else {
        return Ok(false);
    };

    clear_content(&mut *tx, id).await?;

    let emptied = sqlx::query(
        r#"
        UPDATE room_groups SET deleted = TRUE, deleted_at = NOW()
        WHERE id = $1 AND deleted = FALSE
          AND NOT EXISTS (SELECT 1 FROM rooms WHERE room_group_id = $1 AND deleted = FALSE)
        "#,
    )
    .bind(group_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(
        "Deleted room {id}{}",
        if emptied.rows_affected() > 0 {
            format!(" and its empty group {group_id}")
        } else {
            String::new()
        }
    );
    Ok(true)
}

async fn clear_content(conn: &mut PgConnection, room_id: Uuid) -> Result<()> {
    for table in [
        "rooms_has_questions",
        "rooms_has_competencies",
        "results_competencies",
    ] {
        sqlx::query(&format!("DELETE FROM {table} WHERE room_id = $1"))
            .bind(room_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
