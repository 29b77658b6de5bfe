use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::feedback::store::insert_feedback;
use crate::models::feedback::NewFeedback;
use crate::models::room::LevelResult;
use crate::pipeline::scoring::AnsweredQuestion;

/// Stores the uploaded answer and its transcript. Returns `false` if the link row is gone.
pub async fn record_answer(
    pool: &PgPool,
    room_id: Uuid,
    question_id: Uuid,
    file_link: &str,
    transcript: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE rooms_has_questions
        SET file_link = $3, transcript = $4
        WHERE room_id = $1 AND question_id = $2
        "#,
    )
    .bind(room_id)
    .bind(question_id)
    .bind(file_link)
    .bind(transcript)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Claims a fully answered room for scoring.
///
/// Succeeds for exactly one caller: the room must be unclaimed and every linked question must
/// have a transcript.
pub async fn claim_scoring(pool: &PgPool, room_id: Uuid) -> Result<bool> {
    let claimed: Option<Uuid> = sqlx::query_scalar(
        r#"
        UPDATE rooms SET scoring_started_at = NOW()
        WHERE id = $1
          AND deleted = FALSE
          AND scoring_started_at IS NULL
          AND EXISTS (SELECT 1 FROM rooms_has_questions WHERE room_id = $1)
          AND NOT EXISTS (
                SELECT 1 FROM rooms_has_questions WHERE room_id = $1 AND transcript IS NULL)
        RETURNING id
        "#,
    )
    .bind(room_id)
    .fetch_optional(pool)
    .await?;
    Ok(claimed.is_some())
}

pub async fn release_claim(pool: &PgPool, room_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE rooms SET scoring_started_at = NULL WHERE id = $1")
        .bind(room_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn answered_questions(pool: &PgPool, room_id: Uuid) -> Result<Vec<AnsweredQuestion>> {
    Ok(sqlx::query_as::<_, AnsweredQuestion>(
        r#"
        SELECT question_id, position, transcript
        FROM rooms_has_questions
        WHERE room_id = $1 AND transcript IS NOT NULL
        ORDER BY position
        "#,
    )
    .bind(room_id)
    .fetch_all(pool)
    .await?)
}

/// Upserts level results and inserts feedback rows atomically.
pub async fn persist_scores(
    pool: &PgPool,
    room_id: Uuid,
    results: &[LevelResult],
    feedback: &[NewFeedback],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    for result in results {
        sqlx::query(
            r#"
            INSERT INTO results_competencies (room_id, competency_id, level_id, result)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (room_id, level_id) DO UPDATE
            SET competency_id = EXCLUDED.competency_id, result = EXCLUDED.result
            "#,
        )
        .bind(room_id)
        .bind(result.competency_id)
        .bind(result.level_id)
        .bind(result.result)
        .execute(&mut *tx)
        .await?;
    }

    for row in feedback {
        insert_feedback(&mut *tx, row).await?;
    }

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{scoring_claimed, seed_room};

    async fn answer_all(pool: &PgPool, room_id: Uuid, question_ids: &[Uuid]) {
        for (i, question_id) in question_ids.iter().enumerate() {
            let link = format!("http://api/files/{i}.webm");
            assert!(record_answer(pool, room_id, *question_id, &link, "an answer")
                .await
                .unwrap());
        }
    }

    async fn count(pool: &PgPool, sql: &str, room_id: Uuid) -> i64 {
        sqlx::query_scalar(sql)
            .bind(room_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test]
    async fn test_only_one_claim_wins_for_answered_room(pool: PgPool) {
        let room = seed_room(&pool, 2).await;
        answer_all(&pool, room.room_id, &room.question_ids).await;

        let (a, b) = tokio::join!(
            claim_scoring(&pool, room.room_id),
            claim_scoring(&pool, room.room_id)
        );
        let wins = [a.unwrap(), b.unwrap()].iter().filter(|won| **won).count();
        assert_eq!(wins, 1);
        assert!(scoring_claimed(&pool, room.room_id).await);
    }

    #[sqlx::test]
    async fn test_room_with_missing_transcript_is_not_claimed(pool: PgPool) {
        let room = seed_room(&pool, 2).await;
        answer_all(&pool, room.room_id, &room.question_ids[..1]).await;

        assert!(!claim_scoring(&pool, room.room_id).await.unwrap());
        assert!(!scoring_claimed(&pool, room.room_id).await);
    }

    #[sqlx::test]
    async fn test_released_claim_can_be_won_again(pool: PgPool) {
        let room = seed_room(&pool, 1).await;
        answer_all(&pool, room.room_id, &room.question_ids).await;

        assert!(claim_scoring(&pool, room.room_id).await.unwrap());
        assert!(!claim_scoring(&pool, room.room_id).await.unwrap());
        release_claim(&pool, room.room_id).await.unwrap();
        assert!(claim_scoring(&pool, room.room_id).await.unwrap());
    }

    #[sqlx::test]
    async fn test_persist_scores_rolls_back_on_bad_feedback(pool: PgPool) {
        let room = seed_room(&pool, 1).await;
        let results = vec![LevelResult {
            competency_id: room.competency_id,
            level_id: room.level_ids[0],
            result: 0.4,
        }];
        let orphan = NewFeedback {
            competency_id: Uuid::new_v4(),
            room_id: Some(room.room_id),
            transcript: "an answer".into(),
            label_result: None,
        };

        assert!(persist_scores(&pool, room.room_id, &results, &[orphan])
            .await
            .is_err());
        let stored = count(
            &pool,
            "SELECT COUNT(*) FROM results_competencies WHERE room_id = $1",
            room.room_id,
        )
        .await;
        assert_eq!(stored, 0);
    }

    #[sqlx::test]
    async fn test_rescoring_overwrites_results(pool: PgPool) {
        let room = seed_room(&pool, 1).await;
        let feedback = NewFeedback {
            competency_id: room.competency_id,
            room_id: Some(room.room_id),
            transcript: "an answer".into(),
            label_result: Some(room.level_ids[1]),
        };
        for score in [0.25, 0.75] {
            let results: Vec<LevelResult> = room
                .level_ids
                .iter()
                .map(|level_id| LevelResult {
                    competency_id: room.competency_id,
                    level_id: *level_id,
                    result: score,
                })
                .collect();
            persist_scores(&pool, room.room_id, &results, &[feedback.clone()])
                .await
                .unwrap();
        }

        let stored: Vec<f64> = sqlx::query_scalar(
            "SELECT result FROM results_competencies WHERE room_id = $1",
        )
        .bind(room.room_id)
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(stored, vec![0.75, 0.75]);
        let feedback_rows = count(
            &pool,
            "SELECT COUNT(*) FROM feedback_results WHERE room_id = $1",
            room.room_id,
        )
        .await;
        assert_eq!(feedback_rows, 2);
    }
}
