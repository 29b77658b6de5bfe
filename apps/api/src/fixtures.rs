//! Database seeding and state construction shared by tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::auth::token::TokenService;
use crate::config::Config;
use crate::notify::LogNotifier;
use crate::service_client::ServiceClient;
use crate::state::AppState;

/// State whose speech-to-text and scoring hosts all live on `base_url`.
///
/// Speech-to-text answers on `/stt`; the EN scoring model is `base_url` itself and the ID
/// model is `{base_url}/id`.
pub fn test_state(db: PgPool, base_url: &str) -> AppState {
    let stt = format!("{base_url}/stt");
    let scoring_id = format!("{base_url}/id");
    let vars: HashMap<&str, &str> = HashMap::from([
        ("DATABASE_URL", "postgres://unused"),
        ("TOKEN_SECRET", "fixture-secret"),
        ("SPEECH_TO_TEXT_HOST_EN", stt.as_str()),
        ("SPEECH_TO_TEXT_HOST_ID", stt.as_str()),
        ("SCORING_HOST_EN", base_url),
        ("SCORING_HOST_ID", scoring_id.as_str()),
    ]);
    let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
    AppState {
        db,
        tokens: TokenService::new(
            &config.token_secret,
            chrono::Duration::minutes(5),
            chrono::Duration::hours(1),
        )
        .unwrap(),
        services: ServiceClient::new()
            .unwrap()
            .with_backoff(Duration::from_millis(1)),
        notifier: Arc::new(LogNotifier),
        pipeline: Arc::new(Semaphore::new(2)),
        config,
    }
}

/// A WAITING ANSWER room with labelled questions and one two-level competency.
pub struct SeededRoom {
    pub room_id: Uuid,
    pub question_ids: Vec<Uuid>,
    pub competency_id: Uuid,
    pub level_ids: Vec<Uuid>,
}

pub async fn seed_room(pool: &PgPool, questions: usize) -> SeededRoom {
    let interviewer = insert_user(pool, "INTERVIEWER").await;
    let interviewee = insert_user(pool, "INTERVIEWEE").await;

    let group_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO room_groups (id, title, org_position, interviewee_id) VALUES ($1, '[1]_T_Dev_Tess', 'Dev', $2)",
    )
    .bind(group_id)
    .bind(interviewee)
    .execute(pool)
    .await
    .unwrap();

    let room_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO rooms (id, title, "start", "end", status, language, interviewer_id, room_group_id)
        VALUES ($1, 'Technical', NOW(), NOW() + INTERVAL '1 hour', 'WAITING ANSWER', 'EN', $2, $3)
        "#,
    )
    .bind(room_id)
    .bind(interviewer)
    .bind(group_id)
    .execute(pool)
    .await
    .unwrap();

    let competency_id = Uuid::new_v4();
    sqlx::query("INSERT INTO competencies (id, competency) VALUES ($1, 'Teamwork')")
        .bind(competency_id)
        .execute(pool)
        .await
        .unwrap();
    let mut level_ids = Vec::new();
    for (position, level) in ["Low", "High"].iter().enumerate() {
        let level_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO competency_levels (id, competency_id, level, description, position) VALUES ($1, $2, $3, $3, $4)",
        )
        .bind(level_id)
        .bind(competency_id)
        .bind(*level)
        .bind(position as i32)
        .execute(pool)
        .await
        .unwrap();
        level_ids.push(level_id);
    }
    sqlx::query("INSERT INTO rooms_has_competencies (room_id, competency_id) VALUES ($1, $2)")
        .bind(room_id)
        .bind(competency_id)
        .execute(pool)
        .await
        .unwrap();

    let mut question_ids = Vec::new();
    for position in 0..questions {
        let question_id = Uuid::new_v4();
        sqlx::query("INSERT INTO questions (id, question, duration_limit) VALUES ($1, $2, 60)")
            .bind(question_id)
            .bind(format!("Question {position}"))
            .execute(pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO questions_labels (id, question_id, competency_id) VALUES ($1, $2, $3)",
        )
        .bind(Uuid::new_v4())
        .bind(question_id)
        .bind(competency_id)
        .execute(pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO rooms_has_questions (room_id, question_id, position) VALUES ($1, $2, $3)",
        )
        .bind(room_id)
        .bind(question_id)
        .bind(position as i32)
        .execute(pool)
        .await
        .unwrap();
        question_ids.push(question_id);
    }

    SeededRoom {
        room_id,
        question_ids,
        competency_id,
        level_ids,
    }
}

async fn insert_user(pool: &PgPool, role: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, name, email, password, role, status) VALUES ($1, 'Tess', $2, 'x', $3, 'VERIFIED')",
    )
    .bind(id)
    .bind(format!("{id}@corp.io"))
    .bind(role)
    .execute(pool)
    .await
    .unwrap();
    id
}

pub async fn scoring_claimed(pool: &PgPool, room_id: Uuid) -> bool {
    sqlx::query_scalar::<_, bool>(
        "SELECT scoring_started_at IS NOT NULL FROM rooms WHERE id = $1",
    )
    .bind(room_id)
    .fetch_one(pool)
    .await
    .unwrap()
}
