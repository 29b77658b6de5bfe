pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::services::ServeDir;

use crate::auth::{handlers as auth, middleware::authenticate};
use crate::competency::handlers as competency;
use crate::feedback::handlers as feedback;
use crate::question::handlers as question;
use crate::room::handlers as room;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_mb * 1024 * 1024;

    let public = Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/auth/register", post(auth::handle_register))
        .route("/api/v1/auth/login", post(auth::handle_login))
        .route("/api/v1/auth/verify", get(auth::handle_verify_token))
        .route("/api/v1/auth/verify-email", get(auth::handle_verify_email));

    let protected = Router::new()
        // Accounts
        .route(
            "/api/v1/auth/me",
            get(auth::handle_get_profile).put(auth::handle_update_profile),
        )
        .route("/api/v1/auth/me/password", put(auth::handle_change_password))
        .route("/api/v1/auth/emails", get(auth::handle_list_emails))
        .route("/api/v1/auth/check/:email", get(auth::handle_check_email))
        // Question bank
        .route(
            "/api/v1/questions",
            post(question::handle_create_question).get(question::handle_list_questions),
        )
        .route(
            "/api/v1/questions/:id",
            get(question::handle_get_question)
                .put(question::handle_update_question)
                .delete(question::handle_delete_question),
        )
        // Competencies
        .route(
            "/api/v1/competencies",
            post(competency::handle_create_competency).get(competency::handle_list_competencies),
        )
        .route(
            "/api/v1/competencies/:id",
            get(competency::handle_get_competency)
                .put(competency::handle_update_competency)
                .delete(competency::handle_delete_competency),
        )
        // Interview rooms
        .route(
            "/api/v1/room-groups",
            post(room::handle_create_room_groups).get(room::handle_list_room_groups),
        )
        .route("/api/v1/room-groups/:id", get(room::handle_get_room_group))
        .route("/api/v1/rooms", post(room::handle_create_room))
        .route(
            "/api/v1/rooms/:id",
            get(room::handle_get_room)
                .put(room::handle_update_room_content)
                .delete(room::handle_delete_room),
        )
        .route(
            "/api/v1/rooms/:id/questions/:question_id",
            get(room::handle_get_room_question),
        )
        .route(
            "/api/v1/rooms/:id/questions/:question_id/progress",
            put(room::handle_update_progress),
        )
        .route(
            "/api/v1/rooms/:id/questions/:question_id/answer",
            post(room::handle_submit_answer).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/v1/rooms/:id/finish", post(room::handle_finish_room))
        .route("/api/v1/rooms/:id/review", post(room::handle_review_room))
        // Scoring feedback
        .route(
            "/api/v1/feedback",
            get(feedback::handle_list_feedback).post(feedback::handle_create_feedback),
        )
        .route("/api/v1/feedback/:id", put(feedback::handle_label_feedback))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .merge(public)
        .merge(protected)
        .nest_service("/files", ServeDir::new(&state.config.upload_dir))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header::AUTHORIZATION, Request, StatusCode},
    };
    use chrono::Duration;
    use sqlx::postgres::PgPoolOptions;
    use tokio::sync::Semaphore;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::auth::token::TokenService;
    use crate::config::Config;
    use crate::models::user::UserRole;
    use crate::notify::LogNotifier;
    use crate::service_client::ServiceClient;

    fn state() -> AppState {
        let vars = HashMap::from([
            ("DATABASE_URL", "postgres://localhost/hiremif_test"),
            ("TOKEN_SECRET", "router-secret"),
            ("SPEECH_TO_TEXT_HOST_EN", "http://stt-en"),
            ("SPEECH_TO_TEXT_HOST_ID", "http://stt-id"),
            ("SCORING_HOST_EN", "http://scoring-en"),
            ("SCORING_HOST_ID", "http://scoring-id"),
        ]);
        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        AppState {
            db: PgPoolOptions::new()
                .connect_lazy(&config.database_url)
                .unwrap(),
            tokens: TokenService::new(&config.token_secret, Duration::minutes(5), Duration::hours(1))
                .unwrap(),
            services: ServiceClient::new().unwrap(),
            notifier: Arc::new(LogNotifier),
            pipeline: Arc::new(Semaphore::new(1)),
            config,
        }
    }

    #[tokio::test]
    async fn test_health() {
        let response = build_router(state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["service"], "hiremif-api");
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let response = build_router(state())
            .oneshot(Request::get("/api/v1/questions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_interviewee_blocked_from_staff_routes() {
        let state = state();
        let issued = state
            .tokens
            .create_access_token(Uuid::new_v4(), UserRole::Interviewee)
            .unwrap();
        let response = build_router(state)
            .oneshot(
                Request::get("/api/v1/feedback")
                    .header(AUTHORIZATION, format!("Bearer {}", issued.token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_verification_token_is_not_a_session() {
        let state = state();
        let issued = state
            .tokens
            .create_verification_token(Uuid::new_v4())
            .unwrap();
        let response = build_router(state)
            .oneshot(
                Request::get("/api/v1/auth/me")
                    .header(AUTHORIZATION, format!("Bearer {}", issued.token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
