use std::collections::{HashMap, HashSet};

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::auth::middleware::{AuthUser, Staff};
use crate::auth::users;
use crate::competency;
use crate::errors::{ok_message, AppError};
use crate::models::competency::Competency;
use crate::models::room::{
    Language, LevelResult, NewRoom, RoomQuestionRow, RoomRow, RoomStatus,
};
use crate::models::user::{UserRole, UserSummary};
use crate::notify::{dispatch, Notification};
use crate::pipeline::answer::{spawn_answer_job, AnswerJob};
use crate::pipeline::upload::{sanitize_extension, store_answer_file};
use crate::room::store::{self, GroupPlan, GroupScope, RoomGroupView};
use crate::room::title::group_title;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RoomInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub language: Language,
    #[serde(default)]
    pub preparation_time: i32,
    pub interviewer_email: String,
    pub questions_id: Vec<Uuid>,
    pub competencies_id: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupsRequest {
    pub org_position: String,
    pub interviewee_email: Vec<String>,
    pub room: RoomInput,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub room_group_id: Uuid,
    #[serde(flatten)]
    pub room: RoomInput,
}

#[derive(Debug, Serialize)]
pub struct CreatedGroup {
    pub id: Uuid,
    pub title: String,
    pub room_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub start_answer: Option<DateTime<Utc>>,
    pub current_question: i32,
    pub is_started: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateContentRequest {
    pub questions_id: Vec<Uuid>,
    pub competencies_id: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub status: String,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RoomDetail {
    #[serde(flatten)]
    pub room: RoomRow,
    pub questions: Vec<RoomQuestionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub competencies: Option<Vec<ScoredCompetency>>,
}

#[derive(Debug, Serialize)]
pub struct RoomQuestionView {
    pub id: Uuid,
    pub question: String,
    pub duration_limit: i32,
    pub position: i32,
    pub start_answer: Option<DateTime<Utc>>,
    pub answered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuestionState {
    pub id: Uuid,
    pub question: String,
    pub duration_limit: i32,
    pub start_answer: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ScoredCompetency {
    pub id: Uuid,
    pub competency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub levels: Vec<ScoredLevel>,
}

#[derive(Debug, Serialize)]
pub struct ScoredLevel {
    pub id: Uuid,
    pub level: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<f64>,
}

fn validate_room(input: &RoomInput) -> Result<(), AppError> {
    if input.title.trim().is_empty() {
        return Err(AppError::Validation("Room title is required".to_string()));
    }
    if input.end <= input.start {
        return Err(AppError::Validation("Room must end after it starts".to_string()));
    }
    if input.preparation_time < 0 {
        return Err(AppError::Validation(
            "preparation_time must not be negative".to_string(),
        ));
    }
    validate_content(&input.questions_id, &input.competencies_id)
}

fn validate_content(question_ids: &[Uuid], competency_ids: &[Uuid]) -> Result<(), AppError> {
    if question_ids.is_empty() {
        return Err(AppError::Validation("A room needs at least one question".to_string()));
    }
    if competency_ids.is_empty() {
        return Err(AppError::Validation(
            "A room needs at least one competency".to_string(),
        ));
    }
    if has_duplicates(question_ids) || has_duplicates(competency_ids) {
        return Err(AppError::Validation(
            "Questions and competencies must not repeat".to_string(),
        ));
    }
    Ok(())
}

fn has_duplicates(ids: &[Uuid]) -> bool {
    let mut seen = HashSet::with_capacity(ids.len());
    !ids.iter().all(|id| seen.insert(id))
}

fn new_room(input: &RoomInput, room_group_id: Uuid, interviewer_id: Uuid) -> NewRoom {
    NewRoom {
        id: Uuid::new_v4(),
        room_group_id,
        interviewer_id,
        title: input.title.trim().to_string(),
        description: input.description.clone(),
        start: input.start,
        end: input.end,
        language: input.language,
        preparation_time: input.preparation_time,
        question_ids: input.questions_id.clone(),
        competency_ids: input.competencies_id.clone(),
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Interviewees only see their own rooms; staff see every room.
fn can_view(user: &AuthUser, interviewee_id: Uuid) -> bool {
    user.role.is_staff() || user.id == interviewee_id
}

fn room_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Room {id} not found"))
}

async fn load_visible_room(state: &AppState, user: &AuthUser, id: Uuid) -> Result<RoomRow, AppError> {
    let room = store::get_room(&state.db, id)
        .await?
        .ok_or_else(|| room_not_found(id))?;
    if !can_view(user, room.interviewee_id) {
        return Err(room_not_found(id));
    }
    Ok(room)
}

async fn resolve_interviewer(state: &AppState, email: &str) -> Result<UserSummary, AppError> {
    let user = users::find_by_email(&state.db, &normalize_email(email))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Interviewer {email} not found")))?;
    if !user.role.is_staff() {
        return Err(AppError::Validation(format!("{email} cannot conduct interviews")));
    }
    Ok(user.into())
}

fn with_results(competencies: Vec<Competency>, results: &[LevelResult]) -> Vec<ScoredCompetency> {
    let by_level: HashMap<Uuid, f64> = results.iter().map(|r| (r.level_id, r.result)).collect();
    competencies
        .into_iter()
        .map(|c| ScoredCompetency {
            id: c.id,
            competency: c.competency,
            description: c.description,
            levels: c
                .levels
                .into_iter()
                .map(|l| ScoredLevel {
                    result: by_level.get(&l.id).copied(),
                    id: l.id,
                    level: l.level,
                    description: l.description,
                })
                .collect(),
        })
        .collect()
}

fn question_views(rows: Vec<RoomQuestionRow>, reveal_transcripts: bool) -> Vec<RoomQuestionView> {
    rows.into_iter()
        .map(|q| RoomQuestionView {
            answered: q.transcript.is_some(),
            transcript: q.transcript.filter(|_| reveal_transcripts),
            id: q.id,
            question: q.question,
            duration_limit: q.duration_limit,
            position: q.position,
            start_answer: q.start_answer,
        })
        .collect()
}

/// POST /api/v1/room-groups
pub async fn handle_create_room_groups(
    State(state): State<AppState>,
    _staff: Staff,
    Json(req): Json<CreateGroupsRequest>,
) -> Result<(StatusCode, Json<Vec<CreatedGroup>>), AppError> {
    validate_room(&req.room)?;
    let org_position = req.org_position.trim();
    if org_position.is_empty() {
        return Err(AppError::Validation("org_position is required".to_string()));
    }
    if req.interviewee_email.is_empty() {
        return Err(AppError::Validation(
            "At least one interviewee email is required".to_string(),
        ));
    }

    let interviewer = resolve_interviewer(&state, &req.room.interviewer_email).await?;
    let emails: Vec<String> = req.interviewee_email.iter().map(|e| normalize_email(e)).collect();
    let found = users::find_summaries_by_emails(&state.db, &emails).await?;
    let interviewees = users::order_by_emails(found, &emails).map_err(|missing| {
        AppError::NotFound(format!("Users not found: {}", missing.join(", ")))
    })?;

    let plans: Vec<GroupPlan> = interviewees
        .iter()
        .enumerate()
        .map(|(i, interviewee)| {
            let group_id = Uuid::new_v4();
            GroupPlan {
                group_id,
                title: group_title(i + 1, &interviewee.name, org_position),
                org_position: org_position.to_string(),
                interviewee_id: interviewee.id,
                room: new_room(&req.room, group_id, interviewer.id),
            }
        })
        .collect();
    store::create_groups(&state.db, &plans).await?;

    for (plan, interviewee) in plans.iter().zip(&interviewees) {
        dispatch(
            state.notifier.clone(),
            Notification::InterviewerAssignment {
                to: interviewer.email.clone(),
                interviewer_name: interviewer.name.clone(),
                candidate_name: interviewee.name.clone(),
                candidate_email: interviewee.email.clone(),
                title: plan.room.title.clone(),
                start: plan.room.start,
                end: plan.room.end,
                url: format!("{}/room/edit/{}", state.config.frontend_url, plan.room.id),
            },
        );
    }

    let created = plans
        .into_iter()
        .map(|plan| CreatedGroup {
            id: plan.group_id,
            title: plan.title,
            room_id: plan.room.id,
        })
        .collect();
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/room-groups
pub async fn handle_list_room_groups(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<RoomGroupView>>, AppError> {
    let scope = match user.role {
        UserRole::Hrd => GroupScope::All,
        UserRole::Interviewer => GroupScope::ConductedBy(user.id),
        UserRole::Interviewee => GroupScope::OwnedBy(user.id),
    };
    Ok(Json(store::list_groups(&state.db, scope).await?))
}

/// GET /api/v1/room-groups/:id
pub async fn handle_get_room_group(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<RoomGroupView>, AppError> {
    let not_found = || AppError::NotFound(format!("Room group {id} not found"));
    let group = store::get_group(&state.db, id).await?.ok_or_else(not_found)?;
    if !can_view(&user, group.interviewee_id) {
        return Err(not_found());
    }
    let rooms = store::rooms_in_groups(&state.db, &[id]).await?;
    Ok(Json(RoomGroupView { group, rooms }))
}

/// POST /api/v1/rooms
pub async fn handle_create_room(
    State(state): State<AppState>,
    _staff: Staff,
    Json(req): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    validate_room(&req.room)?;
    let group = store::get_group(&state.db, req.room_group_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Room group {} not found", req.room_group_id)))?;
    let interviewer = resolve_interviewer(&state, &req.room.interviewer_email).await?;

    let room = new_room(&req.room, group.id, interviewer.id);
    store::create_room(&state.db, &room).await?;

    dispatch(
        state.notifier.clone(),
        Notification::RoomInvitation {
            to: group.interviewee_email,
            interviewee_name: group.interviewee_name,
            title: room.title.clone(),
            start: room.start,
            end: room.end,
            url: format!("{}/room/{}", state.config.frontend_url, room.id),
        },
    );

    Ok((StatusCode::CREATED, Json(json!({ "id": room.id }))))
}

/// GET /api/v1/rooms/:id
pub async fn handle_get_room(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<RoomDetail>, AppError> {
    let room = load_visible_room(&state, &user, id).await?;
    let staff = user.role.is_staff();
    let scored = staff && room.status != RoomStatus::WaitingAnswer;

    let questions = question_views(store::room_questions(&state.db, id).await?, scored);
    let competencies = if staff {
        let ids = store::room_competency_ids(&state.db, id).await?;
        let competencies = competency::store::get_competencies(&state.db, &ids).await?;
        let results = if scored {
            store::level_results(&state.db, id).await?
        } else {
            Vec::new()
        };
        Some(with_results(competencies, &results))
    } else {
        None
    };

    Ok(Json(RoomDetail {
        room,
        questions,
        competencies,
    }))
}

/// GET /api/v1/rooms/:id/questions/:question_id
pub async fn handle_get_room_question(
    State(state): State<AppState>,
    user: AuthUser,
    Path((room_id, question_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<QuestionState>, AppError> {
    load_visible_room(&state, &user, room_id).await?;
    let question = store::room_question(&state.db, room_id, question_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Question {question_id} not found in room")))?;
    Ok(Json(QuestionState {
        id: question.id,
        question: question.question,
        duration_limit: question.duration_limit,
        start_answer: question.start_answer,
    }))
}

/// PUT /api/v1/rooms/:id/questions/:question_id/progress
pub async fn handle_update_progress(
    State(state): State<AppState>,
    user: AuthUser,
    Path((room_id, question_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ProgressRequest>,
) -> Result<Json<Value>, AppError> {
    load_visible_room(&state, &user, room_id).await?;
    if req.current_question < 0 {
        return Err(AppError::Validation(
            "current_question must not be negative".to_string(),
        ));
    }
    let updated = store::update_progress(
        &state.db,
        room_id,
        question_id,
        req.start_answer,
        req.current_question,
        req.is_started,
    )
    .await?;
    if !updated {
        return Err(AppError::NotFound(format!(
            "Question {question_id} not found in room"
        )));
    }
    Ok(ok_message())
}

/// POST /api/v1/rooms/:id/questions/:question_id/answer
pub async fn handle_submit_answer(
    State(state): State<AppState>,
    user: AuthUser,
    Path((room_id, question_id)): Path<(Uuid, Uuid)>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let room = load_visible_room(&state, &user, room_id).await?;
    if room.status != RoomStatus::WaitingAnswer {
        return Err(AppError::Validation(
            "Room is not accepting answers".to_string(),
        ));
    }
    if store::room_question(&state.db, room_id, question_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound(format!(
            "Question {question_id} not found in room"
        )));
    }

    let (extension, contents) = read_answer_field(&mut multipart).await?;
    let file_link = store_answer_file(
        &state.config.upload_dir,
        &state.config.api_public_url,
        &extension,
        &contents,
    )
    .await?;

    let language = room.language;
    spawn_answer_job(
        state,
        AnswerJob {
            room_id,
            question_id,
            file_link,
            language,
        },
    );
    Ok(ok_message())
}

async fn read_answer_field(multipart: &mut Multipart) -> Result<(String, Bytes), AppError> {
    let invalid = |e: axum::extract::multipart::MultipartError| {
        AppError::Validation(format!("Invalid multipart body: {e}"))
    };
    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        if field.name() != Some("answer") {
            continue;
        }
        let extension = sanitize_extension(field.file_name());
        let contents = field.bytes().await.map_err(invalid)?;
        if contents.is_empty() {
            return Err(AppError::Validation("Answer file is empty".to_string()));
        }
        return Ok((extension, contents));
    }
    Err(AppError::Validation("Missing 'answer' file field".to_string()))
}

/// POST /api/v1/rooms/:id/finish
pub async fn handle_finish_room(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    load_visible_room(&state, &user, id).await?;
    if !store::finish_room(&state.db, id).await? {
        return Err(AppError::Validation(
            "Room is not waiting for answers".to_string(),
        ));
    }
    Ok(ok_message())
}

/// PUT /api/v1/rooms/:id
pub async fn handle_update_room_content(
    State(state): State<AppState>,
    _staff: Staff,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateContentRequest>,
) -> Result<Json<Value>, AppError> {
    validate_content(&req.questions_id, &req.competencies_id)?;
    if !store::replace_room_content(&state.db, id, &req.questions_id, &req.competencies_id).await? {
        return Err(room_not_found(id));
    }

    let room = store::get_room(&state.db, id)
        .await?
        .ok_or_else(|| room_not_found(id))?;
    if let Some(group) = store::get_group(&state.db, room.room_group_id).await? {
        dispatch(
            state.notifier.clone(),
            Notification::RoomInvitation {
                to: group.interviewee_email,
                interviewee_name: group.interviewee_name,
                title: room.title,
                start: room.start,
                end: room.end,
                url: format!("{}/room/{}", state.config.frontend_url, room.id),
            },
        );
    }
    Ok(ok_message())
}

/// POST /api/v1/rooms/:id/review
pub async fn handle_review_room(
    State(state): State<AppState>,
    Staff(reviewer): Staff,
    Path(id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<Value>, AppError> {
    let status = parse_decision(&req.status)?;
    if !store::review_room(&state.db, id, status, req.note.as_deref()).await? {
        return Err(room_not_found(id));
    }
    info!(room_id = %id, reviewer = %reviewer.id, %status, "Room reviewed");
    Ok(ok_message())
}

fn parse_decision(raw: &str) -> Result<RoomStatus, AppError> {
    match raw.parse::<RoomStatus>() {
        Ok(status) if status.is_decision() => Ok(status),
        _ => Err(AppError::Validation(
            "status must be ACCEPTED or REJECTED".to_string(),
        )),
    }
}

/// DELETE /api/v1/rooms/:id
pub async fn handle_delete_room(
    State(state): State<AppState>,
    Staff(staff): Staff,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !store::delete_room(&state.db, id).await? {
        return Err(room_not_found(id));
    }
    info!(room_id = %id, deleted_by = %staff.id, "Room deleted");
    Ok(ok_message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::competency::CompetencyLevel;

    fn room_input(start: &str, end: &str) -> RoomInput {
        serde_json::from_value(json!({
            "title": "Technical round",
            "start": start,
            "end": end,
            "language": "EN",
            "interviewer_email": "lead@corp.io",
            "questions_id": [Uuid::new_v4()],
            "competencies_id": [Uuid::new_v4()]
        }))
        .unwrap()
    }

    #[test]
    fn test_room_must_end_after_start() {
        assert!(validate_room(&room_input("2024-05-01T09:00:00Z", "2024-05-01T10:00:00Z")).is_ok());
        assert!(validate_room(&room_input("2024-05-01T10:00:00Z", "2024-05-01T10:00:00Z")).is_err());
    }

    #[test]
    fn test_content_rules() {
        let q = Uuid::new_v4();
        let c = Uuid::new_v4();
        assert!(validate_content(&[q], &[c]).is_ok());
        assert!(validate_content(&[], &[c]).is_err());
        assert!(validate_content(&[q], &[]).is_err());
        assert!(validate_content(&[q, q], &[c]).is_err());
    }

    #[test]
    fn test_create_room_request_flattens_room() {
        let group = Uuid::new_v4();
        let req: CreateRoomRequest = serde_json::from_value(json!({
            "room_group_id": group,
            "title": "Culture fit",
            "start": "2024-05-01T09:00:00Z",
            "end": "2024-05-01T10:00:00Z",
            "language": "ID",
            "preparation_time": 30,
            "interviewer_email": "hr@corp.io",
            "questions_id": [],
            "competencies_id": []
        }))
        .unwrap();
        assert_eq!(req.room_group_id, group);
        assert_eq!(req.room.language, Language::Id);
        assert_eq!(req.room.preparation_time, 30);
    }

    #[test]
    fn test_interviewee_sees_only_own_rooms() {
        let owner = Uuid::new_v4();
        let interviewee = AuthUser {
            id: owner,
            role: UserRole::Interviewee,
        };
        let stranger = AuthUser {
            id: Uuid::new_v4(),
            role: UserRole::Interviewee,
        };
        let staff = AuthUser {
            id: Uuid::new_v4(),
            role: UserRole::Interviewer,
        };
        assert!(can_view(&interviewee, owner));
        assert!(!can_view(&stranger, owner));
        assert!(can_view(&staff, owner));
    }

    #[test]
    fn test_results_attached_by_level() {
        let competency_id = Uuid::new_v4();
        let scored_level = Uuid::new_v4();
        let competency = Competency {
            id: competency_id,
            competency: "Teamwork".into(),
            description: None,
            levels: vec![
                CompetencyLevel {
                    id: scored_level,
                    competency_id,
                    level: "High".into(),
                    description: "Leads".into(),
                },
                CompetencyLevel {
                    id: Uuid::new_v4(),
                    competency_id,
                    level: "Low".into(),
                    description: "Follows".into(),
                },
            ],
        };
        let results = vec![LevelResult {
            competency_id,
            level_id: scored_level,
            result: 0.875,
        }];

        let scored = with_results(vec![competency], &results);
        assert_eq!(scored[0].levels[0].result, Some(0.875));
        assert_eq!(scored[0].levels[1].result, None);
    }

    #[test]
    fn test_transcripts_hidden_until_scored() {
        let row = RoomQuestionRow {
            id: Uuid::new_v4(),
            question: "Why?".into(),
            duration_limit: 60,
            position: 0,
            file_link: Some("http://api/files/a.webm".into()),
            transcript: Some("Because".into()),
            start_answer: None,
        };
        let hidden = question_views(vec![row.clone()], false);
        assert!(hidden[0].answered);
        assert_eq!(hidden[0].transcript, None);

        let shown = question_views(vec![row], true);
        assert_eq!(shown[0].transcript.as_deref(), Some("Because"));
    }

    #[test]
    fn test_review_accepts_only_decisions() {
        assert_eq!(parse_decision("ACCEPTED").unwrap(), RoomStatus::Accepted);
        assert!(parse_decision("WAITING REVIEW").is_err());
        assert!(parse_decision("maybe").is_err());
    }
}
