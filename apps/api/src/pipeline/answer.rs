use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::competency;
use crate::models::room::Language;
use crate::pipeline::scoring::{build_scoring_batch, score_outcome};
use crate::pipeline::store;
use crate::question;
use crate::room;
use crate::state::AppState;

/// One submitted answer waiting to be transcribed.
#[derive(Debug, Clone)]
pub struct AnswerJob {
    pub room_id: Uuid,
    pub question_id: Uuid,
    pub file_link: String,
    pub language: Language,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Transcript stored; the room still has unanswered questions or is already being scored.
    Recorded,
    /// This job completed the room and scored it.
    Scored { competencies: usize },
}

/// Runs an answer job in the background once a pipeline permit is free.
pub fn spawn_answer_job(state: AppState, job: AnswerJob) {
    tokio::spawn(async move {
        let Ok(_permit) = state.pipeline.clone().acquire_owned().await else {
            warn!("Pipeline closed, dropping answer for room {}", job.room_id);
            return;
        };

        let room_id = job.room_id;
        let question_id = job.question_id;
        info!(%room_id, %question_id, "Answer job started");
        match run_answer_job(&state, &job).await {
            Ok(JobOutcome::Recorded) => {
                info!(%room_id, %question_id, "Answer recorded");
            }
            Ok(JobOutcome::Scored { competencies }) => {
                info!(%room_id, competencies, "Room scored");
            }
            Err(e) => {
                error!(%room_id, %question_id, "Answer job failed: {e:?}");
            }
        }
    });
}

pub async fn run_answer_job(state: &AppState, job: &AnswerJob) -> Result<JobOutcome> {
    let transcript = state
        .services
        .transcribe(
            state.config.speech_to_text_host(job.language),
            &job.file_link,
        )
        .await
        .context("Speech-to-text failed")?;

    let recorded = store::record_answer(
        &state.db,
        job.room_id,
        job.question_id,
        &job.file_link,
        &transcript,
    )
    .await?;
    if !recorded {
        bail!(
            "Room {} no longer links question {}",
            job.room_id,
            job.question_id
        );
    }

    if !store::claim_scoring(&state.db, job.room_id).await? {
        return Ok(JobOutcome::Recorded);
    }

    match score_room(state, job.room_id, job.language).await {
        Ok(competencies) => Ok(JobOutcome::Scored { competencies }),
        Err(e) => {
            if let Err(release) = store::release_claim(&state.db, job.room_id).await {
                warn!(
                    "Failed to release scoring claim on room {}: {release:?}",
                    job.room_id
                );
            }
            Err(e)
        }
    }
}

async fn score_room(state: &AppState, room_id: Uuid, language: Language) -> Result<usize> {
    let answers = store::answered_questions(&state.db, room_id).await?;
    let question_ids: Vec<Uuid> = answers.iter().map(|a| a.question_id).collect();
    let labels = question::store::labels_for(&state.db, &question_ids).await?;

    let competency_ids = room::store::room_competency_ids(&state.db, room_id).await?;
    let competencies = competency::store::get_competencies(&state.db, &competency_ids).await?;
    if competencies.is_empty() {
        bail!("Room {room_id} has no competencies to score");
    }

    let batch = build_scoring_batch(competencies, &answers, &labels);
    let scores = state
        .services
        .predict(
            state.config.scoring_host(language),
            &batch.transcripts,
            &batch.competence_sets,
        )
        .await
        .context("Scoring failed")?;

    let (results, feedback) = score_outcome(room_id, &batch, &scores);
    store::persist_scores(&state.db, room_id, &results, &feedback).await?;
    Ok(batch.competencies.len())
}
