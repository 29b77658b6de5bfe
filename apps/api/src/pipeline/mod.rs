//! Answer submission and scoring.
//!
//! Every uploaded answer becomes an [`answer::AnswerJob`] that transcribes the recording, stores
//! the transcript and, when it completes the room, scores all competencies of that room.

pub mod answer;
pub mod retrain;
pub mod scoring;
pub mod store;
pub mod upload;
