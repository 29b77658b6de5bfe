//! Pure scoring logic: turning a room's answers into a scoring batch and the model's score
//! matrix into stored results and feedback rows.

use std::collections::HashSet;

use sqlx::FromRow;
use uuid::Uuid;

use crate::models::competency::Competency;
use crate::models::feedback::NewFeedback;
use crate::models::question::QuestionLabel;
use crate::models::room::LevelResult;

const TRANSCRIPT_SEPARATOR: &str = ". ";

#[derive(Debug, Clone, FromRow)]
pub struct AnsweredQuestion {
    pub question_id: Uuid,
    pub position: i32,
    pub transcript: String,
}

/// One scoring request: row `i` of every field belongs to `competencies[i]`.
#[derive(Debug, Clone)]
pub struct ScoringBatch {
    pub competencies: Vec<Competency>,
    pub transcripts: Vec<String>,
    pub competence_sets: Vec<Vec<String>>,
}

/// Builds the per-competency transcripts of a room.
///
/// A competency is judged on the answers to questions labelled with it, in question order.
/// When no answered question carries its label it is judged on all answers.
pub fn build_scoring_batch(
    competencies: Vec<Competency>,
    answers: &[AnsweredQuestion],
    labels: &[QuestionLabel],
) -> ScoringBatch {
    let mut ordered: Vec<&AnsweredQuestion> = answers.iter().collect();
    ordered.sort_by_key(|a| a.position);

    let all_answers = join(ordered.iter().copied());

    let mut transcripts = Vec::with_capacity(competencies.len());
    let mut competence_sets = Vec::with_capacity(competencies.len());
    for competency in &competencies {
        let labelled: HashSet<Uuid> = labels
            .iter()
            .filter(|l| l.competency_id == competency.id)
            .map(|l| l.question_id)
            .collect();
        let own: Vec<&AnsweredQuestion> = ordered
            .iter()
            .copied()
            .filter(|a| labelled.contains(&a.question_id))
            .collect();
        transcripts.push(if own.is_empty() {
            all_answers.clone()
        } else {
            join(own.into_iter())
        });
        competence_sets.push(
            competency
                .levels
                .iter()
                .map(|l| l.description.clone())
                .collect(),
        );
    }

    ScoringBatch {
        competencies,
        transcripts,
        competence_sets,
    }
}

fn join<'a>(answers: impl Iterator<Item = &'a AnsweredQuestion>) -> String {
    answers
        .map(|a| a.transcript.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(TRANSCRIPT_SEPARATOR)
}

/// Maps a score matrix of matching shape onto level results and one feedback row per competency.
pub fn score_outcome(
    room_id: Uuid,
    batch: &ScoringBatch,
    scores: &[Vec<f64>],
) -> (Vec<LevelResult>, Vec<NewFeedback>) {
    let mut results = Vec::new();
    let mut feedback = Vec::with_capacity(batch.competencies.len());

    for ((competency, row), transcript) in batch
        .competencies
        .iter()
        .zip(scores)
        .zip(&batch.transcripts)
    {
        for (level, score) in competency.levels.iter().zip(row) {
            results.push(LevelResult {
                competency_id: competency.id,
                level_id: level.id,
                result: round3(*score),
            });
        }
        feedback.push(NewFeedback {
            competency_id: competency.id,
            room_id: Some(room_id),
            transcript: transcript.clone(),
            label_result: argmax(row).and_then(|i| competency.levels.get(i)).map(|l| l.id),
        });
    }

    (results, feedback)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Index of the highest score; the first one wins ties and NaN never wins.
fn argmax(row: &[f64]) -> Option<usize> {
    row.iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::competency::CompetencyLevel;

    fn competency(name: &str, levels: &[&str]) -> Competency {
        let id = Uuid::new_v4();
        Competency {
            id,
            competency: name.to_string(),
            description: None,
            levels: levels
                .iter()
                .map(|d| CompetencyLevel {
                    id: Uuid::new_v4(),
                    competency_id: id,
                    level: d.to_uppercase(),
                    description: d.to_string(),
                })
                .collect(),
        }
    }

    fn answer(position: i32, transcript: &str) -> AnsweredQuestion {
        AnsweredQuestion {
            question_id: Uuid::new_v4(),
            position,
            transcript: transcript.to_string(),
        }
    }

    fn label(question_id: Uuid, competency_id: Uuid) -> QuestionLabel {
        QuestionLabel {
            id: Uuid::new_v4(),
            question_id,
            competency_id,
        }
    }

    #[test]
    fn test_labelled_answers_joined_in_order() {
        let teamwork = competency("Teamwork", &["works alone", "leads others"]);
        let answers = vec![answer(1, "second"), answer(0, "first"), answer(2, "third")];
        let labels = vec![
            label(answers[0].question_id, teamwork.id),
            label(answers[1].question_id, teamwork.id),
        ];

        let batch = build_scoring_batch(vec![teamwork], &answers, &labels);
        assert_eq!(batch.transcripts, vec!["first. second"]);
        assert_eq!(
            batch.competence_sets,
            vec![vec!["works alone".to_string(), "leads others".to_string()]]
        );
    }

    #[test]
    fn test_unlabelled_competency_uses_all_answers() {
        let integrity = competency("Integrity", &["low", "high"]);
        let answers = vec![answer(1, "b"), answer(0, " a ")];
        let batch = build_scoring_batch(vec![integrity], &answers, &[]);
        assert_eq!(batch.transcripts, vec!["a. b"]);
    }

    #[test]
    fn test_blank_labelled_answer_does_not_borrow_other_answers() {
        let teamwork = competency("Teamwork", &["low", "high"]);
        let answers = vec![answer(0, ""), answer(1, "unrelated answer")];
        let labels = vec![label(answers[0].question_id, teamwork.id)];

        let batch = build_scoring_batch(vec![teamwork], &answers, &labels);
        assert_eq!(batch.transcripts, vec![String::new()]);
    }

    #[test]
    fn test_outcome_rounds_and_picks_best_level() {
        let c = competency("Teamwork", &["low", "mid", "high"]);
        let room_id = Uuid::new_v4();
        let batch = build_scoring_batch(vec![c.clone()], &[answer(0, "hello")], &[]);

        let (results, feedback) = score_outcome(room_id, &batch, &[vec![0.12345, 0.6789, 0.2]]);

        let values: Vec<f64> = results.iter().map(|r| r.result).collect();
        assert_eq!(values, vec![0.123, 0.679, 0.2]);
        assert_eq!(results[1].level_id, c.levels[1].id);
        assert_eq!(feedback.len(), 1);
        assert_eq!(feedback[0].label_result, Some(c.levels[1].id));
        assert_eq!(feedback[0].room_id, Some(room_id));
        assert_eq!(feedback[0].transcript, "hello");
    }

    #[test]
    fn test_argmax_edges() {
        assert_eq!(argmax(&[]), None);
        assert_eq!(argmax(&[0.5, 0.5]), Some(0));
        assert_eq!(argmax(&[f64::NAN, 0.1]), Some(1));
        assert_eq!(argmax(&[f64::NAN]), None);
    }
}
