/// HTTP client for the speech-to-text and scoring model services.
///
/// All outbound calls of the pipeline and the labeling loop go through here. Calls are retried on
/// transport errors, 429 and 5xx with exponential backoff; other non-2xx responses fail at once.
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const TRAIN_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Gave up after {retries} attempts")]
    Exhausted { retries: u32 },

    #[error("Unexpected response shape: {0}")]
    Shape(String),
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    transcripts: &'a [String],
    competence_sets: &'a [Vec<String>],
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    scores: Vec<Vec<f64>>,
}

/// Feedback rows the model wants a human to label next.
#[derive(Debug, Clone, Deserialize)]
pub struct ToLabel {
    pub id: Vec<Uuid>,
    #[serde(default)]
    pub scores: Vec<f64>,
}

#[derive(Clone)]
pub struct ServiceClient {
    client: Client,
    backoff: Duration,
}

impl ServiceClient {
    pub fn new() -> Result<Self, ServiceError> {
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Base delay before the first retry; doubled on every further attempt.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Posts `link=<file_link>` to a speech-to-text endpoint and returns the transcript.
    pub async fn transcribe(&self, host: &str, file_link: &str) -> Result<String, ServiceError> {
        let response = self
            .send_with_retry("transcribe", || {
                self.client.post(host).form(&[("link", file_link)])
            })
            .await?;
        let transcript = response.text().await?.trim().to_string();
        debug!("Transcribed {file_link} ({} chars)", transcript.len());
        Ok(transcript)
    }

    /// Scores each transcript against the level descriptions of its competency.
    ///
    /// The returned matrix has exactly one row per transcript and one score per level.
    pub async fn predict(
        &self,
        host: &str,
        transcripts: &[String],
        competence_sets: &[Vec<String>],
    ) -> Result<Vec<Vec<f64>>, ServiceError> {
        let url = format!("{host}/predict");
        let body = PredictRequest {
            transcripts,
            competence_sets,
        };
        let response = self
            .send_with_retry("predict", || self.client.post(&url).json(&body))
            .await?;
        let predicted: PredictResponse = read_json(response).await?;
        check_shape(&predicted.scores, competence_sets)?;
        Ok(predicted.scores)
    }

    pub async fn to_label(&self, host: &str) -> Result<ToLabel, ServiceError> {
        let url = format!("{host}/to-label");
        let response = self
            .send_with_retry("to-label", || self.client.get(&url))
            .await?;
        read_json(response).await
    }

    /// Starts model retraining. Training is long-running and not idempotent, so it is sent once.
    pub async fn train(&self, host: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(format!("{host}/train"))
            .timeout(TRAIN_TIMEOUT)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    async fn send_with_retry<F>(&self, call: &str, build: F) -> Result<Response, ServiceError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_error: Option<ServiceError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = self.backoff * (1 << (attempt - 1));
                warn!(
                    "{call} attempt {attempt} failed, retrying after {}ms...",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match build().send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(ServiceError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("{call} returned {status}: {body}");
                last_error = Some(ServiceError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                return Err(ServiceError::Api {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                });
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or(ServiceError::Exhausted {
            retries: MAX_RETRIES,
        }))
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(ServiceError::Parse)
}

fn check_shape(scores: &[Vec<f64>], competence_sets: &[Vec<String>]) -> Result<(), ServiceError> {
    if scores.len() != competence_sets.len() {
        return Err(ServiceError::Shape(format!(
            "expected {} score rows, got {}",
            competence_sets.len(),
            scores.len()
        )));
    }
    for (i, (row, levels)) in scores.iter().zip(competence_sets).enumerate() {
        if row.len() != levels.len() {
            return Err(ServiceError::Shape(format!(
                "row {i} has {} scores for {} levels",
                row.len(),
                levels.len()
            )));
        }
    }
    Ok(())
}
