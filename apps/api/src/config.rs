use std::str::FromStr;

use anyhow::{Context, Result};

use crate::models::room::Language;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub token_secret: String,
    /// Access token lifetime in minutes.
    pub access_token_expire: i64,
    /// Refresh token lifetime in hours.
    pub refresh_token_expire: i64,
    pub speech_to_text_host_en: String,
    pub speech_to_text_host_id: String,
    pub scoring_host_en: String,
    pub scoring_host_id: String,
    pub api_public_url: String,
    pub frontend_url: String,
    pub upload_dir: String,
    pub max_upload_mb: usize,
    pub pipeline_concurrency: usize,
    /// Base delay before retrying a speech-to-text or scoring call.
    pub service_backoff_ms: u64,
    pub retrain_min_labeled: i64,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("Required environment variable '{key}' is not set"))
        };

        let port: u16 = parse_or(&lookup, "PORT", 8080)?;

        Ok(Config {
            database_url: require("DATABASE_URL")?,
            token_secret: require("TOKEN_SECRET")?,
            access_token_expire: parse_or(&lookup, "ACCESS_TOKEN_EXPIRE", 60)?,
            refresh_token_expire: parse_or(&lookup, "REFRESH_TOKEN_EXPIRE", 72)?,
            speech_to_text_host_en: require("SPEECH_TO_TEXT_HOST_EN")?,
            speech_to_text_host_id: require("SPEECH_TO_TEXT_HOST_ID")?,
            scoring_host_en: trim_slash(require("SCORING_HOST_EN")?),
            scoring_host_id: trim_slash(require("SCORING_HOST_ID")?),
            api_public_url: trim_slash(
                lookup("API_PUBLIC_URL").unwrap_or_else(|| format!("http://localhost:{port}")),
            ),
            frontend_url: trim_slash(
                lookup("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".to_string()),
            ),
            upload_dir: lookup("UPLOAD_DIR").unwrap_or_else(|| "data".to_string()),
            max_upload_mb: parse_or(&lookup, "MAX_UPLOAD_MB", 25)?,
            pipeline_concurrency: parse_or(&lookup, "PIPELINE_CONCURRENCY", 4)?,
            service_backoff_ms: parse_or(&lookup, "SERVICE_BACKOFF_MS", 1000)?,
            retrain_min_labeled: parse_or(&lookup, "RETRAIN_MIN_LABELED", 1)?,
            port,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn speech_to_text_host(&self, language: Language) -> &str {
        match language {
            Language::En => &self.speech_to_text_host_en,
            Language::Id => &self.speech_to_text_host_id,
        }
    }

    pub fn scoring_host(&self, language: Language) -> &str {
        match language {
            Language::En => &self.scoring_host_en,
            Language::Id => &self.scoring_host_id,
        }
    }

    /// Scoring host that owns the labeling queue; retrained once the queue is worked off.
    pub fn labeling_host(&self) -> &str {
        &self.scoring_host_en
    }

    /// Scoring host retrained by the monthly schedule.
    pub fn scheduled_training_host(&self) -> &str {
        &self.scoring_host_id
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
