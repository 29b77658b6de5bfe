use anyhow::Result;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::{error, info};

use crate::feedback;
use crate::feedback::labeling::train_exclusively;
use crate::models::feedback::FeedbackStatus;
use crate::state::AppState;

const RUN_HOUR: u32 = 2;

/// Next 02:00 UTC on the first day of a month strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>) -> DateTime<Utc> {
    let this_month = first_of_month(now.year(), now.month());
    if this_month > now {
        return this_month;
    }
    if now.month() == 12 {
        first_of_month(now.year() + 1, 1)
    } else {
        first_of_month(now.year(), now.month() + 1)
    }
}

fn first_of_month(year: i32, month: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|day| day.and_hms_opt(RUN_HOUR, 0, 0))
        .map(|at| at.and_utc())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Sleeps until each monthly slot and retrains when enough feedback is labeled.
pub async fn run_retrain_scheduler(state: AppState) {
    loop {
        let now = Utc::now();
        let next = next_run_after(now);
        info!("Next scheduled retrain check at {next}");
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        if let Err(e) = scheduled_retrain(&state).await {
            error!("Scheduled retrain failed: {e:?}");
        }
    }
}

async fn scheduled_retrain(state: &AppState) -> Result<()> {
    let labeled = feedback::store::count_with_status(&state.db, FeedbackStatus::Labeled).await?;
    if labeled < state.config.retrain_min_labeled {
        info!(
            "Skipping retrain: {labeled} labeled rows, {} needed",
            state.config.retrain_min_labeled
        );
        return Ok(());
    }
    let host = state.config.scheduled_training_host();
    if train_exclusively(state, host).await? {
        info!("Scheduled retrain of {host} triggered with {labeled} labeled rows");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_before_slot_same_month() {
        assert_eq!(next_run_after(at(2024, 3, 1, 1, 59)), at(2024, 3, 1, 2, 0));
    }

    #[test]
    fn test_at_or_after_slot_moves_to_next_month() {
        assert_eq!(next_run_after(at(2024, 3, 1, 2, 0)), at(2024, 4, 1, 2, 0));
        assert_eq!(next_run_after(at(2024, 3, 17, 9, 30)), at(2024, 4, 1, 2, 0));
    }

    #[test]
    fn test_december_rolls_over_year() {
        assert_eq!(next_run_after(at(2024, 12, 5, 0, 0)), at(2025, 1, 1, 2, 0));
    }
}
