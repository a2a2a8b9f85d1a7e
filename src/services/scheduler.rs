use std::time::Duration;

use chrono::{NaiveDate, Timelike, Utc};
use tokio::time::sleep;

use crate::state::AppState;

/// Spawn the background scheduler that runs the daily lifecycle jobs.
///
/// Each job runs in its own `tokio::spawn` so a failure in one job
/// never crashes the scheduler loop or other jobs.
pub async fn run_background_scheduler(state: AppState) {
    let poll = Duration::from_secs(state.config.scheduler_poll_seconds.max(5));
    let daily_hour = state.config.daily_jobs_hour_utc.min(23);
    tracing::info!(
        poll_seconds = poll.as_secs(),
        daily_hour,
        "Background scheduler started"
    );

    let mut last_daily_run: Option<NaiveDate> = None;

    loop {
        sleep(poll).await;

        let now_utc = Utc::now();
        if !daily_jobs_due(last_daily_run, now_utc.date_naive(), now_utc.hour(), daily_hour) {
            continue;
        }
        let today = now_utc.date_naive();
        last_daily_run = Some(today);
        tracing::info!("Scheduler: running daily jobs for {today}");

        {
            let st = state.clone();
            tokio::spawn(async move {
                match crate::services::leases::expire_ended_leases(&st, Utc::now()).await {
                    Ok(result) => tracing::info!(
                        expired = result.expired,
                        errors = result.errors,
                        "Scheduler: lease expiry completed"
                    ),
                    Err(error) => {
                        tracing::error!(error = %error, "Scheduler: lease expiry failed")
                    }
                }
            });
        }

        {
            let st = state.clone();
            tokio::spawn(async move {
                match crate::services::invoices::refresh_overdue_invoices(&st, Utc::now()).await {
                    Ok(result) => tracing::info!(
                        checked = result.checked,
                        marked_overdue = result.marked_overdue,
                        errors = result.errors,
                        "Scheduler: overdue invoice refresh completed"
                    ),
                    Err(error) => {
                        tracing::error!(error = %error, "Scheduler: overdue refresh failed")
                    }
                }
            });
        }
    }
}

/// Daily jobs run once per calendar day, at or after `daily_hour` UTC.
fn daily_jobs_due(last_run: Option<NaiveDate>, today: NaiveDate, hour: u32, daily_hour: u32) -> bool {
    last_run != Some(today) && hour >= daily_hour
}
