//! Fixed-interval trigger.
//!
//! Fire times are aligned to multiples of the interval since the Unix epoch,
//! so a five minute schedule fires at :00, :05, :10 ... of every hour no
//! matter when the process started. Invocations never overlap: the next one
//! is only scheduled after the previous one finished, and fire times that
//! passed while a run was still going are skipped.

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    interval: Duration,
}

/// Counts reported when a bounded [`Schedule::run`] finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleSummary {
    pub runs: usize,
    pub failures: usize,
}

impl Schedule {
    pub fn every(interval: Duration) -> Result<Self> {
        if interval.as_millis() == 0 {
            bail!("schedule interval must be at least one millisecond");
        }
        Ok(Self { interval })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// First aligned fire time strictly after `now`.
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let step = i64::try_from(self.interval.as_millis()).unwrap_or(i64::MAX);
        let next = now
            .timestamp_millis()
            .div_euclid(step)
            .saturating_add(1)
            .saturating_mul(step);
        DateTime::from_timestamp_millis(next).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Invokes `job` at every fire time, `runs` times in total (`0` runs
    /// forever). With `run_on_startup` the first invocation happens
    /// immediately instead of at the next fire time.
    ///
    /// A failed invocation is logged and does not stop the schedule.
    pub async fn run<F, Fut, T>(&self, runs: usize, run_on_startup: bool, mut job: F) -> ScheduleSummary
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut summary = ScheduleSummary::default();

        loop {
            if runs > 0 && summary.runs >= runs {
                break;
            }

            if !(run_on_startup && summary.runs == 0) {
                let now = Utc::now();
                let fire_at = self.next_fire_after(now);
                info!(next_run = %fire_at, "Waiting for next scheduled run");
                let wait = (fire_at - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;
            }

            summary.runs += 1;
            if let Err(e) = job().await {
                summary.failures += 1;
                error!(run = summary.runs, error = ?e, "Scheduled run failed");
            } else {
                info!(run = summary.runs, "Scheduled run succeeded");
            }
        }

        info!(runs = summary.runs, failures = summary.failures, "Schedule finished");
        summary
    }
}
