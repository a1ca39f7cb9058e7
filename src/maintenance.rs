//! Scheduled maintenance: sweeping expired invitation tokens.
//!
//! A single cron-driven job polled once a minute. The loop holds no open
//! database; each sweep opens the store fresh so a failed sweep never
//! poisons the scheduler.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SareConfig;
use crate::db::SareDb;
use crate::error::SareError;
use crate::invitations;

/// Poll interval for the scheduler loop (1 minute)
const POLL_INTERVAL_SECS: u64 = 60;

/// How close to a scheduled time counts as "now" (2 minutes)
const DUE_WINDOW_SECS: i64 = 120;

/// Parse a cron expression.
///
/// Accepts the crate-native six-field form (with seconds) and plain
/// five-field crontab lines, which get a seconds field of zero.
pub fn parse_schedule(expr: &str) -> Result<Schedule, SareError> {
    let trimmed = expr.trim();
    let full = if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };

    full.parse::<Schedule>()
        .map_err(|e| SareError::Config(format!("Invalid cron expression '{expr}': {e}")))
}

/// Next time the configured sweep will fire.
pub fn next_sweep_time(config: &SareConfig) -> Result<DateTime<Utc>, SareError> {
    let schedule = parse_schedule(&config.maintenance_schedule)?;
    schedule
        .upcoming(Utc)
        .next()
        .ok_or_else(|| SareError::Config("No upcoming scheduled time".to_string()))
}

/// Runs the token sweep when its schedule says so.
pub struct MaintenanceRunner {
    db_path: PathBuf,
    schedule: Schedule,
    last_run: Option<DateTime<Utc>>,
}

impl MaintenanceRunner {
    pub fn new(db_path: PathBuf, expr: &str) -> Result<Self, SareError> {
        Ok(MaintenanceRunner {
            db_path,
            schedule: parse_schedule(expr)?,
            last_run: None,
        })
    }

    /// Whether a scheduled time falls within the due window and has not
    /// already run.
    fn due(&self, now: DateTime<Utc>) -> bool {
        let mut upcoming = self.schedule.after(&(now - chrono::Duration::minutes(2)));
        let Some(scheduled) = upcoming.next() else {
            return false;
        };

        let diff = (now - scheduled).num_seconds().abs();
        if diff >= DUE_WINDOW_SECS {
            return false;
        }
        if let Some(last) = self.last_run {
            if (last - scheduled).num_seconds().abs() < 60 {
                return false; // Already ran this scheduled time
            }
        }
        true
    }

    /// Open the store and sweep expired tokens. Records the run time.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Result<usize, SareError> {
        let db = SareDb::open_at(self.db_path.clone())?;
        let swept = invitations::cleanup_expired_tokens(&db, now)?;
        self.last_run = Some(now);
        Ok(swept)
    }

    fn tick(&mut self, now: DateTime<Utc>) {
        if !self.due(now) {
            return;
        }
        match self.sweep(now) {
            Ok(swept) => {
                log::info!("Maintenance: sweep complete, {swept} token(s) cleared");
            }
            Err(e) => {
                log::warn!("Maintenance: sweep failed: {e}");
            }
        }
    }
}

/// Handle to a running maintenance loop.
pub struct MaintenanceHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Stop the loop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

/// Start the maintenance loop on the current runtime.
pub fn spawn(db_path: PathBuf, config: &SareConfig) -> Result<MaintenanceHandle, SareError> {
    let runner = MaintenanceRunner::new(db_path, &config.maintenance_schedule)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(run_loop(runner, shutdown_rx));
    log::info!(
        "Maintenance: scheduled '{}'",
        config.maintenance_schedule
    );
    Ok(MaintenanceHandle { shutdown_tx, task })
}

async fn run_loop(mut runner: MaintenanceRunner, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)) => {
                runner.tick(Utc::now());
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    log::info!("Maintenance: scheduler stopped");
}
