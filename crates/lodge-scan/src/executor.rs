use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{Local, NaiveDate, TimeDelta};
use rand::Rng;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::{error, info, warn};

use crate::config::CheckerConfig;
use crate::dates::{candidate_pairs, weekend_dates};
use crate::differ::{new_availability, new_consecutive_pairs};
use crate::notification_service::Notifier;
use crate::probe::{AvailabilityProbe, PauseRange, run_probe_pass};
use crate::result_store::ResultStore;
use crate::scan_types::*;

/// Whether the executor stops after one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One cycle, then return
    SingleRun,
    /// Cycle until interrupted
    Continuous,
}

/// Timing knobs that are not part of the configuration file
#[derive(Debug, Clone)]
pub struct CheckExecutorConfig {
    /// Pause between two probed dates (default: 2-5 seconds)
    pub probe_pause: PauseRange,

    /// Shortest allowed wait between cycles (default: 30 minutes)
    pub min_interval: Duration,

    /// Wait after an unexpected cycle error (default: 15 minutes)
    pub error_cooldown: Duration,
}

impl Default for CheckExecutorConfig {
    fn default() -> Self {
        Self {
            probe_pause: PauseRange::default(),
            min_interval: Duration::from_secs(30 * 60),
            error_cooldown: Duration::from_secs(15 * 60),
        }
    }
}

/// Main check execution engine
pub struct CheckExecutor {
    config: CheckerConfig,
    probe: Box<dyn AvailabilityProbe>,
    notifier: Notifier,
    store: ResultStore,
    shutdown: watch::Receiver<bool>,
    previous: Option<CheckResult>,
    timing: CheckExecutorConfig,
}

impl CheckExecutor {
    /// Creates an executor; `timing` defaults to [`CheckExecutorConfig::default`].
    ///
    /// Raising `shutdown` stops the run at the next await point, including in
    /// the middle of a probe pass.
    pub fn new(
        config: CheckerConfig,
        probe: Box<dyn AvailabilityProbe>,
        notifier: Notifier,
        store: ResultStore,
        shutdown: watch::Receiver<bool>,
        timing: Option<CheckExecutorConfig>,
    ) -> Self {
        Self {
            config,
            probe,
            notifier,
            store,
            shutdown,
            previous: None,
            timing: timing.unwrap_or_default(),
        }
    }

    /// Runs cycles until done.
    ///
    /// Single-run mode returns after one cycle and propagates an unexpected
    /// cycle error. Continuous mode logs such errors, cools down and keeps
    /// going until the shutdown flag is raised.
    pub async fn run(&mut self, mode: RunMode) -> Result<(), ScanError> {
        info!("Starting Yosemite Valley Lodge availability checker ({:?})", mode);

        loop {
            if self.shutdown_requested() {
                info!("Check interrupted by user");
                break;
            }

            match self.run_cycle().await {
                Ok(_) => {}
                Err(ScanError::Interrupted) => {
                    info!("Check interrupted by user");
                    break;
                }
                Err(e) => {
                    error!("Unexpected error during check: {}", e);
                    if mode == RunMode::SingleRun {
                        return Err(e);
                    }
                    info!(
                        "Retrying in {} minutes...",
                        self.timing.error_cooldown.as_secs() / 60
                    );
                    if self.sleep_or_shutdown(self.timing.error_cooldown).await {
                        info!("Check interrupted by user");
                        break;
                    }
                    continue;
                }
            }

            if mode == RunMode::SingleRun {
                break;
            }

            let wait = next_check_interval(&self.config, &mut rand::rng(), self.timing.min_interval);
            let next_at = Local::now() + TimeDelta::from_std(wait).unwrap_or_default();
            info!(
                "Next check scheduled for {} ({:.1} hours from now)",
                next_at.format("%Y-%m-%d %H:%M:%S"),
                wait.as_secs_f64() / 3600.0
            );

            if self.sleep_or_shutdown(wait).await {
                info!("Check interrupted by user");
                break;
            }
        }

        Ok(())
    }

    /// One cycle: probe with retries, diff against the previous result,
    /// notify about new dates and persist the result.
    pub async fn run_cycle(&mut self) -> Result<CheckResult, ScanError> {
        let previous = match self.previous.take() {
            Some(previous) => previous,
            None => self.store.load(),
        };

        info!("Starting availability check");
        let current = match self.check_with_retries().await {
            Ok(CycleOutcome::Completed(result)) => result,
            Ok(exhausted @ CycleOutcome::Exhausted { .. }) => {
                // keep the stored result and baseline
                self.previous = Some(previous);
                return Ok(exhausted.into_result());
            }
            Err(e) => {
                self.previous = Some(previous);
                return Err(e);
            }
        };

        let new_dates = new_availability(&current.available_dates, &previous.available_dates);
        if !new_dates.is_empty() {
            let new_pairs = new_consecutive_pairs(&new_dates);
            info!(
                "New availability found for {} dates ({} consecutive pairs)",
                new_dates.len(),
                new_pairs.len()
            );
            if let Err(e) = self.notifier.notify(&new_dates, &new_pairs).await {
                error!("Failed to send notification: {}", e);
            }
        } else if !current.is_empty() {
            info!(
                "Found availability for {} dates, but none are new",
                current.available_dates.len()
            );
        } else {
            info!("No availability found");
        }

        self.store.save(&current);
        self.previous = Some(current.clone());
        Ok(current)
    }

    /// Bounded retry around a probe pass.
    ///
    /// Errors that retrying cannot fix are returned instead of retried.
    pub async fn check_with_retries(&mut self) -> Result<CycleOutcome, ScanError> {
        let max_attempts = self.config.max_retries.max(1);
        let delay = Duration::from_secs(self.config.retry_delay_seconds);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.check_availability().await {
                Ok(dates) => {
                    return Ok(CycleOutcome::Completed(CheckResult::new(
                        Local::now().naive_local(),
                        dates,
                    )));
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    error!("Check failed (attempt {}/{}): {}", attempt, max_attempts, e);
                    if attempt >= max_attempts {
                        error!("Max retries reached. Check failed.");
                        return Ok(CycleOutcome::Exhausted {
                            attempts: attempt,
                            last_error: e,
                        });
                    }
                    info!("Retrying in {} seconds...", delay.as_secs());
                    if self.sleep_or_shutdown(delay).await {
                        return Err(ScanError::Interrupted);
                    }
                }
            }
        }
    }

    async fn check_availability(&mut self) -> Result<BTreeSet<NaiveDate>, ScanError> {
        let today = Local::now().date_naive();
        let dates = weekend_dates(today, self.config.months_ahead);
        let pairs = candidate_pairs(
            &dates,
            self.config.check_friday_saturday,
            self.config.check_saturday_sunday,
        );
        info!("Checking {} weekend date pairs", pairs.len());

        let available = run_probe_pass(
            self.probe.as_mut(),
            &pairs,
            &self.config.classifier,
            self.timing.probe_pause,
            &mut self.shutdown,
        )
        .await?;

        info!("Found {} available dates", available.len());
        Ok(available)
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleeps for `duration`; returns `true` as soon as shutdown is requested.
    async fn sleep_or_shutdown(&mut self, duration: Duration) -> bool {
        if self.shutdown_requested() {
            return true;
        }

        let deadline = Instant::now() + duration;
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => return false,
                changed = self.shutdown.changed() => match changed {
                    Ok(()) if *self.shutdown.borrow() => return true,
                    Ok(()) => continue,
                    Err(_) => {
                        warn!("Shutdown signal channel closed");
                        sleep_until(deadline).await;
                        return false;
                    }
                },
            }
        }
    }
}

/// Longest wait between cycles, whatever the configuration says.
pub const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Randomized wait before the next cycle: the configured interval plus or
/// minus the variation percentage, never shorter than `floor` and never
/// longer than [`MAX_CHECK_INTERVAL`].
pub fn next_check_interval<R: Rng + ?Sized>(
    config: &CheckerConfig,
    rng: &mut R,
    floor: Duration,
) -> Duration {
    let floor_secs = floor.as_secs_f64();
    let ceiling = MAX_CHECK_INTERVAL.as_secs_f64().max(floor_secs);

    let base = (config.check_interval_hours * 3600.0).min(ceiling);
    let variation = base * config.interval_variation_percent.clamp(0.0, 100.0) / 100.0;
    let low = base - variation;
    let high = base + variation;

    let seconds = if high > low {
        rng.random_range(low..=high)
    } else {
        base
    };

    Duration::try_from_secs_f64(seconds.clamp(floor_secs, ceiling)).unwrap_or(floor)
}
