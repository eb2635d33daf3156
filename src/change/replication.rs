//! Replication convergence wait.
//!
//! After a successful write the pipeline writes a marker attribute and polls the
//! directory until every replica reports the same marker value or the wait bound
//! is reached. Whatever the result, the change carries on; the outcome only
//! feeds logging and statistics.

use super::ChangeConfig;
use crate::directory::DirectoryClient;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationOutcome {
    pub converged: bool,
    pub elapsed_ms: u64,
    pub attempts_made: u32,
}

/// Counters shared by every change handled by one orchestrator.
#[derive(Debug, Default)]
pub struct ReplicationStatistics {
    checks: AtomicU64,
    converged: AtomicU64,
    timed_out: AtomicU64,
    total_elapsed_ms: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationStatisticsSnapshot {
    pub checks: u64,
    pub converged: u64,
    pub timed_out: u64,
    pub average_elapsed_ms: u64,
}

impl ReplicationStatistics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: &ReplicationOutcome) {
        self.checks.fetch_add(1, Ordering::Relaxed);
        self.total_elapsed_ms
            .fetch_add(outcome.elapsed_ms, Ordering::Relaxed);
        if outcome.converged {
            self.converged.fetch_add(1, Ordering::Relaxed);
        } else {
            self.timed_out.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> ReplicationStatisticsSnapshot {
        let checks = self.checks.load(Ordering::Relaxed);
        let total = self.total_elapsed_ms.load(Ordering::Relaxed);

        ReplicationStatisticsSnapshot {
            checks,
            converged: self.converged.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            average_elapsed_ms: total.checked_div(checks).unwrap_or(0),
        }
    }
}

/// Sleep for `duration`, or until `deadline` if that comes first.
///
/// Returns `false` when the deadline cut the sleep short.
pub(crate) async fn sleep_bounded(duration: Duration, deadline: Option<Instant>) -> bool {
    match deadline {
        Some(deadline) if Instant::now() + duration > deadline => {
            sleep_until(deadline).await;
            false
        }
        _ => {
            sleep(duration).await;
            true
        }
    }
}

/// Write the marker attribute and poll until replicas agree on it.
///
/// Returns `None` when the marker could not be written, in which case
/// convergence cannot be observed.
pub(crate) async fn await_convergence(
    directory: &dyn DirectoryClient,
    identity: &str,
    config: &ChangeConfig,
    deadline: Option<Instant>,
) -> Option<ReplicationOutcome> {
    let attribute = config.marker_attribute();

    if let Err(e) = directory.write_marker_attribute(identity, attribute, Utc::now()) {
        warn!("unable to write replication marker {attribute}, skipping replication check: {e}");
        return None;
    }

    let started = Instant::now();
    let bound = config.max_wait();
    let mut attempts = 0u32;
    let mut converged = false;

    let mut within_deadline = config.initial_delay().is_zero()
        || sleep_bounded(config.initial_delay(), deadline).await;

    while within_deadline {
        attempts += 1;
        match directory.test_replication(identity, attribute) {
            Ok(true) => {
                converged = true;
                break;
            }
            Ok(false) => debug!(attempts, "replicas not yet in sync"),
            Err(e) => warn!(attempts, "replication check failed: {e}"),
        }

        let elapsed = started.elapsed();
        if elapsed >= bound {
            break;
        }
        let pause = config.cycle_delay().min(bound - elapsed);
        within_deadline = sleep_bounded(pause, deadline).await;
    }

    let outcome = ReplicationOutcome {
        converged,
        elapsed_ms: millis(started.elapsed()),
        attempts_made: attempts,
    };

    if !within_deadline {
        warn!("operation timeout reached while waiting for replication");
    }

    Some(outcome)
}

/// Sleep until at least `config.min_wait()` has passed since `write_started`.
pub(crate) async fn enforce_min_wait(
    config: &ChangeConfig,
    write_started: Instant,
    deadline: Option<Instant>,
) {
    let target = write_started + config.min_wait();

    loop {
        let now = Instant::now();
        if now >= target {
            break;
        }
        let pause = config.min_wait_step().min(target - now);
        if !sleep_bounded(pause, deadline).await {
            warn!("operation timeout reached during minimum wait");
            break;
        }
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{DirectoryError, DirectoryErrorCode, MemoryDirectory, MemoryUser};

    fn directory() -> MemoryDirectory {
        MemoryDirectory::new().with_user("jdoe", MemoryUser::new("pw"))
    }

    #[tokio::test]
    async fn converges_on_first_check() {
        let directory = directory();
        let config = ChangeConfig::new().with_initial_delay_ms(0);

        let outcome = await_convergence(&directory, "jdoe", &config, None)
            .await
            .unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.attempts_made, 1);
        assert_eq!(directory.marker_writes(), 1);
    }

    #[tokio::test]
    async fn polls_until_converged() {
        let directory = directory().with_replication_script([
            Ok(false),
            Err(DirectoryError::new(DirectoryErrorCode::Busy, "busy")),
            Ok(true),
        ]);
        let config = ChangeConfig::new()
            .with_initial_delay_ms(0)
            .with_cycle_delay_ms(5)
            .with_max_wait_ms(1_000);

        let outcome = await_convergence(&directory, "jdoe", &config, None)
            .await
            .unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.attempts_made, 3);
    }

    #[tokio::test]
    async fn gives_up_at_the_bound() {
        let directory = directory().with_replicated_by_default(false);
        let config = ChangeConfig::new()
            .with_initial_delay_ms(0)
            .with_cycle_delay_ms(10)
            .with_max_wait_ms(50);

        let started = std::time::Instant::now();
        let outcome = await_convergence(&directory, "jdoe", &config, None)
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert!(!outcome.converged);
        assert!(outcome.elapsed_ms >= 50);
        assert!(outcome.attempts_made >= 2);
        assert!(elapsed < Duration::from_millis(500), "{elapsed:?}");
    }

    #[tokio::test]
    async fn marker_failure_skips_polling() {
        let directory = directory()
            .failing_marker_write(DirectoryError::new(DirectoryErrorCode::InsufficientAccess, "no"));
        let config = ChangeConfig::new().with_initial_delay_ms(0);

        assert!(await_convergence(&directory, "jdoe", &config, None)
            .await
            .is_none());
        assert_eq!(directory.replication_tests(), 0);
    }

    #[tokio::test]
    async fn deadline_cuts_the_wait_short() {
        let directory = directory().with_replicated_by_default(false);
        let config = ChangeConfig::new()
            .with_initial_delay_ms(0)
            .with_cycle_delay_ms(10)
            .with_max_wait_ms(10_000);
        let deadline = Instant::now() + Duration::from_millis(40);

        let outcome = await_convergence(&directory, "jdoe", &config, Some(deadline))
            .await
            .unwrap();
        assert!(!outcome.converged);
        assert!(outcome.elapsed_ms < 1_000);
    }

    #[tokio::test]
    async fn min_wait_is_measured_from_the_write() {
        let config = ChangeConfig::new()
            .with_min_wait_ms(60)
            .with_min_wait_step_ms(500);
        let write_started = Instant::now();

        enforce_min_wait(&config, write_started, None).await;
        let elapsed = write_started.elapsed();
        assert!(elapsed >= Duration::from_millis(60));
        // steps are capped by the remaining time
        assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
    }

    #[test]
    fn statistics_snapshot() {
        let stats = ReplicationStatistics::new();
        stats.record(&ReplicationOutcome {
            converged: true,
            elapsed_ms: 10,
            attempts_made: 1,
        });
        stats.record(&ReplicationOutcome {
            converged: false,
            elapsed_ms: 30,
            attempts_made: 4,
        });

        assert_eq!(
            stats.snapshot(),
            ReplicationStatisticsSnapshot {
                checks: 2,
                converged: 1,
                timed_out: 1,
                average_elapsed_ms: 20,
            }
        );
    }
}
