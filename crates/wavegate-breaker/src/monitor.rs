//! Continuous monitoring mode
//!
//! A single cooperative loop: check, stop if open, sleep, repeat. The check
//! itself is synchronous, so cancellation can only land between iterations
//! (during the sleep), never halfway through an evaluation.

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use wavegate_core::{BreakerStatus, Result};

use crate::circuit_breaker::CircuitBreakerMonitor;

/// Waits between monitor iterations (allows simulated time in tests)
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Why the monitor loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorExit {
    /// Breaker is open; the process should exit nonzero
    Tripped { reason: String, iterations: u64 },
    /// Cancellation was requested between iterations
    Cancelled { iterations: u64 },
}

/// Run checks every `interval` until the breaker opens or `cancel` fires
pub async fn run_monitor(
    monitor: &CircuitBreakerMonitor,
    interval: Duration,
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
) -> Result<MonitorExit> {
    info!(
        wave = monitor.wave(),
        interval_secs = interval.as_secs(),
        "Starting circuit breaker monitor"
    );

    let mut iterations = 0u64;
    loop {
        if cancel.is_cancelled() {
            info!(wave = monitor.wave(), iterations, "Monitor cancelled");
            return Ok(MonitorExit::Cancelled { iterations });
        }

        iterations += 1;
        match monitor.check()? {
            BreakerStatus::Open { reason, .. } => {
                info!(wave = monitor.wave(), iterations, %reason, "Monitor stopping: breaker open");
                return Ok(MonitorExit::Tripped { reason, iterations });
            }
            BreakerStatus::Closed => {
                debug!(wave = monitor.wave(), iterations, "breaker closed, sleeping");
            }
        }

        tokio::select! {
            _ = sleeper.sleep(interval) => {}
            _ = cancel.cancelled() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::Thresholds;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use wavegate_core::{FixedClock, SignalKind, StateLayout};

    /// Advances a fake clock instead of waiting and runs a hook per sleep
    struct SimulatedSleeper<F: Fn(u64) + Send + Sync> {
        clock: Arc<FixedClock>,
        sleeps: AtomicU64,
        on_sleep: F,
    }

    #[async_trait]
    impl<F: Fn(u64) + Send + Sync> Sleeper for SimulatedSleeper<F> {
        async fn sleep(&self, duration: Duration) {
            let n = self.sleeps.fetch_add(1, Ordering::SeqCst) + 1;
            self.clock.advance(chrono::Duration::from_std(duration).unwrap());
            (self.on_sleep)(n);
        }
    }

    fn monitor(dir: &TempDir, clock: Arc<FixedClock>) -> CircuitBreakerMonitor {
        CircuitBreakerMonitor::new(StateLayout::new(dir.path()), 1, Thresholds::default())
            .with_clock(clock)
    }

    #[tokio::test]
    async fn test_monitor_stops_when_signal_appears() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let signal_path = StateLayout::new(dir.path())
            .signals_dir(1)
            .join(SignalKind::QaRejectionCount.file_name());

        let sleeper = SimulatedSleeper {
            clock: clock.clone(),
            sleeps: AtomicU64::new(0),
            on_sleep: move |n: u64| {
                if n == 2 {
                    std::fs::create_dir_all(signal_path.parent().unwrap()).unwrap();
                    std::fs::write(&signal_path, r#"{"count": 3}"#).unwrap();
                }
            },
        };

        let exit = run_monitor(
            &monitor(&dir, clock),
            Duration::from_secs(60),
            &sleeper,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        match exit {
            MonitorExit::Tripped { reason, iterations } => {
                assert_eq!(iterations, 3);
                assert!(reason.contains("3/3"));
            }
            other => panic!("expected trip, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_monitor_detects_stall_with_simulated_time() {
        let dir = TempDir::new().unwrap();
        let start = Utc::now();
        let clock = Arc::new(FixedClock::new(start));

        let heartbeat = StateLayout::new(dir.path())
            .signals_dir(1)
            .join(SignalKind::Heartbeat.file_name());
        std::fs::create_dir_all(heartbeat.parent().unwrap()).unwrap();
        std::fs::write(
            &heartbeat,
            format!(r#"{{"timestamp": "{}"}}"#, start.to_rfc3339()),
        )
        .unwrap();

        let sleeper = SimulatedSleeper {
            clock: clock.clone(),
            sleeps: AtomicU64::new(0),
            on_sleep: |_: u64| {},
        };

        let exit = run_monitor(
            &monitor(&dir, clock),
            Duration::from_secs(600),
            &sleeper,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        // 0, 10, 20, 30 minutes
        assert!(matches!(exit, MonitorExit::Tripped { iterations: 4, .. }));
    }

    #[tokio::test]
    async fn test_monitor_cancels_between_iterations() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let cancel = CancellationToken::new();
        let cancel_on_sleep = cancel.clone();

        let sleeper = SimulatedSleeper {
            clock: clock.clone(),
            sleeps: AtomicU64::new(0),
            on_sleep: move |n: u64| {
                if n == 3 {
                    cancel_on_sleep.cancel();
                }
            },
        };

        let exit = run_monitor(&monitor(&dir, clock), Duration::from_secs(1), &sleeper, &cancel)
            .await
            .unwrap();

        assert_eq!(exit, MonitorExit::Cancelled { iterations: 3 });
    }

    #[tokio::test]
    async fn test_monitor_returns_immediately_when_already_open() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let breaker = monitor(&dir, clock.clone());
        breaker.trip("operator halt").unwrap();

        let sleeper = SimulatedSleeper {
            clock,
            sleeps: AtomicU64::new(0),
            on_sleep: |_: u64| panic!("should not sleep"),
        };

        let exit = run_monitor(&breaker, Duration::from_secs(1), &sleeper, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            exit,
            MonitorExit::Tripped {
                reason: "operator halt".to_string(),
                iterations: 1
            }
        );
    }
}
