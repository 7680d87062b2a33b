//! Circuit breaker for runaway waves
//!
//! Stops a wave when failure signals pile up: QA rejections, spend against
//! budget, the same error over and over, or agents that stopped sending
//! heartbeats.
//!
//! # States
//!
//! - **Closed**: normal operation, agents keep working
//! - **Open**: a threshold was breached; the emergency marker is on disk and
//!   every agent halts until an operator resets the breaker
//!
//! Unlike a request-level breaker there is no half-open state. Open is
//! sticky: nothing but [`CircuitBreakerMonitor::reset`] closes it again.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wavegate_core::fail_open::fail_open;
use wavegate_core::layout::{read_json, remove_if_exists, write_json_atomic};
use wavegate_core::{
    BreakerState, BreakerStatus, Clock, EmergencyMarker, Result, SignalSnapshot, SignalStore,
    StateLayout, SystemClock, WaveNumber,
};

use crate::notifier::{EscalationNotifier, LogNotifier, NotificationKind};
use crate::thresholds::{Evidence, Thresholds};

/// Snapshot of a wave's breaker for display
#[derive(Debug, Clone, Serialize)]
pub struct BreakerReport {
    pub state: BreakerState,
    pub emergency_marker: bool,
    pub signals: SignalSnapshot,
    pub minutes_since_heartbeat: i64,
    pub thresholds: Thresholds,
}

/// Circuit breaker owning the breaker state of one wave
///
/// # Example
///
/// ```no_run
/// use wavegate_breaker::{CircuitBreakerMonitor, Thresholds};
/// use wavegate_core::StateLayout;
///
/// let monitor = CircuitBreakerMonitor::new(StateLayout::new("."), 1, Thresholds::default());
///
/// let status = monitor.check()?;
/// if status.is_open() {
///     eprintln!("wave halted: {}", status);
/// }
/// # Ok::<(), wavegate_core::WaveGateError>(())
/// ```
pub struct CircuitBreakerMonitor {
    wave: WaveNumber,
    layout: StateLayout,
    signals: SignalStore,
    thresholds: Thresholds,
    notifier: Arc<dyn EscalationNotifier>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerMonitor {
    /// Create a breaker for `wave` that logs escalations and uses the system clock
    pub fn new(layout: StateLayout, wave: WaveNumber, thresholds: Thresholds) -> Self {
        Self {
            wave,
            signals: SignalStore::new(layout.clone()),
            layout,
            thresholds,
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn EscalationNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn wave(&self) -> WaveNumber {
        self.wave
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Evaluate thresholds and trip on the first breach
    ///
    /// An open breaker is returned as-is without looking at the signals.
    pub fn check(&self) -> Result<BreakerStatus> {
        let state = self.load_or_create()?;
        if state.is_open() {
            debug!(wave = self.wave, "breaker already open, skipping evaluation");
            self.restore_marker(&state.status)?;
            return Ok(state.status);
        }

        let snapshot = self.signals.snapshot(self.wave);
        let evidence = Evidence::new(&snapshot, self.clock.now());

        match self.thresholds.evaluate(&evidence) {
            Some(cause) => {
                info!(
                    wave = self.wave,
                    condition = ?cause.condition,
                    "threshold breached"
                );
                self.trip(&cause.reason)
            }
            None => {
                debug!(
                    wave = self.wave,
                    qa_rejections = snapshot.qa_rejections,
                    cost_total = snapshot.cost_total,
                    repeated_errors = snapshot.repeated_error.count,
                    minutes_since_heartbeat = evidence.minutes_since_heartbeat,
                    "all thresholds clear"
                );
                Ok(BreakerStatus::Closed)
            }
        }
    }

    /// Open the breaker
    ///
    /// Idempotent: when already open nobody is notified and the original
    /// reason is returned. The emergency marker is written before the state,
    /// and an open breaker whose marker is missing gets it back.
    pub fn trip(&self, reason: &str) -> Result<BreakerStatus> {
        let current = self
            .load()?
            .unwrap_or_else(|| BreakerState::closed(self.wave, self.clock.now()));

        if current.is_open() {
            info!(
                wave = self.wave,
                requested = reason,
                "breaker already open, keeping original reason"
            );
            self.restore_marker(&current.status)?;
            return Ok(current.status);
        }

        let now = self.clock.now();
        let tripped = BreakerState {
            wave: self.wave,
            status: BreakerStatus::Open {
                reason: reason.to_string(),
                tripped_at: now,
            },
            version: current.version + 1,
            updated_at: now,
        };

        write_json_atomic(
            &self.layout.emergency_marker(),
            &EmergencyMarker {
                wave: self.wave,
                reason: reason.to_string(),
                tripped_at: now,
            },
        )?;
        write_json_atomic(&self.layout.breaker_state(self.wave), &tripped)?;

        warn!(wave = self.wave, reason, "circuit breaker tripped");
        fail_open("breaker::notify", || {
            self.notifier
                .notify(NotificationKind::BreakerTripped, self.wave, reason)
        });

        Ok(tripped.status)
    }

    /// Close the breaker and clear the emergency marker
    ///
    /// Idempotent. Signal documents are left alone: if the evidence that
    /// tripped the breaker is still there, the next check trips it again.
    pub fn reset(&self) -> Result<BreakerStatus> {
        // A corrupt record is overwritten; reset is the operator's way out.
        let current = fail_open("breaker::load_state", || self.load()).flatten();

        match current {
            Some(state) if state.is_open() => {
                let now = self.clock.now();
                let closed = BreakerState {
                    wave: self.wave,
                    status: BreakerStatus::Closed,
                    version: state.version + 1,
                    updated_at: now,
                };
                write_json_atomic(&self.layout.breaker_state(self.wave), &closed)?;
                info!(wave = self.wave, "circuit breaker reset");
                fail_open("breaker::notify", || {
                    self.notifier.notify(
                        NotificationKind::BreakerReset,
                        self.wave,
                        "circuit breaker reset by operator",
                    )
                });
            }
            Some(_) => debug!(wave = self.wave, "breaker already closed"),
            None => {
                // Unknown or corrupt record: write a fresh closed one
                let closed = BreakerState {
                    version: 1,
                    ..BreakerState::closed(self.wave, self.clock.now())
                };
                write_json_atomic(&self.layout.breaker_state(self.wave), &closed)?;
            }
        }

        self.clear_marker()?;
        Ok(BreakerStatus::Closed)
    }

    /// Current state plus live readings, without persisting anything
    pub fn status(&self) -> Result<BreakerReport> {
        let now = self.clock.now();
        let state = self
            .load()?
            .unwrap_or_else(|| BreakerState::closed(self.wave, now));
        let signals = self.signals.snapshot(self.wave);
        let minutes_since_heartbeat = Evidence::new(&signals, now).minutes_since_heartbeat;

        Ok(BreakerReport {
            state,
            emergency_marker: self.layout.emergency_marker().exists(),
            minutes_since_heartbeat,
            signals,
            thresholds: self.thresholds.clone(),
        })
    }

    fn load(&self) -> Result<Option<BreakerState>> {
        read_json(&self.layout.breaker_state(self.wave))
    }

    // Breaker state is created lazily on first evaluation.
    fn load_or_create(&self) -> Result<BreakerState> {
        if let Some(state) = self.load()? {
            return Ok(state);
        }

        let state = BreakerState {
            version: 1,
            ..BreakerState::closed(self.wave, self.clock.now())
        };
        write_json_atomic(&self.layout.breaker_state(self.wave), &state)?;
        debug!(wave = self.wave, "created breaker state");
        Ok(state)
    }

    /// Rewrite a missing emergency marker for an open breaker
    fn restore_marker(&self, status: &BreakerStatus) -> Result<()> {
        let BreakerStatus::Open { reason, tripped_at } = status else {
            return Ok(());
        };
        let path = self.layout.emergency_marker();
        if path.exists() {
            return Ok(());
        }

        write_json_atomic(
            &path,
            &EmergencyMarker {
                wave: self.wave,
                reason: reason.clone(),
                tripped_at: *tripped_at,
            },
        )?;
        warn!(wave = self.wave, "emergency marker was missing, restored");
        Ok(())
    }

    // The marker is project-wide; only remove it if it belongs to this wave
    // (or cannot be attributed to any wave).
    fn clear_marker(&self) -> Result<()> {
        let path = self.layout.emergency_marker();
        let owner = fail_open("breaker::read_marker", || read_json::<EmergencyMarker>(&path));

        match owner {
            Some(Some(marker)) if marker.wave != self.wave => {
                info!(
                    wave = self.wave,
                    marker_wave = marker.wave,
                    "emergency marker belongs to another wave, leaving it"
                );
            }
            _ => {
                if remove_if_exists(&path)? {
                    info!(wave = self.wave, "emergency marker cleared");
                }
            }
        }
        Ok(())
    }
}
