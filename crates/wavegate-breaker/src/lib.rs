//! # wavegate-breaker
//!
//! Circuit breaker for wavegate waves.
//!
//! This crate provides:
//! - Threshold rules over the wave's signals (QA rejections, spend, repeated
//!   errors, stalled heartbeats), evaluated in fixed priority order
//! - The breaker monitor that owns the persisted breaker state and performs
//!   the trip/reset protocol
//! - Best-effort escalation notifiers
//! - A cooperative monitor loop with injectable sleep and cancellation

mod circuit_breaker;
mod monitor;
mod notifier;
mod thresholds;

pub use circuit_breaker::{BreakerReport, CircuitBreakerMonitor};
pub use monitor::{run_monitor, MonitorExit, Sleeper, TokioSleeper};
pub use notifier::{
    CommandNotifier, EscalationNotifier, FanoutNotifier, JournalNotifier, LogNotifier,
    NotificationKind,
};
pub use thresholds::{Evidence, Thresholds, TripCause, TripCondition, UNLIMITED_BUDGET};
pub use tokio_util::sync::CancellationToken;
