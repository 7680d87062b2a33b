//! Fail-open utilities for evidence reads and best-effort side effects
//!
//! Threshold evidence is read fail-open: a signal that cannot be read counts
//! as "no evidence of a problem". Only a successfully read breach may halt a
//! wave. The same helpers wrap notification delivery, which must never fail
//! the caller.
//!
//! DO NOT use fail-open for:
//! - Gate completion signals (absence must fail the gate)
//! - Breaker state or gate lock writes (state)

use tracing::warn;

use crate::Result;

/// Run an operation that should fail open
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// # Usage
///
/// ```
/// use wavegate_core::fail_open::fail_open;
/// use wavegate_core::{Result, WaveGateError};
///
/// fn deliver() -> Result<()> {
///     Err(WaveGateError::Notify("hook exited 1".to_string()))
/// }
///
/// assert_eq!(fail_open("notifier::deliver", deliver), None);
/// ```
pub fn fail_open<F, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Result<T>,
{
    match f() {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

/// Like fail_open but substitutes a documented default on failure
///
/// ```
/// use wavegate_core::fail_open::fail_open_or;
/// use wavegate_core::{Result, WaveGateError};
///
/// let count = fail_open_or("signals::qa_rejections", 0u64, || {
///     Err::<u64, _>(WaveGateError::Other("truncated document".to_string()))
/// });
/// assert_eq!(count, 0);
/// ```
pub fn fail_open_or<F, T>(operation_name: &str, default: T, f: F) -> T
where
    F: FnOnce() -> Result<T>,
{
    fail_open(operation_name, f).unwrap_or(default)
}
