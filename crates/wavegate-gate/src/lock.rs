//! Gate lock persistence
//!
//! A gate lock asserts that a phase of a wave passed validation. Locks are
//! written whole (atomic replace) and never patched. Phase N can only be
//! locked while phase N-1 holds a valid lock and the wave's breaker is
//! closed; [`FileLockManager::create`] enforces both.

use std::sync::Arc;
use tracing::{debug, info, warn};
use wavegate_core::layout::{read_json, write_json_atomic};
use wavegate_core::{
    BreakerState, CheckMap, Clock, GateLock, GatePhase, LockStatus, Result, StateLayout,
    SystemClock, WaveGateError, WaveNumber,
};

/// Reads and writes gate locks
pub trait LockManager: Send + Sync {
    /// Whether a valid lock exists for (wave, phase)
    fn validate(&self, wave: WaveNumber, phase: GatePhase) -> bool;

    /// Persist a lock, enforcing phase ordering
    fn create(&self, wave: WaveNumber, phase: GatePhase, checks: CheckMap) -> Result<GateLock>;
}

/// Gate locks stored as JSON under the project's state directory
pub struct FileLockManager {
    layout: StateLayout,
    clock: Arc<dyn Clock>,
}

impl FileLockManager {
    pub fn new(layout: StateLayout) -> Self {
        Self {
            layout,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Read a lock without judging it
    pub fn load(&self, wave: WaveNumber, phase: GatePhase) -> Result<Option<GateLock>> {
        read_json(&self.layout.gate_lock(wave, phase))
    }

    /// All valid locks for a wave, in phase order
    pub fn passed_phases(&self, wave: WaveNumber) -> Vec<GatePhase> {
        GatePhase::ALL
            .into_iter()
            .filter(|phase| self.validate(wave, *phase))
            .collect()
    }

    fn breaker_open_reason(&self, wave: WaveNumber) -> Result<Option<String>> {
        let state: Option<BreakerState> = read_json(&self.layout.breaker_state(wave))?;
        Ok(state.and_then(|s| s.status.reason().map(str::to_string)))
    }
}

impl LockManager for FileLockManager {
    fn validate(&self, wave: WaveNumber, phase: GatePhase) -> bool {
        match self.load(wave, phase) {
            Ok(Some(lock)) => {
                let valid =
                    lock.status == LockStatus::Passed && lock.wave == wave && lock.phase == phase;
                if !valid {
                    warn!(
                        wave,
                        phase = phase.number(),
                        "gate lock does not match its key, treating as invalid"
                    );
                }
                valid
            }
            Ok(None) => {
                debug!(wave, phase = phase.number(), "no gate lock");
                false
            }
            Err(e) => {
                warn!(wave, phase = phase.number(), "gate lock unreadable: {}", e);
                false
            }
        }
    }

    fn create(&self, wave: WaveNumber, phase: GatePhase, checks: CheckMap) -> Result<GateLock> {
        if let Some(required) = phase.previous() {
            if !self.validate(wave, required) {
                return Err(WaveGateError::LockOrder {
                    wave,
                    phase: phase.number(),
                    required: required.number(),
                });
            }
        }

        if let Some(reason) = self.breaker_open_reason(wave)? {
            return Err(WaveGateError::BreakerOpen { wave, reason });
        }

        let lock = GateLock {
            wave,
            phase,
            status: LockStatus::Passed,
            checks,
            created_at: self.clock.now(),
        };
        write_json_atomic(&self.layout.gate_lock(wave, phase), &lock)?;

        info!(wave, phase = phase.number(), "Gate lock created");
        Ok(lock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;
    use wavegate_core::{BreakerStatus, CheckRecord};

    fn manager() -> (TempDir, FileLockManager) {
        let dir = TempDir::new().unwrap();
        let manager = FileLockManager::new(StateLayout::new(dir.path()));
        (dir, manager)
    }

    fn checks() -> CheckMap {
        let mut checks = CheckMap::new();
        checks.insert("emergency_stop".to_string(), CheckRecord::pass("no marker"));
        checks
    }

    #[test]
    fn test_create_and_validate() {
        let (_dir, manager) = manager();

        assert!(!manager.validate(1, GatePhase::Build));
        let lock = manager.create(1, GatePhase::Build, checks()).unwrap();

        assert_eq!(lock.status, LockStatus::Passed);
        assert!(manager.validate(1, GatePhase::Build));
        assert!(!manager.validate(2, GatePhase::Build));
        assert_eq!(manager.load(1, GatePhase::Build).unwrap().unwrap().checks.len(), 1);
    }

    #[test]
    fn test_create_enforces_phase_order() {
        let (_dir, manager) = manager();

        let err = manager.create(1, GatePhase::DevComplete, checks()).unwrap_err();
        assert!(matches!(
            err,
            WaveGateError::LockOrder {
                phase: 3,
                required: 2,
                ..
            }
        ));

        manager.create(1, GatePhase::Build, checks()).unwrap();
        manager.create(1, GatePhase::SmokeTest, checks()).unwrap();
        manager.create(1, GatePhase::DevComplete, checks()).unwrap();
        assert_eq!(
            manager.passed_phases(1),
            vec![GatePhase::Build, GatePhase::SmokeTest, GatePhase::DevComplete]
        );
    }

    #[test]
    fn test_create_refused_while_breaker_open() {
        let (dir, manager) = manager();
        let layout = StateLayout::new(dir.path());
        let now = Utc::now();
        write_json_atomic(
            &layout.breaker_state(1),
            &BreakerState {
                wave: 1,
                status: BreakerStatus::Open {
                    reason: "stalled".to_string(),
                    tripped_at: now,
                },
                version: 2,
                updated_at: now,
            },
        )
        .unwrap();

        let err = manager.create(1, GatePhase::Build, checks()).unwrap_err();
        assert!(matches!(err, WaveGateError::BreakerOpen { .. }));
        assert!(!layout.gate_lock(1, GatePhase::Build).exists());
    }

    #[test]
    fn test_mismatched_or_corrupt_lock_is_invalid() {
        let (dir, manager) = manager();
        let layout = StateLayout::new(dir.path());

        // Phase 1 lock copied into the phase 2 slot
        let lock = manager.create(1, GatePhase::Build, checks()).unwrap();
        write_json_atomic(&layout.gate_lock(1, GatePhase::SmokeTest), &lock).unwrap();
        assert!(!manager.validate(1, GatePhase::SmokeTest));

        std::fs::write(layout.gate_lock(1, GatePhase::Build), "{\"status\":").unwrap();
        assert!(!manager.validate(1, GatePhase::Build));
    }

    #[test]
    fn test_revalidation_overwrites_wholesale() {
        let (_dir, manager) = manager();
        manager.create(1, GatePhase::Build, checks()).unwrap();

        let mut second = CheckMap::new();
        second.insert("escalation".to_string(), CheckRecord::pass("none"));
        manager.create(1, GatePhase::Build, second).unwrap();

        let lock = manager.load(1, GatePhase::Build).unwrap().unwrap();
        assert_eq!(lock.checks.keys().collect::<Vec<_>>(), vec!["escalation"]);
    }
}
