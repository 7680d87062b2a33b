//! Integration tests for the breaker and gate working over one project
//!
//! Covers:
//! - Phase ordering through gate locks
//! - Domain-conditional completion checks driven by work items
//! - Breaker trips blocking the gate and resets restoring it

use std::path::Path;
use tempfile::TempDir;
use wavegate_breaker::{CircuitBreakerMonitor, Thresholds};
use wavegate_core::{CheckStatus, GateConfig, GatePhase, SignalKind, StateLayout};
use wavegate_gate::{
    FileLockManager, GateOutcome, LockManager, PhaseGateValidator, ValidateOptions,
    CHECK_CIRCUIT_BREAKER, CHECK_EMERGENCY_STOP,
};

/// Helper to write a file under the project, creating parents
fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Helper to set up a wave with backend-only work and a completion signal
fn backend_wave(root: &Path, wave: u32) {
    write(
        root,
        &format!(".wavegate/work-items/wave-{}/story-1.json", wave),
        r#"{"id": "S-1", "agent": "backend-dev", "tags": ["api"]}"#,
    );
    write(
        root,
        &format!(".wavegate/signals/wave-{}/backend/complete.json", wave),
        &format!(
            r#"{{"wave": {}, "domain": "backend", "status": "complete", "agent": "backend-dev"}}"#,
            wave
        ),
    );
}

fn gate(root: &Path) -> PhaseGateValidator {
    PhaseGateValidator::new(StateLayout::new(root), GateConfig::default())
}

fn breaker(root: &Path, wave: u32) -> CircuitBreakerMonitor {
    CircuitBreakerMonitor::new(StateLayout::new(root), wave, Thresholds::default())
}

#[test]
fn test_phases_advance_in_order() {
    let dir = TempDir::new().unwrap();
    backend_wave(dir.path(), 1);
    let gate = gate(dir.path());
    let options = ValidateOptions::default();

    let blocked = gate.validate(1, GatePhase::SmokeTest, &options).unwrap();
    assert_eq!(blocked.outcome, GateOutcome::Blocked);

    for phase in GatePhase::ALL {
        let verdict = gate.validate(1, phase, &options).unwrap();
        assert_eq!(verdict.outcome, GateOutcome::Pass, "phase {}", phase);
        assert_eq!(
            verdict.checks["frontend_completion"].status,
            CheckStatus::Skipped
        );
        assert_eq!(verdict.checks["backend_completion"].status, CheckStatus::Pass);
        assert_eq!(
            verdict.checks["repository_clean"].status,
            CheckStatus::Skipped
        );
    }

    let locks = FileLockManager::new(StateLayout::new(dir.path()));
    assert_eq!(locks.passed_phases(1), GatePhase::ALL.to_vec());
    assert!(!locks.validate(2, GatePhase::Build));
}

#[test]
fn test_lock_records_checks_for_audit() {
    let dir = TempDir::new().unwrap();
    backend_wave(dir.path(), 3);

    gate(dir.path())
        .validate(3, GatePhase::Build, &ValidateOptions::default())
        .unwrap();

    let raw = std::fs::read_to_string(dir.path().join(".wavegate/state/wave-3/locks/phase-1.json"))
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["status"], "PASSED");
    assert_eq!(value["phase"], 1);
    assert_eq!(value["checks"]["backend_completion"]["status"], "PASS");
}

#[test]
fn test_frontend_work_without_signal_fails() {
    let dir = TempDir::new().unwrap();
    backend_wave(dir.path(), 1);
    write(
        dir.path(),
        ".wavegate/work-items/wave-1/story-2.json",
        r#"{"id": "S-2", "domain": "Frontend"}"#,
    );

    let verdict = gate(dir.path())
        .validate(1, GatePhase::Build, &ValidateOptions::default())
        .unwrap();

    assert_eq!(verdict.outcome, GateOutcome::Fail);
    assert_eq!(verdict.checks["frontend_completion"].status, CheckStatus::Fail);
    assert_eq!(verdict.checks["backend_completion"].status, CheckStatus::Pass);
    assert!(verdict.lock.is_none());
}

#[test]
fn test_breaker_trip_blocks_gate_until_reset() {
    let dir = TempDir::new().unwrap();
    backend_wave(dir.path(), 1);
    let gate = gate(dir.path());
    let breaker = breaker(dir.path(), 1);
    let options = ValidateOptions::default();

    assert_eq!(
        gate.validate(1, GatePhase::Build, &options).unwrap().outcome,
        GateOutcome::Pass
    );

    write(
        dir.path(),
        &format!(".wavegate/signals/wave-1/{}", SignalKind::QaRejectionCount.file_name()),
        r#"{"count": 5}"#,
    );
    assert!(breaker.check().unwrap().is_open());

    let verdict = gate.validate(1, GatePhase::SmokeTest, &options).unwrap();
    assert_eq!(verdict.outcome, GateOutcome::Fail);
    assert_eq!(verdict.checks[CHECK_CIRCUIT_BREAKER].status, CheckStatus::Fail);
    assert_eq!(verdict.checks[CHECK_EMERGENCY_STOP].status, CheckStatus::Fail);

    // Reset closes the breaker but the rejection signal is still there
    breaker.reset().unwrap();
    write(
        dir.path(),
        &format!(".wavegate/signals/wave-1/{}", SignalKind::QaRejectionCount.file_name()),
        r#"{"count": 0}"#,
    );
    assert!(!breaker.check().unwrap().is_open());

    let verdict = gate.validate(1, GatePhase::SmokeTest, &options).unwrap();
    assert_eq!(verdict.outcome, GateOutcome::Pass);
}

#[test]
fn test_trip_in_other_wave_stops_everyone() {
    let dir = TempDir::new().unwrap();
    backend_wave(dir.path(), 1);
    backend_wave(dir.path(), 2);

    breaker(dir.path(), 2).trip("operator halt").unwrap();

    let verdict = gate(dir.path())
        .validate(1, GatePhase::Build, &ValidateOptions::default())
        .unwrap();
    assert_eq!(verdict.outcome, GateOutcome::Fail);
    assert_eq!(verdict.checks[CHECK_CIRCUIT_BREAKER].status, CheckStatus::Pass);
    assert_eq!(verdict.checks[CHECK_EMERGENCY_STOP].status, CheckStatus::Fail);
    assert!(verdict.checks[CHECK_EMERGENCY_STOP]
        .detail
        .contains("operator halt"));
}
