//! Phase gate validator
//!
//! Decides whether a wave may advance into a phase. The prerequisite lock is
//! checked first; without it the result is BLOCKED and nothing else runs.
//! Every other check is independent: one failing or unreadable input never
//! stops the rest from being evaluated, so the verdict always carries the
//! full picture.

use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};
use wavegate_core::layout::read_json;
use wavegate_core::{
    BreakerState, BreakerStatus, CheckMap, CheckRecord, CompletionSignal, EmergencyMarker,
    Escalation, GateConfig, GateLock, GatePhase, Result, SignalStore, StateLayout, WaveNumber,
};

use crate::lock::{FileLockManager, LockManager};
use crate::repository::{GitProbe, RepositoryProbe, RepositoryState};
use crate::work_items::{FileWorkItemIndex, WorkItemIndex};

pub const CHECK_PREREQUISITE: &str = "prerequisite_lock";
pub const CHECK_REPOSITORY: &str = "repository_clean";
pub const CHECK_EMERGENCY_STOP: &str = "emergency_stop";
pub const CHECK_ESCALATION: &str = "escalation";
pub const CHECK_CIRCUIT_BREAKER: &str = "circuit_breaker";

/// Name of the completion check for a domain
pub fn completion_check_name(domain: &str) -> String {
    format!("{}_completion", domain)
}

/// Options for one validation run
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateOptions {
    /// Evaluate everything but never write a lock
    pub dry_run: bool,
    /// Record the repository check as SKIPPED
    pub skip_repository_check: bool,
    /// Log every check result at info level
    pub verbose: bool,
}

/// Overall gate result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateOutcome {
    Pass,
    Fail,
    /// Prerequisite lock missing; no other check was run
    Blocked,
}

impl fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
            Self::Blocked => write!(f, "BLOCKED"),
        }
    }
}

/// Result of validating one (wave, phase)
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub wave: WaveNumber,
    pub phase: GatePhase,
    pub outcome: GateOutcome,
    pub checks: CheckMap,
    /// Lock written by this run, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock: Option<GateLock>,
}

impl Verdict {
    pub fn failed_checks(&self) -> impl Iterator<Item = (&String, &CheckRecord)> {
        self.checks
            .iter()
            .filter(|(_, record)| !record.status.is_acceptable())
    }
}

/// Runs the gate checks for a project
pub struct PhaseGateValidator {
    layout: StateLayout,
    signals: SignalStore,
    config: GateConfig,
    locks: Box<dyn LockManager>,
    work_items: Box<dyn WorkItemIndex>,
    repository: Box<dyn RepositoryProbe>,
}

impl PhaseGateValidator {
    pub fn new(layout: StateLayout, config: GateConfig) -> Self {
        Self {
            signals: SignalStore::new(layout.clone()),
            locks: Box::new(FileLockManager::new(layout.clone())),
            work_items: Box::new(FileWorkItemIndex::new(layout.clone())),
            repository: Box::new(GitProbe),
            layout,
            config,
        }
    }

    pub fn with_lock_manager(mut self, locks: Box<dyn LockManager>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_work_items(mut self, work_items: Box<dyn WorkItemIndex>) -> Self {
        self.work_items = work_items;
        self
    }

    pub fn with_repository_probe(mut self, repository: Box<dyn RepositoryProbe>) -> Self {
        self.repository = repository;
        self
    }

    /// Validate advancement into `phase` of `wave`
    ///
    /// Returns `Err` only when a passing verdict could not be persisted.
    pub fn validate(
        &self,
        wave: WaveNumber,
        phase: GatePhase,
        options: &ValidateOptions,
    ) -> Result<Verdict> {
        let mut checks = CheckMap::new();

        match phase.previous() {
            Some(required) if !self.locks.validate(wave, required) => {
                checks.insert(
                    CHECK_PREREQUISITE.to_string(),
                    CheckRecord::fail(format!(
                        "No valid lock for phase {} ({}) of wave {}",
                        required.number(),
                        required.name(),
                        wave
                    )),
                );
                warn!(wave, phase = phase.number(), "Gate BLOCKED: prerequisite lock missing");
                return Ok(Verdict {
                    wave,
                    phase,
                    outcome: GateOutcome::Blocked,
                    checks,
                    lock: None,
                });
            }
            Some(required) => {
                checks.insert(
                    CHECK_PREREQUISITE.to_string(),
                    CheckRecord::pass(format!("Phase {} lock valid", required.number())),
                );
            }
            None => {
                checks.insert(
                    CHECK_PREREQUISITE.to_string(),
                    CheckRecord::skipped("First phase has no prerequisite"),
                );
            }
        }

        for domain in &self.config.domains {
            checks.insert(
                completion_check_name(domain),
                self.check_completion(wave, domain),
            );
        }

        let repository = if options.skip_repository_check {
            CheckRecord::skipped("Repository check skipped by request")
        } else {
            self.check_repository()
        };
        checks.insert(CHECK_REPOSITORY.to_string(), repository);
        checks.insert(CHECK_EMERGENCY_STOP.to_string(), self.check_emergency_stop());
        checks.insert(CHECK_ESCALATION.to_string(), self.check_escalation(wave));
        checks.insert(CHECK_CIRCUIT_BREAKER.to_string(), self.check_breaker(wave));

        for (name, record) in &checks {
            if options.verbose {
                info!(check = %name, status = %record.status, "{}", record.detail);
            } else {
                debug!(check = %name, status = %record.status, "{}", record.detail);
            }
        }

        let passed = checks.values().all(|record| record.status.is_acceptable());
        if !passed {
            info!(wave, phase = phase.number(), "Gate FAIL");
            return Ok(Verdict {
                wave,
                phase,
                outcome: GateOutcome::Fail,
                checks,
                lock: None,
            });
        }

        let lock = if options.dry_run {
            info!(wave, phase = phase.number(), "Gate PASS (dry run, no lock written)");
            None
        } else {
            info!(wave, phase = phase.number(), "Gate PASS");
            Some(self.locks.create(wave, phase, checks.clone())?)
        };

        Ok(Verdict {
            wave,
            phase,
            outcome: GateOutcome::Pass,
            checks,
            lock,
        })
    }

    fn check_completion(&self, wave: WaveNumber, domain: &str) -> CheckRecord {
        if !self.work_items.has_stories_for_domain(wave, domain) {
            return CheckRecord::skipped(format!("No {} work items in wave {}", domain, wave));
        }

        match self.signals.read_completion(wave, domain) {
            CompletionSignal::Missing => CheckRecord::fail(format!(
                "No {} completion signal for wave {}",
                domain, wave
            )),
            CompletionSignal::Malformed { path, reason } => {
                CheckRecord::fail(format!("Invalid signal {}: {}", path.display(), reason))
            }
            CompletionSignal::Present { path, document } => {
                if document.wave != wave {
                    CheckRecord::fail(format!(
                        "{} reports wave {}, expected {}",
                        path.display(),
                        document.wave,
                        wave
                    ))
                } else if !document.domain.eq_ignore_ascii_case(domain) {
                    CheckRecord::fail(format!(
                        "{} reports domain '{}', expected '{}'",
                        path.display(),
                        document.domain,
                        domain
                    ))
                } else if !self.is_accepted_status(&document.status) {
                    CheckRecord::fail(format!(
                        "{} status '{}' is not a completion status",
                        domain, document.status
                    ))
                } else {
                    CheckRecord::pass(format!("{} complete ({})", domain, document.status))
                }
            }
        }
    }

    fn is_accepted_status(&self, status: &str) -> bool {
        self.config
            .accepted_statuses
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(status.trim()))
    }

    fn check_repository(&self) -> CheckRecord {
        match self.repository.inspect(self.layout.project_root()) {
            Ok(RepositoryState::NoHistory) => {
                CheckRecord::skipped("No version control in project")
            }
            Ok(RepositoryState::Clean) => CheckRecord::pass("No merge conflicts"),
            Ok(RepositoryState::Conflicted { paths }) => CheckRecord::fail(format!(
                "{} conflicted path(s): {}",
                paths.len(),
                paths.join(", ")
            )),
            Err(e) => CheckRecord::fail(format!("Repository state unknown: {}", e)),
        }
    }

    fn check_emergency_stop(&self) -> CheckRecord {
        let path = self.layout.emergency_marker();
        if !path.exists() {
            return CheckRecord::pass("No emergency stop");
        }

        // Presence alone fails the check; the contents only improve the message
        match read_json::<EmergencyMarker>(&path) {
            Ok(Some(marker)) => CheckRecord::fail(format!(
                "Emergency stop set by wave {}: {}",
                marker.wave, marker.reason
            )),
            _ => CheckRecord::fail(format!("Emergency stop present at {}", path.display())),
        }
    }

    fn check_escalation(&self, wave: WaveNumber) -> CheckRecord {
        match read_json::<Escalation>(&self.layout.escalation(wave)) {
            Ok(None) => CheckRecord::pass("No escalation"),
            Ok(Some(escalation)) if escalation.resolved => {
                CheckRecord::pass(format!("Escalation resolved: {}", escalation.message))
            }
            Ok(Some(escalation)) => {
                CheckRecord::fail(format!("Unresolved escalation: {}", escalation.message))
            }
            Err(e) => CheckRecord::fail(format!("Escalation record unreadable: {}", e)),
        }
    }

    fn check_breaker(&self, wave: WaveNumber) -> CheckRecord {
        match read_json::<BreakerState>(&self.layout.breaker_state(wave)) {
            Ok(None) => CheckRecord::pass("Circuit breaker closed (not yet evaluated)"),
            Ok(Some(state)) => match state.status {
                BreakerStatus::Closed => CheckRecord::pass("Circuit breaker closed"),
                BreakerStatus::Open { reason, .. } => {
                    CheckRecord::fail(format!("Circuit breaker open: {}", reason))
                }
            },
            Err(e) => CheckRecord::fail(format!("Circuit breaker state unreadable: {}", e)),
        }
    }
}
