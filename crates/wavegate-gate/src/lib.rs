//! # wavegate-gate
//!
//! Phase gate validation for wavegate waves.
//!
//! A wave advances through four fixed phases (build, smoke test,
//! development complete, QA). Advancing into a phase requires a valid lock
//! on the previous one plus a clean set of independent checks; a passing
//! validation writes the lock for the phase.

mod lock;
mod repository;
mod validator;
mod work_items;

pub use lock::{FileLockManager, LockManager};
pub use repository::{GitProbe, RepositoryProbe, RepositoryState};
pub use validator::{
    completion_check_name, GateOutcome, PhaseGateValidator, ValidateOptions, Verdict,
    CHECK_CIRCUIT_BREAKER, CHECK_EMERGENCY_STOP, CHECK_ESCALATION, CHECK_PREREQUISITE,
    CHECK_REPOSITORY,
};
pub use work_items::{FileWorkItemIndex, WorkItem, WorkItemIndex};
