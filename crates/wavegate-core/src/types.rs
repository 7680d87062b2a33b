//! Core type definitions for wave coordination

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wave number (1-indexed)
pub type WaveNumber = u32;

/// Ordered checkpoint within a wave
///
/// The phase set is fixed. Phase N can only be gated once phase N-1 holds a
/// valid lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum GatePhase {
    Build = 1,
    SmokeTest = 2,
    DevComplete = 3,
    Qa = 4,
}

impl GatePhase {
    /// All phases in order
    pub const ALL: [GatePhase; 4] = [
        GatePhase::Build,
        GatePhase::SmokeTest,
        GatePhase::DevComplete,
        GatePhase::Qa,
    ];

    pub fn number(self) -> u32 {
        self as u32
    }

    pub fn from_number(number: u32) -> Option<Self> {
        match number {
            1 => Some(Self::Build),
            2 => Some(Self::SmokeTest),
            3 => Some(Self::DevComplete),
            4 => Some(Self::Qa),
            _ => None,
        }
    }

    /// The phase whose lock must exist before this one can be gated
    pub fn previous(self) -> Option<Self> {
        Self::from_number(self.number() - 1)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::SmokeTest => "smoke_test",
            Self::DevComplete => "development_complete",
            Self::Qa => "qa",
        }
    }
}

impl std::fmt::Display for GatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.number(), self.name())
    }
}

impl std::str::FromStr for GatePhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1" | "build" => Ok(Self::Build),
            "2" | "smoke_test" | "smoke-test" | "smoke" => Ok(Self::SmokeTest),
            "3" | "development_complete" | "dev-complete" | "dev_complete" => {
                Ok(Self::DevComplete)
            }
            "4" | "qa" => Ok(Self::Qa),
            _ => Err(format!("Invalid phase: {} (expected 1-4)", s)),
        }
    }
}

impl From<GatePhase> for u32 {
    fn from(phase: GatePhase) -> Self {
        phase.number()
    }
}

impl TryFrom<u32> for GatePhase {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_number(value).ok_or_else(|| format!("Invalid phase: {} (expected 1-4)", value))
    }
}

/// Breaker status as a tagged union
///
/// Serialized inline with the owning record as `"status": "CLOSED"` or
/// `"status": "OPEN"` plus the open-only fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum BreakerStatus {
    Closed,
    Open {
        reason: String,
        tripped_at: DateTime<Utc>,
    },
}

impl BreakerStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Trip reason, if open
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Closed => None,
            Self::Open { reason, .. } => Some(reason),
        }
    }
}

impl std::fmt::Display for BreakerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open { reason, .. } => write!(f, "OPEN ({})", reason),
        }
    }
}

/// Persisted circuit breaker record for one wave
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerState {
    pub wave: WaveNumber,
    #[serde(flatten)]
    pub status: BreakerStatus,
    /// Incremented on every persisted transition
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl BreakerState {
    /// Fresh closed record (version 0, never persisted)
    pub fn closed(wave: WaveNumber, now: DateTime<Utc>) -> Self {
        Self {
            wave,
            status: BreakerStatus::Closed,
            version: 0,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

/// Halt marker written next to the breaker state when it trips
///
/// Agents only look at whether the file exists; the contents are for humans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyMarker {
    pub wave: WaveNumber,
    pub reason: String,
    pub tripped_at: DateTime<Utc>,
}

/// Result of a single gate check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

impl CheckStatus {
    /// PASS and SKIPPED both allow progression
    pub fn is_acceptable(self) -> bool {
        !matches!(self, Self::Fail)
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Structured record of one check, kept for audit inside gate locks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckRecord {
    pub fn pass(detail: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Pass,
            detail: detail.into(),
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Fail,
            detail: detail.into(),
        }
    }

    pub fn skipped(detail: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Skipped,
            detail: detail.into(),
        }
    }
}

/// Check results keyed by check name
pub type CheckMap = BTreeMap<String, CheckRecord>;

/// Gate lock status; only passed locks are ever written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LockStatus {
    Passed,
}

/// Immutable record asserting a phase's validation passed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateLock {
    pub wave: WaveNumber,
    pub phase: GatePhase,
    pub status: LockStatus,
    pub checks: CheckMap,
    pub created_at: DateTime<Utc>,
}

/// Unresolved incident record blocking phase progression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    #[serde(default)]
    pub wave: Option<WaveNumber>,
    pub message: String,
    #[serde(default)]
    pub resolved: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering() {
        assert_eq!(GatePhase::Build.previous(), None);
        assert_eq!(GatePhase::Qa.previous(), Some(GatePhase::DevComplete));
        assert_eq!("3".parse::<GatePhase>().unwrap(), GatePhase::DevComplete);
        assert_eq!("smoke-test".parse::<GatePhase>().unwrap(), GatePhase::SmokeTest);
        assert!("5".parse::<GatePhase>().is_err());
        assert!(GatePhase::try_from(0).is_err());
    }

    #[test]
    fn test_breaker_state_inline_status() {
        let now = Utc::now();
        let state = BreakerState {
            wave: 2,
            status: BreakerStatus::Open {
                reason: "QA rejections 3/3".to_string(),
                tripped_at: now,
            },
            version: 1,
            updated_at: now,
        };

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "OPEN");
        assert_eq!(json["reason"], "QA rejections 3/3");

        let decoded: BreakerState = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_closed_state_has_no_reason() {
        let state = BreakerState::closed(1, Utc::now());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "CLOSED");
        assert!(json.get("reason").is_none());
        assert_eq!(state.status.reason(), None);
    }

    #[test]
    fn test_gate_lock_phase_serialized_as_number() {
        let lock = GateLock {
            wave: 1,
            phase: GatePhase::SmokeTest,
            status: LockStatus::Passed,
            checks: CheckMap::new(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&lock).unwrap();
        assert_eq!(json["phase"], 2);
        assert_eq!(json["status"], "PASSED");
    }

    #[test]
    fn test_escalation_resolved_defaults_false() {
        let escalation: Escalation =
            serde_json::from_str(r#"{"message": "prod outage"}"#).unwrap();
        assert!(!escalation.resolved);
    }
}
