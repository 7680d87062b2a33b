//! Trip thresholds evaluated over a signal snapshot
//!
//! Rules are an ordered list of (predicate, reason) pairs. Evaluation stops
//! at the first rule that fires, so the order decides which cause is
//! reported when several thresholds are breached at once.

use chrono::{DateTime, Utc};
use serde::Serialize;
use wavegate_core::{BreakerConfig, SignalSnapshot};

/// Budget used when none is configured; the cost rule can never fire
pub const UNLIMITED_BUDGET: f64 = f64::INFINITY;

const BUDGET_TOLERANCE: f64 = 1e-9;

/// Which rule tripped the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TripCondition {
    QaRejections,
    CostBudget,
    RepeatedError,
    Stalled,
}

/// A fired rule with its rendered reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripCause {
    pub condition: TripCondition,
    pub reason: String,
}

/// Signal snapshot plus derived values the rules look at
#[derive(Debug, Clone)]
pub struct Evidence<'a> {
    pub signals: &'a SignalSnapshot,
    /// Whole minutes since the last heartbeat, 0 without one
    pub minutes_since_heartbeat: i64,
}

impl<'a> Evidence<'a> {
    pub fn new(signals: &'a SignalSnapshot, now: DateTime<Utc>) -> Self {
        let minutes_since_heartbeat = signals
            .last_heartbeat
            .map(|last| (now - last).num_minutes().max(0))
            .unwrap_or(0);
        Self {
            signals,
            minutes_since_heartbeat,
        }
    }
}

/// Threshold values for one wave
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thresholds {
    pub max_qa_rejections: u64,
    /// Budget in USD, [`UNLIMITED_BUDGET`] when not supplied
    #[serde(serialize_with = "serialize_budget")]
    pub budget_usd: f64,
    pub budget_ratio: f64,
    pub max_error_repeats: u64,
    pub stall_minutes: i64,
}

struct Rule {
    condition: TripCondition,
    fires: fn(&Thresholds, &Evidence<'_>) -> bool,
    reason: fn(&Thresholds, &Evidence<'_>) -> String,
}

const RULES: [Rule; 4] = [
    Rule {
        condition: TripCondition::QaRejections,
        fires: |t, e| e.signals.qa_rejections >= t.max_qa_rejections,
        reason: |t, e| {
            format!(
                "QA rejection limit reached: {}/{} rejections",
                e.signals.qa_rejections, t.max_qa_rejections
            )
        },
    },
    Rule {
        condition: TripCondition::CostBudget,
        fires: |t, e| t.budget_exceeded(e.signals.cost_total),
        reason: |t, e| {
            format!(
                "Cost ${:.2} reached {:.0}% of ${:.2} budget",
                e.signals.cost_total,
                t.budget_ratio * 100.0,
                t.budget_usd
            )
        },
    },
    Rule {
        condition: TripCondition::RepeatedError,
        fires: |t, e| e.signals.repeated_error.count >= t.max_error_repeats,
        reason: |t, e| {
            format!(
                "Repeated error {}/{} times: {}",
                e.signals.repeated_error.count,
                t.max_error_repeats,
                e.signals.repeated_error.message.as_deref().unwrap_or("<unknown>")
            )
        },
    },
    Rule {
        condition: TripCondition::Stalled,
        fires: |t, e| e.minutes_since_heartbeat >= t.stall_minutes,
        reason: |t, e| {
            format!(
                "No heartbeat for {} minutes (limit {})",
                e.minutes_since_heartbeat, t.stall_minutes
            )
        },
    },
];

impl Thresholds {
    pub fn from_config(config: &BreakerConfig) -> Self {
        Self {
            max_qa_rejections: config.max_qa_rejections,
            budget_usd: config.budget_usd.unwrap_or(UNLIMITED_BUDGET),
            budget_ratio: config.budget_ratio,
            max_error_repeats: config.max_error_repeats,
            stall_minutes: config.stall_minutes,
        }
    }

    /// Override the budget; `None` keeps the configured one
    pub fn with_budget(mut self, budget_usd: Option<f64>) -> Self {
        if let Some(budget) = budget_usd {
            self.budget_usd = budget;
        }
        self
    }

    pub fn has_budget(&self) -> bool {
        self.budget_usd.is_finite()
    }

    /// Cost breach check against `budget_ratio` of the budget
    ///
    /// Relative tolerance absorbs float noise when the cost lands exactly on
    /// the limit; there is no rounding, so 0.899 of a $1 budget stays clear.
    pub fn budget_exceeded(&self, cost_total: f64) -> bool {
        if !self.has_budget() {
            return false;
        }
        let limit = self.budget_usd * self.budget_ratio;
        cost_total >= limit - limit.abs() * BUDGET_TOLERANCE
    }

    /// First rule that fires, in priority order
    pub fn evaluate(&self, evidence: &Evidence<'_>) -> Option<TripCause> {
        RULES
            .iter()
            .find(|rule| (rule.fires)(self, evidence))
            .map(|rule| TripCause {
                condition: rule.condition,
                reason: (rule.reason)(self, evidence),
            })
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from_config(&BreakerConfig::default())
    }
}

fn serialize_budget<S: serde::Serializer>(budget: &f64, s: S) -> Result<S::Ok, S::Error> {
    if budget.is_finite() {
        s.serialize_some(budget)
    } else {
        s.serialize_none()
    }
}
