//! Configuration management for wavegate
//!
//! Project-level thresholds for the circuit breaker and the domain list for
//! the phase gate. Every field has a default, so a project without a config
//! file behaves exactly like one with an empty file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::layout::StateLayout;
use crate::{Result, WaveGateError};

/// Project-level configuration
///
/// Loaded from `.wavegate/config.toml` in the project root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaveGateConfig {
    /// Circuit breaker thresholds
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Phase gate settings
    #[serde(default)]
    pub gate: GateConfig,
}

/// Circuit breaker thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// QA rejections before tripping
    #[serde(default = "default_max_qa_rejections")]
    pub max_qa_rejections: u64,

    /// Wave budget in USD; unlimited when absent
    #[serde(default)]
    pub budget_usd: Option<f64>,

    /// Fraction of the budget that trips the breaker
    #[serde(default = "default_budget_ratio")]
    pub budget_ratio: f64,

    /// Identical error messages before tripping
    #[serde(default = "default_max_error_repeats")]
    pub max_error_repeats: u64,

    /// Minutes without a heartbeat before the wave counts as stuck
    #[serde(default = "default_stall_minutes")]
    pub stall_minutes: i64,

    /// Seconds between checks in monitor mode
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Shell command spawned on trip (best-effort)
    #[serde(default)]
    pub notify_command: Option<String>,
}

/// Phase gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Domains whose completion signals are checked
    #[serde(default = "default_domains")]
    pub domains: Vec<String>,

    /// Completion statuses accepted (compared case-insensitively)
    #[serde(default = "default_accepted_statuses")]
    pub accepted_statuses: Vec<String>,
}

// Default value providers
fn default_max_qa_rejections() -> u64 {
    3
}

fn default_budget_ratio() -> f64 {
    0.90
}

fn default_max_error_repeats() -> u64 {
    3
}

fn default_stall_minutes() -> i64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_domains() -> Vec<String> {
    vec!["frontend".to_string(), "backend".to_string()]
}

fn default_accepted_statuses() -> Vec<String> {
    vec![
        "complete".to_string(),
        "completed".to_string(),
        "success".to_string(),
    ]
}

impl WaveGateConfig {
    /// Load configuration from `.wavegate/config.toml` or use defaults
    ///
    /// A missing file yields defaults. A file that exists but does not parse
    /// is an error: silently ignoring it would run with thresholds the
    /// operator did not ask for.
    pub fn load_or_default(project_root: &Path) -> Result<Self> {
        let config_path = StateLayout::new(project_root).config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Self = toml::from_str(&content).map_err(|e| {
                WaveGateError::Config(format!(
                    "Failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.wavegate/config.toml`
    pub fn write_default(project_root: &Path) -> Result<()> {
        let config_path = StateLayout::new(project_root).config_path();
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| WaveGateError::Config(format!("Failed to serialize config: {}", e)))?;
        crate::layout::write_atomic(&config_path, content.as_bytes())
    }

    fn validate(&self) -> Result<()> {
        let b = &self.breaker;
        if !(b.budget_ratio > 0.0 && b.budget_ratio <= 1.0) {
            return Err(WaveGateError::Config(format!(
                "breaker.budget_ratio must be in (0, 1], got {}",
                b.budget_ratio
            )));
        }
        if let Some(budget) = b.budget_usd {
            if !(budget.is_finite() && budget > 0.0) {
                return Err(WaveGateError::Config(format!(
                    "breaker.budget_usd must be a positive amount, got {}",
                    budget
                )));
            }
        }
        if b.poll_interval_secs == 0 {
            return Err(WaveGateError::Config(
                "breaker.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_qa_rejections: default_max_qa_rejections(),
            budget_usd: None,
            budget_ratio: default_budget_ratio(),
            max_error_repeats: default_max_error_repeats(),
            stall_minutes: default_stall_minutes(),
            poll_interval_secs: default_poll_interval_secs(),
            notify_command: None,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            domains: default_domains(),
            accepted_statuses: default_accepted_statuses(),
        }
    }
}
