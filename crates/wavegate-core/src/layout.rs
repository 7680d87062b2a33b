//! On-disk layout of a wavegate project
//!
//! Everything lives under `<project>/.wavegate/`:
//!
//! ```text
//! .wavegate/
//!   config.toml
//!   EMERGENCY_STOP
//!   notifications.jsonl
//!   escalations/wave-<n>.json
//!   signals/wave-<n>/{qa-rejections,cost,errors,heartbeat}.json
//!   state/wave-<n>/breaker.json
//!   state/wave-<n>/locks/phase-<p>.json
//!   work-items/wave-<n>/*.json
//! ```
//!
//! All writes go through [`write_atomic`]: a temp file in the destination
//! directory renamed over the target, so concurrent readers see either the
//! old document or the new one, never a torn write.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::types::{GatePhase, WaveNumber};
use crate::Result;

/// Name of the state directory inside a project
pub const STATE_DIR: &str = ".wavegate";

/// Resolves every persisted entity to its path for one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    project_root: PathBuf,
    base: PathBuf,
}

impl StateLayout {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let base = project_root.join(STATE_DIR);
        Self { project_root, base }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn config_path(&self) -> PathBuf {
        self.base.join("config.toml")
    }

    /// Presence of this file halts every agent
    pub fn emergency_marker(&self) -> PathBuf {
        self.base.join("EMERGENCY_STOP")
    }

    pub fn notifications_log(&self) -> PathBuf {
        self.base.join("notifications.jsonl")
    }

    pub fn escalation(&self, wave: WaveNumber) -> PathBuf {
        self.base.join("escalations").join(format!("wave-{}.json", wave))
    }

    pub fn signals_dir(&self, wave: WaveNumber) -> PathBuf {
        self.base.join("signals").join(format!("wave-{}", wave))
    }

    pub fn state_dir(&self, wave: WaveNumber) -> PathBuf {
        self.base.join("state").join(format!("wave-{}", wave))
    }

    pub fn breaker_state(&self, wave: WaveNumber) -> PathBuf {
        self.state_dir(wave).join("breaker.json")
    }

    pub fn locks_dir(&self, wave: WaveNumber) -> PathBuf {
        self.state_dir(wave).join("locks")
    }

    pub fn gate_lock(&self, wave: WaveNumber, phase: GatePhase) -> PathBuf {
        self.locks_dir(wave).join(format!("phase-{}.json", phase.number()))
    }

    pub fn work_items_dir(&self, wave: WaveNumber) -> PathBuf {
        self.base.join("work-items").join(format!("wave-{}", wave))
    }

    /// Candidate completion-signal locations for a domain, in lookup order
    pub fn completion_candidates(&self, wave: WaveNumber, domain: &str) -> Vec<PathBuf> {
        let signals = self.signals_dir(wave);
        vec![
            signals.join(format!("{}-complete.json", domain)),
            signals.join(domain).join("complete.json"),
            self.base
                .join("signals")
                .join(format!("wave-{}-{}-complete.json", wave, domain)),
        ]
    }

    /// Create the directory skeleton for a wave
    pub fn ensure_wave_dirs(&self, wave: WaveNumber) -> Result<()> {
        std::fs::create_dir_all(self.signals_dir(wave))?;
        std::fs::create_dir_all(self.locks_dir(wave))?;
        std::fs::create_dir_all(self.work_items_dir(wave))?;
        if let Some(parent) = self.escalation(wave).parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

/// Replace `path` with `bytes` in one rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Serialize `value` as pretty JSON and replace `path` atomically
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)
}

/// Read a JSON document, `Ok(None)` when the file does not exist
///
/// Parse failures and other I/O errors are returned; callers decide whether
/// they collapse to a default.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Remove a file, treating "already gone" as success
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
