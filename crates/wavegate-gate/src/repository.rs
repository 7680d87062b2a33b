//! Repository cleanliness probe

use std::path::Path;
use std::process::Command;
use tracing::debug;
use wavegate_core::{Result, WaveGateError};

/// What the probe found in the project's working copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryState {
    /// No version-control history in the project
    NoHistory,
    Clean,
    /// Paths with unresolved merge conflicts
    Conflicted { paths: Vec<String> },
}

/// Inspects a project's working copy (allows mocking in tests)
pub trait RepositoryProbe: Send + Sync {
    fn inspect(&self, project_root: &Path) -> Result<RepositoryState>;
}

/// Git-backed probe using `git diff --diff-filter=U`
#[derive(Debug, Clone, Copy, Default)]
pub struct GitProbe;

impl RepositoryProbe for GitProbe {
    fn inspect(&self, project_root: &Path) -> Result<RepositoryState> {
        if !project_root.join(".git").exists() {
            return Ok(RepositoryState::NoHistory);
        }

        let output = Command::new("git")
            .args(["diff", "--name-only", "--diff-filter=U"])
            .current_dir(project_root)
            .output()
            .map_err(|e| WaveGateError::Vcs(format!("Failed to run git: {}", e)))?;

        if !output.status.success() {
            return Err(WaveGateError::Vcs(format!(
                "git diff failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let paths = conflicted_paths(&String::from_utf8_lossy(&output.stdout));
        debug!(conflicts = paths.len(), "inspected git working copy");

        if paths.is_empty() {
            Ok(RepositoryState::Clean)
        } else {
            Ok(RepositoryState::Conflicted { paths })
        }
    }
}

fn conflicted_paths(stdout: &str) -> Vec<String> {
    let mut paths: Vec<String> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    // Unmerged paths can be listed once per stage
    paths.dedup();
    paths
}
