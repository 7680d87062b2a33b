//! Work-item index
//!
//! Decides whether a domain has work in a wave. Each JSON file under
//! `.wavegate/work-items/wave-<n>/` is one work item.

use serde::Deserialize;
use std::path::Path;
use tracing::debug;
use wavegate_core::{StateLayout, WaveNumber};

/// Answers "does this domain have work in this wave?"
pub trait WorkItemIndex: Send + Sync {
    fn has_stories_for_domain(&self, wave: WaveNumber, domain: &str) -> bool;
}

/// One work item (story) as written by the planner
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    /// Assigned agent, e.g. `backend-dev`
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl WorkItem {
    /// Match on domain, agent name or tag, case-insensitively
    pub fn matches_domain(&self, domain: &str) -> bool {
        let domain = domain.to_lowercase();

        self.domain
            .as_deref()
            .is_some_and(|d| d.to_lowercase() == domain)
            || self
                .agent
                .as_deref()
                .is_some_and(|a| a.to_lowercase().contains(&domain))
            || self.tags.iter().any(|t| t.to_lowercase() == domain)
    }
}

/// Work items read from the project's work-item directory
#[derive(Debug, Clone)]
pub struct FileWorkItemIndex {
    layout: StateLayout,
}

impl FileWorkItemIndex {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    /// All parseable work items for a wave; unreadable files are skipped
    pub fn items(&self, wave: WaveNumber) -> Vec<WorkItem> {
        let dir = self.layout.work_items_dir(wave);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => {
                debug!(wave, dir = %dir.display(), "no work-item directory");
                return Vec::new();
            }
        };

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        paths.iter().filter_map(|path| read_item(path)).collect()
    }
}

fn read_item(path: &Path) -> Option<WorkItem> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(item) => Some(item),
        Err(e) => {
            debug!(path = %path.display(), "skipping unparseable work item: {}", e);
            None
        }
    }
}

impl WorkItemIndex for FileWorkItemIndex {
    fn has_stories_for_domain(&self, wave: WaveNumber, domain: &str) -> bool {
        self.items(wave).iter().any(|item| item.matches_domain(domain))
    }
}
