//! Signal Store: read-only access to externally produced evidence
//!
//! Producers (agents, QA tooling, cost trackers) drop JSON documents under
//! `.wavegate/signals/wave-<n>/`. This module never writes them.
//!
//! Threshold reads are fail-open: a missing document is the documented
//! default and a malformed one is logged and treated the same way. Default
//! values:
//!
//! | Read | Default |
//! | --- | --- |
//! | [`SignalStore::read_count`] | `0` |
//! | [`SignalStore::read_scalar`] | `0.00` |
//! | [`SignalStore::read_max_repeat`] | no repeats |
//! | [`SignalStore::read_timestamp`] | `None` (not stuck) |
//! | [`SignalStore::read_completion`] | [`CompletionSignal::Missing`] |
//!
//! Completion reads are the exception: they report what was found so the
//! gate can fail closed on it.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::fail_open::{fail_open, fail_open_or};
use crate::layout::{read_json, StateLayout};
use crate::types::WaveNumber;
use crate::WaveGateError;

/// Threshold evidence kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    QaRejectionCount,
    CostTotal,
    ErrorLog,
    Heartbeat,
}

impl SignalKind {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::QaRejectionCount => "qa-rejections.json",
            Self::CostTotal => "cost.json",
            Self::ErrorLog => "errors.json",
            Self::Heartbeat => "heartbeat.json",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QaRejectionCount => write!(f, "qa_rejection_count"),
            Self::CostTotal => write!(f, "cost_total"),
            Self::ErrorLog => write!(f, "error_log"),
            Self::Heartbeat => write!(f, "heartbeat"),
        }
    }
}

/// Most frequent identical message in an error log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepeatedError {
    pub count: u64,
    pub message: Option<String>,
}

/// Everything the breaker thresholds look at, read once
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalSnapshot {
    pub qa_rejections: u64,
    pub cost_total: f64,
    pub repeated_error: RepeatedError,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// Parsed completion marker written by a domain's agents
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompletionDocument {
    #[serde(deserialize_with = "deserialize_wave")]
    pub wave: WaveNumber,
    pub domain: String,
    pub status: String,
    #[serde(default)]
    pub agent: Option<String>,
}

/// What was found when looking for a domain's completion signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionSignal {
    /// None of the candidate locations exist
    Missing,
    /// The first existing candidate could not be read or parsed
    Malformed { path: PathBuf, reason: String },
    Present {
        path: PathBuf,
        document: CompletionDocument,
    },
}

/// Read-only view over one project's signal documents
#[derive(Debug, Clone)]
pub struct SignalStore {
    layout: StateLayout,
}

impl SignalStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn signal_path(&self, wave: WaveNumber, kind: SignalKind) -> PathBuf {
        self.layout.signals_dir(wave).join(kind.file_name())
    }

    /// Integer count signal, `0` when absent or malformed
    pub fn read_count(&self, wave: WaveNumber, kind: SignalKind) -> u64 {
        let path = self.signal_path(wave, kind);
        fail_open_or(&format!("signals::{}", kind), 0, || {
            match read_json::<Value>(&path)? {
                None => {
                    debug!(wave, signal = %kind, "signal absent, using 0");
                    Ok(0)
                }
                Some(value) => count_from(&value)
                    .ok_or_else(|| malformed(&path, "expected a non-negative count")),
            }
        })
    }

    /// Decimal scalar signal, `0.00` when absent or malformed
    pub fn read_scalar(&self, wave: WaveNumber, kind: SignalKind) -> f64 {
        let path = self.signal_path(wave, kind);
        fail_open_or(&format!("signals::{}", kind), 0.0, || {
            match read_json::<Value>(&path)? {
                None => {
                    debug!(wave, signal = %kind, "signal absent, using 0.00");
                    Ok(0.0)
                }
                Some(value) => scalar_from(&value)
                    .ok_or_else(|| malformed(&path, "expected a non-negative amount")),
            }
        })
    }

    /// Highest repeat count of one identical message in the error log
    pub fn read_max_repeat(&self, wave: WaveNumber) -> RepeatedError {
        let path = self.signal_path(wave, SignalKind::ErrorLog);
        fail_open_or("signals::error_log", RepeatedError::default(), || {
            match read_json::<Value>(&path)? {
                None => Ok(RepeatedError::default()),
                Some(value) => error_messages(&value)
                    .map(|messages| max_repeat(&messages))
                    .ok_or_else(|| malformed(&path, "expected an array of errors")),
            }
        })
    }

    /// Last heartbeat, `None` when absent or malformed
    pub fn read_timestamp(&self, wave: WaveNumber) -> Option<DateTime<Utc>> {
        let path = self.signal_path(wave, SignalKind::Heartbeat);
        fail_open("signals::heartbeat", || match read_json::<Value>(&path)? {
            None => Ok(None),
            Some(value) => timestamp_from(&value)
                .map(Some)
                .ok_or_else(|| malformed(&path, "expected an RFC 3339 timestamp")),
        })
        .flatten()
    }

    /// Look up a domain's completion signal; the first existing candidate wins
    pub fn read_completion(&self, wave: WaveNumber, domain: &str) -> CompletionSignal {
        for path in self.layout.completion_candidates(wave, domain) {
            if !path.is_file() {
                continue;
            }

            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    return CompletionSignal::Malformed {
                        path,
                        reason: format!("unreadable: {}", e),
                    }
                }
            };

            return match serde_json::from_str::<CompletionDocument>(&content) {
                Ok(document) => CompletionSignal::Present { path, document },
                Err(e) => CompletionSignal::Malformed {
                    path,
                    reason: e.to_string(),
                },
            };
        }

        CompletionSignal::Missing
    }

    /// Read all threshold evidence for a wave
    pub fn snapshot(&self, wave: WaveNumber) -> SignalSnapshot {
        SignalSnapshot {
            qa_rejections: self.read_count(wave, SignalKind::QaRejectionCount),
            cost_total: self.read_scalar(wave, SignalKind::CostTotal),
            repeated_error: self.read_max_repeat(wave),
            last_heartbeat: self.read_timestamp(wave),
        }
    }
}

fn malformed(path: &Path, reason: &str) -> WaveGateError {
    WaveGateError::MalformedSignal {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn count_from(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => map.get("count").and_then(count_from),
        _ => None,
    }
}

fn scalar_from(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches('$').parse().ok(),
        Value::Object(map) => return map.get("total").and_then(scalar_from),
        _ => None,
    };
    amount.filter(|f| f.is_finite() && *f >= 0.0)
}

fn error_messages(value: &Value) -> Option<Vec<String>> {
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(map) => map.get("errors")?.as_array()?,
        _ => return None,
    };

    Some(
        entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => map
                    .get("message")
                    .or_else(|| map.get("error"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
    )
}

// Ties go to the message that reached the count first.
fn max_repeat(messages: &[String]) -> RepeatedError {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    let mut best = RepeatedError::default();

    for message in messages {
        let message = message.trim();
        if message.is_empty() {
            continue;
        }
        let count = counts.entry(message).or_insert(0);
        *count += 1;
        if *count > best.count {
            best = RepeatedError {
                count: *count,
                message: Some(message.to_string()),
            };
        }
    }

    best
}

fn timestamp_from(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        Value::Object(map) => map.get("timestamp").and_then(timestamp_from),
        _ => None,
    }
}

fn deserialize_wave<'de, D>(deserializer: D) -> std::result::Result<WaveNumber, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawWave {
        Number(WaveNumber),
        Text(String),
    }

    match RawWave::deserialize(deserializer)? {
        RawWave::Number(n) => Ok(n),
        RawWave::Text(s) => s
            .trim()
            .trim_start_matches("wave-")
            .parse()
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, SignalStore) {
        let dir = TempDir::new().unwrap();
        let store = SignalStore::new(StateLayout::new(dir.path()));
        (dir, store)
    }

    fn write_signal(store: &SignalStore, wave: WaveNumber, kind: SignalKind, content: &str) {
        let path = store.signal_path(wave, kind);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_empty_store_defaults() {
        let (_dir, store) = store();
        let snapshot = store.snapshot(1);

        assert_eq!(snapshot.qa_rejections, 0);
        assert_eq!(snapshot.cost_total, 0.0);
        assert_eq!(snapshot.repeated_error, RepeatedError::default());
        assert_eq!(snapshot.last_heartbeat, None);
        assert_eq!(store.read_completion(1, "backend"), CompletionSignal::Missing);
    }

    #[test]
    fn test_count_formats() {
        let (_dir, store) = store();

        write_signal(&store, 1, SignalKind::QaRejectionCount, r#"{"count": 2}"#);
        assert_eq!(store.read_count(1, SignalKind::QaRejectionCount), 2);

        write_signal(&store, 1, SignalKind::QaRejectionCount, "4");
        assert_eq!(store.read_count(1, SignalKind::QaRejectionCount), 4);
    }

    #[test]
    fn test_malformed_count_is_zero() {
        let (_dir, store) = store();
        write_signal(&store, 1, SignalKind::QaRejectionCount, r#"{"count": "#);
        assert_eq!(store.read_count(1, SignalKind::QaRejectionCount), 0);

        write_signal(&store, 1, SignalKind::QaRejectionCount, r#"{"count": -3}"#);
        assert_eq!(store.read_count(1, SignalKind::QaRejectionCount), 0);
    }

    #[test]
    fn test_scalar_formats() {
        let (_dir, store) = store();

        write_signal(&store, 1, SignalKind::CostTotal, r#"{"total": 42.5}"#);
        assert_eq!(store.read_scalar(1, SignalKind::CostTotal), 42.5);

        write_signal(&store, 1, SignalKind::CostTotal, r#"{"total": "$17.25"}"#);
        assert_eq!(store.read_scalar(1, SignalKind::CostTotal), 17.25);

        write_signal(&store, 1, SignalKind::CostTotal, r#"["nope"]"#);
        assert_eq!(store.read_scalar(1, SignalKind::CostTotal), 0.0);
    }

    #[test]
    fn test_max_repeat_counts_identical_messages() {
        let (_dir, store) = store();
        write_signal(
            &store,
            1,
            SignalKind::ErrorLog,
            r#"{"errors": [
                {"message": "connection refused"},
                "timeout",
                {"error": "connection refused "},
                {"message": "timeout"},
                {"message": "connection refused"}
            ]}"#,
        );

        let repeated = store.read_max_repeat(1);
        assert_eq!(repeated.count, 3);
        assert_eq!(repeated.message.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_max_repeat_tie_goes_to_first() {
        let repeated = max_repeat(&[
            "b".to_string(),
            "a".to_string(),
            "a".to_string(),
            "b".to_string(),
        ]);
        assert_eq!(repeated.count, 2);
        assert_eq!(repeated.message.as_deref(), Some("a"));
    }

    #[test]
    fn test_heartbeat_formats() {
        let (_dir, store) = store();

        write_signal(
            &store,
            1,
            SignalKind::Heartbeat,
            r#"{"timestamp": "2026-01-02T03:04:05Z"}"#,
        );
        let ts = store.read_timestamp(1).unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-01-02T03:04:05+00:00");

        write_signal(&store, 1, SignalKind::Heartbeat, r#"{"timestamp": "yesterday"}"#);
        assert_eq!(store.read_timestamp(1), None);
    }

    #[test]
    fn test_completion_first_candidate_wins() {
        let (_dir, store) = store();
        let candidates = store.layout().completion_candidates(2, "frontend");

        std::fs::create_dir_all(candidates[1].parent().unwrap()).unwrap();
        std::fs::write(
            &candidates[1],
            r#"{"wave": 2, "domain": "frontend", "status": "complete"}"#,
        )
        .unwrap();

        match store.read_completion(2, "frontend") {
            CompletionSignal::Present { path, document } => {
                assert_eq!(path, candidates[1]);
                assert_eq!(document.status, "complete");
            }
            other => panic!("expected present signal, got {:?}", other),
        }

        // A broken earlier candidate shadows the valid later one
        std::fs::create_dir_all(candidates[0].parent().unwrap()).unwrap();
        std::fs::write(&candidates[0], "{").unwrap();
        assert!(matches!(
            store.read_completion(2, "frontend"),
            CompletionSignal::Malformed { .. }
        ));
    }

    #[test]
    fn test_completion_missing_fields_is_malformed() {
        let (_dir, store) = store();
        let path = store.layout().completion_candidates(1, "backend").remove(0);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"status": "complete"}"#).unwrap();

        match store.read_completion(1, "backend") {
            CompletionSignal::Malformed { reason, .. } => assert!(reason.contains("wave")),
            other => panic!("expected malformed signal, got {:?}", other),
        }
    }

    #[test]
    fn test_completion_wave_as_string() {
        let (_dir, store) = store();
        let path = store.layout().completion_candidates(3, "backend").remove(0);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{"wave": "wave-3", "domain": "backend", "status": "SUCCESS"}"#,
        )
        .unwrap();

        match store.read_completion(3, "backend") {
            CompletionSignal::Present { document, .. } => assert_eq!(document.wave, 3),
            other => panic!("expected present signal, got {:?}", other),
        }
    }
}
