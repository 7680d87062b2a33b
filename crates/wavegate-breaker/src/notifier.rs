//! Escalation notifier
//!
//! Delivery is best-effort. The breaker wraps every call in
//! [`fail_open`](wavegate_core::fail_open::fail_open), so an implementation
//! may return errors freely; they are logged and dropped. Implementations
//! must not block on the receiving end.

use chrono::Utc;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, warn};
use wavegate_core::{Result, WaveGateError, WaveNumber};

/// Event being delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BreakerTripped,
    BreakerReset,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BreakerTripped => write!(f, "breaker_tripped"),
            Self::BreakerReset => write!(f, "breaker_reset"),
        }
    }
}

/// Receives trip/reset events
pub trait EscalationNotifier: Send + Sync {
    fn notify(&self, kind: NotificationKind, wave: WaveNumber, message: &str) -> Result<()>;
}

/// Emits the event as a log record
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl EscalationNotifier for LogNotifier {
    fn notify(&self, kind: NotificationKind, wave: WaveNumber, message: &str) -> Result<()> {
        warn!(wave, event = %kind, "ESCALATION: {}", message);
        Ok(())
    }
}

#[derive(Serialize)]
struct JournalEntry<'a> {
    kind: NotificationKind,
    wave: WaveNumber,
    message: &'a str,
    at: chrono::DateTime<Utc>,
}

/// Appends one JSON line per event to a journal file
#[derive(Debug, Clone)]
pub struct JournalNotifier {
    path: PathBuf,
}

impl JournalNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EscalationNotifier for JournalNotifier {
    fn notify(&self, kind: NotificationKind, wave: WaveNumber, message: &str) -> Result<()> {
        let entry = JournalEntry {
            kind,
            wave,
            message,
            at: Utc::now(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Spawns a shell hook without waiting for it
///
/// The hook receives `WAVEGATE_EVENT`, `WAVEGATE_WAVE` and `WAVEGATE_MESSAGE`
/// in its environment.
///
/// The hook is not waited on; a detached thread reaps it when it exits.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    command: String,
    shell: PathBuf,
}

impl CommandNotifier {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            shell: PathBuf::from("sh"),
        }
    }

    /// Run the hook through a different shell (`<shell> -c <command>`)
    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }
}

impl EscalationNotifier for CommandNotifier {
    fn notify(&self, kind: NotificationKind, wave: WaveNumber, message: &str) -> Result<()> {
        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(&self.command)
            .env("WAVEGATE_EVENT", kind.to_string())
            .env("WAVEGATE_WAVE", wave.to_string())
            .env("WAVEGATE_MESSAGE", message)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                WaveGateError::Notify(format!("Failed to spawn '{}': {}", self.command, e))
            })?;

        debug!(pid = child.id(), command = %self.command, "notify hook spawned");
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}

/// Delivers to every inner notifier; one failure does not stop the rest
#[derive(Default)]
pub struct FanoutNotifier {
    notifiers: Vec<Box<dyn EscalationNotifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: impl EscalationNotifier + 'static) -> Self {
        self.notifiers.push(Box::new(notifier));
        self
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl EscalationNotifier for FanoutNotifier {
    fn notify(&self, kind: NotificationKind, wave: WaveNumber, message: &str) -> Result<()> {
        let mut failures = Vec::new();
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(kind, wave, message) {
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(WaveGateError::Notify(failures.join("; ")))
        }
    }
}
