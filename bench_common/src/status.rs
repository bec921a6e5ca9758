//! Human-readable status channel.
//!
//! Status lines are what an operator watches on the ground console: the
//! agent's periodic summary and the monitor's WARN/ABORT reasons. The
//! default channel writes through `tracing` under the `status` target so a
//! subscriber can route or filter them separately.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Status line severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Notice,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "INFO",
            Self::Notice => "NOTICE",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        })
    }
}

/// Sink for status lines. Sending never fails from the caller's view.
pub trait StatusChannel {
    fn send(&mut self, severity: Severity, text: &str);
}

impl<S: StatusChannel + ?Sized> StatusChannel for Box<S> {
    fn send(&mut self, severity: Severity, text: &str) {
        (**self).send(severity, text);
    }
}

/// Writes status lines as `tracing` events with target `status`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatus;

impl StatusChannel for TracingStatus {
    fn send(&mut self, severity: Severity, text: &str) {
        match severity {
            Severity::Info | Severity::Notice => info!(target: "status", %severity, "{text}"),
            Severity::Warning => warn!(target: "status", %severity, "{text}"),
            Severity::Critical => error!(target: "status", %severity, "{text}"),
        }
    }
}

/// Keeps every line in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingStatus {
    lines: Arc<Mutex<Vec<(Severity, String)>>>,
}

impl RecordingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything sent so far.
    pub fn lines(&self) -> Vec<(Severity, String)> {
        self.lines.lock().clone()
    }

    /// True if any line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|(_, l)| l.contains(needle))
    }

    /// Number of lines at exactly `severity`.
    pub fn count(&self, severity: Severity) -> usize {
        self.lines.lock().iter().filter(|(s, _)| *s == severity).count()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl StatusChannel for RecordingStatus {
    fn send(&mut self, severity: Severity, text: &str) {
        self.lines.lock().push((severity, text.to_string()));
    }
}
