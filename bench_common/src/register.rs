//! Trigger register: the single shared start/stop scalar.
//!
//! The register is a named numeric parameter in a store both processes can
//! reach. It is a single-slot, last-write-visible mailbox: no queue, no
//! history, no acknowledgement. Each side polls it at its own cadence and
//! tracks the last value it observed with an [`EdgeWatcher`].
//!
//! ```text
//!   monitor ──set(1)──┐                 ┌──get()── agent (10 Hz)
//!                     ▼                 │
//!               ┌──────────────┐        │
//!               │  SCR_USER4   │◄───────┘
//!               └──────────────┘
//!                     ▲
//!   agent ──set(0)────┘  (completion)    monitor ──set(0) (abort)
//! ```
//!
//! Concurrent writes are not arbitrated; the last write before the next
//! poll wins.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::consts::TRIGGER_SET_THRESHOLD;

/// Errors from a parameter store.
#[derive(Debug, Error)]
pub enum RegisterError {
    /// The store could not be read or written.
    #[error("parameter store I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The store exists but could not be decoded.
    #[error("parameter store {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    /// The named parameter is not defined.
    #[error("parameter {0} not found")]
    NotFound(String),

    /// The store refused the operation.
    #[error("parameter store unavailable: {0}")]
    Unavailable(String),
}

/// Named numeric parameter store.
///
/// `get`/`set` must return promptly; callers run inside fixed-period loops.
pub trait TriggerRegister {
    /// Read a parameter.
    fn get(&self, name: &str) -> Result<f64, RegisterError>;

    /// Write a parameter. `Ok` means the store accepted the value.
    fn set(&self, name: &str, value: f64) -> Result<(), RegisterError>;
}

impl<R: TriggerRegister + ?Sized> TriggerRegister for Box<R> {
    fn get(&self, name: &str) -> Result<f64, RegisterError> {
        (**self).get(name)
    }

    fn set(&self, name: &str, value: f64) -> Result<(), RegisterError> {
        (**self).set(name, value)
    }
}

/// True when a raw register value means "test should be running".
#[inline]
pub fn is_set(value: f64) -> bool {
    value.abs() >= TRIGGER_SET_THRESHOLD
}

// ─── File-backed store ──────────────────────────────────────────────

/// Parameter store persisted as a JSON object of `name → number`.
///
/// Every write goes to its own uniquely named temp file in the same
/// directory, which is then renamed over the store. A reader sees either
/// the old or the new content; of two concurrent writers the later rename
/// wins.
#[derive(Debug, Clone)]
pub struct FileRegister {
    path: PathBuf,
}

impl FileRegister {
    /// Create a store handle. The file is created on first `set`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, f64>, RegisterError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| RegisterError::Corrupt {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn store(&self, values: &BTreeMap<String, f64>) -> Result<(), RegisterError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        let bytes = serde_json::to_vec_pretty(values).map_err(|e| RegisterError::Corrupt {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        // Each write stages in its own uniquely named sibling.
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.io_err(e))?;
        tmp.write_all(&bytes).map_err(|e| self.io_err(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_err(e.error))?;
        Ok(())
    }

    fn io_err(&self, source: std::io::Error) -> RegisterError {
        RegisterError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl TriggerRegister for FileRegister {
    fn get(&self, name: &str) -> Result<f64, RegisterError> {
        self.load()?
            .get(name)
            .copied()
            .ok_or_else(|| RegisterError::NotFound(name.to_string()))
    }

    fn set(&self, name: &str, value: f64) -> Result<(), RegisterError> {
        let mut values = self.load()?;
        values.insert(name.to_string(), value);
        self.store(&values)?;
        debug!(param = name, value, path = %self.path.display(), "parameter written");
        Ok(())
    }
}

// ─── In-memory store ────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryInner {
    values: BTreeMap<String, f64>,
    fail_reads: bool,
    fail_writes: bool,
    writes: u64,
}

/// Shared in-process store. Clones share the same values.
///
/// Used when both sides run in one process (tests, dry runs); read and
/// write failures can be injected.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegister {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryRegister {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with one parameter.
    pub fn with(name: &str, value: f64) -> Self {
        let reg = Self::new();
        reg.inner.lock().values.insert(name.to_string(), value);
        reg
    }

    /// Make every subsequent `get` fail (or succeed again).
    pub fn fail_reads(&self, fail: bool) {
        self.inner.lock().fail_reads = fail;
    }

    /// Make every subsequent `set` fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Number of accepted writes so far.
    pub fn write_count(&self) -> u64 {
        self.inner.lock().writes
    }

    /// Current value without going through the failure switches.
    pub fn peek(&self, name: &str) -> Option<f64> {
        self.inner.lock().values.get(name).copied()
    }
}

impl TriggerRegister for MemoryRegister {
    fn get(&self, name: &str) -> Result<f64, RegisterError> {
        let inner = self.inner.lock();
        if inner.fail_reads {
            return Err(RegisterError::Unavailable(format!("read of {name} refused")));
        }
        inner
            .values
            .get(name)
            .copied()
            .ok_or_else(|| RegisterError::NotFound(name.to_string()))
    }

    fn set(&self, name: &str, value: f64) -> Result<(), RegisterError> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(RegisterError::Unavailable(format!("write of {name} refused")));
        }
        inner.values.insert(name.to_string(), value);
        inner.writes += 1;
        Ok(())
    }
}

// ─── Edge detection ─────────────────────────────────────────────────

/// What a poll observed relative to the previous poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// First sample after startup. Never a command.
    Baseline(bool),
    /// 0 → nonzero.
    Rising,
    /// nonzero → 0.
    Falling,
    /// Same logical value as before.
    Steady(bool),
}

/// Tracks the last observed logical register value.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeWatcher {
    last: Option<bool>,
}

impl EdgeWatcher {
    /// Watcher with no baseline yet.
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Last observed value, if any.
    #[inline]
    pub const fn last(&self) -> Option<bool> {
        self.last
    }

    /// Feed one sample.
    pub fn observe(&mut self, set: bool) -> Edge {
        let edge = match (self.last, set) {
            (None, v) => Edge::Baseline(v),
            (Some(false), true) => Edge::Rising,
            (Some(true), false) => Edge::Falling,
            (Some(_), v) => Edge::Steady(v),
        };
        self.last = Some(set);
        edge
    }

    /// Record a value this process wrote itself, so it is not mistaken
    /// for an external command on the next poll.
    pub fn record_own_write(&mut self, set: bool) {
        self.last = Some(set);
    }
}

/// A named register plus the edge state of one observer.
#[derive(Debug)]
pub struct TriggerLine<R> {
    store: R,
    name: String,
    watcher: EdgeWatcher,
}

impl<R: TriggerRegister> TriggerLine<R> {
    /// Bind an observer to `name` in `store`.
    pub fn new(store: R, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
            watcher: EdgeWatcher::new(),
        }
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying store.
    pub fn store(&self) -> &R {
        &self.store
    }

    /// Last observed logical value.
    pub fn last(&self) -> Option<bool> {
        self.watcher.last()
    }

    /// Read the register and classify the change.
    ///
    /// On error the edge state is left untouched.
    pub fn poll(&mut self) -> Result<Edge, RegisterError> {
        let raw = self.store.get(&self.name)?;
        Ok(self.watcher.observe(is_set(raw)))
    }

    /// Write 1 (`true`) or 0 (`false`).
    ///
    /// On success the value is recorded as observed. On failure the
    /// previous observation stands and the caller decides what to report.
    pub fn write(&mut self, set: bool) -> Result<(), RegisterError> {
        self.store
            .set(&self.name, if set { 1.0 } else { 0.0 })?;
        self.watcher.record_own_write(set);
        Ok(())
    }
}
