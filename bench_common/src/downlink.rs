//! Telemetry downlink: the snapshot file the bench publishes for the monitor.
//!
//! The monitor never talks to the agent's telemetry providers. It reads
//! its own copy of the bench state from a JSON file that the publisher
//! replaces atomically. Liveness is tracked through the snapshot sequence
//! number: a reader that sees the same `seq` for `stale_threshold`
//! consecutive polls reports the downlink as stale.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::telemetry::{BenchInstruments, BenchSnapshot, Readings};

/// Downlink read/write errors.
#[derive(Debug, Error)]
pub enum DownlinkError {
    /// File could not be read or written.
    #[error("downlink I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// File content is not a valid snapshot.
    #[error("downlink {path} could not be decoded: {reason}")]
    Parse { path: String, reason: String },

    /// Sequence number has not advanced.
    #[error("downlink stale: seq {seq} unchanged for {missed} polls")]
    Stale { seq: u64, missed: u32 },
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Publishes snapshots with a monotonically increasing sequence number.
#[derive(Debug)]
pub struct DownlinkWriter {
    path: PathBuf,
    seq: u64,
}

impl DownlinkWriter {
    /// Writer for `path`. The first published snapshot carries `seq = 1`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            seq: 0,
        }
    }

    /// Sequence number of the last published snapshot (0 before any).
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Publish one snapshot; returns its sequence number.
    pub fn publish(
        &mut self,
        readings: &Readings,
        bench: Option<BenchInstruments>,
    ) -> Result<u64, DownlinkError> {
        let snapshot = BenchSnapshot {
            seq: self.seq + 1,
            timestamp_ms: now_ms(),
            readings: *readings,
            bench,
        };
        let bytes = serde_json::to_vec(&snapshot).map_err(|e| DownlinkError::Parse {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.io_err(e))?;
        tmp.write_all(&bytes).map_err(|e| self.io_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_err(e.error))?;

        self.seq = snapshot.seq;
        Ok(self.seq)
    }

    fn io_err(&self, source: std::io::Error) -> DownlinkError {
        DownlinkError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

/// Polls the snapshot file with sequence-number staleness detection.
#[derive(Debug)]
pub struct DownlinkReader {
    path: PathBuf,
    /// Last observed sequence number.
    last_seq: u64,
    /// Consecutive polls without a sequence change.
    stale_count: u32,
    /// Unchanged polls tolerated before `Stale`.
    stale_threshold: u32,
}

impl DownlinkReader {
    /// Reader for `path`, reporting `Stale` after `stale_threshold`
    /// unchanged polls.
    pub fn new<P: AsRef<Path>>(path: P, stale_threshold: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            last_seq: 0,
            stale_count: 0,
            stale_threshold: stale_threshold.max(1),
        }
    }

    /// Read the current snapshot.
    ///
    /// # Errors
    /// - `DownlinkError::Io` if the file cannot be read.
    /// - `DownlinkError::Parse` if the content is not a snapshot.
    /// - `DownlinkError::Stale` if `seq` has not changed for
    ///   `stale_threshold` consecutive polls.
    pub fn poll(&mut self) -> Result<BenchSnapshot, DownlinkError> {
        let content = fs::read_to_string(&self.path).map_err(|e| DownlinkError::Io {
            path: self.path.display().to_string(),
            source: e,
        })?;
        let snapshot: BenchSnapshot =
            serde_json::from_str(&content).map_err(|e| DownlinkError::Parse {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;

        if snapshot.seq == self.last_seq && self.last_seq != 0 {
            self.stale_count += 1;
            if self.stale_count >= self.stale_threshold {
                return Err(DownlinkError::Stale {
                    seq: snapshot.seq,
                    missed: self.stale_count,
                });
            }
        } else {
            self.last_seq = snapshot.seq;
            self.stale_count = 0;
        }
        Ok(snapshot)
    }

    /// Consecutive polls without a sequence change.
    pub fn stale_count(&self) -> u32 {
        self.stale_count
    }

    /// Path being polled.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
