//! Telemetry input for the monitor.

use std::sync::Arc;

use bench_common::downlink::{DownlinkError, DownlinkReader};
use bench_common::telemetry::{BenchInstruments, BenchSnapshot, Readings};
use parking_lot::Mutex;

/// Where the monitor gets its snapshots from.
pub trait SnapshotSource {
    fn poll(&mut self) -> Result<BenchSnapshot, DownlinkError>;
}

impl SnapshotSource for DownlinkReader {
    fn poll(&mut self) -> Result<BenchSnapshot, DownlinkError> {
        DownlinkReader::poll(self)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    latest: Option<BenchSnapshot>,
    seq: u64,
    failing: bool,
}

/// In-process snapshot feed. Clones share the same feed.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest snapshot; the sequence number advances.
    pub fn publish(&self, readings: Readings, bench: Option<BenchInstruments>) {
        let mut inner = self.inner.lock();
        inner.seq += 1;
        let seq = inner.seq;
        inner.latest = Some(BenchSnapshot {
            seq,
            timestamp_ms: 0,
            readings,
            bench,
        });
    }

    /// Make every subsequent poll fail (or succeed again).
    pub fn fail(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }
}

impl SnapshotSource for MemorySource {
    fn poll(&mut self) -> Result<BenchSnapshot, DownlinkError> {
        let inner = self.inner.lock();
        let unavailable = || DownlinkError::Io {
            path: "<memory>".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no snapshot available"),
        };
        if inner.failing {
            return Err(unavailable());
        }
        inner.latest.clone().ok_or_else(unavailable)
    }
}
