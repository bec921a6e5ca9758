//! Prelude module for common re-exports.
//!
//! ```rust
//! use bench_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{ACTUATOR_COUNT, GROUP_SIZE};

// ─── Program & Telemetry ────────────────────────────────────────────
pub use crate::classify::{Advisory, AdvisoryThresholds, Classification, classify_advisory};
pub use crate::stage::{StageDefinition, StageProgram};
pub use crate::telemetry::{
    ActuatorReading, BenchInstruments, BenchSnapshot, Group, GroupAggregate, Readings, aggregate,
};

// ─── Handshake ──────────────────────────────────────────────────────
pub use crate::register::{
    Edge, EdgeWatcher, FileRegister, MemoryRegister, RegisterError, TriggerLine, TriggerRegister,
    is_set,
};

// ─── Downlink & Status ──────────────────────────────────────────────
pub use crate::downlink::{DownlinkError, DownlinkReader, DownlinkWriter};
pub use crate::status::{RecordingStatus, Severity, StatusChannel, TracingStatus};
