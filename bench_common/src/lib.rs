//! Bench Common Library
//!
//! Shared definitions for the X8 propulsion bench endurance test. Both the
//! real-time agent (`bench_agent`) and the supervisory monitor
//! (`bench_monitor`) link this crate; nothing in it owns a loop or a thread.
//!
//! # Module Structure
//!
//! - [`consts`] - Actuator counts, cadences, plausibility ranges, defaults
//! - [`config`] - TOML configuration loading traits and types
//! - [`stage`] - Stage program (name, duty, duration)
//! - [`telemetry`] - Actuator readings, group aggregation, bench snapshot
//! - [`classify`] - Advisory classification (absolute thresholds)
//! - [`register`] - Trigger register store + rising-edge watcher
//! - [`downlink`] - Telemetry snapshot file used by the monitor
//! - [`status`] - Human-readable status channel
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use bench_common::prelude::*;
//! ```

pub mod classify;
pub mod config;
pub mod consts;
pub mod downlink;
pub mod prelude;
pub mod register;
pub mod stage;
pub mod status;
pub mod telemetry;
