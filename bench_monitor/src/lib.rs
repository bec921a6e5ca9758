//! # Bench Monitor Library
//!
//! Supervisory side of the X8 propulsion bench endurance test. Polls at
//! about 1 Hz, independent of the agent, and owns the authoritative safety
//! decision: on ABORT it clears the trigger register, which stops the agent
//! on its next cycle.
//!
//! ## Module Structure
//!
//! - [`config`] - Monitor TOML configuration, limits and per-stage expectations
//! - [`checks`] - Absolute and deviation checks
//! - [`console`] - Per-poll console line
//! - [`source`] - Telemetry snapshot sources
//! - [`supervisor`] - Supervision state machine and tokio polling loop

pub mod checks;
pub mod config;
pub mod console;
pub mod source;
pub mod supervisor;
