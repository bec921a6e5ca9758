//! # Bench Agent Library
//!
//! Real-time side of the X8 propulsion bench endurance test. Runs next to
//! the motor controller at a fixed ~10 Hz period and:
//!
//! - watches the trigger register for a rising edge (start) or a clear (stop),
//! - steps through the configured stage program, re-commanding every motor
//!   output each cycle with a short watchdog timeout,
//! - reads per-actuator telemetry through an ordered provider chain,
//! - aggregates top/bottom groups and classifies an advisory state,
//! - writes structured log records and periodic status lines.
//!
//! The agent never aborts on its own classification. A run ends when the
//! program completes (the agent clears the register) or when the register is
//! cleared by someone else.
//!
//! ## Module Structure
//!
//! - [`config`] - Agent TOML configuration
//! - [`hal`] - Actuator bus and telemetry provider chain
//! - [`sequencer`] - Run state and stage transitions
//! - [`agent`] - Per-cycle body (handshake, outputs, telemetry, reporting)
//! - [`report`] - Structured log sink and status line formatting
//! - [`cycle`] - Fixed-period runner, RT setup, cycle statistics
//! - [`sim`] - Simulated 8-motor bench

pub mod agent;
pub mod config;
pub mod cycle;
pub mod hal;
pub mod report;
pub mod sequencer;
pub mod sim;
