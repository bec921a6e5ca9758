//! Simulated 8-motor bench.
//!
//! Stands in for the motor controller on a development host: implements the
//! output bus and two telemetry providers, models rotor/current/thermal
//! response, honours the output watchdog, injects configured faults and
//! publishes the telemetry downlink the monitor reads.

mod driver;
mod physics;

pub use driver::{SimBench, SimBus};
pub use physics::MotorModel;
