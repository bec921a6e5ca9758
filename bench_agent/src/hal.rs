//! Actuation and telemetry access layer.
//!
//! The agent talks to the motor controller through two narrow seams:
//!
//! - [`ActuatorBus`]: channel discovery and per-output commands carrying a
//!   watchdog timeout.
//! - [`TelemetryProvider`]: named telemetry sources. A [`TelemetryChain`]
//!   merges them into one [`ActuatorReading`] per actuator.
//!
//! Both are plain traits so the physical controller, the simulated bench
//! and test doubles are interchangeable.

use std::time::Duration;

use bench_common::config::ConfigError;
use bench_common::consts::ACTUATOR_COUNT;
use bench_common::telemetry::{ActuatorReading, Readings, temperature_from_centidegrees};
use thiserror::Error;
use tracing::debug;

use crate::config::TelemetryConfig;

/// Errors from the output path.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    #[error("actuator index {0} out of range")]
    InvalidIndex(usize),

    #[error("output write to actuator {index} failed: {reason}")]
    WriteFailed { index: usize, reason: String },

    #[error("channel discovery failed: {0}")]
    Discovery(String),
}

/// Motor output path.
pub trait ActuatorBus {
    /// How many of the eight motor functions are mapped to physical outputs.
    fn discover_channels(&mut self) -> Result<usize, BusError>;

    /// Command one output. The output falls back to its minimum if it is not
    /// re-commanded within `timeout`.
    fn command(&mut self, index: usize, value: u16, timeout: Duration) -> Result<(), BusError>;

    /// End of the cycle's output phase. `now` is the agent clock.
    ///
    /// Buses that latch each command immediately have nothing to do here.
    fn flush(&mut self, _now: Duration) {}
}

/// One named telemetry source.
///
/// `None` means the source has nothing for that actuator this cycle.
pub trait TelemetryProvider {
    fn name(&self) -> &str;

    fn rpm(&self, index: usize) -> Option<f64>;

    /// ESC current [A].
    fn current(&self, _index: usize) -> Option<f64> {
        None
    }

    /// ESC temperature in hundredths of a degree.
    fn temperature_raw(&self, _index: usize) -> Option<f64> {
        None
    }
}

/// Ordered rpm providers plus one designated ESC provider.
pub struct TelemetryChain {
    providers: Vec<Box<dyn TelemetryProvider>>,
    /// Indices into `providers`, primary first.
    rpm_order: Vec<usize>,
    esc: usize,
}

impl TelemetryChain {
    /// Resolve the configured provider names against `providers`.
    pub fn new(
        providers: Vec<Box<dyn TelemetryProvider>>,
        config: &TelemetryConfig,
    ) -> Result<Self, ConfigError> {
        let find = |name: &str| {
            providers
                .iter()
                .position(|p| p.name() == name)
                .ok_or_else(|| {
                    ConfigError::ValidationError(format!("unknown telemetry provider '{name}'"))
                })
        };

        let rpm_order = config
            .rpm_sources
            .iter()
            .map(|n| find(n.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let esc = find(config.esc_source.as_str())?;
        if rpm_order.is_empty() {
            return Err(ConfigError::ValidationError(
                "no rpm provider configured".to_string(),
            ));
        }

        debug!(
            rpm = ?config.rpm_sources,
            esc = %config.esc_source,
            "telemetry chain resolved"
        );
        Ok(Self {
            providers,
            rpm_order,
            esc,
        })
    }

    /// Reading for one actuator.
    ///
    /// rpm comes from the first provider reporting a nonzero value; the
    /// next provider is consulted only when the previous one reports
    /// exactly zero or nothing. Missing current/temperature read as 0.
    pub fn read_actuator(&self, index: usize) -> ActuatorReading {
        let rpm = self
            .rpm_order
            .iter()
            .find_map(|&p| {
                self.providers[p]
                    .rpm(index)
                    .filter(|v| v.is_finite() && *v != 0.0)
            })
            .unwrap_or(0.0);

        let esc = &self.providers[self.esc];
        let current = esc
            .current(index)
            .filter(|v| v.is_finite())
            .unwrap_or(0.0);
        let temperature = esc
            .temperature_raw(index)
            .map(temperature_from_centidegrees)
            .unwrap_or(0.0);

        ActuatorReading {
            index: index as u8,
            rpm,
            current,
            temperature,
        }
    }

    /// Readings for all actuators.
    pub fn read_all(&self) -> Readings {
        std::array::from_fn(|i| self.read_actuator(i))
    }
}

/// Output value range mapped from duty fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputRange {
    pub min: u16,
    pub max: u16,
}

impl OutputRange {
    /// `min + duty * (max - min)`, duty clamped to `[0, 1]`, rounded.
    #[inline]
    pub fn duty_to_value(&self, duty: f64) -> u16 {
        let duty = if duty.is_finite() { duty.clamp(0.0, 1.0) } else { 0.0 };
        let span = f64::from(self.max.saturating_sub(self.min));
        self.min + (duty * span).round() as u16
    }
}

/// Command every output to `value`.
///
/// Every output is attempted even after a failure; the first error is
/// returned.
pub fn command_all(
    bus: &mut dyn ActuatorBus,
    value: u16,
    timeout: Duration,
) -> Result<(), BusError> {
    let mut first_err = None;
    for index in 0..ACTUATOR_COUNT {
        if let Err(e) = bus.command(index, value, timeout) {
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}
