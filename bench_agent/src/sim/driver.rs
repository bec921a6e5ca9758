//! Simulated bench: output bus, telemetry providers and downlink publisher.
//!
//! All handles share one [`SimState`] behind a mutex. The bus advances the
//! physics on every `flush`, so simulated time is the agent's clock and
//! tests stay deterministic.

use std::sync::Arc;
use std::time::Duration;

use bench_common::consts::{ACTUATOR_COUNT, CENTIDEGREES_PER_DEGREE, LOAD_CELL_COUNT};
use bench_common::downlink::DownlinkWriter;
use bench_common::telemetry::{
    ActuatorReading, BenchInstruments, Readings, temperature_from_centidegrees, zeroed_readings,
};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use super::physics::MotorModel;
use crate::config::{FaultKind, FaultSpec, SimConfig};
use crate::hal::{ActuatorBus, BusError, OutputRange, TelemetryProvider};

/// Raw ESC temperature reported by a broken sensor (0xFFFF centidegrees).
const SENSOR_FAULT_RAW: f64 = 65_535.0;
/// Bench quiescent draw seen by the shunt [A].
const QUIESCENT_CURRENT_A: f64 = 0.3;

/// What the instruments report this step.
#[derive(Debug, Clone, Copy, Default)]
struct Measured {
    esc_rpm: f64,
    optical_rpm: f64,
    current: f64,
    temp_raw: f64,
}

/// Shared simulator state.
struct SimState {
    config: SimConfig,
    range: OutputRange,
    mapped: usize,
    /// Last commanded value per output.
    commanded: [u16; ACTUATOR_COUNT],
    /// Watchdog deadline per output.
    deadline: [Option<Duration>; ACTUATOR_COUNT],
    /// Value actually applied at the last flush.
    applied: [u16; ACTUATOR_COUNT],
    motors: [MotorModel; ACTUATOR_COUNT],
    measured: [Measured; ACTUATOR_COUNT],
    instruments: BenchInstruments,
    faults: Vec<FaultSpec>,
    /// Start of the current spin (any output above minimum).
    spin_start: Option<Duration>,
    clock: Duration,
    rng: StdRng,
    downlink: Option<DownlinkWriter>,
    last_publish: Option<Duration>,
    publish_failing: bool,
}

impl SimState {
    fn duty(&self, value: u16) -> f64 {
        let span = f64::from(self.range.max.saturating_sub(self.range.min));
        if span <= 0.0 {
            return 0.0;
        }
        (f64::from(value.saturating_sub(self.range.min)) / span).clamp(0.0, 1.0)
    }

    fn active_fault(&self, index: usize, now: Duration) -> Option<FaultKind> {
        let spin = now.saturating_sub(self.spin_start?);
        self.faults
            .iter()
            .find(|f| f.actuator == index && spin.as_secs_f64() >= f.after_s)
            .map(|f| f.kind)
    }

    fn noisy(&mut self, value: f64) -> f64 {
        if self.config.noise_frac <= 0.0 {
            return value;
        }
        let n = self.config.noise_frac;
        value * (1.0 + self.rng.gen_range(-n..=n))
    }

    fn step(&mut self, now: Duration) {
        let dt = now.saturating_sub(self.clock).as_secs_f64();

        // Output watchdog.
        for i in 0..ACTUATOR_COUNT {
            self.applied[i] = match self.deadline[i] {
                Some(deadline) if i < self.mapped && now <= deadline => self.commanded[i],
                _ => self.range.min,
            };
        }

        let spinning = self.applied.iter().any(|&v| v > self.range.min);
        match (spinning, self.spin_start) {
            (true, None) => self.spin_start = Some(now),
            (false, Some(_)) if self.motors.iter().all(|m| m.rpm < 1.0) => self.spin_start = None,
            _ => {}
        }

        for i in 0..ACTUATOR_COUNT {
            let duty = self.duty(self.applied[i]);
            let fault = self.active_fault(i, now);
            let config = &self.config;
            self.motors[i].step(duty, dt, config, fault);
        }

        for i in 0..ACTUATOR_COUNT {
            let motor = self.motors[i];
            let fault = self.active_fault(i, now);
            let rpm = self.noisy(motor.rpm);
            let optical_rpm = self.noisy(motor.rpm);
            let current = self.noisy(motor.current);
            self.measured[i] = Measured {
                esc_rpm: if fault == Some(FaultKind::EscRpmDropout) { 0.0 } else { rpm },
                optical_rpm,
                current,
                temp_raw: if fault == Some(FaultKind::SensorFault) {
                    SENSOR_FAULT_RAW
                } else {
                    (motor.temperature * CENTIDEGREES_PER_DEGREE).round()
                },
            };
        }

        let true_total: f64 = self.motors.iter().map(|m| m.current).sum();
        let total_current = self.noisy(true_total) + QUIESCENT_CURRENT_A;
        let voltage = self.config.supply_voltage - self.config.supply_resistance_ohm * total_current;
        let load_cells: [f64; LOAD_CELL_COUNT] = std::array::from_fn(|arm| {
            let top = self.motors[arm].rpm / 1000.0;
            let bottom = self.motors[arm + LOAD_CELL_COUNT].rpm / 1000.0;
            self.config.thrust_per_krpm2 * (top * top + bottom * bottom)
        });
        self.instruments = BenchInstruments {
            total_current,
            voltage,
            load_cells,
        };

        self.clock = now;
    }

    /// ESC telemetry as a ground station would see it.
    fn esc_readings(&self) -> Readings {
        let mut readings = zeroed_readings();
        for (i, r) in readings.iter_mut().enumerate() {
            let m = self.measured[i];
            *r = ActuatorReading {
                index: i as u8,
                rpm: m.esc_rpm,
                current: m.current,
                temperature: temperature_from_centidegrees(m.temp_raw),
            };
        }
        readings
    }

    fn maybe_publish(&mut self, now: Duration) {
        let due = match self.last_publish {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.config.publish_interval(),
        };
        if !due {
            return;
        }
        let readings = self.esc_readings();
        let instruments = self.instruments;
        let Some(writer) = self.downlink.as_mut() else {
            return;
        };
        match writer.publish(&readings, Some(instruments)) {
            Ok(_) => {
                if self.publish_failing {
                    info!("downlink publishing recovered");
                }
                self.publish_failing = false;
            }
            Err(e) => {
                if !self.publish_failing {
                    warn!("downlink publish failed: {e}");
                }
                self.publish_failing = true;
            }
        }
        self.last_publish = Some(now);
    }
}

/// Handle to the simulated bench. Clones share the same state.
#[derive(Clone)]
pub struct SimBench {
    state: Arc<Mutex<SimState>>,
}

impl SimBench {
    /// Bench at rest. Noise is seeded from `config.seed` when present.
    pub fn new(config: &SimConfig, range: OutputRange) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let state = SimState {
            config: config.clone(),
            range,
            mapped: config.mapped_channels,
            commanded: [range.min; ACTUATOR_COUNT],
            deadline: [None; ACTUATOR_COUNT],
            applied: [range.min; ACTUATOR_COUNT],
            motors: [MotorModel::at_rest(config.ambient_c); ACTUATOR_COUNT],
            measured: [Measured::default(); ACTUATOR_COUNT],
            instruments: BenchInstruments::default(),
            faults: config.faults.clone(),
            spin_start: None,
            clock: Duration::ZERO,
            rng,
            downlink: None,
            last_publish: None,
            publish_failing: false,
        };
        debug!(
            mapped = config.mapped_channels,
            faults = config.faults.len(),
            "simulated bench created"
        );
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Publish downlink snapshots to `writer`.
    pub fn with_downlink(self, writer: DownlinkWriter) -> Self {
        self.state.lock().downlink = Some(writer);
        self
    }

    /// Output bus handle.
    pub fn bus(&self) -> SimBus {
        SimBus {
            state: Arc::clone(&self.state),
        }
    }

    /// Telemetry providers: `"esc"` (rpm, current, temperature) and
    /// `"rpm_sensor"` (optical rpm only).
    pub fn providers(&self) -> Vec<Box<dyn TelemetryProvider>> {
        let esc: Box<dyn TelemetryProvider> = Box::new(SimEsc {
            state: Arc::clone(&self.state),
        });
        let optical: Box<dyn TelemetryProvider> = Box::new(SimRpmSensor {
            state: Arc::clone(&self.state),
        });
        vec![esc, optical]
    }

    /// Output values applied at the last flush.
    pub fn outputs(&self) -> [u16; ACTUATOR_COUNT] {
        self.state.lock().applied
    }

    /// True rotor speeds.
    pub fn rpms(&self) -> [f64; ACTUATOR_COUNT] {
        self.state.lock().motors.map(|m| m.rpm)
    }

    /// ESC telemetry as published on the downlink.
    pub fn esc_readings(&self) -> Readings {
        self.state.lock().esc_readings()
    }

    /// Change how many channels discovery reports.
    pub fn set_mapped_channels(&self, mapped: usize) {
        self.state.lock().mapped = mapped.min(ACTUATOR_COUNT);
    }

    /// Add a fault at runtime.
    pub fn inject(&self, fault: FaultSpec) {
        info!(actuator = fault.actuator, kind = ?fault.kind, "fault injected");
        self.state.lock().faults.push(fault);
    }
}

/// Output side of the simulated bench.
pub struct SimBus {
    state: Arc<Mutex<SimState>>,
}

impl ActuatorBus for SimBus {
    fn discover_channels(&mut self) -> Result<usize, BusError> {
        Ok(self.state.lock().mapped)
    }

    fn command(&mut self, index: usize, value: u16, timeout: Duration) -> Result<(), BusError> {
        if index >= ACTUATOR_COUNT {
            return Err(BusError::InvalidIndex(index));
        }
        let mut s = self.state.lock();
        s.commanded[index] = value;
        s.deadline[index] = Some(s.clock + timeout);
        Ok(())
    }

    fn flush(&mut self, now: Duration) {
        let mut s = self.state.lock();
        s.step(now);
        s.maybe_publish(now);
    }
}

/// ESC telemetry provider.
struct SimEsc {
    state: Arc<Mutex<SimState>>,
}

impl TelemetryProvider for SimEsc {
    fn name(&self) -> &str {
        "esc"
    }

    fn rpm(&self, index: usize) -> Option<f64> {
        self.state.lock().measured.get(index).map(|m| m.esc_rpm)
    }

    fn current(&self, index: usize) -> Option<f64> {
        self.state.lock().measured.get(index).map(|m| m.current)
    }

    fn temperature_raw(&self, index: usize) -> Option<f64> {
        self.state.lock().measured.get(index).map(|m| m.temp_raw)
    }
}

/// Optical rpm sensor, used as fallback.
struct SimRpmSensor {
    state: Arc<Mutex<SimState>>,
}

impl TelemetryProvider for SimRpmSensor {
    fn name(&self) -> &str {
        "rpm_sensor"
    }

    fn rpm(&self, index: usize) -> Option<f64> {
        self.state.lock().measured.get(index).map(|m| m.optical_rpm)
    }
}
