//! Agent configuration.
//!
//! One TOML file holds everything the agent needs: the `[shared]` table,
//! loop and output settings, advisory thresholds, the telemetry provider
//! order, the stage program and the simulated bench parameters.
//!
//! ```toml
//! [shared]
//! service_name = "x8-agent"
//!
//! [agent]
//! cycle_ms = 100
//! pwm_min = 1000
//! pwm_max = 2000
//!
//! [telemetry]
//! rpm_sources = ["esc", "rpm_sensor"]
//! esc_source = "esc"
//!
//! [[stages]]
//! name = "Stage 1 (10%)"
//! duty = 0.1
//! duration_s = 600.0
//! ```

use std::path::PathBuf;
use std::time::Duration;

use bench_common::classify::AdvisoryThresholds;
use bench_common::config::{ConfigError, SharedConfig, check_positive, check_range};
use bench_common::consts::{
    ACTUATOR_COUNT, AGENT_CYCLE_MS, AGENT_CYCLE_MS_MAX, AGENT_CYCLE_MS_MIN, DEFAULT_DOWNLINK_PATH,
    DEFAULT_REGISTER_PATH, DISPLAY_INTERVAL_MS, LOG_INTERVAL_MS, PWM_MAX_DEFAULT, PWM_MIN_DEFAULT,
    REFRESH_TIMEOUT_MS, TRIGGER_PARAM_DEFAULT,
};
use bench_common::stage::StageProgram;
use serde::Deserialize;

/// Default structured log file.
pub const DEFAULT_LOG_PATH: &str = "/var/log/x8bench/agent.jsonl";

/// Complete agent configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub shared: SharedConfig,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub advisory: AdvisoryThresholds,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub sim: SimConfig,
    pub stages: StageProgram,
}

impl AgentConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.agent.validate()?;
        self.advisory.validate()?;
        self.telemetry.validate()?;
        self.sim.validate()?;
        self.stages.validate()
    }
}

/// Loop, output and reporting settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Control period [ms].
    pub cycle_ms: u64,
    /// Output value for duty 0 [µs PWM].
    pub pwm_min: u16,
    /// Output value for duty 1 [µs PWM].
    pub pwm_max: u16,
    /// Watchdog timeout attached to every output command [ms].
    pub refresh_timeout_ms: u64,
    /// Structured log cadence [ms].
    pub log_interval_ms: u64,
    /// Status line cadence [ms].
    pub display_interval_ms: u64,
    /// Trigger register parameter name.
    pub trigger_param: String,
    /// Parameter store file.
    pub register_path: PathBuf,
    /// Structured log file (JSON lines).
    pub log_path: PathBuf,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            cycle_ms: AGENT_CYCLE_MS,
            pwm_min: PWM_MIN_DEFAULT,
            pwm_max: PWM_MAX_DEFAULT,
            refresh_timeout_ms: REFRESH_TIMEOUT_MS,
            log_interval_ms: LOG_INTERVAL_MS,
            display_interval_ms: DISPLAY_INTERVAL_MS,
            trigger_param: TRIGGER_PARAM_DEFAULT.to_string(),
            register_path: PathBuf::from(DEFAULT_REGISTER_PATH),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
        }
    }
}

impl AgentSection {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("cycle_ms", self.cycle_ms, AGENT_CYCLE_MS_MIN, AGENT_CYCLE_MS_MAX)?;
        if self.pwm_min >= self.pwm_max {
            return Err(ConfigError::ValidationError(format!(
                "pwm_min {} must be below pwm_max {}",
                self.pwm_min, self.pwm_max
            )));
        }
        // Outputs must survive until the next refresh.
        if self.refresh_timeout_ms <= self.cycle_ms {
            return Err(ConfigError::ValidationError(format!(
                "refresh_timeout_ms {} must exceed cycle_ms {}",
                self.refresh_timeout_ms, self.cycle_ms
            )));
        }
        if self.log_interval_ms < self.cycle_ms || self.display_interval_ms < self.cycle_ms {
            return Err(ConfigError::ValidationError(
                "log and display intervals cannot be shorter than cycle_ms".to_string(),
            ));
        }
        if self.trigger_param.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "trigger_param cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn cycle_time(&self) -> Duration {
        Duration::from_millis(self.cycle_ms)
    }

    #[inline]
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    #[inline]
    pub fn log_interval(&self) -> Duration {
        Duration::from_millis(self.log_interval_ms)
    }

    #[inline]
    pub fn display_interval(&self) -> Duration {
        Duration::from_millis(self.display_interval_ms)
    }
}

/// Telemetry provider order.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Providers consulted for rpm, primary first.
    pub rpm_sources: Vec<String>,
    /// Provider supplying current and temperature.
    pub esc_source: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            rpm_sources: vec!["esc".to_string(), "rpm_sensor".to_string()],
            esc_source: "esc".to_string(),
        }
    }
}

impl TelemetryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpm_sources.is_empty() {
            return Err(ConfigError::ValidationError(
                "telemetry.rpm_sources must name at least one provider".to_string(),
            ));
        }
        if self.esc_source.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "telemetry.esc_source cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Simulated fault kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Rotor slows to a crawl.
    Stall,
    /// Extra heating on top of the thermal model.
    Overheat,
    /// Current draw multiplied.
    OverCurrent,
    /// ESC stops reporting rpm; the backup rpm sensor still works.
    EscRpmDropout,
    /// ESC temperature sensor returns garbage.
    SensorFault,
}

/// One injected fault.
#[derive(Debug, Clone, Deserialize)]
pub struct FaultSpec {
    /// Actuator index `0..8`.
    pub actuator: usize,
    pub kind: FaultKind,
    /// Seconds of motor activity before the fault appears.
    #[serde(default)]
    pub after_s: f64,
}

/// Simulated bench parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Telemetry downlink file published for the monitor.
    pub downlink_path: PathBuf,
    /// Downlink publish period [ms].
    pub publish_interval_ms: u64,
    /// Motor functions mapped to outputs.
    pub mapped_channels: usize,
    /// Steady-state rpm at duty 1.0.
    pub rpm_per_duty: f64,
    /// Steady-state ESC current at duty 1.0 [A].
    pub amps_per_duty: f64,
    /// Rotor time constant [s].
    pub rpm_tau_s: f64,
    /// Ambient temperature [°C].
    pub ambient_c: f64,
    /// Steady-state temperature rise per ampere [°C/A].
    pub temp_rise_per_amp: f64,
    /// Thermal time constant [s].
    pub thermal_tau_s: f64,
    /// Open-circuit supply voltage [V].
    pub supply_voltage: f64,
    /// Supply internal resistance [Ω].
    pub supply_resistance_ohm: f64,
    /// Load-cell reading per (krpm)² of the two motors on that arm.
    pub thrust_per_krpm2: f64,
    /// Relative measurement noise.
    pub noise_frac: f64,
    /// RNG seed; random when absent.
    pub seed: Option<u64>,
    #[serde(default)]
    pub faults: Vec<FaultSpec>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            downlink_path: PathBuf::from(DEFAULT_DOWNLINK_PATH),
            publish_interval_ms: 500,
            mapped_channels: ACTUATOR_COUNT,
            rpm_per_duty: 17_500.0,
            amps_per_duty: 50.0,
            rpm_tau_s: 0.4,
            ambient_c: 25.0,
            temp_rise_per_amp: 1.5,
            thermal_tau_s: 90.0,
            supply_voltage: 50.4,
            supply_resistance_ohm: 0.01,
            thrust_per_krpm2: 0.05,
            noise_frac: 0.01,
            seed: None,
            faults: Vec::new(),
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("sim.mapped_channels", self.mapped_channels, 0, ACTUATOR_COUNT)?;
        check_positive("sim.rpm_tau_s", self.rpm_tau_s)?;
        check_positive("sim.thermal_tau_s", self.thermal_tau_s)?;
        check_range("sim.noise_frac", self.noise_frac, 0.0, 0.5)?;
        for fault in &self.faults {
            if fault.actuator >= ACTUATOR_COUNT {
                return Err(ConfigError::ValidationError(format!(
                    "sim fault actuator {} out of range",
                    fault.actuator
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }
}
