//! Monitor configuration.
//!
//! The stage list repeats the agent's program (name, duty, duration) and
//! adds the expected values the deviation checks compare against.
//!
//! ```toml
//! [shared]
//! service_name = "x8-monitor"
//!
//! [monitor]
//! poll_ms = 1000
//! auto_stop = true
//!
//! [limits]
//! rpm_floor = 500.0
//!
//! [[stages]]
//! name = "Stage 2 (20%)"
//! duty = 0.2
//! duration_s = 600.0
//! expected_rpm = 3500.0
//! expected_current_per_actuator = 10.0     # or an array of 8
//! expected_total_current = 80.0
//! ```

use std::path::PathBuf;
use std::time::Duration;

use bench_common::config::{ConfigError, SharedConfig, check_duration, check_positive};
use bench_common::consts::{
    ACTUATOR_COUNT, DEFAULT_DOWNLINK_PATH, DEFAULT_REGISTER_PATH, DOWNLINK_STALE_POLLS_DEFAULT,
    MONITOR_POLL_MS, TRIGGER_PARAM_DEFAULT,
};
use bench_common::stage::{StageDefinition, StageProgram};
use serde::Deserialize;

/// Complete monitor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    pub shared: SharedConfig,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub limits: AbsoluteLimits,
    #[serde(default)]
    pub deviation: DeviationBounds,
    pub stages: Vec<MonitorStage>,
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.monitor.validate()?;
        self.limits.validate()?;
        self.deviation.validate()?;
        self.program()?;
        for stage in &self.stages {
            stage.validate()?;
        }
        Ok(())
    }

    /// The stage program these stages describe.
    pub fn program(&self) -> Result<StageProgram, ConfigError> {
        StageProgram::new(
            self.stages
                .iter()
                .map(|s| StageDefinition {
                    name: s.name.clone(),
                    duty: s.duty,
                    duration_s: s.duration_s,
                })
                .collect(),
        )
    }

    /// Expected values, one entry per stage.
    pub fn profiles(&self) -> Vec<ExpectedProfile> {
        self.stages.iter().map(MonitorStage::profile).collect()
    }
}

/// Polling, handshake and policy switches.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    /// Poll period [ms].
    pub poll_ms: u64,
    /// Trigger register parameter name.
    pub trigger_param: String,
    /// Parameter store file.
    pub register_path: PathBuf,
    /// Telemetry downlink file.
    pub downlink_path: PathBuf,
    /// Unchanged downlink polls before the feed is stale.
    pub stale_polls: u32,
    /// Checks are held off this long after run start and after every stage
    /// change (rpm checks) [s].
    pub ramp_up_grace_s: f64,
    /// Time past the program end before the register is force-cleared [s].
    pub end_grace_s: f64,
    /// Clear the register on ABORT. `false` reports only.
    pub auto_stop: bool,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            poll_ms: MONITOR_POLL_MS,
            trigger_param: TRIGGER_PARAM_DEFAULT.to_string(),
            register_path: PathBuf::from(DEFAULT_REGISTER_PATH),
            downlink_path: PathBuf::from(DEFAULT_DOWNLINK_PATH),
            stale_polls: DOWNLINK_STALE_POLLS_DEFAULT,
            ramp_up_grace_s: 5.0,
            end_grace_s: 5.0,
            auto_stop: true,
        }
    }
}

impl MonitorSection {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll_ms must be positive".to_string(),
            ));
        }
        if self.trigger_param.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "trigger_param cannot be empty".to_string(),
            ));
        }
        if self.stale_polls == 0 {
            return Err(ConfigError::ValidationError(
                "stale_polls must be at least 1".to_string(),
            ));
        }
        check_duration("monitor.ramp_up_grace_s", self.ramp_up_grace_s)?;
        check_duration("monitor.end_grace_s", self.end_grace_s)?;
        Ok(())
    }

    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    /// Zero when the value did not pass validation.
    #[inline]
    pub fn ramp_up_grace(&self) -> Duration {
        Duration::try_from_secs_f64(self.ramp_up_grace_s).unwrap_or_default()
    }

    /// Zero when the value did not pass validation.
    #[inline]
    pub fn end_grace(&self) -> Duration {
        Duration::try_from_secs_f64(self.end_grace_s).unwrap_or_default()
    }
}

/// Immediate-abort ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AbsoluteLimits {
    /// A spinning actuator below this rpm is nearly stopped.
    pub rpm_floor: f64,
    /// Per-actuator temperature ceiling [°C].
    pub temp_ceiling_c: f64,
    /// Per-actuator current ceiling [A].
    pub esc_current_max_a: f64,
    /// Bench total current ceiling [A].
    pub total_current_max_a: f64,
}

impl Default for AbsoluteLimits {
    fn default() -> Self {
        Self {
            rpm_floor: 500.0,
            temp_ceiling_c: 80.0,
            esc_current_max_a: 100.0,
            total_current_max_a: 100.0,
        }
    }
}

impl AbsoluteLimits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("limits.rpm_floor", self.rpm_floor)?;
        check_positive("limits.temp_ceiling_c", self.temp_ceiling_c)?;
        check_positive("limits.esc_current_max_a", self.esc_current_max_a)?;
        check_positive("limits.total_current_max_a", self.total_current_max_a)
    }
}

/// Two-level deviation bounds (warning, abort).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeviationBounds {
    /// rpm deviation from expected, as a fraction.
    pub rpm_warn_frac: f64,
    pub rpm_abort_frac: f64,
    /// Temperature distance from the median [°C].
    pub temp_warn_c: f64,
    pub temp_abort_c: f64,
    /// Current deviation from expected (per actuator and total), as a fraction.
    pub current_warn_frac: f64,
    pub current_abort_frac: f64,
}

impl Default for DeviationBounds {
    fn default() -> Self {
        Self {
            rpm_warn_frac: 0.10,
            rpm_abort_frac: 0.30,
            temp_warn_c: 10.0,
            temp_abort_c: 20.0,
            current_warn_frac: 0.10,
            current_abort_frac: 0.30,
        }
    }
}

impl DeviationBounds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (warn, abort, name) in [
            (self.rpm_warn_frac, self.rpm_abort_frac, "rpm"),
            (self.temp_warn_c, self.temp_abort_c, "temp"),
            (self.current_warn_frac, self.current_abort_frac, "current"),
        ] {
            check_positive(&format!("deviation.{name} warning bound"), warn)?;
            check_positive(&format!("deviation.{name} abort bound"), abort)?;
            if warn >= abort {
                return Err(ConfigError::ValidationError(format!(
                    "deviation.{name}: warning bound {warn} must be below abort bound {abort}"
                )));
            }
        }
        Ok(())
    }
}

/// Expected per-actuator current: one value for all, or one per actuator.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CurrentExpectation {
    Uniform(f64),
    PerActuator([f64; ACTUATOR_COUNT]),
}

impl Default for CurrentExpectation {
    fn default() -> Self {
        Self::Uniform(0.0)
    }
}

impl CurrentExpectation {
    pub fn expand(&self) -> [f64; ACTUATOR_COUNT] {
        match *self {
            Self::Uniform(v) => [v; ACTUATOR_COUNT],
            Self::PerActuator(values) => values,
        }
    }
}

/// One stage as the monitor sees it.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorStage {
    pub name: String,
    pub duty: f64,
    pub duration_s: f64,
    /// 0 disables the rpm deviation check for this stage.
    #[serde(default)]
    pub expected_rpm: f64,
    #[serde(default)]
    pub expected_current_per_actuator: CurrentExpectation,
    #[serde(default)]
    pub expected_total_current: f64,
}

impl MonitorStage {
    fn validate(&self) -> Result<(), ConfigError> {
        let currents = self.expected_current_per_actuator.expand();
        let all = [self.expected_rpm, self.expected_total_current]
            .into_iter()
            .chain(currents);
        for v in all {
            if !v.is_finite() || v < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "stage '{}': expected values must be non-negative, got {v}",
                    self.name
                )));
            }
        }
        Ok(())
    }

    pub fn profile(&self) -> ExpectedProfile {
        ExpectedProfile {
            rpm: self.expected_rpm,
            current_per_actuator: self.expected_current_per_actuator.expand(),
            total_current: self.expected_total_current,
        }
    }
}

/// Expected values for one stage. Zero disables the corresponding check.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExpectedProfile {
    pub rpm: f64,
    pub current_per_actuator: [f64; ACTUATOR_COUNT],
    pub total_current: f64,
}
