//! System-wide constants for the bench workspace.
//!
//! Single source of truth for actuator counts, loop cadences and defaults.

use static_assertions::const_assert_eq;

/// Number of actuators (ESC + motor pairs) on the bench.
pub const ACTUATOR_COUNT: usize = 8;

/// Actuators per group. Indices `0..GROUP_SIZE` are "top", the rest "bottom".
pub const GROUP_SIZE: usize = 4;

const_assert_eq!(ACTUATOR_COUNT, GROUP_SIZE * 2);

/// Number of load-cell channels on the bench instrumentation board.
pub const LOAD_CELL_COUNT: usize = 4;

/// Lowest plausible temperature [°C]. Anything below is a sensor fault.
pub const TEMP_PLAUSIBLE_MIN_C: f64 = -50.0;

/// Highest plausible temperature [°C]. Anything above is a sensor fault.
pub const TEMP_PLAUSIBLE_MAX_C: f64 = 200.0;

/// ESC telemetry reports temperature in hundredths of a degree.
pub const CENTIDEGREES_PER_DEGREE: f64 = 100.0;

/// Agent control period [ms] (10 Hz).
pub const AGENT_CYCLE_MS: u64 = 100;

/// Agent control period bounds [ms].
pub const AGENT_CYCLE_MS_MIN: u64 = 10;
pub const AGENT_CYCLE_MS_MAX: u64 = 1000;

/// Monitor poll period [ms] (1 Hz).
pub const MONITOR_POLL_MS: u64 = 1000;

/// Structured log cadence [ms].
pub const LOG_INTERVAL_MS: u64 = 1000;

/// Status line cadence [ms].
pub const DISPLAY_INTERVAL_MS: u64 = 2000;

/// Output watchdog timeout for re-asserted actuator commands [ms].
pub const REFRESH_TIMEOUT_MS: u64 = 300;

/// Default actuator command range [µs PWM].
pub const PWM_MIN_DEFAULT: u16 = 1000;
pub const PWM_MAX_DEFAULT: u16 = 2000;

/// Name of the parameter used as trigger register.
pub const TRIGGER_PARAM_DEFAULT: &str = "SCR_USER4";

/// A register value at or above this magnitude reads as "set".
pub const TRIGGER_SET_THRESHOLD: f64 = 0.5;

/// Default parameter store file.
pub const DEFAULT_REGISTER_PATH: &str = "/var/lib/x8bench/params.json";

/// Default telemetry downlink file.
pub const DEFAULT_DOWNLINK_PATH: &str = "/run/x8bench/downlink.json";

/// Default configuration directory.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/x8bench";

/// Consecutive unchanged downlink polls before the feed counts as stale.
pub const DOWNLINK_STALE_POLLS_DEFAULT: u32 = 3;
