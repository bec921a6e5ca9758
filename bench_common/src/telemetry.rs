//! Actuator readings and per-cycle group aggregation.
//!
//! Aggregation is pure: the same eight readings always give the same
//! [`GroupAggregate`], in either process.

use serde::{Deserialize, Serialize};

use crate::consts::{
    ACTUATOR_COUNT, CENTIDEGREES_PER_DEGREE, GROUP_SIZE, LOAD_CELL_COUNT, TEMP_PLAUSIBLE_MAX_C,
    TEMP_PLAUSIBLE_MIN_C,
};

/// One actuator's telemetry for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ActuatorReading {
    /// Actuator index, `0..ACTUATOR_COUNT`.
    pub index: u8,
    /// Rotor speed [rpm].
    pub rpm: f64,
    /// ESC current [A].
    pub current: f64,
    /// ESC temperature [°C]; 0 when the sensor is implausible or missing.
    pub temperature: f64,
}

impl ActuatorReading {
    /// Zeroed reading for `index`.
    pub const fn zeroed(index: u8) -> Self {
        Self {
            index,
            rpm: 0.0,
            current: 0.0,
            temperature: 0.0,
        }
    }
}

/// Readings for the whole bench, indexed by actuator.
pub type Readings = [ActuatorReading; ACTUATOR_COUNT];

/// All-zero readings with indices filled in.
pub fn zeroed_readings() -> Readings {
    std::array::from_fn(|i| ActuatorReading::zeroed(i as u8))
}

/// Convert a raw ESC temperature (hundredths of a degree) to °C.
///
/// Implausible values read as 0 °C; a faulty sensor looks cold rather than
/// unknown.
pub fn temperature_from_centidegrees(raw: f64) -> f64 {
    let deg = raw / CENTIDEGREES_PER_DEGREE;
    if deg.is_finite() && (TEMP_PLAUSIBLE_MIN_C..=TEMP_PLAUSIBLE_MAX_C).contains(&deg) {
        deg
    } else {
        0.0
    }
}

/// Fixed actuator group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    /// Actuators `0..4`.
    Top,
    /// Actuators `4..8`.
    Bottom,
}

impl Group {
    /// Group owning actuator `index`.
    #[inline]
    pub const fn of(index: usize) -> Self {
        if index < GROUP_SIZE { Self::Top } else { Self::Bottom }
    }

    /// Lowercase label.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }
}

/// Per-group statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupStats {
    pub avg_rpm: f64,
    pub avg_temp: f64,
    pub sum_current: f64,
}

impl GroupStats {
    fn from_slice(readings: &[ActuatorReading]) -> Self {
        let n = readings.len() as f64;
        let (rpm, temp, current) = readings.iter().fold((0.0, 0.0, 0.0), |acc, r| {
            (acc.0 + r.rpm, acc.1 + r.temperature, acc.2 + r.current)
        });
        Self {
            avg_rpm: rpm / n,
            avg_temp: temp / n,
            sum_current: current,
        }
    }
}

/// Both groups plus total current.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupAggregate {
    pub top: GroupStats,
    pub bottom: GroupStats,
    pub total_current: f64,
}

impl GroupAggregate {
    /// Stats for one group.
    #[inline]
    pub const fn group(&self, group: Group) -> &GroupStats {
        match group {
            Group::Top => &self.top,
            Group::Bottom => &self.bottom,
        }
    }
}

/// Split eight readings into top/bottom and aggregate.
pub fn aggregate(readings: &Readings) -> GroupAggregate {
    let top = GroupStats::from_slice(&readings[..GROUP_SIZE]);
    let bottom = GroupStats::from_slice(&readings[GROUP_SIZE..]);
    GroupAggregate {
        top,
        bottom,
        total_current: top.sum_current + bottom.sum_current,
    }
}

/// Bench instrumentation outside the ESCs (shunt, supply, load cells).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BenchInstruments {
    /// Total bench current from the supply shunt [A].
    pub total_current: f64,
    /// Supply voltage [V].
    pub voltage: f64,
    /// Generic load-cell channels.
    pub load_cells: [f64; LOAD_CELL_COUNT],
}

/// Everything the monitor sees in one poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchSnapshot {
    /// Publisher sequence number, incremented on every publish.
    pub seq: u64,
    /// Publisher wall clock [ms since Unix epoch].
    pub timestamp_ms: u64,
    /// Per-actuator readings, already range-checked.
    pub readings: Readings,
    /// Optional bench instrumentation.
    #[serde(default)]
    pub bench: Option<BenchInstruments>,
}

impl BenchSnapshot {
    /// Total bench current: the shunt when present, else the ESC sum.
    pub fn total_current(&self) -> f64 {
        match self.bench {
            Some(b) => b.total_current,
            None => self.readings.iter().map(|r| r.current).sum(),
        }
    }
}
