//! Classification levels and the agent's advisory tier.
//!
//! The advisory tier uses absolute thresholds on group temperature and total
//! current. EMERGENCY checks are evaluated before WARNING checks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, check_positive};
use crate::telemetry::{Group, GroupAggregate};

/// Per-cycle operating classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Classification {
    #[default]
    Normal = 0,
    Warning = 1,
    Emergency = 2,
}

impl Classification {
    /// Upper-case label used in status lines.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Warning => "WARNING",
            Self::Emergency => "EMERGENCY",
        }
    }

    /// Numeric code for structured log records.
    #[inline]
    pub const fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Absolute limits for the advisory tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryThresholds {
    /// Group average temperature for WARNING [°C].
    #[serde(default = "default_warn_temp")]
    pub warn_temp_c: f64,
    /// Group average temperature for EMERGENCY [°C].
    #[serde(default = "default_crit_temp")]
    pub crit_temp_c: f64,
    /// Total current for WARNING [A].
    #[serde(default = "default_warn_current")]
    pub warn_current_a: f64,
    /// Total current for EMERGENCY [A].
    #[serde(default = "default_crit_current")]
    pub crit_current_a: f64,
}

fn default_warn_temp() -> f64 {
    70.0
}
fn default_crit_temp() -> f64 {
    85.0
}
fn default_warn_current() -> f64 {
    150.0
}
fn default_crit_current() -> f64 {
    180.0
}

impl Default for AdvisoryThresholds {
    fn default() -> Self {
        Self {
            warn_temp_c: default_warn_temp(),
            crit_temp_c: default_crit_temp(),
            warn_current_a: default_warn_current(),
            crit_current_a: default_crit_current(),
        }
    }
}

impl AdvisoryThresholds {
    /// Every limit positive; warning strictly below critical.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("warn_temp_c", self.warn_temp_c)?;
        check_positive("crit_temp_c", self.crit_temp_c)?;
        check_positive("warn_current_a", self.warn_current_a)?;
        check_positive("crit_current_a", self.crit_current_a)?;
        if self.warn_temp_c >= self.crit_temp_c {
            return Err(ConfigError::ValidationError(format!(
                "warn_temp_c {} must be below crit_temp_c {}",
                self.warn_temp_c, self.crit_temp_c
            )));
        }
        if self.warn_current_a >= self.crit_current_a {
            return Err(ConfigError::ValidationError(format!(
                "warn_current_a {} must be below crit_current_a {}",
                self.warn_current_a, self.crit_current_a
            )));
        }
        Ok(())
    }
}

/// The first limit that produced a non-NORMAL advisory result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdvisoryTrigger {
    GroupTemperature {
        group: Group,
        measured: f64,
        limit: f64,
    },
    TotalCurrent {
        measured: f64,
        limit: f64,
    },
}

impl fmt::Display for AdvisoryTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GroupTemperature {
                group,
                measured,
                limit,
            } => write!(
                f,
                "{} group avg temp {measured:.1}C >= {limit:.1}C",
                group.label()
            ),
            Self::TotalCurrent { measured, limit } => {
                write!(f, "total current {measured:.1}A >= {limit:.1}A")
            }
        }
    }
}

/// Advisory verdict for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Advisory {
    pub class: Classification,
    pub trigger: Option<AdvisoryTrigger>,
}

fn first_exceeded(
    agg: &GroupAggregate,
    temp_limit: f64,
    current_limit: f64,
) -> Option<AdvisoryTrigger> {
    for group in [Group::Top, Group::Bottom] {
        let measured = agg.group(group).avg_temp;
        if measured >= temp_limit {
            return Some(AdvisoryTrigger::GroupTemperature {
                group,
                measured,
                limit: temp_limit,
            });
        }
    }
    if agg.total_current >= current_limit {
        return Some(AdvisoryTrigger::TotalCurrent {
            measured: agg.total_current,
            limit: current_limit,
        });
    }
    None
}

/// Classify one cycle against the advisory thresholds.
pub fn classify_advisory(agg: &GroupAggregate, th: &AdvisoryThresholds) -> Advisory {
    if let Some(trigger) = first_exceeded(agg, th.crit_temp_c, th.crit_current_a) {
        return Advisory {
            class: Classification::Emergency,
            trigger: Some(trigger),
        };
    }
    if let Some(trigger) = first_exceeded(agg, th.warn_temp_c, th.warn_current_a) {
        return Advisory {
            class: Classification::Warning,
            trigger: Some(trigger),
        };
    }
    Advisory {
        class: Classification::Normal,
        trigger: None,
    }
}
