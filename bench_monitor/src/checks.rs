//! Authoritative safety checks.
//!
//! Evaluated once per poll against the latest downlink snapshot:
//!
//! 1. Absolute ceilings (ABORT only): rpm above zero but below the floor,
//!    temperature at or over the ceiling, per-actuator current, bench total
//!    current.
//! 2. Deviation checks (WARN, then ABORT at the wider bound): rpm against
//!    the stage expectation, temperature against the median of valid
//!    temperatures, per-actuator current and total current against the
//!    stage expectation.
//!
//! Evaluation stops at the first ABORT. Nothing is checked before the
//! ramp-up grace since run start; rpm checks also wait out the grace after
//! every stage change.

use std::fmt;
use std::time::Duration;

use bench_common::classify::Classification;
use bench_common::consts::ACTUATOR_COUNT;
use bench_common::telemetry::BenchSnapshot;

use crate::config::{AbsoluteLimits, DeviationBounds, ExpectedProfile};

/// Finding severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Warn,
    Abort,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warn => "WARN",
            Self::Abort => "ABORT",
        })
    }
}

/// Which check produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    LowRpm,
    OverTemperature,
    OverCurrent,
    TotalOverCurrent,
    RpmDeviation,
    TemperatureDeviation,
    CurrentDeviation,
    TotalCurrentDeviation,
}

/// One check result with its operator-facing reason.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub level: Level,
    pub kind: CheckKind,
    /// 0-based actuator index, `None` for bench-wide checks.
    pub actuator: Option<usize>,
    pub reason: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.level, self.reason)
    }
}

/// Where the run is when a snapshot is checked.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    /// Time since run start.
    pub elapsed: Duration,
    /// Time since the current stage started.
    pub stage_elapsed: Duration,
    pub expected: &'a ExpectedProfile,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Assessment {
    /// Still inside the ramp-up grace; nothing was checked.
    pub held_off: bool,
    /// Findings in evaluation order. An ABORT, if any, is last.
    pub findings: Vec<Finding>,
}

impl Assessment {
    /// The ABORT finding, if evaluation ended on one.
    pub fn abort(&self) -> Option<&Finding> {
        self.findings.last().filter(|f| f.level == Level::Abort)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.level == Level::Warn)
    }

    /// Authoritative classification: any ABORT is EMERGENCY.
    pub fn classification(&self) -> Classification {
        if self.abort().is_some() {
            Classification::Emergency
        } else if self.findings.is_empty() {
            Classification::Normal
        } else {
            Classification::Warning
        }
    }
}

/// Label used in reasons, e.g. `ESC4 (actuator 3)`.
fn esc(i: usize) -> String {
    format!("ESC{} (actuator {i})", i + 1)
}

/// Upper median (`sorted[n / 2]`) of the positive values.
pub fn positive_median(values: &[f64]) -> Option<f64> {
    let mut valid: Vec<f64> = values.iter().copied().filter(|v| *v > 0.0).collect();
    if valid.is_empty() {
        return None;
    }
    valid.sort_by(f64::total_cmp);
    Some(valid[valid.len() / 2])
}

/// Grade a deviation against a (warning, abort) bound pair.
#[inline]
fn grade(deviation: f64, warn: f64, abort: f64) -> Option<Level> {
    if deviation > abort {
        Some(Level::Abort)
    } else if deviation > warn {
        Some(Level::Warn)
    } else {
        None
    }
}

/// The authoritative checker.
#[derive(Debug, Clone)]
pub struct Checker {
    limits: AbsoluteLimits,
    bounds: DeviationBounds,
    grace: Duration,
}

impl Checker {
    pub fn new(limits: AbsoluteLimits, bounds: DeviationBounds, grace: Duration) -> Self {
        Self {
            limits,
            bounds,
            grace,
        }
    }

    /// Evaluate `snapshot`.
    pub fn assess(&self, snapshot: &BenchSnapshot, ctx: &CheckContext<'_>) -> Assessment {
        if ctx.elapsed < self.grace {
            return Assessment {
                held_off: true,
                findings: Vec::new(),
            };
        }
        let mut findings = Vec::new();
        if self.absolute(snapshot, ctx, &mut findings) {
            self.deviation(snapshot, ctx, &mut findings);
        }
        Assessment {
            held_off: false,
            findings,
        }
    }

    /// Returns `false` once an ABORT was pushed.
    fn absolute(&self, snap: &BenchSnapshot, ctx: &CheckContext<'_>, out: &mut Vec<Finding>) -> bool {
        let l = &self.limits;
        let r = &snap.readings;

        if ctx.stage_elapsed >= self.grace {
            for (i, reading) in r.iter().enumerate() {
                if reading.rpm > 0.0 && reading.rpm < l.rpm_floor {
                    out.push(Finding {
                        level: Level::Abort,
                        kind: CheckKind::LowRpm,
                        actuator: Some(i),
                        reason: format!(
                            "{} low rpm ({:.0} < {:.0})",
                            esc(i),
                            reading.rpm,
                            l.rpm_floor
                        ),
                    });
                    return false;
                }
            }
        }

        for (i, reading) in r.iter().enumerate() {
            let t = reading.temperature;
            if t > 0.0 && t >= l.temp_ceiling_c {
                out.push(Finding {
                    level: Level::Abort,
                    kind: CheckKind::OverTemperature,
                    actuator: Some(i),
                    reason: format!(
                        "{} over temperature ({t:.1}C >= {:.1}C)",
                        esc(i),
                        l.temp_ceiling_c
                    ),
                });
                return false;
            }
        }

        for (i, reading) in r.iter().enumerate() {
            if reading.current > l.esc_current_max_a {
                out.push(Finding {
                    level: Level::Abort,
                    kind: CheckKind::OverCurrent,
                    actuator: Some(i),
                    reason: format!(
                        "{} over current ({:.1}A > {:.1}A)",
                        esc(i),
                        reading.current,
                        l.esc_current_max_a
                    ),
                });
                return false;
            }
        }

        let total = snap.total_current();
        if total > l.total_current_max_a {
            out.push(Finding {
                level: Level::Abort,
                kind: CheckKind::TotalOverCurrent,
                actuator: None,
                reason: format!(
                    "Total current too high ({total:.1}A > {:.1}A)",
                    l.total_current_max_a
                ),
            });
            return false;
        }
        true
    }

    fn deviation(&self, snap: &BenchSnapshot, ctx: &CheckContext<'_>, out: &mut Vec<Finding>) {
        let b = &self.bounds;
        let r = &snap.readings;
        let exp = ctx.expected;

        if ctx.stage_elapsed >= self.grace && exp.rpm > 0.0 {
            for (i, reading) in r.iter().enumerate() {
                let frac = (reading.rpm - exp.rpm).abs() / exp.rpm;
                if let Some(level) = grade(frac, b.rpm_warn_frac, b.rpm_abort_frac) {
                    let what = if level == Level::Abort { "rpm out of range" } else { "rpm off" };
                    out.push(Finding {
                        level,
                        kind: CheckKind::RpmDeviation,
                        actuator: Some(i),
                        reason: format!(
                            "{} {what} ({:.0} vs {:.0}, {:.0}%)",
                            esc(i),
                            reading.rpm,
                            exp.rpm,
                            frac * 100.0
                        ),
                    });
                    if level == Level::Abort {
                        return;
                    }
                }
            }
        }

        let temps: [f64; ACTUATOR_COUNT] = r.map(|x| x.temperature);
        if let Some(median) = positive_median(&temps) {
            for (i, &t) in temps.iter().enumerate() {
                if t <= 0.0 {
                    continue;
                }
                let diff = t - median;
                if let Some(level) = grade(diff.abs(), b.temp_warn_c, b.temp_abort_c) {
                    out.push(Finding {
                        level,
                        kind: CheckKind::TemperatureDeviation,
                        actuator: Some(i),
                        reason: format!(
                            "{} temp off median ({t:.1}C vs {median:.1}C, diff={diff:.1}C)",
                            esc(i)
                        ),
                    });
                    if level == Level::Abort {
                        return;
                    }
                }
            }
        }

        for (i, reading) in r.iter().enumerate() {
            let expected = exp.current_per_actuator[i];
            if expected <= 0.0 {
                continue;
            }
            let frac = (reading.current - expected).abs() / expected;
            if let Some(level) = grade(frac, b.current_warn_frac, b.current_abort_frac) {
                let what = if level == Level::Abort { "current out of range" } else { "current off" };
                out.push(Finding {
                    level,
                    kind: CheckKind::CurrentDeviation,
                    actuator: Some(i),
                    reason: format!(
                        "{} {what} ({:.1}A vs {expected:.1}A, {:.0}%)",
                        esc(i),
                        reading.current,
                        frac * 100.0
                    ),
                });
                if level == Level::Abort {
                    return;
                }
            }
        }

        if exp.total_current > 0.0 {
            let total = snap.total_current();
            let frac = (total - exp.total_current).abs() / exp.total_current;
            if let Some(level) = grade(frac, b.current_warn_frac, b.current_abort_frac) {
                let what = if level == Level::Abort {
                    "Total current out of range"
                } else {
                    "Total current off"
                };
                out.push(Finding {
                    level,
                    kind: CheckKind::TotalCurrentDeviation,
                    actuator: None,
                    reason: format!(
                        "{what} ({total:.1}A vs {:.1}A, {:.0}%)",
                        exp.total_current,
                        frac * 100.0
                    ),
                });
                if level == Level::Abort {
                    return;
                }
            }
        }
    }
}
