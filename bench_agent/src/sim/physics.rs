//! First-order motor model.
//!
//! Each motor tracks three states: rotor speed, ESC current and ESC
//! temperature. Speed follows the commanded duty with time constant
//! `rpm_tau_s`; current follows speed; temperature relaxes towards
//! `ambient + temp_rise_per_amp * current` with `thermal_tau_s`.

use crate::config::{FaultKind, SimConfig};

/// Rotor speed fraction reached by a stalled motor.
const STALL_RPM_FACTOR: f64 = 0.03;
/// Current multiplier of a stalled motor at the same duty.
const STALL_CURRENT_FACTOR: f64 = 1.5;
/// Current multiplier for an over-current fault.
const OVERCURRENT_FACTOR: f64 = 2.5;
/// Extra steady-state temperature of an overheating ESC [°C].
const OVERHEAT_EXTRA_C: f64 = 45.0;

/// True physical state of one motor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorModel {
    pub rpm: f64,
    pub current: f64,
    pub temperature: f64,
}

impl MotorModel {
    /// Motor at rest at ambient temperature.
    pub fn at_rest(ambient_c: f64) -> Self {
        Self {
            rpm: 0.0,
            current: 0.0,
            temperature: ambient_c,
        }
    }

    /// Advance by `dt_s` seconds at `duty`.
    pub fn step(&mut self, duty: f64, dt_s: f64, p: &SimConfig, fault: Option<FaultKind>) {
        if dt_s <= 0.0 {
            return;
        }
        let duty = duty.clamp(0.0, 1.0);

        let mut target_rpm = p.rpm_per_duty * duty;
        if fault == Some(FaultKind::Stall) {
            target_rpm *= STALL_RPM_FACTOR;
        }
        self.rpm += (target_rpm - self.rpm) * relax(dt_s, p.rpm_tau_s);

        self.current = match fault {
            Some(FaultKind::Stall) => p.amps_per_duty * duty * STALL_CURRENT_FACTOR,
            _ if p.rpm_per_duty > 0.0 => p.amps_per_duty * self.rpm / p.rpm_per_duty,
            _ => 0.0,
        };
        if fault == Some(FaultKind::OverCurrent) {
            self.current *= OVERCURRENT_FACTOR;
        }

        let mut target_temp = p.ambient_c + p.temp_rise_per_amp * self.current;
        if fault == Some(FaultKind::Overheat) {
            target_temp += OVERHEAT_EXTRA_C;
        }
        self.temperature += (target_temp - self.temperature) * relax(dt_s, p.thermal_tau_s);
    }
}

/// Fraction of the remaining gap closed in `dt` for time constant `tau`.
#[inline]
fn relax(dt_s: f64, tau_s: f64) -> f64 {
    1.0 - (-dt_s / tau_s).exp()
}
