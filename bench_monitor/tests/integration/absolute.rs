//! Integration test: absolute ceilings abort immediately.

use bench_common::status::Severity;
use bench_monitor::supervisor::{PollOutcome, Skip};

use super::{Rig, healthy, readings};

#[test]
fn stalled_actuator_aborts_naming_it() {
    let mut rig = Rig::new();
    rig.arm();
    rig.healthy_until(8);

    let mut r = healthy();
    r[3].rpm = 200.0;
    assert_eq!(rig.feed(r), PollOutcome::Aborted);
    assert!(rig.status.contains("ABORT: ESC4 (actuator 3) low rpm (200 < 500)"));
    assert_eq!(rig.register_value(), 0.0);
}

#[test]
fn stalled_actuator_is_ignored_inside_grace() {
    let mut rig = Rig::new();
    rig.arm();
    rig.healthy_until(2);

    let mut r = healthy();
    r[3].rpm = 200.0;
    assert_eq!(rig.feed(r), PollOutcome::Skipped(Skip::RampUp));
    assert_eq!(rig.register_value(), 1.0);

    // Same fault just after the stage change: rpm checks still wait.
    rig.healthy_until(21);
    assert!(!matches!(rig.feed(r), PollOutcome::Aborted));
    rig.healthy_until(25);
    assert_eq!(rig.feed(r), PollOutcome::Aborted);
}

#[test]
fn stopped_actuator_is_not_low_rpm() {
    let mut rig = Rig::new();
    rig.arm();
    rig.healthy_until(8);

    // 0 rpm means no data, not a stall.
    let mut r = healthy();
    r[3].rpm = 0.0;
    assert!(!matches!(rig.feed(r), PollOutcome::Aborted));
}

#[test]
fn total_current_aborts_within_one_poll() {
    let mut rig = Rig::new();
    rig.arm();
    rig.healthy_until(6);

    assert_eq!(rig.feed(readings(5000.0, 13.125, 40.0)), PollOutcome::Aborted);
    assert!(rig.status.contains("ABORT: Total current too high (105.0A > 100.0A)"));
    assert_eq!(rig.register_value(), 0.0);
    assert_eq!(rig.status.count(Severity::Critical), 1);
}

#[test]
fn over_temperature_aborts() {
    let mut rig = Rig::new();
    rig.arm();
    rig.healthy_until(6);

    let mut r = healthy();
    r[5].temperature = 85.0;
    assert_eq!(rig.feed(r), PollOutcome::Aborted);
    assert!(rig.status.contains("ABORT: ESC6 (actuator 5) over temperature (85.0C >= 80.0C)"));
}

#[test]
fn single_esc_over_current_aborts() {
    let mut rig = Rig::new();
    rig.arm();
    rig.healthy_until(6);

    let mut r = readings(5000.0, 1.0, 40.0);
    r[1].current = 101.0;
    assert_eq!(rig.feed(r), PollOutcome::Aborted);
    assert!(rig.status.contains("ABORT: ESC2 (actuator 1) over current (101.0A > 100.0A)"));
}
