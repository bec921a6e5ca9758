//! Integration test: deviation checks against the stage expectations.
//!
//! Validates: the ramp-up hold-off, WARN keeps the run going, ABORT clears
//! the register, and rpm checks wait out the grace after a stage change
//! while current checks do not.

use bench_common::classify::Classification;
use bench_common::status::Severity;
use bench_monitor::supervisor::{Phase, PollOutcome, Skip};

use super::{Rig, healthy, readings};

#[test]
fn checks_are_held_off_after_start() {
    let mut rig = Rig::new();
    rig.arm();
    let outcomes = rig.healthy_until(5);
    assert_eq!(outcomes, vec![PollOutcome::Skipped(Skip::RampUp); 4]);
    assert_eq!(rig.feed(healthy()), PollOutcome::Assessed(Classification::Normal));
}

#[test]
fn rpm_warning_keeps_run_and_abort_clears_register() {
    let mut rig = Rig::new();
    rig.arm();
    let outcomes = rig.healthy_until(25);
    assert!(outcomes[4..]
        .iter()
        .all(|o| *o == PollOutcome::Assessed(Classification::Normal)));

    // 12 % high on every actuator.
    let outcome = rig.feed(readings(5600.0, 10.0, 40.0));
    assert_eq!(outcome, PollOutcome::Assessed(Classification::Warning));
    assert_eq!(rig.register_value(), 1.0);
    assert_eq!(rig.status.count(Severity::Warning), 8);
    assert!(rig.status.contains("WARN: ESC1 (actuator 0) rpm off (5600 vs 5000, 12%)"));
    assert!(rig.supervisor.is_supervising());

    // 32 % high: ABORT on the first actuator, evaluation stops there.
    let outcome = rig.feed(readings(6600.0, 10.0, 40.0));
    assert_eq!(outcome, PollOutcome::Aborted);
    assert_eq!(rig.register_value(), 0.0);
    assert_eq!(rig.status.count(Severity::Critical), 1);
    assert!(rig.status.contains("ABORT: ESC1 (actuator 0) rpm out of range (6600 vs 5000, 32%)"));
    assert!(rig.status.contains("SCR_USER4 set to 0 (test stop requested)"));
    assert_eq!(rig.supervisor.phase(), Phase::Idle);
}

#[test]
fn rpm_checks_wait_after_stage_change() {
    let mut rig = Rig::new();
    rig.arm();
    rig.healthy_until(21);

    // One second into stage 2: rpm far off, but not checked yet.
    let outcome = rig.feed(readings(7000.0, 10.0, 40.0));
    assert_eq!(outcome, PollOutcome::Assessed(Classification::Normal));

    rig.healthy_until(25);
    assert_eq!(rig.feed(readings(7000.0, 10.0, 40.0)), PollOutcome::Aborted);
    assert!(rig.status.contains("ESC1 (actuator 0) rpm out of range (7000 vs 5000, 40%)"));
}

#[test]
fn current_checks_run_during_rpm_grace() {
    let mut rig = Rig::new();
    rig.arm();
    rig.healthy_until(21);

    let mut r = healthy();
    r[7].current = 14.0;
    assert_eq!(rig.feed(r), PollOutcome::Aborted);
    assert!(rig.status.contains("ABORT: ESC8 (actuator 7) current out of range (14.0A vs 10.0A, 40%)"));
}

#[test]
fn stage_without_expectations_skips_deviation_checks() {
    let mut rig = Rig::new();
    rig.arm();
    rig.healthy_until(6);

    // Stage 1 has no expected rpm or current.
    let outcome = rig.feed(readings(9000.0, 12.0, 40.0));
    assert_eq!(outcome, PollOutcome::Assessed(Classification::Normal));
    assert_eq!(rig.register_value(), 1.0);
}

#[test]
fn temperature_outlier_warns_against_median() {
    let mut rig = Rig::new();
    rig.arm();
    rig.healthy_until(6);

    let mut r = healthy();
    r[2].temperature = 55.0;
    assert_eq!(rig.feed(r), PollOutcome::Assessed(Classification::Warning));
    assert!(rig.status.contains("WARN: ESC3 (actuator 2) temp off median (55.0C vs 40.0C, diff=15.0C)"));
    assert_eq!(rig.register_value(), 1.0);
}
