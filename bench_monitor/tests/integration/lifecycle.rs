//! Integration test: supervision lifecycle.
//!
//! Validates: start on a fresh rising edge only, the start toggle, external
//! stop, the end-of-program guard, re-arming in watch mode, report-only
//! mode and collaborator failures.

use std::time::Duration;

use bench_common::classify::Classification;
use bench_common::register::TriggerRegister;
use bench_common::status::Severity;
use bench_monitor::supervisor::{Phase, PollOutcome, Skip, StartOutcome};

use super::{MONITOR_TOML, P, Rig, healthy, readings};

#[test]
fn register_set_at_startup_needs_fresh_edge() {
    let mut rig = Rig::new();
    rig.register.set(P, 1.0).unwrap();

    assert_eq!(rig.poll(), PollOutcome::Waiting);
    assert_eq!(rig.poll(), PollOutcome::Waiting);
    assert!(!rig.supervisor.is_supervising());

    rig.register.set(P, 0.0).unwrap();
    assert_eq!(rig.poll(), PollOutcome::Waiting);
    rig.register.set(P, 1.0).unwrap();
    assert_eq!(rig.poll(), PollOutcome::Started);
    assert!(rig.status.contains("SCR_USER4 set: supervising 2 stages"));
}

#[test]
fn program_end_clears_register() {
    let mut rig = Rig::new();
    rig.arm();

    let outcomes = rig.healthy_until(45);
    assert!(!outcomes.iter().any(PollOutcome::ended_run));
    assert_eq!(rig.register_value(), 1.0);

    assert_eq!(rig.feed(healthy()), PollOutcome::Ended);
    assert_eq!(rig.register_value(), 0.0);
    assert!(rig.status.contains("Test ended: SCR_USER4 set to 0"));
    assert_eq!(rig.poll(), PollOutcome::Waiting);
}

#[test]
fn external_clear_ends_supervision() {
    let mut rig = Rig::new();
    rig.arm();
    rig.healthy_until(10);

    rig.register.set(P, 0.0).unwrap();
    assert_eq!(rig.feed(healthy()), PollOutcome::StoppedExternally);
    assert!(rig.status.contains("SCR_USER4 is 0, supervision stopped at t=10s"));
    assert_eq!(rig.supervisor.phase(), Phase::Idle);
    assert_eq!(rig.feed(healthy()), PollOutcome::Waiting);
}

#[test]
fn restart_between_polls_keeps_original_start_time() {
    let mut rig = Rig::new();
    rig.arm();
    rig.healthy_until(10);

    rig.register.set(P, 0.0).unwrap();
    rig.register.set(P, 1.0).unwrap();
    let outcome = rig.feed(healthy());
    assert!(!outcome.ended_run());
    assert_eq!(rig.supervisor.phase(), Phase::Supervising { since: rig.since });
    assert_eq!(rig.count_containing("supervision stopped"), 0);
}

#[test]
fn watch_rearms_after_abort() {
    let mut rig = Rig::new();
    rig.arm();
    rig.healthy_until(6);
    assert_eq!(rig.feed(readings(5000.0, 13.125, 40.0)), PollOutcome::Aborted);

    // Our own clear is not an edge.
    assert_eq!(rig.poll(), PollOutcome::Waiting);

    rig.register.set(P, 1.0).unwrap();
    let restart = rig.now;
    assert_eq!(rig.poll(), PollOutcome::Started);
    assert_eq!(rig.supervisor.phase(), Phase::Supervising { since: restart });
    // Run time restarts: back inside the hold-off.
    assert_eq!(rig.feed(healthy()), PollOutcome::Skipped(Skip::RampUp));
}

#[test]
fn report_only_mode_never_clears_register() {
    let toml = MONITOR_TOML.replace("auto_stop = true", "auto_stop = false");
    let mut rig = Rig::with_toml(&toml);
    rig.arm();
    rig.healthy_until(25);

    let overspeed = readings(6600.0, 10.0, 40.0);
    assert_eq!(rig.feed(overspeed), PollOutcome::Assessed(Classification::Emergency));
    assert_eq!(rig.feed(overspeed), PollOutcome::Assessed(Classification::Emergency));
    assert_eq!(rig.status.count(Severity::Critical), 1);
    assert!(rig.status.contains("(auto stop disabled, register left set)"));

    let mut stalled = healthy();
    stalled[3].rpm = 200.0;
    assert_eq!(rig.feed(stalled), PollOutcome::Assessed(Classification::Emergency));
    assert_eq!(rig.status.count(Severity::Critical), 2);

    assert_eq!(rig.feed(healthy()), PollOutcome::Assessed(Classification::Normal));
    rig.feed(overspeed);
    assert_eq!(rig.status.count(Severity::Critical), 3);

    assert_eq!(rig.register_value(), 1.0);
    assert_eq!(rig.register.write_count(), 1);
    assert!(rig.supervisor.is_supervising());
}

#[test]
fn failed_abort_clear_is_reported() {
    let mut rig = Rig::new();
    rig.arm();
    rig.healthy_until(6);

    rig.register.fail_writes(true);
    assert_eq!(rig.feed(readings(5000.0, 13.125, 40.0)), PollOutcome::Aborted);
    assert!(rig.status.contains("Cannot set SCR_USER4 to 0"));
    assert_eq!(rig.register_value(), 1.0);
    assert_eq!(rig.supervisor.phase(), Phase::Idle);

    // Still set, but not a new edge.
    assert_eq!(rig.poll(), PollOutcome::Waiting);
}

#[test]
fn unreadable_register_skips_polls_and_reports_once() {
    let mut rig = Rig::new();
    rig.arm();
    rig.healthy_until(6);

    rig.register.fail_reads(true);
    for _ in 0..3 {
        assert_eq!(rig.feed(healthy()), PollOutcome::Skipped(Skip::RegisterUnreadable));
    }
    assert_eq!(rig.count_containing("Cannot read SCR_USER4"), 1);
    assert!(rig.supervisor.is_supervising());

    rig.register.fail_reads(false);
    assert_eq!(rig.feed(healthy()), PollOutcome::Assessed(Classification::Normal));
}

#[test]
fn start_command_toggles_and_supervises() {
    let mut rig = Rig::new();
    rig.now = Duration::from_secs(3);

    assert_eq!(rig.supervisor.request_start(rig.now).unwrap(), StartOutcome::Started);
    rig.since = rig.now;
    rig.now += Duration::from_secs(1);
    assert_eq!(rig.register_value(), 1.0);
    assert!(rig.status.contains("Planned test duration: ~0 minutes"));

    // The own write is the baseline, not a rising edge.
    assert_eq!(rig.feed(healthy()), PollOutcome::Skipped(Skip::RampUp));
    rig.healthy_until(6);
    assert_eq!(rig.feed(healthy()), PollOutcome::Assessed(Classification::Normal));

    assert_eq!(rig.supervisor.request_start(rig.now).unwrap(), StartOutcome::StopRequested);
    assert_eq!(rig.register_value(), 0.0);
    assert!(rig.status.contains("SCR_USER4 was non-zero, set to 0. Test stop requested."));
    assert_eq!(rig.poll(), PollOutcome::Waiting);
}
