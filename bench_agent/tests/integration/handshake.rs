//! Integration test: trigger register handshake.
//!
//! Validates: baseline is not an edge, repeated set is idempotent, an
//! external clear stops the run, and a channel shortfall refuses the start
//! without touching the register.

use bench_agent::sequencer::Transition;
use bench_common::register::TriggerRegister;
use bench_common::status::Severity;

use super::{P, Rig};

#[test]
fn register_already_set_at_startup_does_not_start() {
    let mut rig = Rig::new();
    rig.register.set(P, 1.0).unwrap();

    assert_eq!(rig.step(), Transition::Idle);
    assert!(rig.steps(10).is_empty());
    assert_eq!(rig.sim.outputs(), [1000; 8]);
    assert!(!rig.status.contains("Test started"));

    // A fresh 0 → 1 transition is required.
    rig.register.set(P, 0.0).unwrap();
    assert_eq!(rig.step(), Transition::Idle);
    rig.register.set(P, 1.0).unwrap();
    assert_eq!(rig.step(), Transition::Started);
}

#[test]
fn repeated_set_does_not_restart() {
    let mut rig = Rig::new();
    rig.step();
    rig.register.set(P, 1.0).unwrap();
    assert_eq!(rig.step(), Transition::Started);
    let started_at = rig.agent.state().test_start;

    rig.steps(5);
    rig.register.set(P, 1.0).unwrap();
    let transitions = rig.steps(10);
    assert!(!transitions.contains(&Transition::Started));
    assert_eq!(rig.agent.state().test_start, started_at);
    assert_eq!(rig.agent.state().stage_index, 1);
}

#[test]
fn external_clear_stops_run() {
    let mut rig = Rig::new();
    rig.step();
    rig.register.set(P, 1.0).unwrap();
    rig.step();
    rig.steps(12);
    assert_eq!(rig.agent.state().stage_index, 1);

    rig.register.set(P, 0.0).unwrap();
    assert_eq!(rig.step(), Transition::Stopped);
    assert_eq!(rig.sim.outputs(), [1000; 8]);
    assert_eq!(rig.register_value(), 0.0);
    assert!(rig.status.contains("Test stopped: SCR_USER4 is 0"));
    assert!(rig.steps(10).is_empty());
}

#[test]
fn channel_shortfall_refuses_start_and_leaves_register() {
    let mut rig = Rig::new();
    rig.sim.set_mapped_channels(6);
    rig.step();
    rig.register.set(P, 1.0).unwrap();
    let writes = rig.register.write_count();

    assert_eq!(rig.step(), Transition::Refused { mapped: 6 });
    assert_eq!(rig.sim.outputs(), [1000; 8]);
    assert_eq!(rig.register_value(), 1.0);
    assert_eq!(rig.register.write_count(), writes);
    assert!(
        rig.status
            .lines()
            .iter()
            .any(|(s, l)| *s == Severity::Critical && l.contains("only 6 of 8"))
    );

    // Still set, still refused state: no retry without a new edge.
    assert!(rig.steps(5).is_empty());

    rig.sim.set_mapped_channels(8);
    rig.register.set(P, 0.0).unwrap();
    rig.step();
    rig.register.set(P, 1.0).unwrap();
    assert_eq!(rig.step(), Transition::Started);
}
