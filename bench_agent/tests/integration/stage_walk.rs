//! Integration test: full three-stage run.
//!
//! Validates: rising edge → stage 1 commanded the same cycle → stage
//! boundaries exactly one stage duration apart → completion clears the
//! register and drops every output to minimum.

use bench_agent::sequencer::Transition;
use bench_common::register::TriggerRegister;

use super::{P, Rig};

#[test]
fn three_stage_run_commands_each_duty_and_completes() {
    let mut rig = Rig::new();

    assert_eq!(rig.step(), Transition::Idle);
    assert_eq!(rig.sim.outputs(), [1000; 8]);

    rig.register.set(P, 1.0).unwrap();
    assert_eq!(rig.step(), Transition::Started);
    assert_eq!(rig.sim.outputs(), [1100; 8]);
    assert!(rig.status.contains("Test started: Stage 1 (10%) (10% duty), 3 stages, 3s total"));

    // Edge seen at t=100ms; stage 2 starts at t=1100ms.
    assert!(rig.steps(9).is_empty());
    assert_eq!(rig.step(), Transition::Advanced { from: 0, to: 1 });
    assert_eq!(rig.sim.outputs(), [1200; 8]);
    assert!(rig.status.contains("Stage 2/3: Stage 2 (20%) (20% duty)"));

    assert!(rig.steps(9).is_empty());
    assert_eq!(rig.step(), Transition::Advanced { from: 1, to: 2 });
    assert_eq!(rig.sim.outputs(), [1400; 8]);

    assert!(rig.steps(9).is_empty());
    assert_eq!(rig.step(), Transition::Completed);
    assert_eq!(rig.sim.outputs(), [1000; 8]);
    assert_eq!(rig.register_value(), 0.0);
    assert!(rig.status.contains("Test complete: SCR_USER4 cleared to 0"));
    assert!(!rig.agent.state().active);

    // Our own clear is not mistaken for anything.
    assert!(rig.steps(20).is_empty());
}

#[test]
fn outputs_are_recommanded_every_cycle() {
    let mut rig = Rig::new();
    rig.step();
    rig.register.set(P, 1.0).unwrap();
    rig.step();

    // Longer than the 300 ms watchdog; outputs must hold.
    for _ in 0..8 {
        rig.step();
        assert_eq!(rig.sim.outputs(), [1100; 8]);
    }
}

#[test]
fn telemetry_is_logged_at_the_log_interval() {
    let mut rig = Rig::new();
    rig.step();
    rig.register.set(P, 1.0).unwrap();
    rig.steps(31);

    // Active from 100 ms to 3100 ms, logging every 500 ms after the start.
    assert_eq!(rig.sink.count("SUMMARY"), 5);
    assert_eq!(rig.sink.count("RPM"), 5);
    assert_eq!(rig.sink.count("TEMP"), 5);
    assert_eq!(rig.sink.count("CURR"), 5);
    assert!(rig.status.contains("NORMAL t="));
}

#[test]
fn motors_follow_the_stage_duty() {
    let mut rig = Rig::new();
    rig.step();
    rig.register.set(P, 1.0).unwrap();
    rig.steps(25);

    // Mid stage 3 (40 %), rotor speed well above the stage 1 level.
    let agg = *rig.agent.aggregate();
    assert!(agg.top.avg_rpm > 3500.0, "top rpm {}", agg.top.avg_rpm);
    assert!(agg.bottom.avg_rpm > 3500.0);
    assert!(agg.total_current > 0.0);
}
