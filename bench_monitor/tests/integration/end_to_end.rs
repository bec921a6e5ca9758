//! Integration test: agent and monitor on one bench.
//!
//! The agent drives the simulated bench at its 10 Hz period and publishes
//! the downlink file; the monitor polls once a second. Both share one
//! trigger register. A stall injected on one motor must be caught by the
//! monitor, whose clear stops the agent on its next cycle.

use std::time::Duration;

use bench_agent::agent::{Agent, AgentIo};
use bench_agent::config::{AgentConfig, FaultKind, FaultSpec};
use bench_agent::hal::{OutputRange, TelemetryChain};
use bench_agent::report::MemorySink;
use bench_agent::sequencer::Transition;
use bench_agent::sim::SimBench;
use bench_common::config::ConfigLoader;
use bench_common::downlink::{DownlinkReader, DownlinkWriter};
use bench_common::register::{MemoryRegister, TriggerRegister};
use bench_common::status::RecordingStatus;
use bench_monitor::supervisor::{MonitorIo, PollOutcome, Supervisor};
use tempfile::tempdir;

use super::{P, config};

const AGENT_TOML: &str = r#"
[shared]
service_name = "x8-agent-e2e"

[agent]
cycle_ms = 100

[sim]
noise_frac = 0.0
seed = 11
publish_interval_ms = 500

[[stages]]
name = "Stage 3 (40%)"
duty = 0.4
duration_s = 30.0
"#;

const MONITOR_TOML: &str = r#"
[shared]
service_name = "x8-monitor-e2e"

[limits]
total_current_max_a = 250.0

[[stages]]
name = "Stage 3 (40%)"
duty = 0.4
duration_s = 30.0
expected_rpm = 7000.0
expected_current_per_actuator = 20.0
"#;

#[test]
fn monitor_abort_stops_agent() {
    let dir = tempdir().unwrap();
    let downlink = dir.path().join("downlink.json");
    let register = MemoryRegister::with(P, 0.0);
    let monitor_status = RecordingStatus::new();

    let agent_config = AgentConfig::from_toml(AGENT_TOML).unwrap();
    agent_config.validate().unwrap();
    let range = OutputRange {
        min: agent_config.agent.pwm_min,
        max: agent_config.agent.pwm_max,
    };
    let sim = SimBench::new(&agent_config.sim, range).with_downlink(DownlinkWriter::new(&downlink));
    sim.inject(FaultSpec {
        actuator: 3,
        kind: FaultKind::Stall,
        after_s: 8.0,
    });
    let mut agent = Agent::new(
        &agent_config,
        AgentIo {
            register: Box::new(register.clone()),
            bus: Box::new(sim.bus()),
            telemetry: TelemetryChain::new(sim.providers(), &agent_config.telemetry).unwrap(),
            sink: Box::new(MemorySink::new()),
            status: Box::new(RecordingStatus::new()),
        },
    );

    let monitor_config = config(MONITOR_TOML);
    let mut monitor = Supervisor::new(
        &monitor_config,
        MonitorIo {
            register: Box::new(register.clone()),
            source: Box::new(DownlinkReader::new(&downlink, monitor_config.monitor.stale_polls)),
            status: Box::new(monitor_status.clone()),
        },
    )
    .unwrap();

    let tick = Duration::from_millis(100);
    assert_eq!(agent.cycle(Duration::ZERO), Transition::Idle);
    assert_eq!(monitor.poll(Duration::ZERO), PollOutcome::Waiting);

    register.set(P, 1.0).unwrap();
    let mut aborted_at = None;
    for i in 1..=250u32 {
        let now = tick * i;
        let transition = agent.cycle(now);
        assert!(!transition.ended(), "agent ended on its own at {now:?}");
        if i % 10 == 0 {
            match monitor.poll(now) {
                PollOutcome::Aborted => {
                    aborted_at = Some(now);
                    break;
                }
                outcome => assert!(!outcome.ended_run(), "{outcome:?} at {now:?}"),
            }
        }
    }

    let aborted_at = aborted_at.expect("monitor never aborted");
    assert!(aborted_at > Duration::from_secs(8));
    assert!(monitor_status.contains("ABORT: ESC4 (actuator 3)"));
    assert_eq!(register.peek(P), Some(0.0));

    assert_eq!(agent.cycle(aborted_at + tick), Transition::Stopped);
    assert_eq!(sim.outputs(), [range.min; 8]);
}
