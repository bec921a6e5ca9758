//! Shared harness for monitor integration tests.

mod absolute;
mod deviation;
mod end_to_end;
mod lifecycle;
mod shipped_config;
mod telemetry;

use std::time::Duration;

use bench_common::config::ConfigLoader;
use bench_common::register::{MemoryRegister, TriggerRegister};
use bench_common::status::RecordingStatus;
use bench_common::telemetry::{ActuatorReading, Readings};
use bench_monitor::config::MonitorConfig;
use bench_monitor::source::{MemorySource, SnapshotSource};
use bench_monitor::supervisor::{MonitorIo, PollOutcome, Supervisor};

pub const P: &str = "SCR_USER4";

pub const POLL: Duration = Duration::from_secs(1);

/// Two 20 s stages; only the second carries expectations.
pub const MONITOR_TOML: &str = r#"
[shared]
service_name = "x8-monitor-test"

[monitor]
poll_ms = 1000
ramp_up_grace_s = 5.0
end_grace_s = 5.0
stale_polls = 3
auto_stop = true

[[stages]]
name = "Stage 1 (10%)"
duty = 0.1
duration_s = 20.0

[[stages]]
name = "Stage 2 (20%)"
duty = 0.2
duration_s = 20.0
expected_rpm = 5000.0
expected_current_per_actuator = 10.0
expected_total_current = 80.0
"#;

pub fn config(toml: &str) -> MonitorConfig {
    let config = MonitorConfig::from_toml(toml).unwrap();
    config.validate().unwrap();
    config
}

/// Same values on every actuator.
pub fn readings(rpm: f64, current: f64, temperature: f64) -> Readings {
    std::array::from_fn(|i| ActuatorReading {
        index: i as u8,
        rpm,
        current,
        temperature,
    })
}

/// Matches every stage 2 expectation exactly.
pub fn healthy() -> Readings {
    readings(5000.0, 10.0, 40.0)
}

/// Supervisor plus handles to everything it talks to.
pub struct Rig {
    pub supervisor: Supervisor,
    pub register: MemoryRegister,
    pub source: MemorySource,
    pub status: RecordingStatus,
    pub now: Duration,
    /// Monitor time of the `Started` poll.
    pub since: Duration,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_toml(MONITOR_TOML)
    }

    pub fn with_toml(toml: &str) -> Self {
        let source = MemorySource::new();
        Self::with_source(toml, source.clone(), Box::new(source))
    }

    /// Rig reading snapshots from `input`; `source` is only used by
    /// [`Rig::feed`].
    pub fn with_source(toml: &str, source: MemorySource, input: Box<dyn SnapshotSource>) -> Self {
        let register = MemoryRegister::with(P, 0.0);
        let status = RecordingStatus::new();
        let supervisor = Supervisor::new(
            &config(toml),
            MonitorIo {
                register: Box::new(register.clone()),
                source: input,
                status: Box::new(status.clone()),
            },
        )
        .unwrap();
        Self {
            supervisor,
            register,
            source,
            status,
            now: Duration::ZERO,
            since: Duration::ZERO,
        }
    }

    /// One poll at the current time, then advance the clock.
    pub fn poll(&mut self) -> PollOutcome {
        let outcome = self.supervisor.poll(self.now);
        self.now += POLL;
        outcome
    }

    /// Publish `readings`, then poll.
    pub fn feed(&mut self, readings: Readings) -> PollOutcome {
        self.source.publish(readings, None);
        self.poll()
    }

    /// Baseline poll, operator sets the register, rising edge observed.
    pub fn arm(&mut self) {
        assert_eq!(self.poll(), PollOutcome::Waiting);
        self.register.set(P, 1.0).unwrap();
        self.since = self.now;
        assert_eq!(self.poll(), PollOutcome::Started);
    }

    /// Run time of the next poll [s].
    pub fn next_elapsed(&self) -> u64 {
        self.now.saturating_sub(self.since).as_secs()
    }

    /// Feed healthy readings until the next poll is at run time `elapsed_s`.
    pub fn healthy_until(&mut self, elapsed_s: u64) -> Vec<PollOutcome> {
        let mut outcomes = Vec::new();
        while self.next_elapsed() < elapsed_s {
            outcomes.push(self.feed(healthy()));
        }
        outcomes
    }

    pub fn register_value(&self) -> f64 {
        self.register.peek(P).unwrap()
    }

    /// Status lines containing `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.status
            .lines()
            .iter()
            .filter(|(_, l)| l.contains(needle))
            .count()
    }
}
