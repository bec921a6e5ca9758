//! Shared harness for agent integration tests.

mod collaborator_failures;
mod handshake;
mod stage_walk;

use std::time::Duration;

use bench_agent::agent::{Agent, AgentIo};
use bench_agent::config::AgentConfig;
use bench_agent::hal::{OutputRange, TelemetryChain, TelemetryProvider};
use bench_agent::report::MemorySink;
use bench_agent::sequencer::Transition;
use bench_agent::sim::SimBench;
use bench_common::config::ConfigLoader;
use bench_common::register::MemoryRegister;
use bench_common::status::RecordingStatus;

pub const P: &str = "SCR_USER4";

/// Three one-second stages at 10/20/40 % duty, noiseless simulator.
pub const AGENT_TOML: &str = r#"
[shared]
service_name = "x8-agent-test"

[agent]
cycle_ms = 100
pwm_min = 1000
pwm_max = 2000
log_interval_ms = 500
display_interval_ms = 1000

[advisory]
warn_current_a = 80.0
crit_current_a = 100.0

[sim]
noise_frac = 0.0
seed = 7

[[stages]]
name = "Stage 1 (10%)"
duty = 0.1
duration_s = 1.0

[[stages]]
name = "Stage 2 (20%)"
duty = 0.2
duration_s = 1.0

[[stages]]
name = "Stage 3 (40%)"
duty = 0.4
duration_s = 1.0
"#;

pub fn config() -> AgentConfig {
    let config = AgentConfig::from_toml(AGENT_TOML).unwrap();
    config.validate().unwrap();
    config
}

/// Agent plus handles to everything it talks to.
pub struct Rig {
    pub agent: Agent,
    pub register: MemoryRegister,
    pub sim: SimBench,
    pub sink: MemorySink,
    pub status: RecordingStatus,
    pub now: Duration,
    pub cycle: Duration,
}

impl Rig {
    /// Simulated bench with its own telemetry.
    pub fn new() -> Self {
        let config = config();
        let sim = SimBench::new(&config.sim, range(&config));
        let providers = sim.providers();
        Self::build(config, sim, providers)
    }

    /// Simulated outputs, telemetry from `providers`.
    pub fn with_providers(providers: Vec<Box<dyn TelemetryProvider>>) -> Self {
        let config = config();
        let sim = SimBench::new(&config.sim, range(&config));
        Self::build(config, sim, providers)
    }

    fn build(
        config: AgentConfig,
        sim: SimBench,
        providers: Vec<Box<dyn TelemetryProvider>>,
    ) -> Self {
        let register = MemoryRegister::with(P, 0.0);
        let sink = MemorySink::new();
        let status = RecordingStatus::new();
        let telemetry = TelemetryChain::new(providers, &config.telemetry).unwrap();
        let agent = Agent::new(
            &config,
            AgentIo {
                register: Box::new(register.clone()),
                bus: Box::new(sim.bus()),
                telemetry,
                sink: Box::new(sink.clone()),
                status: Box::new(status.clone()),
            },
        );
        Self {
            agent,
            register,
            sim,
            sink,
            status,
            now: Duration::ZERO,
            cycle: config.agent.cycle_time(),
        }
    }

    /// One agent cycle at the current time, then advance the clock.
    pub fn step(&mut self) -> Transition {
        let t = self.agent.cycle(self.now);
        self.now += self.cycle;
        t
    }

    /// `n` cycles, returning every transition that was not a plain hold or idle.
    pub fn steps(&mut self, n: usize) -> Vec<Transition> {
        (0..n)
            .map(|_| self.step())
            .filter(|t| !matches!(t, Transition::Hold { .. } | Transition::Idle))
            .collect()
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

fn range(config: &AgentConfig) -> OutputRange {
    OutputRange {
        min: config.agent.pwm_min,
        max: config.agent.pwm_max,
    }
}
