//! # Bench Agent
//!
//! Real-time stage sequencer for the X8 propulsion bench endurance test.
//!
//! Loads one TOML configuration, binds the trigger register, attaches the
//! output bus and telemetry providers, performs RT setup and enters the
//! fixed-period cycle loop. `--simulate` runs against the simulated bench,
//! which also publishes the telemetry downlink read by the monitor.

use clap::Parser;
use bench_agent::agent::{Agent, AgentIo};
use bench_agent::config::AgentConfig;
use bench_agent::cycle::{CycleRunner, rt_setup};
use bench_agent::hal::{OutputRange, TelemetryChain};
use bench_agent::report::JsonLinesSink;
use bench_agent::sim::SimBench;
use bench_common::config::{ConfigLoader, LogLevel};
use bench_common::downlink::DownlinkWriter;
use bench_common::register::{FileRegister, RegisterError, TriggerRegister};
use bench_common::status::TracingStatus;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// X8 bench agent: stage sequencer and telemetry logger
#[derive(Parser, Debug)]
#[command(name = "bench_agent")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Fixed-period stage sequencer for the X8 propulsion bench")]
struct Args {
    /// Path to the agent configuration TOML.
    #[arg(default_value = "config/agent.toml")]
    config: PathBuf,

    /// Run against the simulated bench instead of hardware.
    #[arg(long)]
    simulate: bool,

    /// CPU core to pin the cycle thread to (default: 1).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority (default: 80).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = AgentConfig::load(&args.config);
    setup_tracing(&args, config.as_ref().map(|c| c.shared.log_level).unwrap_or_default());

    info!("Bench agent v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = match config {
        Ok(config) => run(&args, config),
        Err(e) => Err(e.into()),
    };
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Bench agent shutdown complete");
}

fn run(args: &Args, config: AgentConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    info!(
        service = %config.shared.service_name,
        stages = config.stages.len(),
        total_s = config.stages.total_duration().as_secs(),
        fingerprint = %format!("{:016x}", config.stages.fingerprint()),
        "Config OK: cycle={}ms",
        config.agent.cycle_ms,
    );

    let register = FileRegister::new(&config.agent.register_path);
    init_register(&register, &config.agent.trigger_param)?;

    if !args.simulate {
        return Err("no hardware output bus is available on this host; run with --simulate".into());
    }

    let range = OutputRange {
        min: config.agent.pwm_min,
        max: config.agent.pwm_max,
    };
    let bench = SimBench::new(&config.sim, range)
        .with_downlink(DownlinkWriter::new(&config.sim.downlink_path));
    info!(
        downlink = %config.sim.downlink_path.display(),
        mapped = config.sim.mapped_channels,
        "simulated bench attached"
    );

    let telemetry = TelemetryChain::new(bench.providers(), &config.telemetry)?;
    let sink = JsonLinesSink::open(&config.agent.log_path)?;
    info!(path = %config.agent.log_path.display(), "structured log opened");

    let agent = Agent::new(
        &config,
        AgentIo {
            register: Box::new(register),
            bus: Box::new(bench.bus()),
            telemetry,
            sink: Box::new(sink),
            status: Box::new(TracingStatus),
        },
    );

    rt_setup(args.cpu_core, args.rt_priority)?;
    info!(
        "RT setup complete (cpu_core={}, priority={})",
        args.cpu_core, args.rt_priority
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let mut runner = CycleRunner::new(agent, config.agent.cycle_time(), running);
    if let Err(e) = runner.run() {
        error!("cycle loop error: {e}");
        return Err(Box::new(e));
    }

    Ok(())
}

/// Define the trigger parameter as 0 when the store does not have it yet.
fn init_register(register: &FileRegister, name: &str) -> Result<(), RegisterError> {
    match register.get(name) {
        Ok(value) => {
            info!(param = name, value, path = %register.path().display(), "trigger register bound");
            Ok(())
        }
        Err(RegisterError::NotFound(_)) => {
            warn!(param = name, "trigger parameter not defined; initializing to 0");
            register.set(name, 0.0)
        }
        Err(e) => Err(e),
    }
}

/// Setup tracing subscriber; `-v` overrides the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        configured.into()
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
