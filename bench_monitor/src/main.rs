//! # Bench Monitor
//!
//! Supervisory monitor for the X8 propulsion bench endurance test.
//!
//! - `watch` supervises every run started through the trigger register.
//! - `start` toggles the register (sets it when 0, clears it otherwise) and,
//!   after starting, supervises that one run.
//! - `stop` clears the register.

use bench_common::config::{ConfigLoader, LogLevel};
use bench_common::downlink::DownlinkReader;
use bench_common::register::FileRegister;
use bench_common::status::TracingStatus;
use bench_monitor::config::MonitorConfig;
use bench_monitor::supervisor::{MonitorIo, MonitorRunner, Mode, StartOutcome, Supervisor};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tokio::signal;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// X8 bench monitor: authoritative safety checks
#[derive(Parser, Debug)]
#[command(name = "bench_monitor")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Supervisory safety monitor for the X8 propulsion bench")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to the monitor configuration TOML.
    #[arg(long, default_value = "config/monitor.toml", global = true)]
    config: PathBuf,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Supervise every run until interrupted.
    Watch,
    /// Toggle the trigger register; supervise the run if one was started.
    Start,
    /// Clear the trigger register.
    Stop,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = MonitorConfig::load(&args.config);
    setup_tracing(&args, config.as_ref().map(|c| c.shared.log_level).unwrap_or_default());

    info!("Bench monitor v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = match config {
        Ok(config) => run(&args, config).await,
        Err(e) => Err(e.into()),
    };
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Bench monitor shutdown complete");
}

async fn run(args: &Args, config: MonitorConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    let program = config.program()?;
    info!(
        service = %config.shared.service_name,
        stages = program.len(),
        total_s = program.total_duration().as_secs(),
        fingerprint = %format!("{:016x}", program.fingerprint()),
        auto_stop = config.monitor.auto_stop,
        "Config OK: poll={}ms",
        config.monitor.poll_ms,
    );

    let io = MonitorIo {
        register: Box::new(FileRegister::new(&config.monitor.register_path)),
        source: Box::new(DownlinkReader::new(
            &config.monitor.downlink_path,
            config.monitor.stale_polls,
        )),
        status: Box::new(TracingStatus),
    };
    let supervisor = Supervisor::new(&config, io)?;
    let mut runner = MonitorRunner::new(supervisor, config.monitor.poll_interval());

    let mode = match args.command {
        Command::Stop => {
            runner.supervisor_mut().request_stop()?;
            return Ok(());
        }
        Command::Start => match runner.request_start()? {
            StartOutcome::StopRequested => return Ok(()),
            StartOutcome::Started => Mode::Once,
        },
        Command::Watch => {
            info!(
                param = %config.monitor.trigger_param,
                "waiting for a rising edge on the trigger register"
            );
            Mode::Watch
        }
    };

    runner.run(mode, shutdown_signal()).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
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
