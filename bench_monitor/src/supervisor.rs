//! Supervision state machine and its polling loop.
//!
//! ```text
//!            rising edge / start request
//!   IDLE ───────────────────────────────▶ SUPERVISING
//!    ▲                                        │
//!    │  ABORT (register cleared)              │
//!    │  register reads 0                      │
//!    └──── program end + grace (cleared) ◀────┘
//! ```
//!
//! One [`Supervisor::poll`] per poll period. Time is passed in explicitly
//! so the state machine runs the same under tokio and in tests.

use std::future::Future;
use std::time::Duration;

use bench_common::classify::Classification;
use bench_common::config::ConfigError;
use bench_common::downlink::DownlinkError;
use bench_common::register::{Edge, RegisterError, TriggerLine, TriggerRegister};
use bench_common::stage::StageProgram;
use bench_common::status::{Severity, StatusChannel};
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::checks::{CheckContext, Checker, Finding};
use crate::config::{ExpectedProfile, MonitorConfig};
use crate::console::console_line;
use crate::source::SnapshotSource;

/// Errors from operator commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("cannot read {param}: {source}")]
    Read {
        param: String,
        #[source]
        source: RegisterError,
    },

    #[error("cannot set {param} to {value}: {source}")]
    Write {
        param: String,
        value: u8,
        #[source]
        source: RegisterError,
    },
}

/// Supervision phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Supervising a run that started at `since`.
    Supervising { since: Duration },
}

/// Why a poll did not evaluate the checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    RegisterUnreadable,
    TelemetryStale,
    TelemetryUnavailable,
    /// Inside the ramp-up grace after run start.
    RampUp,
}

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Idle, no rising edge.
    Waiting,
    /// Rising edge observed; supervision begins.
    Started,
    Skipped(Skip),
    /// Checks ran; the run continues.
    Assessed(Classification),
    /// ABORT; the register was cleared (or the clear was attempted).
    Aborted,
    /// Register read 0 while supervising.
    StoppedExternally,
    /// Program end plus grace reached with the register still set.
    Ended,
}

impl PollOutcome {
    /// True when supervision of the current run finished on this poll.
    #[inline]
    pub const fn ended_run(&self) -> bool {
        matches!(self, Self::Aborted | Self::StoppedExternally | Self::Ended)
    }
}

/// Result of a `start` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Register was 0 and is now 1; supervising.
    Started,
    /// Register was already set; it was cleared instead.
    StopRequested,
}

/// External collaborators owned by the supervisor.
pub struct MonitorIo {
    pub register: Box<dyn TriggerRegister>,
    pub source: Box<dyn SnapshotSource>,
    pub status: Box<dyn StatusChannel>,
}

#[derive(Debug, Default)]
struct Latches {
    register: bool,
    telemetry: bool,
}

/// The supervisory monitor.
pub struct Supervisor {
    trigger: TriggerLine<Box<dyn TriggerRegister>>,
    source: Box<dyn SnapshotSource>,
    status: Box<dyn StatusChannel>,
    program: StageProgram,
    profiles: Vec<ExpectedProfile>,
    checker: Checker,
    auto_stop: bool,
    end_grace: Duration,
    phase: Phase,
    latches: Latches,
    /// Last ABORT reason reported in report-only mode.
    last_abort: Option<String>,
}

impl Supervisor {
    pub fn new(config: &MonitorConfig, io: MonitorIo) -> Result<Self, ConfigError> {
        let program = config.program()?;
        Ok(Self {
            trigger: TriggerLine::new(io.register, config.monitor.trigger_param.clone()),
            source: io.source,
            status: io.status,
            program,
            profiles: config.profiles(),
            checker: Checker::new(config.limits, config.deviation, config.monitor.ramp_up_grace()),
            auto_stop: config.monitor.auto_stop,
            end_grace: config.monitor.end_grace(),
            phase: Phase::Idle,
            latches: Latches::default(),
            last_abort: None,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_supervising(&self) -> bool {
        matches!(self.phase, Phase::Supervising { .. })
    }

    pub fn program(&self) -> &StageProgram {
        &self.program
    }

    /// Toggle: set the register and supervise if it reads 0, clear it if it
    /// is already set.
    pub fn request_start(&mut self, now: Duration) -> Result<StartOutcome, CommandError> {
        let edge = self.trigger.poll().map_err(|source| CommandError::Read {
            param: self.trigger.name().to_string(),
            source,
        })?;
        let set = matches!(edge, Edge::Baseline(true) | Edge::Rising | Edge::Steady(true));

        if set {
            self.write(false)?;
            self.phase = Phase::Idle;
            let text = format!(
                "{} was non-zero, set to 0. Test stop requested.",
                self.trigger.name()
            );
            self.status.send(Severity::Notice, &text);
            return Ok(StartOutcome::StopRequested);
        }

        self.write(true)?;
        let text = format!(
            "{}=1 (test requested). Planned test duration: ~{} minutes.",
            self.trigger.name(),
            self.program.total_duration().as_secs() / 60
        );
        self.status.send(Severity::Notice, &text);
        self.begin(now);
        Ok(StartOutcome::Started)
    }

    /// Clear the register.
    pub fn request_stop(&mut self) -> Result<(), CommandError> {
        self.write(false)?;
        self.phase = Phase::Idle;
        let text = format!("{} set to 0 (stop requested)", self.trigger.name());
        self.status.send(Severity::Notice, &text);
        Ok(())
    }

    fn write(&mut self, set: bool) -> Result<(), CommandError> {
        self.trigger.write(set).map_err(|source| CommandError::Write {
            param: self.trigger.name().to_string(),
            value: u8::from(set),
            source,
        })
    }

    fn begin(&mut self, now: Duration) {
        self.phase = Phase::Supervising { since: now };
        self.last_abort = None;
        self.latches.telemetry = false;
        info!(
            stages = self.program.len(),
            total_s = self.program.total_duration().as_secs(),
            "supervising run"
        );
    }

    /// One poll at monitor time `now`.
    pub fn poll(&mut self, now: Duration) -> PollOutcome {
        let edge = match self.trigger.poll() {
            Ok(edge) => {
                if self.latches.register {
                    info!(param = self.trigger.name(), "trigger register readable again");
                    self.latches.register = false;
                }
                edge
            }
            Err(e) => {
                if !self.latches.register {
                    self.latches.register = true;
                    let text = format!("Cannot read {}: {e}; skipping poll", self.trigger.name());
                    self.status.send(Severity::Warning, &text);
                }
                return PollOutcome::Skipped(Skip::RegisterUnreadable);
            }
        };

        match self.phase {
            Phase::Idle => self.poll_idle(edge, now),
            Phase::Supervising { since } => self.poll_supervising(edge, now, since),
        }
    }

    fn poll_idle(&mut self, edge: Edge, now: Duration) -> PollOutcome {
        match edge {
            Edge::Rising => {
                let text = format!(
                    "{} set: supervising {} stages (~{} minutes)",
                    self.trigger.name(),
                    self.program.len(),
                    self.program.total_duration().as_secs() / 60
                );
                self.status.send(Severity::Notice, &text);
                self.begin(now);
                PollOutcome::Started
            }
            Edge::Baseline(true) => {
                info!(
                    param = self.trigger.name(),
                    "register already set at startup; waiting for a fresh rising edge"
                );
                PollOutcome::Waiting
            }
            _ => PollOutcome::Waiting,
        }
    }

    fn poll_supervising(&mut self, edge: Edge, now: Duration, since: Duration) -> PollOutcome {
        let elapsed = now.saturating_sub(since);

        // A stop and restart that both land between two polls reads as
        // Steady(true): supervision keeps the old start time, so stage
        // expectations stay aligned to the earlier run.
        if matches!(edge, Edge::Falling | Edge::Steady(false) | Edge::Baseline(false)) {
            self.phase = Phase::Idle;
            let text = format!(
                "{} is 0, supervision stopped at t={}s",
                self.trigger.name(),
                elapsed.as_secs()
            );
            self.status.send(Severity::Notice, &text);
            return PollOutcome::StoppedExternally;
        }

        if elapsed >= self.program.total_duration().saturating_add(self.end_grace) {
            return self.end_run();
        }

        let snapshot = match self.source.poll() {
            Ok(s) => {
                if self.latches.telemetry {
                    info!("telemetry feed recovered");
                    self.latches.telemetry = false;
                }
                s
            }
            Err(e) => {
                let skip = match e {
                    DownlinkError::Stale { .. } => Skip::TelemetryStale,
                    _ => Skip::TelemetryUnavailable,
                };
                if !self.latches.telemetry {
                    self.latches.telemetry = true;
                    let text = format!("Telemetry unavailable: {e}; skipping checks");
                    self.status.send(Severity::Warning, &text);
                }
                return PollOutcome::Skipped(skip);
            }
        };

        let (stage_index, stage_elapsed) = self.program.stage_at(elapsed);
        let stage_name = self
            .program
            .get(stage_index)
            .map(|s| s.name.as_str())
            .unwrap_or_default();
        let line = console_line(elapsed, stage_name, stage_elapsed, &snapshot);
        self.status.send(Severity::Info, &line);

        let expected = self.profiles.get(stage_index).copied().unwrap_or_default();
        let assessment = self.checker.assess(
            &snapshot,
            &CheckContext {
                elapsed,
                stage_elapsed,
                expected: &expected,
            },
        );
        if assessment.held_off {
            return PollOutcome::Skipped(Skip::RampUp);
        }

        for warning in assessment.warnings() {
            self.status.send(Severity::Warning, &warning.to_string());
        }
        if let Some(finding) = assessment.abort() {
            return self.abort(finding);
        }

        self.last_abort = None;
        let class = assessment.classification();
        debug!(%class, stage = stage_index + 1, "poll assessed");
        PollOutcome::Assessed(class)
    }

    fn abort(&mut self, finding: &Finding) -> PollOutcome {
        if !self.auto_stop {
            if self.last_abort.as_deref() != Some(finding.reason.as_str()) {
                let text = format!("{finding} (auto stop disabled, register left set)");
                self.status.send(Severity::Critical, &text);
                self.last_abort = Some(finding.reason.clone());
            }
            return PollOutcome::Assessed(Classification::Emergency);
        }

        self.status.send(Severity::Critical, &finding.to_string());
        match self.trigger.write(false) {
            Ok(()) => {
                let text = format!("{} set to 0 (test stop requested)", self.trigger.name());
                self.status.send(Severity::Notice, &text);
            }
            Err(e) => {
                warn!(param = self.trigger.name(), "abort clear failed: {e}");
                let text = format!(
                    "Cannot set {} to 0: {e}; check the parameter store",
                    self.trigger.name()
                );
                self.status.send(Severity::Critical, &text);
            }
        }
        self.phase = Phase::Idle;
        PollOutcome::Aborted
    }

    fn end_run(&mut self) -> PollOutcome {
        self.phase = Phase::Idle;
        let text = match self.trigger.write(false) {
            Ok(()) => format!("Test ended: {} set to 0", self.trigger.name()),
            Err(e) => format!("Test ended, but cannot set {} to 0: {e}", self.trigger.name()),
        };
        self.status.send(Severity::Notice, &text);
        PollOutcome::Ended
    }
}

// ─── Polling loop ───────────────────────────────────────────────────

/// When the loop returns on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Supervise every run until shutdown.
    Watch,
    /// Return once the current run has been supervised to its end.
    Once,
}

/// Drives a [`Supervisor`] at a fixed poll period on the tokio clock.
pub struct MonitorRunner {
    supervisor: Supervisor,
    poll: Duration,
    origin: Instant,
}

impl MonitorRunner {
    pub fn new(supervisor: Supervisor, poll: Duration) -> Self {
        Self {
            supervisor,
            poll,
            origin: Instant::now(),
        }
    }

    /// Monitor time.
    pub fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn supervisor_mut(&mut self) -> &mut Supervisor {
        &mut self.supervisor
    }

    /// Issue a `start` command at the current monitor time.
    pub fn request_start(&mut self) -> Result<StartOutcome, CommandError> {
        let now = self.now();
        self.supervisor.request_start(now)
    }

    /// Poll until `shutdown` resolves or, in [`Mode::Once`], the run ends.
    pub async fn run<F: Future<Output = ()>>(&mut self, mode: Mode, shutdown: F) {
        let mut ticker = interval(self.poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.supervisor.poll(self.now());
                    debug!(?outcome, "poll");
                    if mode == Mode::Once && outcome.ended_run() {
                        info!("run supervised to its end");
                        break;
                    }
                }
                _ = &mut shutdown => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        if self.supervisor.is_supervising() {
            warn!("monitor stopping while a run is active; register left unchanged");
        }
    }
}
