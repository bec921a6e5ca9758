//! Per-cycle agent body.
//!
//! One call to [`Agent::cycle`] is one control period:
//!
//! 1. Poll the trigger register and turn the observed edge into a
//!    sequencer event.
//! 2. Step the sequencer (start, hold, advance, complete, stop).
//! 3. Re-command every output for the current stage, or drive all outputs
//!    to minimum when the run ended.
//! 4. While running: read telemetry, aggregate, classify, log and display.
//!
//! Nothing here blocks or fails the loop. Collaborator failures are
//! reported once per failure streak and the cycle carries on.

use std::time::Duration;

use bench_common::classify::{Advisory, AdvisoryThresholds, Classification, classify_advisory};
use bench_common::consts::ACTUATOR_COUNT;
use bench_common::register::{Edge, TriggerLine, TriggerRegister};
use bench_common::status::{Severity, StatusChannel};
use bench_common::telemetry::{GroupAggregate, Readings, aggregate, zeroed_readings};
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::hal::{ActuatorBus, OutputRange, TelemetryChain, command_all};
use crate::report::{LogSink, log_batch, status_line};
use crate::sequencer::{RunState, Sequencer, SequencerEvent, Transition};

/// External collaborators owned by the agent.
pub struct AgentIo {
    pub register: Box<dyn TriggerRegister>,
    pub bus: Box<dyn ActuatorBus>,
    pub telemetry: TelemetryChain,
    pub sink: Box<dyn LogSink>,
    pub status: Box<dyn StatusChannel>,
}

/// Failure streak flags; each streak is reported once.
#[derive(Debug, Default)]
struct Latches {
    register_read: bool,
    bus: bool,
    sink: bool,
}

/// The real-time test agent.
pub struct Agent {
    sequencer: Sequencer,
    state: RunState,
    trigger: TriggerLine<Box<dyn TriggerRegister>>,
    bus: Box<dyn ActuatorBus>,
    telemetry: TelemetryChain,
    sink: Box<dyn LogSink>,
    status: Box<dyn StatusChannel>,
    range: OutputRange,
    refresh_timeout: Duration,
    log_interval: Duration,
    display_interval: Duration,
    thresholds: AdvisoryThresholds,
    readings: Readings,
    aggregate: GroupAggregate,
    latches: Latches,
}

impl Agent {
    pub fn new(config: &AgentConfig, io: AgentIo) -> Self {
        Self {
            sequencer: Sequencer::new(config.stages.clone()),
            state: RunState::idle(),
            trigger: TriggerLine::new(io.register, config.agent.trigger_param.clone()),
            bus: io.bus,
            telemetry: io.telemetry,
            sink: io.sink,
            status: io.status,
            range: OutputRange {
                min: config.agent.pwm_min,
                max: config.agent.pwm_max,
            },
            refresh_timeout: config.agent.refresh_timeout(),
            log_interval: config.agent.log_interval(),
            display_interval: config.agent.display_interval(),
            thresholds: config.advisory,
            readings: zeroed_readings(),
            aggregate: GroupAggregate::default(),
            latches: Latches::default(),
        }
    }

    /// Run bookkeeping.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Readings from the latest active cycle.
    pub fn readings(&self) -> &Readings {
        &self.readings
    }

    /// Group aggregate from the latest active cycle.
    pub fn aggregate(&self) -> &GroupAggregate {
        &self.aggregate
    }

    /// Execute one control period at agent time `now`.
    pub fn cycle(&mut self, now: Duration) -> Transition {
        let transition = match self.poll_trigger() {
            SequencerEvent::StartRequested if !self.state.active => self.start_run(now),
            event => self.sequencer.handle(&mut self.state, event, now),
        };
        self.apply(transition);
        self.bus.flush(now);
        if self.state.active {
            self.observe(now);
        }
        transition
    }

    /// Drive every output to minimum and drop any active run.
    ///
    /// The trigger register is left as is.
    pub fn shutdown(&mut self, now: Duration) {
        if let Some(stage) = self.sequencer.current_stage(&self.state) {
            let text = format!(
                "Agent shutting down during {}; outputs to minimum",
                stage.name
            );
            self.status.send(Severity::Warning, &text);
        }
        self.state = RunState::idle();
        self.outputs_to_min();
        self.bus.flush(now);
    }

    fn poll_trigger(&mut self) -> SequencerEvent {
        match self.trigger.poll() {
            Ok(edge) => {
                if self.latches.register_read {
                    info!(param = self.trigger.name(), "trigger register readable again");
                    self.latches.register_read = false;
                }
                match edge {
                    Edge::Rising => SequencerEvent::StartRequested,
                    Edge::Baseline(set) => {
                        if set {
                            info!(
                                param = self.trigger.name(),
                                "register already set at startup; waiting for a rising edge"
                            );
                        }
                        SequencerEvent::Tick
                    }
                    Edge::Falling | Edge::Steady(false) if self.state.active => {
                        SequencerEvent::StopRequested
                    }
                    _ => SequencerEvent::Tick,
                }
            }
            Err(e) => {
                if !self.latches.register_read {
                    self.latches.register_read = true;
                    warn!(param = self.trigger.name(), "trigger register read failed: {e}");
                    if self.state.active {
                        let text = format!(
                            "Cannot read {}: {e}; continuing current stage",
                            self.trigger.name()
                        );
                        self.status.send(Severity::Warning, &text);
                    }
                }
                SequencerEvent::Tick
            }
        }
    }

    fn start_run(&mut self, now: Duration) -> Transition {
        let mapped = match self.bus.discover_channels() {
            Ok(n) => n,
            Err(e) => {
                let text = format!("Run refused: {e}");
                self.status.send(Severity::Critical, &text);
                return Transition::Refused { mapped: 0 };
            }
        };
        if mapped < ACTUATOR_COUNT {
            let text = format!(
                "Run refused: only {mapped} of {ACTUATOR_COUNT} motor channels mapped"
            );
            self.status.send(Severity::Critical, &text);
            return Transition::Refused { mapped };
        }
        self.sequencer
            .handle(&mut self.state, SequencerEvent::StartRequested, now)
    }

    fn apply(&mut self, transition: Transition) {
        let stages = self.sequencer.program().len();
        match transition {
            Transition::Started => {
                if let Some(stage) = self.sequencer.current_stage(&self.state) {
                    let text = format!(
                        "Test started: {} ({:.0}% duty), {stages} stages, {:.0}s total",
                        stage.name,
                        stage.duty * 100.0,
                        self.sequencer.program().total_duration().as_secs_f64()
                    );
                    self.status.send(Severity::Notice, &text);
                }
                self.command_stage();
            }
            Transition::Advanced { to, .. } => {
                if let Some(stage) = self.sequencer.current_stage(&self.state) {
                    let text = format!(
                        "Stage {}/{stages}: {} ({:.0}% duty)",
                        to + 1,
                        stage.name,
                        stage.duty * 100.0
                    );
                    self.status.send(Severity::Notice, &text);
                }
                self.command_stage();
            }
            Transition::Hold { .. } => self.command_stage(),
            Transition::Completed => {
                self.outputs_to_min();
                self.readings = zeroed_readings();
                let (severity, text) = match self.trigger.write(false) {
                    Ok(()) => (
                        Severity::Notice,
                        format!("Test complete: {} cleared to 0", self.trigger.name()),
                    ),
                    Err(e) => {
                        warn!(param = self.trigger.name(), "cannot clear trigger register: {e}");
                        (
                            Severity::Warning,
                            format!(
                                "Test complete, but cannot clear {}: {e}; register may be stale",
                                self.trigger.name()
                            ),
                        )
                    }
                };
                self.status.send(severity, &text);
            }
            Transition::Stopped => {
                self.outputs_to_min();
                self.readings = zeroed_readings();
                let text = format!("Test stopped: {} is 0", self.trigger.name());
                self.status.send(Severity::Notice, &text);
            }
            Transition::Refused { .. } | Transition::Idle => {}
        }
    }

    fn command_stage(&mut self) {
        let Some(duty) = self.sequencer.duty(&self.state) else {
            return;
        };
        let value = self.range.duty_to_value(duty);
        self.command_outputs(value);
    }

    fn outputs_to_min(&mut self) {
        self.command_outputs(self.range.min);
    }

    fn command_outputs(&mut self, value: u16) {
        match command_all(self.bus.as_mut(), value, self.refresh_timeout) {
            Ok(()) => {
                if self.latches.bus {
                    info!("output path recovered");
                    self.latches.bus = false;
                }
            }
            Err(e) => {
                if !self.latches.bus {
                    self.latches.bus = true;
                    warn!(value, "output command failed: {e}");
                    self.status
                        .send(Severity::Warning, &format!("Output command failed: {e}"));
                }
            }
        }
    }

    fn observe(&mut self, now: Duration) {
        self.readings = self.telemetry.read_all();
        self.aggregate = aggregate(&self.readings);

        let advisory = classify_advisory(&self.aggregate, &self.thresholds);
        if advisory.class != self.state.classification {
            self.report_classification(&advisory);
        }
        self.state.classification = advisory.class;

        let elapsed = self.state.elapsed(now);

        if now.saturating_sub(self.state.last_log) >= self.log_interval {
            self.state.last_log = now;
            let batch = log_batch(
                elapsed,
                self.state.stage_index,
                advisory.class,
                &self.readings,
                &self.aggregate,
            );
            match self.sink.write(&batch) {
                Ok(()) => self.latches.sink = false,
                Err(e) => {
                    if !self.latches.sink {
                        self.latches.sink = true;
                        warn!("structured log write failed: {e}");
                    }
                }
            }
        }

        if now.saturating_sub(self.state.last_display) >= self.display_interval {
            self.state.last_display = now;
            let line = status_line(advisory.class, elapsed, &self.aggregate);
            self.status.send(Severity::Info, line.as_str());
        }
    }

    fn report_classification(&mut self, advisory: &Advisory) {
        debug!(from = %self.state.classification, to = %advisory.class, "advisory class changed");
        let reason = advisory
            .trigger
            .map(|t| t.to_string())
            .unwrap_or_else(|| "all advisory limits clear".to_string());
        let (severity, text) = match advisory.class {
            Classification::Emergency => (
                Severity::Critical,
                format!("EMERGENCY: {reason} (advisory only, run continues)"),
            ),
            Classification::Warning => (Severity::Warning, format!("WARNING: {reason}")),
            Classification::Normal => (Severity::Info, format!("NORMAL: {reason}")),
        };
        self.status.send(severity, &text);
    }
}
