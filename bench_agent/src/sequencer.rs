//! Stage sequencer: IDLE → RUNNING(1) → … → RUNNING(N) → IDLE.
//!
//! Pure state transitions over an explicitly owned [`RunState`]. Time is a
//! `Duration` on the agent's monotonic clock, so transitions are exact and
//! reproducible in tests.
//!
//! | from        | event          | to                      |
//! |-------------|----------------|-------------------------|
//! | IDLE        | StartRequested | RUNNING(1)              |
//! | RUNNING(k)  | Tick, stage done | RUNNING(k+1)          |
//! | RUNNING(N)  | Tick, stage done | IDLE (completed)      |
//! | RUNNING(k)  | StopRequested  | IDLE (stopped)          |
//!
//! Stage boundaries are scheduled from the run start, not from the cycle
//! that noticed them, so late cycles do not accumulate drift.

use std::time::Duration;

use bench_common::classify::Classification;
use bench_common::stage::{StageDefinition, StageProgram};

/// Agent-side run bookkeeping. Reset whenever a run ends.
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    pub active: bool,
    /// 0-based index of the stage being commanded.
    pub stage_index: usize,
    /// Scheduled start of the current stage.
    pub stage_start: Duration,
    /// Cycle time of the rising edge that started the run.
    pub test_start: Duration,
    pub last_log: Duration,
    pub last_display: Duration,
    /// Advisory classification of the latest cycle.
    pub classification: Classification,
}

impl Default for RunState {
    fn default() -> Self {
        Self::idle()
    }
}

impl RunState {
    /// Inactive state.
    pub const fn idle() -> Self {
        Self {
            active: false,
            stage_index: 0,
            stage_start: Duration::ZERO,
            test_start: Duration::ZERO,
            last_log: Duration::ZERO,
            last_display: Duration::ZERO,
            classification: Classification::Normal,
        }
    }

    fn begin(&mut self, now: Duration) {
        *self = Self {
            active: true,
            stage_index: 0,
            stage_start: now,
            test_start: now,
            last_log: now,
            last_display: now,
            classification: Classification::Normal,
        };
    }

    fn reset(&mut self) {
        *self = Self::idle();
    }

    /// Time since the run started.
    #[inline]
    pub fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.test_start)
    }

    /// Time since the current stage started.
    #[inline]
    pub fn stage_elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.stage_start)
    }
}

/// Input to the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerEvent {
    /// Rising edge on the trigger register (channels already verified).
    StartRequested,
    /// Register read 0 during a run.
    StopRequested,
    /// Ordinary cycle.
    Tick,
}

/// Outcome of one sequencer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing running.
    Idle,
    /// Run started at stage 0.
    Started,
    /// Still in `stage`.
    Hold { stage: usize },
    /// Moved from `from` to `to`.
    Advanced { from: usize, to: usize },
    /// Last stage finished.
    Completed,
    /// Stopped by an external clear.
    Stopped,
    /// Start refused because fewer than eight channels are mapped.
    Refused { mapped: usize },
}

impl Transition {
    /// True when the run ended this cycle.
    #[inline]
    pub const fn ended(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped)
    }
}

/// Drives a [`RunState`] through a [`StageProgram`].
#[derive(Debug, Clone)]
pub struct Sequencer {
    program: StageProgram,
}

impl Sequencer {
    pub fn new(program: StageProgram) -> Self {
        Self { program }
    }

    pub fn program(&self) -> &StageProgram {
        &self.program
    }

    /// Stage being commanded, if a run is active.
    pub fn current_stage<'a>(&'a self, state: &RunState) -> Option<&'a StageDefinition> {
        if state.active {
            self.program.get(state.stage_index)
        } else {
            None
        }
    }

    /// Duty to command this cycle, if a run is active.
    #[inline]
    pub fn duty(&self, state: &RunState) -> Option<f64> {
        self.current_stage(state).map(|s| s.duty)
    }

    /// Apply one event at time `now`.
    pub fn handle(&self, state: &mut RunState, event: SequencerEvent, now: Duration) -> Transition {
        match (state.active, event) {
            (false, SequencerEvent::StartRequested) => {
                state.begin(now);
                Transition::Started
            }
            (false, _) => Transition::Idle,
            (true, SequencerEvent::StopRequested) => {
                state.reset();
                Transition::Stopped
            }
            (true, _) => self.advance(state, now),
        }
    }

    fn advance(&self, state: &mut RunState, now: Duration) -> Transition {
        let from = state.stage_index;
        loop {
            let Some(stage) = self.program.get(state.stage_index) else {
                state.reset();
                return Transition::Completed;
            };
            let duration = stage.duration();
            if state.stage_elapsed(now) < duration {
                break;
            }
            state.stage_start += duration;
            state.stage_index += 1;
        }
        if state.stage_index == from {
            Transition::Hold { stage: from }
        } else {
            Transition::Advanced {
                from,
                to: state.stage_index,
            }
        }
    }
}
