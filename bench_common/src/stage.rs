//! Stage program: the ordered list of timed duty phases.
//!
//! The same program must be configured in the agent and in the monitor.
//! The agent uses it to command duty; the monitor uses it to know which
//! expected values apply at a given time since run start.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, check_duration, check_positive};

const FNV64_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV64_PRIME: u64 = 0x0100_0000_01b3;

/// One timed phase of the test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Display name, e.g. `"Stage 2 (20%)"`.
    pub name: String,
    /// Commanded duty fraction in `[0, 1]`.
    pub duty: f64,
    /// Stage length [s].
    pub duration_s: f64,
}

impl StageDefinition {
    /// Stage length as a `Duration`.
    #[inline]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_s)
    }

    fn validate(&self, idx: usize) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "stage {} has an empty name",
                idx + 1
            )));
        }
        if !(0.0..=1.0).contains(&self.duty) {
            return Err(ConfigError::ValidationError(format!(
                "stage '{}' duty {} out of range [0, 1]",
                self.name, self.duty
            )));
        }
        let name = format!("stage '{}' duration_s", self.name);
        check_positive(&name, self.duration_s)?;
        check_duration(&name, self.duration_s).map(drop)
    }
}

/// Ordered, immutable sequence of stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageProgram {
    stages: Vec<StageDefinition>,
}

impl StageProgram {
    /// Build and validate a program.
    pub fn new(stages: Vec<StageDefinition>) -> Result<Self, ConfigError> {
        let program = Self { stages };
        program.validate()?;
        Ok(program)
    }

    /// Validate every stage; an empty program is rejected, and so is a
    /// program whose total length does not fit in a `Duration`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::ValidationError(
                "stage program must define at least one stage".to_string(),
            ));
        }
        let mut total = Duration::ZERO;
        for (idx, stage) in self.stages.iter().enumerate() {
            stage.validate(idx)?;
            total = total.checked_add(stage.duration()).ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "stage program length overflows at stage {}",
                    idx + 1
                ))
            })?;
        }
        Ok(())
    }

    /// Number of stages.
    #[inline]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True when no stage is defined (never the case after validation).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage by 0-based index.
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&StageDefinition> {
        self.stages.get(idx)
    }

    /// All stages in order.
    #[inline]
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// Sum of all stage durations.
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(StageDefinition::duration).sum()
    }

    /// Locate the stage active `elapsed` after run start.
    ///
    /// Returns `(stage_index, time_in_stage)`. Past the end of the program
    /// the last stage is reported with its full duration.
    pub fn stage_at(&self, elapsed: Duration) -> (usize, Duration) {
        let mut accum = Duration::ZERO;
        for (idx, stage) in self.stages.iter().enumerate() {
            let dur = stage.duration();
            if elapsed < accum + dur {
                return (idx, elapsed - accum);
            }
            accum += dur;
        }
        let last = self.stages.len().saturating_sub(1);
        let dur = self.stages.last().map(StageDefinition::duration).unwrap_or_default();
        (last, dur)
    }

    /// Fingerprint of names, duties and durations.
    ///
    /// FNV-1a over the field bytes, so it does not depend on the toolchain
    /// either binary was built with. Logged by both processes at startup; a
    /// mismatch means the agent and the monitor disagree on the program.
    pub fn fingerprint(&self) -> u64 {
        let mut hash = FNV64_OFFSET_BASIS;
        let mut feed = |bytes: &[u8]| {
            for byte in bytes {
                hash ^= u64::from(*byte);
                hash = hash.wrapping_mul(FNV64_PRIME);
            }
        };
        for stage in &self.stages {
            feed(&(stage.name.len() as u64).to_le_bytes());
            feed(stage.name.as_bytes());
            feed(&stage.duty.to_bits().to_le_bytes());
            feed(&stage.duration_s.to_bits().to_le_bytes());
        }
        hash
    }
}
