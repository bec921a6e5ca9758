//! Structured log records and status line formatting.
//!
//! Four named records with fixed fields, written once per log interval:
//!
//! | record    | fields                                               |
//! |-----------|------------------------------------------------------|
//! | `SUMMARY` | t, stage, class, group averages/sums, total current  |
//! | `RPM`     | t, 8 × rpm                                           |
//! | `TEMP`    | t, 8 × temperature [°C]                              |
//! | `CURR`    | t, 8 × current [A]                                   |

use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bench_common::classify::Classification;
use bench_common::consts::ACTUATOR_COUNT;
use bench_common::telemetry::{GroupAggregate, Readings};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

/// Log sink errors.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("log sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("log record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One structured log record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "record", rename_all = "UPPERCASE")]
pub enum LogRecord {
    Summary {
        /// Seconds since run start.
        t: f64,
        /// 1-based stage number.
        stage: usize,
        /// [`Classification::code`]: 0 normal, 1 warning, 2 emergency.
        class: u8,
        top_rpm: f64,
        bottom_rpm: f64,
        top_temp: f64,
        bottom_temp: f64,
        top_current: f64,
        bottom_current: f64,
        total_current: f64,
    },
    Rpm {
        t: f64,
        values: [f64; ACTUATOR_COUNT],
    },
    Temp {
        t: f64,
        values: [f64; ACTUATOR_COUNT],
    },
    #[serde(rename = "CURR")]
    Current {
        t: f64,
        values: [f64; ACTUATOR_COUNT],
    },
}

impl LogRecord {
    /// Record name as written.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Summary { .. } => "SUMMARY",
            Self::Rpm { .. } => "RPM",
            Self::Temp { .. } => "TEMP",
            Self::Current { .. } => "CURR",
        }
    }
}

/// The four records for one log tick.
pub fn log_batch(
    elapsed: Duration,
    stage_index: usize,
    class: Classification,
    readings: &Readings,
    agg: &GroupAggregate,
) -> [LogRecord; 4] {
    let t = elapsed.as_secs_f64();
    [
        LogRecord::Summary {
            t,
            stage: stage_index + 1,
            class: class.code(),
            top_rpm: agg.top.avg_rpm,
            bottom_rpm: agg.bottom.avg_rpm,
            top_temp: agg.top.avg_temp,
            bottom_temp: agg.bottom.avg_temp,
            top_current: agg.top.sum_current,
            bottom_current: agg.bottom.sum_current,
            total_current: agg.total_current,
        },
        LogRecord::Rpm {
            t,
            values: readings.map(|r| r.rpm),
        },
        LogRecord::Temp {
            t,
            values: readings.map(|r| r.temperature),
        },
        LogRecord::Current {
            t,
            values: readings.map(|r| r.current),
        },
    ]
}

/// Destination for structured log records.
pub trait LogSink {
    fn write(&mut self, records: &[LogRecord]) -> Result<(), SinkError>;
}

/// Appends one JSON object per line.
pub struct JsonLinesSink {
    out: BufWriter<File>,
}

impl JsonLinesSink {
    /// Open `path` for appending, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }
}

impl LogSink for JsonLinesSink {
    fn write(&mut self, records: &[LogRecord]) -> Result<(), SinkError> {
        for record in records {
            serde_json::to_writer(&mut self.out, record)?;
            self.out.write_all(b"\n")?;
        }
        self.out.flush()?;
        Ok(())
    }
}

/// Keeps records in memory. Clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Number of records named `name`.
    pub fn count(&self, name: &str) -> usize {
        self.records.lock().iter().filter(|r| r.name() == name).count()
    }
}

impl LogSink for MemorySink {
    fn write(&mut self, records: &[LogRecord]) -> Result<(), SinkError> {
        self.records.lock().extend_from_slice(records);
        Ok(())
    }
}

/// Fixed-capacity status line buffer.
pub type StatusLine = heapless::String<128>;

/// Periodic operator status line, e.g.
/// `NORMAL t=3.2min RPM T/B 3500/3498 Temp T/B 41.2/40.8C I=80.3A`.
///
/// Truncated if it would exceed the buffer.
pub fn status_line(class: Classification, elapsed: Duration, agg: &GroupAggregate) -> StatusLine {
    let mut line = StatusLine::new();
    let _ = write!(
        line,
        "{} t={:.1}min RPM T/B {:.0}/{:.0} Temp T/B {:.1}/{:.1}C I={:.1}A",
        class.label(),
        elapsed.as_secs_f64() / 60.0,
        agg.top.avg_rpm,
        agg.bottom.avg_rpm,
        agg.top.avg_temp,
        agg.bottom.avg_temp,
        agg.total_current,
    );
    line
}
