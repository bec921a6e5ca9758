//! Per-poll console line.

use std::fmt::Write as _;
use std::time::Duration;

use bench_common::consts::LOAD_CELL_COUNT;
use bench_common::telemetry::BenchSnapshot;

/// One line per poll, e.g.
///
/// ```text
/// t= 125s [Stage 1 (10%) t=125s] E1:1750rpm/ 5.0A/32.1C ... | I_tot=40.3A V=50.0V | LC: L1=0.3, L2=0.3, L3=0.3, L4=0.3
/// ```
///
/// Without bench instrumentation the total is the actuator sum and the
/// voltage and load cells read 0.
pub fn console_line(
    elapsed: Duration,
    stage_name: &str,
    stage_elapsed: Duration,
    snapshot: &BenchSnapshot,
) -> String {
    let mut line = format!(
        "t={:4}s [{stage_name} t={:3}s] ",
        elapsed.as_secs(),
        stage_elapsed.as_secs()
    );
    for (i, r) in snapshot.readings.iter().enumerate() {
        let _ = write!(
            line,
            "E{}:{:4}rpm/{:4.1}A/{:4.1}C ",
            i + 1,
            r.rpm as i64,
            r.current,
            r.temperature
        );
    }

    let (voltage, cells) = snapshot
        .bench
        .map(|b| (b.voltage, b.load_cells))
        .unwrap_or((0.0, [0.0; LOAD_CELL_COUNT]));
    let _ = write!(
        line,
        "| I_tot={:.1}A V={voltage:.1}V | LC: ",
        snapshot.total_current()
    );
    let cells: Vec<String> = cells
        .iter()
        .enumerate()
        .map(|(i, v)| format!("L{}={v:.1}", i + 1))
        .collect();
    line.push_str(&cells.join(", "));
    line
}
