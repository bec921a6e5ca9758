//! Fixed-period cycle runner.
//!
//! Paces [`Agent::cycle`] at the configured period until the running flag
//! is cleared, then drives all outputs to minimum.
//!
//! ## RT Setup Sequence (`rt` feature)
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)`
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity` to the requested core.
//! 4. `sched_setscheduler(SCHED_FIFO, priority)`.
//!
//! ## Pacing
//! With `rt`: absolute-time `clock_nanosleep` on `CLOCK_MONOTONIC`.
//! Without: `std::thread::sleep` for the remainder of the period.
//! Overruns are counted and logged; the loop never aborts on them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::agent::Agent;

/// Emit a pacing summary every this many cycles (5 minutes at 10 Hz).
const STATS_LOG_INTERVAL_CYCLES: u64 = 3000;

// ─── Pacing Statistics ──────────────────────────────────────────────

/// Running body-time and wake-lateness figures for the cycle loop.
#[derive(Debug, Clone, Default)]
pub struct PacingStats {
    pub cycles: u64,
    pub overruns: u64,
    body_total: Duration,
    body_worst: Option<Duration>,
    body_best: Option<Duration>,
    late_worst: Duration,
}

impl PacingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one cycle against `period`. Returns `true` when the body
    /// alone took longer than the period.
    pub fn record(&mut self, body: Duration, late: Duration, period: Duration) -> bool {
        self.cycles += 1;
        self.body_total += body;
        self.body_worst = Some(self.body_worst.map_or(body, |w| w.max(body)));
        self.body_best = Some(self.body_best.map_or(body, |b| b.min(body)));
        self.late_worst = self.late_worst.max(late);
        let overrun = body > period;
        if overrun {
            self.overruns += 1;
        }
        overrun
    }

    pub fn body_mean(&self) -> Duration {
        match u32::try_from(self.cycles) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.body_total / n,
            Err(_) => Duration::from_secs_f64(self.body_total.as_secs_f64() / self.cycles as f64),
        }
    }

    pub fn body_worst(&self) -> Duration {
        self.body_worst.unwrap_or_default()
    }

    pub fn body_best(&self) -> Duration {
        self.body_best.unwrap_or_default()
    }

    /// Largest gap between the scheduled and actual wake-up.
    pub fn late_worst(&self) -> Duration {
        self.late_worst
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

/// Errors during RT setup or pacing.
#[derive(Debug, Error)]
pub enum CycleError {
    /// RT system call failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),

    /// Monotonic clock unavailable.
    #[error("clock error: {0}")]
    Clock(String),
}

// ─── RT Setup ───────────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CycleError> {
    Ok(())
}

/// Touch 256 KiB of stack so the loop does not fault pages in.
fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, exclusive reference into `buf`.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), CycleError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` is a valid sched_param for the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), CycleError> {
    Ok(())
}

/// Full RT setup. All steps except stack prefaulting are no-ops without
/// the `rt` feature.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Cycle Runner ───────────────────────────────────────────────────

/// Owns the agent and paces it.
pub struct CycleRunner {
    agent: Agent,
    cycle_time: Duration,
    running: Arc<AtomicBool>,
    stats: PacingStats,
    origin: Instant,
}

impl CycleRunner {
    /// `running` is shared with the signal handler.
    pub fn new(agent: Agent, cycle_time: Duration, running: Arc<AtomicBool>) -> Self {
        Self {
            agent,
            cycle_time,
            running,
            stats: PacingStats::new(),
            origin: Instant::now(),
        }
    }

    pub fn stats(&self) -> &PacingStats {
        &self.stats
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Loop until the running flag is cleared, then shut the agent down.
    pub fn run(&mut self) -> Result<(), CycleError> {
        info!(
            cycle_ms = self.cycle_time.as_millis() as u64,
            "entering cycle loop"
        );

        #[cfg(feature = "rt")]
        let result = self.run_rt_loop();

        #[cfg(not(feature = "rt"))]
        let result = self.run_sim_loop();

        self.agent.shutdown(self.origin.elapsed());
        info!(
            cycles = self.stats.cycles,
            mean_us = self.stats.body_mean().as_micros() as u64,
            worst_us = self.stats.body_worst().as_micros() as u64,
            overruns = self.stats.overruns,
            "cycle loop stopped"
        );
        result
    }

    fn body(&mut self) {
        let now = self.origin.elapsed();
        let transition = self.agent.cycle(now);
        debug!(?transition, "cycle");
    }

    fn account(&mut self, body: Duration, late: Duration) {
        if self.stats.record(body, late, self.cycle_time) {
            warn!(
                body_ms = body.as_millis() as u64,
                period_ms = self.cycle_time.as_millis() as u64,
                "cycle body overran its period"
            );
        }
        if self.stats.cycles % STATS_LOG_INTERVAL_CYCLES == 0 {
            debug!(
                cycles = self.stats.cycles,
                best_us = self.stats.body_best().as_micros() as u64,
                mean_us = self.stats.body_mean().as_micros() as u64,
                worst_us = self.stats.body_worst().as_micros() as u64,
                late_worst_us = self.stats.late_worst().as_micros() as u64,
                overruns = self.stats.overruns,
                "pacing"
            );
        }
    }

    #[cfg(feature = "rt")]
    fn run_rt_loop(&mut self) -> Result<(), CycleError> {
        use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};

        let clock = ClockId::CLOCK_MONOTONIC;
        let period_ns = self.cycle_time.as_nanos() as i64;
        let mut next_wake =
            clock_gettime(clock).map_err(|e| CycleError::Clock(format!("clock_gettime: {e}")))?;

        while self.running.load(Ordering::SeqCst) {
            next_wake = timespec_add_ns(next_wake, period_ns);

            let start =
                clock_gettime(clock).map_err(|e| CycleError::Clock(format!("clock_gettime: {e}")))?;
            self.body();
            let end =
                clock_gettime(clock).map_err(|e| CycleError::Clock(format!("clock_gettime: {e}")))?;

            let late_ns = timespec_diff_ns(&start, &timespec_add_ns(next_wake, -period_ns));
            self.account(
                Duration::from_nanos(timespec_diff_ns(&end, &start).max(0) as u64),
                Duration::from_nanos(late_ns.unsigned_abs()),
            );

            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
        }
        Ok(())
    }

    #[cfg(not(feature = "rt"))]
    fn run_sim_loop(&mut self) -> Result<(), CycleError> {
        let mut next_wake = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            let start = Instant::now();
            let late = start.saturating_duration_since(next_wake);
            next_wake += self.cycle_time;

            self.body();
            self.account(start.elapsed(), late);

            let now = Instant::now();
            if next_wake > now {
                std::thread::sleep(next_wake - now);
            } else {
                // Fell behind by more than a period; resynchronise.
                next_wake = now;
            }
        }
        Ok(())
    }
}

// ─── Time Helpers ───────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let total = ts.tv_sec() as i64 * 1_000_000_000 + ts.tv_nsec() as i64 + ns;
    TimeSpec::new(
        total.div_euclid(1_000_000_000) as _,
        total.rem_euclid(1_000_000_000) as _,
    )
}

#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() as i64 - b.tv_sec() as i64) * 1_000_000_000 + (a.tv_nsec() as i64 - b.tv_nsec() as i64)
}
