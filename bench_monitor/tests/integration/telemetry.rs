//! Integration test: the telemetry downlink as the monitor sees it.
//!
//! Validates: a stale downlink skips checks (reported once) without
//! clearing the register, fresh data resumes checking, and a missing feed
//! never aborts.

use bench_common::classify::Classification;
use bench_common::downlink::{DownlinkReader, DownlinkWriter};
use bench_common::status::Severity;
use bench_monitor::source::MemorySource;
use bench_monitor::supervisor::{PollOutcome, Skip};
use tempfile::tempdir;

use super::{MONITOR_TOML, Rig, healthy};

#[test]
fn stale_downlink_skips_checks_until_fresh_data() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("downlink.json");
    let mut writer = DownlinkWriter::new(&path);
    let reader = DownlinkReader::new(&path, 3);
    let mut rig = Rig::with_source(MONITOR_TOML, MemorySource::new(), Box::new(reader));
    rig.arm();

    while rig.next_elapsed() < 7 {
        writer.publish(&healthy(), None).unwrap();
        rig.poll();
    }

    // Publisher stops: two unchanged polls are tolerated, the third is stale.
    assert_eq!(rig.poll(), PollOutcome::Assessed(Classification::Normal));
    assert_eq!(rig.poll(), PollOutcome::Assessed(Classification::Normal));
    assert_eq!(rig.poll(), PollOutcome::Skipped(Skip::TelemetryStale));
    assert_eq!(rig.poll(), PollOutcome::Skipped(Skip::TelemetryStale));
    assert_eq!(rig.count_containing("Telemetry unavailable"), 1);
    assert_eq!(rig.register_value(), 1.0);
    assert!(rig.supervisor.is_supervising());

    let mut hot = healthy();
    hot[0].temperature = 90.0;
    writer.publish(&hot, None).unwrap();
    assert_eq!(rig.poll(), PollOutcome::Aborted);
    assert!(rig.status.contains("ESC1 (actuator 0) over temperature (90.0C >= 80.0C)"));
    assert_eq!(rig.register_value(), 0.0);
}

#[test]
fn missing_downlink_never_aborts() {
    let mut rig = Rig::new();
    rig.source.fail(true);
    rig.arm();

    for _ in 0..10 {
        assert_eq!(rig.poll(), PollOutcome::Skipped(Skip::TelemetryUnavailable));
    }
    assert_eq!(rig.register_value(), 1.0);
    assert_eq!(rig.status.count(Severity::Warning), 1);

    rig.source.fail(false);
    assert_eq!(rig.feed(healthy()), PollOutcome::Assessed(Classification::Normal));
}
