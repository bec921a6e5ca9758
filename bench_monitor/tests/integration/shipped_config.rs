//! Integration test: the configuration files under `config/`.

use bench_agent::config::AgentConfig;
use bench_common::config::ConfigLoader;

use super::config;

const AGENT: &str = include_str!("../../../config/agent.toml");
const MONITOR: &str = include_str!("../../../config/monitor.toml");

#[test]
fn shipped_configs_validate_and_agree_on_program() {
    let agent = AgentConfig::from_toml(AGENT).unwrap();
    agent.validate().unwrap();
    let monitor = config(MONITOR);

    let program = monitor.program().unwrap();
    assert_eq!(program.fingerprint(), agent.stages.fingerprint());
    assert_eq!(program.total_duration().as_secs(), 1800);
}

#[test]
fn shipped_expectations_fit_under_absolute_limits() {
    let monitor = config(MONITOR);
    for profile in monitor.profiles() {
        assert!(profile.total_current < monitor.limits.total_current_max_a);
        assert!(
            profile
                .current_per_actuator
                .iter()
                .all(|&c| c < monitor.limits.esc_current_max_a)
        );
    }
}
