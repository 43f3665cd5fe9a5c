//! Configuration Module Tests
//!
//! Loads the shipped configuration files and checks environment variable
//! overrides.

use appstore_core::config::{AppstoreConfig, ConfigManager, ConfigurationError};
use std::path::PathBuf;
use std::time::Duration;

fn shipped_config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config")
}

#[test]
fn config_has_expected_defaults() {
    let config = AppstoreConfig::default();

    assert_eq!(config.cluster.kubectl, "kubectl");
    assert_eq!(config.cluster.namespace, "default");
    assert_eq!(config.cluster.runtime_deployment, "sdv-runtime");
    assert_eq!(config.restart.cycle_limit, 3);
    assert_eq!(config.restart.delay(), Duration::from_millis(2000));
    assert_eq!(config.timeouts.image_pull(), Duration::from_secs(1200));
    assert_eq!(config.reconnect.max_delay(), Duration::from_secs(30));
    assert!(config.validate().is_ok());
}

#[test]
fn shipped_base_config_matches_defaults() {
    let manager =
        ConfigManager::load_from_directory_with_env(Some(shipped_config_dir()), "development")
            .expect("shipped configuration should load");
    let (loaded, defaults) = (manager.config(), AppstoreConfig::default());
    // `events` is left out; another test overrides it through the environment
    assert_eq!(loaded.cluster, defaults.cluster);
    assert_eq!(loaded.timeouts, defaults.timeouts);
    assert_eq!(loaded.orchestration, defaults.orchestration);
    assert_eq!(loaded.restart, defaults.restart);
    assert_eq!(loaded.reconnect, defaults.reconnect);
    assert_eq!(loaded.persistence, defaults.persistence);
    assert_eq!(manager.environment(), "development");
}

#[test]
fn shipped_test_overlay_shortens_delays() {
    let manager = ConfigManager::load_from_directory_with_env(Some(shipped_config_dir()), "test")
        .expect("test overlay should load");
    let config = manager.config();

    assert!(!config.restart.enabled);
    assert_eq!(config.restart.delay_ms, 10);
    assert_eq!(config.orchestration.settle_delay(), Duration::ZERO);
    // Untouched sections keep the base values
    assert_eq!(config.restart.cycle_limit, 3);
    assert_eq!(config.cluster.node_name, "vip");
}

#[test]
fn environment_variables_override_files() {
    std::env::set_var("APPSTORE__EVENTS__CHANNEL_CAPACITY", "512");
    let loaded = ConfigManager::load_from_directory_with_env(Some(shipped_config_dir()), "test");
    std::env::remove_var("APPSTORE__EVENTS__CHANNEL_CAPACITY");

    let manager = loaded.expect("configuration with env override should load");
    assert_eq!(manager.config().events.channel_capacity, 512);
}

#[test]
fn invalid_values_are_rejected() {
    let mut config = AppstoreConfig::default();
    config.reconnect.base_delay_ms = 60_000;

    match ConfigManager::from_config(config, "test") {
        Err(ConfigurationError::InvalidValue { field, .. }) => {
            assert_eq!(field, "reconnect.base_delay_ms")
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("base delay above max delay should be rejected"),
    }
}
