//! # Appstore Configuration System
//!
//! Layered configuration for the orchestration core: compiled-in defaults, an
//! optional `appstore.yaml`, an optional environment overlay
//! (`appstore.<env>.yaml`) and finally `APPSTORE__SECTION__KEY` environment
//! variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use appstore_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let limit = manager.config().restart.cycle_limit;
//! let pull_timeout = manager.config().timeouts.image_pull();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/appstore.yaml`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AppstoreConfig {
    /// How the cluster-management CLI is invoked
    pub cluster: ClusterConfig,

    /// Per-command-class timeouts
    pub timeouts: TimeoutConfig,

    /// Orchestrator pacing and mailbox settings
    pub orchestration: OrchestrationConfig,

    /// Connectivity-triggered restart policy
    pub restart: RestartConfig,

    /// Reconnection backoff
    pub reconnect: ReconnectConfig,

    /// Durable diagnostic records
    pub persistence: PersistenceConfig,

    /// Event fan-out settings
    pub events: EventsConfig,
}

/// Cluster CLI invocation settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClusterConfig {
    /// Cluster-management binary (`kubectl`, `k3s kubectl`, or a test double)
    pub kubectl: String,
    /// Shell used to run command lines
    pub shell: String,
    pub namespace: String,
    /// Node probed before subscribing a service
    pub node_name: String,
    /// Deployment recycled by the restart coordinator
    pub runtime_deployment: String,
    /// Appended to PATH for child processes when missing
    pub extra_path: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kubectl: constants::cluster::DEFAULT_KUBECTL.to_string(),
            shell: constants::cluster::DEFAULT_SHELL.to_string(),
            namespace: constants::cluster::DEFAULT_NAMESPACE.to_string(),
            node_name: constants::cluster::DEFAULT_NODE_NAME.to_string(),
            runtime_deployment: constants::cluster::DEFAULT_RUNTIME_DEPLOYMENT.to_string(),
            extra_path: constants::cluster::EXTRA_PATH_ENTRY.to_string(),
        }
    }
}

/// Timeouts for each command class, in seconds
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub node_status_seconds: u64,
    pub apply_seconds: u64,
    pub condition_wait_seconds: u64,
    pub image_pull_seconds: u64,
    pub rollout_status_seconds: u64,
    pub default_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            node_status_seconds: 10,
            apply_seconds: 60,
            condition_wait_seconds: 300,
            image_pull_seconds: 1200,
            rollout_status_seconds: 60,
            default_seconds: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn node_status(&self) -> Duration {
        Duration::from_secs(self.node_status_seconds)
    }

    pub fn apply(&self) -> Duration {
        Duration::from_secs(self.apply_seconds)
    }

    pub fn condition_wait(&self) -> Duration {
        Duration::from_secs(self.condition_wait_seconds)
    }

    pub fn image_pull(&self) -> Duration {
        Duration::from_secs(self.image_pull_seconds)
    }

    pub fn rollout_status(&self) -> Duration {
        Duration::from_secs(self.rollout_status_seconds)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_seconds)
    }
}

/// Orchestrator pacing
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Capacity of the owner task's mailbox
    pub mailbox_capacity: usize,
    /// Pause after force-deleting an existing deployment before applying
    pub settle_delay_ms: u64,
    /// Pause between consecutive installation commands
    pub install_command_pause_ms: u64,
    /// Timeout of the node probe run before a subscribe
    pub node_probe_timeout_seconds: u64,
    /// Default timeout for deployment availability probes
    pub deployment_probe_timeout_seconds: u64,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 64,
            settle_delay_ms: 2000,
            install_command_pause_ms: 500,
            node_probe_timeout_seconds: 3,
            deployment_probe_timeout_seconds: 10,
        }
    }
}

impl OrchestrationConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn install_command_pause(&self) -> Duration {
        Duration::from_millis(self.install_command_pause_ms)
    }

    pub fn node_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.node_probe_timeout_seconds)
    }

    pub fn deployment_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.deployment_probe_timeout_seconds)
    }
}

/// Restart policy and self-restart settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RestartConfig {
    pub enabled: bool,
    pub cycle_limit: u32,
    /// Delay between a connectivity-restored event and the restart firing
    pub delay_ms: u64,
    pub pod_termination_timeout_seconds: u64,
    pub termination_poll_interval_ms: u64,
    pub pods_ready_timeout_seconds: u64,
    pub ready_poll_interval_ms: u64,
    /// Pause between scale-down completion and scale-up
    pub scale_up_pause_ms: u64,
    /// Delay before the host process recycles itself
    pub self_restart_delay_ms: u64,
    /// Pause after a runtime restart before recycling the host process
    pub runtime_settle_ms: u64,
    /// Service-manager unit restarted for a self restart
    pub service_unit: String,
    /// Exit code requesting a supervisor restart
    pub restart_exit_code: i32,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cycle_limit: constants::restart::DEFAULT_CYCLE_LIMIT,
            delay_ms: constants::restart::DEFAULT_DELAY_MS,
            pod_termination_timeout_seconds: 30,
            termination_poll_interval_ms: 1000,
            pods_ready_timeout_seconds: 60,
            ready_poll_interval_ms: 3000,
            scale_up_pause_ms: 3000,
            self_restart_delay_ms: 3000,
            runtime_settle_ms: 5000,
            service_unit: constants::restart::DEFAULT_SERVICE_UNIT.to_string(),
            restart_exit_code: constants::restart::RESTART_EXIT_CODE,
        }
    }
}

impl RestartConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn pod_termination_timeout(&self) -> Duration {
        Duration::from_secs(self.pod_termination_timeout_seconds)
    }

    pub fn termination_poll_interval(&self) -> Duration {
        Duration::from_millis(self.termination_poll_interval_ms)
    }

    pub fn pods_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.pods_ready_timeout_seconds)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    pub fn scale_up_pause(&self) -> Duration {
        Duration::from_millis(self.scale_up_pause_ms)
    }

    pub fn self_restart_delay(&self) -> Duration {
        Duration::from_millis(self.self_restart_delay_ms)
    }

    pub fn runtime_settle(&self) -> Duration {
        Duration::from_millis(self.runtime_settle_ms)
    }
}

/// Reconnection backoff: `min(base * 2^(attempt-1), max)`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Attempts per outage before giving up; 0 retries until connected
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            max_attempts: 0,
        }
    }
}

impl ReconnectConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PersistenceConfig {
    pub state_directory: PathBuf,
    pub restart_record_key: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_directory: PathBuf::from("data"),
            restart_record_key: constants::restart::RESTART_RECORD_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast channel capacity for orchestrator and restart events
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

impl Default for AppstoreConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            timeouts: TimeoutConfig::default(),
            orchestration: OrchestrationConfig::default(),
            restart: RestartConfig::default(),
            reconnect: ReconnectConfig::default(),
            persistence: PersistenceConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

impl AppstoreConfig {
    /// Reject configurations the orchestrator cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.cluster.kubectl.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "cluster.kubectl",
                "cluster binary cannot be empty",
            ));
        }
        if self.cluster.shell.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "cluster.shell",
                "shell cannot be empty",
            ));
        }
        if self.cluster.namespace.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "cluster.namespace",
                "namespace cannot be empty",
            ));
        }
        if self.restart.cycle_limit == 0 {
            return Err(ConfigurationError::invalid_value(
                "restart.cycle_limit",
                "cycle limit must be at least 1",
            ));
        }
        if self.orchestration.mailbox_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "orchestration.mailbox_capacity",
                "mailbox capacity must be at least 1",
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                "channel capacity must be at least 1",
            ));
        }
        if self.reconnect.base_delay_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "reconnect.base_delay_ms",
                "base delay must be positive",
            ));
        }
        if self.reconnect.base_delay_ms > self.reconnect.max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "reconnect.base_delay_ms",
                format!(
                    "base delay {}ms exceeds max delay {}ms",
                    self.reconnect.base_delay_ms, self.reconnect.max_delay_ms
                ),
            ));
        }

        let timeouts = [
            ("timeouts.node_status_seconds", self.timeouts.node_status_seconds),
            ("timeouts.apply_seconds", self.timeouts.apply_seconds),
            ("timeouts.condition_wait_seconds", self.timeouts.condition_wait_seconds),
            ("timeouts.image_pull_seconds", self.timeouts.image_pull_seconds),
            ("timeouts.rollout_status_seconds", self.timeouts.rollout_status_seconds),
            ("timeouts.default_seconds", self.timeouts.default_seconds),
        ];
        for (field, value) in timeouts {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    "timeout must be positive",
                ));
            }
        }

        Ok(())
    }
}
