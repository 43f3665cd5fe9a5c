//! Scripted stand-in for the cluster CLI
//!
//! Writes an executable `kubectl` into a temporary directory. Every call
//! appends its arguments to a log file, then runs the `case "$*"` arms the
//! test supplied.

use appstore_core::config::AppstoreConfig;
use appstore_core::events::{ChannelNotifier, Notification};
use appstore_core::orchestration::Orchestrator;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

pub const READY_NODE_JSON: &str =
    r#"{"status":{"conditions":[{"type":"MemoryPressure","status":"False"},{"type":"Ready","status":"True"}]}}"#;

pub const NOT_READY_NODE_JSON: &str =
    r#"{"status":{"conditions":[{"type":"Ready","status":"False"}]}}"#;

/// A deployment that reports zero replicas once scaled down and 1/1 ready
/// once scaled up, so a restart chain runs all five steps
pub const RECYCLE_ARMS: &str = r#"  *"{.status.readyReplicas}/{.status.replicas}"*) echo -n "1/1" ;;
  *"{.status.replicas}"*) echo -n "" ;;"#;

pub struct FakeCluster {
    dir: TempDir,
    kubectl: PathBuf,
    log: PathBuf,
}

impl FakeCluster {
    /// `arms` are `case` arms matched against the full argument string
    pub fn new(arms: &str) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let kubectl = dir.path().join("kubectl");
        let log = dir.path().join("calls.log");

        let script = format!(
            "#!/bin/bash\necho \"$*\" >> '{log}'\ncase \"$*\" in\n{arms}\n  *) exit 0 ;;\nesac\n",
            log = log.display(),
        );
        std::fs::write(&kubectl, script).expect("Failed to write fake kubectl");
        std::fs::set_permissions(&kubectl, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to make fake kubectl executable");

        Self { dir, kubectl, log }
    }

    /// A cluster where every call succeeds silently
    pub fn permissive() -> Self {
        Self::new("")
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Arguments of every call so far, oldest first
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Configuration pointing at this cluster, with pauses shortened for tests
    pub fn config(&self) -> AppstoreConfig {
        let mut config = AppstoreConfig::default();
        config.cluster.kubectl = self.kubectl.display().to_string();
        config.orchestration.settle_delay_ms = 0;
        config.orchestration.install_command_pause_ms = 0;
        config.restart.delay_ms = 10;
        config.restart.termination_poll_interval_ms = 10;
        config.restart.ready_poll_interval_ms = 10;
        config.restart.scale_up_pause_ms = 0;
        config.restart.self_restart_delay_ms = 0;
        config.restart.runtime_settle_ms = 0;
        config
    }

    pub fn start(&self) -> (Orchestrator, UnboundedReceiver<Notification>) {
        start_with(self.config())
    }
}

pub fn start_with(config: AppstoreConfig) -> (Orchestrator, UnboundedReceiver<Notification>) {
    let (notifier, notifications) = ChannelNotifier::new();
    let (orchestrator, _owner) = Orchestrator::start(Arc::new(config), Arc::new(notifier));
    (orchestrator, notifications)
}

/// Poll until the orchestrator reports a running job
pub async fn wait_until_busy(orchestrator: &Orchestrator) {
    for _ in 0..200 {
        if orchestrator.is_busy() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("orchestrator never became busy");
}
