//! Recycling the host process
//!
//! Fallback order: restart through the service manager when the unit is
//! active, otherwise relaunch the current executable, otherwise ask the host
//! to exit with a sentinel code its supervisor treats as "restart me".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tracing::{info, warn};

use crate::execution::ShellRunner;

#[async_trait]
pub trait ProcessControl: Send + Sync {
    async fn service_active(&self, unit: &str) -> bool;

    async fn restart_service(&self, unit: &str) -> bool;

    /// Start a detached copy of the current executable
    async fn relaunch_self(&self) -> bool;
}

/// `systemctl` plus the current executable
#[derive(Debug, Clone)]
pub struct SystemProcessControl {
    runner: ShellRunner,
    timeout: Duration,
}

impl SystemProcessControl {
    pub fn new(runner: ShellRunner, timeout: Duration) -> Self {
        Self { runner, timeout }
    }
}

#[async_trait]
impl ProcessControl for SystemProcessControl {
    async fn service_active(&self, unit: &str) -> bool {
        matches!(
            self.runner.run(&format!("systemctl is-active {unit}"), self.timeout).await,
            Ok(output) if output.success()
        )
    }

    async fn restart_service(&self, unit: &str) -> bool {
        matches!(
            self.runner.run(&format!("systemctl restart {unit}"), self.timeout).await,
            Ok(output) if output.success()
        )
    }

    async fn relaunch_self(&self) -> bool {
        let executable = match std::env::current_exe() {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "Cannot resolve current executable");
                return false;
            }
        };

        let spawned = std::process::Command::new(&executable)
            .args(std::env::args().skip(1))
            .stdin(Stdio::null())
            .spawn();
        match spawned {
            Ok(child) => {
                info!(
                    pid = child.id(),
                    executable = %executable.display(),
                    "♻️ SELF_RESTART: Relaunched"
                );
                true
            }
            Err(e) => {
                warn!(error = %e, executable = %executable.display(), "Relaunch failed");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfRestartOutcome {
    /// The service manager is restarting the unit
    ServiceManager,
    /// A fresh copy of the executable is running
    Relaunched,
    /// Nothing worked; exit with this code
    ExitRequested(i32),
}

impl SelfRestartOutcome {
    /// Code the host process should exit with
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ServiceManager | Self::Relaunched => 0,
            Self::ExitRequested(code) => *code,
        }
    }
}

pub async fn perform_self_restart(
    control: &dyn ProcessControl,
    unit: &str,
    sentinel_exit_code: i32,
) -> SelfRestartOutcome {
    if control.service_active(unit).await {
        if control.restart_service(unit).await {
            info!(unit = %unit, "♻️ SELF_RESTART: Restart handed to service manager");
            return SelfRestartOutcome::ServiceManager;
        }
        warn!(unit = %unit, "Service manager restart failed, relaunching directly");
    }

    if control.relaunch_self().await {
        return SelfRestartOutcome::Relaunched;
    }

    warn!(
        exit_code = sentinel_exit_code,
        "♻️ SELF_RESTART: Falling back to supervisor exit code"
    );
    SelfRestartOutcome::ExitRequested(sentinel_exit_code)
}
