//! Request and result types for orchestrator jobs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::state_machine::OperationState;

/// Why a job did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    /// Another mutating operation was running; nothing was attempted
    BusyRejection,
    /// A command exited nonzero or timed out
    CommandFailure,
    /// A check failed before any mutating command ran
    PreconditionFailure,
    /// A child process could not be started
    ProcessLaunchFailure,
    /// The job body panicked
    InternalFault,
}

impl fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusyRejection => write!(f, "busy_rejection"),
            Self::CommandFailure => write!(f, "command_failure"),
            Self::PreconditionFailure => write!(f, "precondition_failure"),
            Self::ProcessLaunchFailure => write!(f, "process_launch_failure"),
            Self::InternalFault => write!(f, "internal_fault"),
        }
    }
}

/// Outcome of every mutating operation; immutable once returned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    /// Failure description, or a partial-success note
    pub error_message: String,
    pub output: String,
    pub error_kind: Option<JobErrorKind>,
}

impl JobResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            error_message: String::new(),
            output: output.into(),
            error_kind: None,
        }
    }

    /// Succeeded with a caveat worth surfacing
    pub fn partial(message: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            success: true,
            error_message: message.into(),
            output: output.into(),
            error_kind: None,
        }
    }

    pub fn failure(
        kind: JobErrorKind,
        message: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error_message: message.into(),
            output: output.into(),
            error_kind: Some(kind),
        }
    }

    pub fn busy(running: &str, requested: &str) -> Self {
        Self::failure(
            JobErrorKind::BusyRejection,
            format!("Orchestrator busy with: {running} (requested: {requested})"),
            String::new(),
        )
    }

    pub fn is_busy_rejection(&self) -> bool {
        self.error_kind == Some(JobErrorKind::BusyRejection)
    }
}

/// Input to deploy and undeploy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub id: String,
    pub name: String,
    pub manifest_path: PathBuf,
    /// `true` applies the manifest, `false` deletes it
    pub subscribe: bool,
}

impl DeploymentInfo {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        manifest_path: impl Into<PathBuf>,
        subscribe: bool,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            manifest_path: manifest_path.into(),
            subscribe,
        }
    }
}

/// Input to install; commands run in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationRequest {
    pub app_id: String,
    pub app_name: String,
    pub commands: Vec<String>,
    pub category: String,
}

/// Input to remove
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalRequest {
    pub id: String,
    /// Manifest deleted after scale-down, when known
    pub manifest_path: Option<PathBuf>,
}

/// Every gated job the orchestrator accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobRequest {
    Deploy(DeploymentInfo),
    Remove(RemovalRequest),
    Install(InstallationRequest),
    Restart { name: String },
    Scale { name: String, replicas: u32 },
    /// A custom labelled command batch
    Commands { label: String, commands: Vec<String> },
}

impl JobRequest {
    /// Gate state the job occupies
    pub fn state(&self) -> OperationState {
        match self {
            Self::Deploy(_) | Self::Scale { .. } => OperationState::Deploying,
            Self::Remove(_) => OperationState::Removing,
            Self::Install(_) | Self::Commands { .. } => OperationState::Installing,
            Self::Restart { .. } => OperationState::Restarting,
        }
    }

    /// Operation label shown while the job runs
    pub fn label(&self) -> String {
        match self {
            Self::Deploy(info) => format!("Deploy {}", info.name),
            Self::Remove(request) => format!("Remove {}", request.id),
            Self::Install(request) => format!("Install {}", request.app_name),
            Self::Restart { name } => format!("Restart {name}"),
            Self::Scale { name, replicas } => format!("Scale {name} to {replicas} replicas"),
            Self::Commands { label, .. } => label.clone(),
        }
    }
}
