//! # Lifecycle Events
//!
//! Typed events published by the orchestrator and the restart coordinator, the
//! broadcast publisher that fans them out, and the outbound notification seam.

pub mod notifications;
pub mod publisher;

use serde::{Deserialize, Serialize};

use crate::constants::events;
use crate::state_machine::OperationState;

pub use notifications::{ChannelNotifier, LogNotifier, Notification, Notifier, Severity};
pub use publisher::EventPublisher;

/// Events emitted by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    JobStarted {
        operation: String,
    },
    JobFinished {
        operation: String,
        success: bool,
        message: String,
    },
    /// A mutating request arrived while another operation held the gate
    RequestRejected {
        reason: String,
        running: String,
        requested: String,
    },
    StateChanged {
        state: OperationState,
    },
    BusyChanged {
        busy: bool,
    },
    CurrentOperationChanged {
        operation: String,
    },
}

impl OrchestratorEvent {
    /// Stable event name for structured logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::JobStarted { .. } => events::JOB_STARTED,
            Self::JobFinished { .. } => events::JOB_FINISHED,
            Self::RequestRejected { .. } => events::JOB_REJECTED,
            Self::StateChanged { .. } => events::STATE_CHANGED,
            Self::BusyChanged { .. } => events::BUSY_CHANGED,
            Self::CurrentOperationChanged { .. } => events::OPERATION_CHANGED,
        }
    }
}

/// Events emitted by the restart coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RestartEvent {
    RestartStarted { cycle: u32 },
    RestartCompleted { cycle: u32, success: bool },
    RestartCycleLimitReached { cycle_count: u32, cycle_limit: u32 },
    /// The host process should exit with this code
    ShutdownRequested { exit_code: i32 },
}

impl RestartEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RestartStarted { .. } => events::RESTART_STARTED,
            Self::RestartCompleted { .. } => events::RESTART_COMPLETED,
            Self::RestartCycleLimitReached { .. } => events::RESTART_LIMIT_REACHED,
            Self::ShutdownRequested { .. } => events::SHUTDOWN_REQUESTED,
        }
    }
}
