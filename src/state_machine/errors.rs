use super::states::OperationState;
use thiserror::Error;

pub type StateMachineResult<T> = Result<T, StateMachineError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateMachineError {
    /// Another mutating operation holds the gate
    #[error("Orchestrator busy with: {running} (requested: {requested})")]
    Busy { running: String, requested: String },

    #[error("Cannot acquire the gate into the {0} state")]
    InvalidTarget(OperationState),

    /// The ticket no longer matches the operation holding the gate
    #[error("Stale gate ticket for '{label}'")]
    StaleTicket { label: String },
}
