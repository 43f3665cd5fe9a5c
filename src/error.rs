use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum AppstoreError {
    ConfigurationError(String),
    PersistenceError(String),
    StateTransitionError(String),
    OrchestrationError(String),
    ProcessControlError(String),
    ValidationError(String),
}

impl fmt::Display for AppstoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppstoreError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
            AppstoreError::PersistenceError(msg) => write!(f, "Persistence error: {msg}"),
            AppstoreError::StateTransitionError(msg) => write!(f, "State transition error: {msg}"),
            AppstoreError::OrchestrationError(msg) => write!(f, "Orchestration error: {msg}"),
            AppstoreError::ProcessControlError(msg) => write!(f, "Process control error: {msg}"),
            AppstoreError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl std::error::Error for AppstoreError {}

impl From<crate::config::ConfigurationError> for AppstoreError {
    fn from(err: crate::config::ConfigurationError) -> Self {
        AppstoreError::ConfigurationError(err.to_string())
    }
}

impl From<crate::persistence::PersistenceError> for AppstoreError {
    fn from(err: crate::persistence::PersistenceError) -> Self {
        AppstoreError::PersistenceError(err.to_string())
    }
}

impl From<crate::state_machine::StateMachineError> for AppstoreError {
    fn from(err: crate::state_machine::StateMachineError) -> Self {
        AppstoreError::StateTransitionError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppstoreError>;
