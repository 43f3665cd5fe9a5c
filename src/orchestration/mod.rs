//! # Orchestration
//!
//! The gated job service: request/result types, cluster command lists,
//! operation bodies and the [`Orchestrator`] handle with its owner task.

pub mod commands;
pub mod operations;
pub mod orchestrator;
pub mod types;

pub use commands::CommandBuilder;
pub use orchestrator::Orchestrator;
pub use types::{
    DeploymentInfo, InstallationRequest, JobErrorKind, JobRequest, JobResult, RemovalRequest,
};
