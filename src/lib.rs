#![allow(clippy::doc_markdown)] // Allow technical terms like kubectl, systemd in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Appstore Core
//!
//! Job orchestration core for an in-vehicle application marketplace.
//!
//! ## Overview
//!
//! Every mutating cluster action (deploying a service, removing it, installing
//! an application, restarting or scaling a deployment) runs as a background job
//! behind a single operation gate. At most one such job is in flight; a second
//! request is rejected immediately with a busy result naming the running
//! operation. Read-only probes bypass the gate.
//!
//! Work reaches the cluster through shell command lines (usually `kubectl`)
//! executed one at a time by the [`execution::ProcessQueueExecutor`], each with
//! a timeout inferred from the command and a per-command failure tolerance.
//!
//! When connectivity comes back after an outage, the
//! [`monitoring::RestartCoordinator`] recycles the vehicle runtime deployment
//! through a five-step [`execution::TaskChain`], at most a configured number of
//! times before a manual reset.
//!
//! ## Module Organization
//!
//! - [`config`] - Layered configuration (defaults, YAML files, environment)
//! - [`error`] - Top-level error type
//! - [`events`] - Lifecycle events, broadcast publisher, notifications
//! - [`execution`] - Async tasks, task chains, shell runner, process queue, probes
//! - [`logging`] - Structured logging setup and helpers
//! - [`monitoring`] - Connectivity, reconnection backoff, restart coordination
//! - [`orchestration`] - The gated job service
//! - [`persistence`] - Small JSON state store and the restart record
//! - [`state_machine`] - Operation states and the single-operation gate
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use appstore_core::config::ConfigManager;
//! use appstore_core::events::LogNotifier;
//! use appstore_core::orchestration::{DeploymentInfo, Orchestrator};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let (orchestrator, _owner) =
//!     Orchestrator::start(Arc::new(manager.config().clone()), Arc::new(LogNotifier));
//!
//! let handle = orchestrator
//!     .deploy_service(DeploymentInfo::new("nav", "Navigation", "/opt/apps/nav.yaml", true))
//!     .await;
//! if let Some(result) = handle.wait().await.into_value() {
//!     println!("deployed: {}", result.success);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod execution;
pub mod logging;
pub mod monitoring;
pub mod orchestration;
pub mod persistence;
pub mod state_machine;

pub use config::{AppstoreConfig, ConfigManager};
pub use error::{AppstoreError, Result};
pub use events::{OrchestratorEvent, RestartEvent};
pub use execution::{AsyncTask, ChainOutcome, TaskChain, TaskHandle, TaskOutcome};
pub use monitoring::{ConnectivityTracker, RestartCoordinator};
pub use orchestration::{JobRequest, JobResult, Orchestrator};
pub use state_machine::{OperationGate, OperationState};
