//! # Monitoring
//!
//! Connectivity tracking, reconnection backoff, the restart coordinator and
//! host-process recycling.

pub mod backoff;
pub mod connectivity;
pub mod reconnect;
pub mod restart_coordinator;
pub mod self_restart;

pub use backoff::{delay_for_attempt, ReconnectBackoff};
pub use connectivity::{
    ConnectivityEvent, ConnectivityState, ConnectivityStatus, ConnectivityTracker,
};
pub use reconnect::{Reconnect, ReconnectOutcome, ReconnectionSupervisor};
pub use restart_coordinator::{
    IgnoreReason, RestartCoordinator, RestartDecision, RestartError, RestartPolicyState,
};
pub use self_restart::{
    perform_self_restart, ProcessControl, SelfRestartOutcome, SystemProcessControl,
};
