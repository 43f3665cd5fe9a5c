//! # System Constants
//!
//! Event names, defaults and sentinel values shared by the orchestrator, the
//! restart coordinator and the host binaries.

/// Names used for structured logging and event correlation
pub mod events {
    // Orchestrator lifecycle events
    pub const JOB_STARTED: &str = "job.started";
    pub const JOB_FINISHED: &str = "job.finished";
    pub const JOB_REJECTED: &str = "job.rejected";
    pub const STATE_CHANGED: &str = "orchestrator.state_changed";
    pub const BUSY_CHANGED: &str = "orchestrator.busy_changed";
    pub const OPERATION_CHANGED: &str = "orchestrator.operation_changed";

    // Restart lifecycle events
    pub const RESTART_STARTED: &str = "restart.started";
    pub const RESTART_COMPLETED: &str = "restart.completed";
    pub const RESTART_LIMIT_REACHED: &str = "restart.cycle_limit_reached";
    pub const SHUTDOWN_REQUESTED: &str = "restart.shutdown_requested";

    // Connectivity events
    pub const CONNECTION_RESTORED: &str = "connectivity.restored";
    pub const CONNECTION_LOST: &str = "connectivity.lost";
}

/// Cluster defaults matching the vehicle image layout
pub mod cluster {
    pub const DEFAULT_KUBECTL: &str = "kubectl";
    pub const DEFAULT_SHELL: &str = "/bin/bash";
    pub const DEFAULT_NAMESPACE: &str = "default";
    pub const DEFAULT_NODE_NAME: &str = "vip";
    pub const DEFAULT_RUNTIME_DEPLOYMENT: &str = "sdv-runtime";
    pub const EXTRA_PATH_ENTRY: &str = "/usr/local/bin";
}

/// Restart policy defaults
pub mod restart {
    pub const DEFAULT_CYCLE_LIMIT: u32 = 3;
    pub const DEFAULT_DELAY_MS: u64 = 2000;
    pub const DEFAULT_SERVICE_UNIT: &str = "sdv-runtime";

    /// Exit code an external supervisor interprets as "please restart me"
    pub const RESTART_EXIT_CODE: i32 = 42;

    /// Key the pre-restart diagnostic record is stored under
    pub const RESTART_RECORD_KEY: &str = "auto_restart_state";
}

/// Substrings in command output that identify an already-absent resource
pub const NOT_FOUND_MARKERS: &[&str] = &["NotFound", "not found"];
