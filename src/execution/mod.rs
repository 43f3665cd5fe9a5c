//! # Execution Primitives
//!
//! Background tasks, sequential task chains, the shell command runner, the
//! single-queue process executor and read-only cluster probes.

pub mod async_task;
pub mod command;
pub mod probes;
pub mod process_queue;
pub mod task_chain;

pub use async_task::{AsyncTask, TaskHandle, TaskOutcome, TaskState};
pub use command::{
    ClusterCli, CommandOutput, CommandSpec, FailureTolerance, ProcessError, ProcessErrorKind,
    ShellRunner, TimeoutClass,
};
pub use process_queue::{ProcessQueueExecutor, QueueEvent, QueueOutcome, QueueState};
pub use task_chain::{ChainOutcome, IntoStepResult, TaskChain};
