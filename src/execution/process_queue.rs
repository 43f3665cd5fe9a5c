//! # Process Queue Executor
//!
//! Runs an ordered list of commands one child process at a time. Every
//! command must exit 0 (or fail in a way its [`FailureTolerance`] accepts);
//! the first other failure aborts the queue and the remaining commands never
//! run. Only one queue runs at a time; a second request while busy is
//! rejected without side effects.
//!
//! [`FailureTolerance`]: super::command::FailureTolerance

use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};

use super::async_task::panic_message;
use super::command::{CommandSpec, ProcessErrorKind, ShellRunner};
use crate::events::EventPublisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueState {
    Idle,
    Busy,
}

/// Result of one queue run; `failed_index` is 1-based
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueOutcome {
    pub success: bool,
    pub failed_index: Option<usize>,
    pub commands_run: usize,
    /// Merged output of every command that ran
    pub output: String,
    /// Output (or launch/timeout description) of the failing command
    pub error: Option<String>,
    /// How the failing command failed
    pub error_kind: Option<ProcessErrorKind>,
}

impl QueueOutcome {
    pub fn rejected() -> Self {
        Self {
            success: false,
            failed_index: None,
            commands_run: 0,
            output: String::new(),
            error: Some("Process queue is busy".to_string()),
            error_kind: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    BusyChanged {
        busy: bool,
    },
    CommandFinished {
        run_id: u64,
        index: usize,
        command: String,
        success: bool,
        tolerated: bool,
    },
    Finished {
        run_id: u64,
        outcome: QueueOutcome,
    },
}

#[derive(Debug)]
struct QueueStatus {
    state: QueueState,
    cursor: usize,
    next_run_id: u64,
}

#[derive(Debug)]
struct ExecutorInner {
    runner: ShellRunner,
    status: Mutex<QueueStatus>,
    events: EventPublisher<QueueEvent>,
}

#[derive(Debug, Clone)]
pub struct ProcessQueueExecutor {
    inner: Arc<ExecutorInner>,
}

impl ProcessQueueExecutor {
    pub fn new(runner: ShellRunner) -> Self {
        Self::with_capacity(runner, 64)
    }

    pub fn with_capacity(runner: ShellRunner, event_capacity: usize) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                runner,
                status: Mutex::new(QueueStatus {
                    state: QueueState::Idle,
                    cursor: 0,
                    next_run_id: 0,
                }),
                events: EventPublisher::new(event_capacity),
            }),
        }
    }

    pub fn state(&self) -> QueueState {
        self.inner.status.lock().state
    }

    pub fn is_busy(&self) -> bool {
        self.state() == QueueState::Busy
    }

    /// 1-based index of the running command, 0 when idle
    pub fn current_index(&self) -> usize {
        self.inner.status.lock().cursor
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Start running `commands` in the background
    ///
    /// Returns false, doing nothing, when a queue is already running.
    pub fn queue_and_run(&self, commands: Vec<CommandSpec>) -> bool {
        self.start(commands).is_some()
    }

    /// Run `commands` and wait for the queue to finish
    pub async fn run_commands_sync(&self, commands: Vec<CommandSpec>) -> QueueOutcome {
        match self.start(commands) {
            Some((_, done)) => done.await.unwrap_or_else(|_| QueueOutcome {
                error: Some("Process queue stopped before finishing".to_string()),
                ..QueueOutcome::default()
            }),
            None => QueueOutcome::rejected(),
        }
    }

    fn start(&self, commands: Vec<CommandSpec>) -> Option<(u64, oneshot::Receiver<QueueOutcome>)> {
        let run_id = {
            let mut status = self.inner.status.lock();
            if status.state == QueueState::Busy {
                warn!(
                    cursor = status.cursor,
                    "⚙️ PROCESS_QUEUE: Rejecting commands while busy"
                );
                return None;
            }
            status.state = QueueState::Busy;
            status.cursor = 0;
            status.next_run_id = status.next_run_id.wrapping_add(1);
            status.next_run_id
        };

        self.inner.events.publish(QueueEvent::BusyChanged { busy: true });

        let (done_tx, done_rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let run = Self::run_queue(&inner, run_id, commands);
            let outcome = Self::finish_run(&inner, run_id, run).await;
            let _ = done_tx.send(outcome);
        });

        Some((run_id, done_rx))
    }

    /// Drive `run` and return the executor to idle, even if `run` panics
    async fn finish_run<F>(inner: &ExecutorInner, run_id: u64, run: F) -> QueueOutcome
    where
        F: Future<Output = QueueOutcome>,
    {
        let outcome = match AssertUnwindSafe(run).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(run_id = run_id, panic = %message, "⚙️ PROCESS_QUEUE: Run panicked");
                QueueOutcome {
                    error: Some(format!("Process queue panicked: {message}")),
                    ..QueueOutcome::default()
                }
            }
        };

        {
            let mut status = inner.status.lock();
            status.state = QueueState::Idle;
            status.cursor = 0;
        }
        inner.events.publish(QueueEvent::BusyChanged { busy: false });
        inner.events.publish(QueueEvent::Finished {
            run_id,
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn run_queue(
        inner: &ExecutorInner,
        run_id: u64,
        commands: Vec<CommandSpec>,
    ) -> QueueOutcome {
        let total = commands.len();
        let mut outcome = QueueOutcome {
            success: true,
            ..QueueOutcome::default()
        };

        info!(run_id = run_id, commands = total, "⚙️ PROCESS_QUEUE: Starting");

        for (index, spec) in commands.into_iter().enumerate() {
            let number = index + 1;
            inner.status.lock().cursor = number;
            debug!(
                run_id = run_id,
                index = number,
                command = %spec.line,
                "⚙️ PROCESS_QUEUE: Running"
            );

            let (kind, text, detail) = match inner.runner.run(&spec.line, spec.timeout).await {
                Ok(result) if result.success() => (None, result.output, String::new()),
                Ok(result) => {
                    let detail = match result.exit_code {
                        Some(code) => format!("exit code {code}"),
                        None => "terminated by signal".to_string(),
                    };
                    (Some(ProcessErrorKind::NonZeroExit), result.output, detail)
                }
                Err(e) => (Some(e.kind()), e.output().to_string(), e.to_string()),
            };
            let succeeded = kind.is_none();

            outcome.commands_run = number;
            outcome.output.push_str(&text);

            let tolerated = !succeeded && spec.tolerance.tolerates(&text);
            inner.events.publish(QueueEvent::CommandFinished {
                run_id,
                index: number,
                command: spec.line.clone(),
                success: succeeded,
                tolerated,
            });

            if succeeded {
                continue;
            }
            if tolerated {
                warn!(
                    run_id = run_id,
                    index = number,
                    command = %spec.line,
                    tolerance = ?spec.tolerance,
                    detail = %detail,
                    "⚙️ PROCESS_QUEUE: Tolerated failure, continuing"
                );
                continue;
            }

            // A nonzero exit explains itself in its output; a timeout or launch
            // failure does not
            let trimmed = text.trim();
            let error = if kind == Some(ProcessErrorKind::NonZeroExit) && !trimmed.is_empty() {
                trimmed.to_string()
            } else {
                detail
            };
            warn!(
                run_id = run_id,
                index = number,
                total = total,
                command = %spec.line,
                error = %error,
                "⚙️ PROCESS_QUEUE: Command failed, aborting queue"
            );
            outcome.success = false;
            outcome.failed_index = Some(number);
            outcome.error = Some(error);
            outcome.error_kind = kind;
            return outcome;
        }

        info!(run_id = run_id, commands = total, "⚙️ PROCESS_QUEUE: All commands succeeded");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeoutConfig;
    use crate::execution::command::FailureTolerance;

    fn executor() -> ProcessQueueExecutor {
        ProcessQueueExecutor::new(ShellRunner::new("/bin/sh", ""))
    }

    fn spec(line: &str) -> CommandSpec {
        CommandSpec::infer(line, &TimeoutConfig::default())
    }

    #[tokio::test]
    async fn test_all_commands_succeed() {
        let outcome = executor()
            .run_commands_sync(vec![spec("echo one"), spec("echo two")])
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.commands_run, 2);
        assert!(outcome.output.contains("one"));
        assert!(outcome.output.contains("two"));
    }

    #[tokio::test]
    async fn test_empty_queue_succeeds() {
        let outcome = executor().run_commands_sync(Vec::new()).await;
        assert!(outcome.success);
        assert_eq!(outcome.commands_run, 0);
    }

    #[tokio::test]
    async fn test_not_found_failure_is_tolerated() {
        let outcome = executor()
            .run_commands_sync(vec![
                spec("echo 'Error from server (NotFound)'; exit 1")
                    .with_tolerance(FailureTolerance::IgnoreNotFound),
                spec("echo after"),
            ])
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.commands_run, 2);
    }

    #[tokio::test]
    async fn test_other_failure_aborts_tolerant_command() {
        let outcome = executor()
            .run_commands_sync(vec![
                spec("echo 'connection refused'; exit 1")
                    .with_tolerance(FailureTolerance::IgnoreNotFound),
                spec("echo never"),
            ])
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.failed_index, Some(1));
        assert_eq!(outcome.error.as_deref(), Some("connection refused"));
        assert!(!outcome.output.contains("never"));
    }

    #[tokio::test]
    async fn test_busy_executor_rejects_second_queue() {
        let executor = executor();
        assert!(executor.queue_and_run(vec![spec("sleep 0.3")]));
        assert!(executor.is_busy());
        assert!(!executor.queue_and_run(vec![spec("true")]));

        let outcome = executor.run_commands_sync(vec![spec("true")]).await;
        assert_eq!(outcome, QueueOutcome::rejected());
    }

    #[tokio::test]
    async fn test_timeout_is_command_failure() {
        let outcome = executor()
            .run_commands_sync(vec![
                spec("sleep 5").with_timeout(std::time::Duration::from_millis(100))
            ])
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ProcessErrorKind::Timeout));
        assert!(outcome.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let outcome = executor()
            .run_commands_sync(vec![spec("echo partial-progress; sleep 5")
                .with_timeout(std::time::Duration::from_millis(500))])
            .await;
        assert!(!outcome.success);
        assert!(outcome.output.contains("partial-progress"));
        assert!(outcome.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_printed_launch_text_is_still_an_exit_failure() {
        let outcome = executor()
            .run_commands_sync(vec![spec("echo 'Failed to start sdv-runtime.service'; exit 1")])
            .await;
        assert_eq!(outcome.error_kind, Some(ProcessErrorKind::NonZeroExit));
        assert_eq!(outcome.error.as_deref(), Some("Failed to start sdv-runtime.service"));
    }

    #[tokio::test]
    async fn test_panicking_run_returns_executor_to_idle() {
        let executor = executor();
        executor.inner.status.lock().state = QueueState::Busy;
        let mut events = executor.subscribe();

        let outcome = ProcessQueueExecutor::finish_run(&executor.inner, 7, async {
            if true {
                panic!("queue bug");
            }
            QueueOutcome::default()
        })
        .await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("queue bug"));
        assert!(!executor.is_busy());
        assert_eq!(events.recv().await.unwrap(), QueueEvent::BusyChanged { busy: false });
        assert!(executor.run_commands_sync(vec![spec("true")]).await.success);
    }
}
