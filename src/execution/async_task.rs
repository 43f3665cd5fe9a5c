//! # AsyncTask
//!
//! One-shot background computations with exactly-once completion. A panic in
//! the computation is caught and reported as [`TaskOutcome::Failed`]; it never
//! reaches whoever observes the handle.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lifecycle of a submitted task; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending = 0,
    Running = 1,
    Completed = 2,
}

impl From<u8> for TaskState {
    fn from(value: u8) -> Self {
        match value {
            0 => TaskState::Pending,
            1 => TaskState::Running,
            _ => TaskState::Completed,
        }
    }
}

/// Result delivered once when a task completes
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<T> {
    Completed(T),
    Failed(String),
}

impl<T> TaskOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Failed(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TaskOutcome<U> {
        match self {
            Self::Completed(value) => TaskOutcome::Completed(f(value)),
            Self::Failed(reason) => TaskOutcome::Failed(reason),
        }
    }
}

#[derive(Debug)]
struct TaskShared {
    state: AtomicU8,
    cancelled: AtomicBool,
}

impl TaskShared {
    fn new(state: TaskState) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(state as u8),
            cancelled: AtomicBool::new(false),
        })
    }

    fn advance(&self, state: TaskState) {
        self.state.fetch_max(state as u8, Ordering::AcqRel);
    }
}

/// Caller-side handle to a submitted task
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: Uuid,
    shared: Arc<TaskShared>,
    receiver: oneshot::Receiver<TaskOutcome<T>>,
}

impl<T: Send + 'static> TaskHandle<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TaskState {
        TaskState::from(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_completed(&self) -> bool {
        self.state() == TaskState::Completed
    }

    /// Mark a task that has not completed yet as failed for presentation
    ///
    /// The computation keeps running; only the observed outcome changes.
    /// Returns false when the task had already completed.
    pub fn cancel(&self) -> bool {
        if self.is_completed() {
            return false;
        }
        self.shared.cancelled.store(true, Ordering::Release);
        debug!(task_id = %self.id, "⏹️ TASK: Marked cancelled");
        true
    }

    /// Wait for the single completion notification
    pub async fn wait(self) -> TaskOutcome<T> {
        let outcome = self
            .receiver
            .await
            .unwrap_or_else(|_| TaskOutcome::Failed("task dropped before completion".to_string()));
        self.shared.advance(TaskState::Completed);
        Self::apply_cancellation(&self.shared, outcome)
    }

    /// Blocking variant of [`TaskHandle::wait`] for threads outside the runtime
    pub fn wait_blocking(self) -> TaskOutcome<T> {
        let outcome = self
            .receiver
            .blocking_recv()
            .unwrap_or_else(|_| TaskOutcome::Failed("task dropped before completion".to_string()));
        self.shared.advance(TaskState::Completed);
        Self::apply_cancellation(&self.shared, outcome)
    }

    /// Deliver the outcome to `callback` once the task completes
    pub fn on_complete<F>(self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(TaskOutcome<T>) + Send + 'static,
    {
        tokio::spawn(async move {
            let outcome = self.wait().await;
            callback(outcome);
        })
    }

    fn apply_cancellation(shared: &TaskShared, outcome: TaskOutcome<T>) -> TaskOutcome<T> {
        if shared.cancelled.load(Ordering::Acquire) {
            TaskOutcome::Failed("cancelled".to_string())
        } else {
            outcome
        }
    }
}

/// Entry points for running work off the caller's context
pub struct AsyncTask;

impl AsyncTask {
    /// Spawn `future` onto the runtime
    pub fn submit<T, F>(future: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        Self::submit_with_finalizer(future, |outcome| async move { outcome })
    }

    /// Spawn `future`, then pass its outcome through `finalizer` before it is
    /// published to the handle
    ///
    /// The finalizer sees panics as `TaskOutcome::Failed` and may rewrite the
    /// outcome.
    pub fn submit_with_finalizer<T, F, Fin, FinFut>(future: F, finalizer: Fin) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
        Fin: FnOnce(TaskOutcome<T>) -> FinFut + Send + 'static,
        FinFut: Future<Output = TaskOutcome<T>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let shared = TaskShared::new(TaskState::Pending);
        let (sender, receiver) = oneshot::channel();

        let task_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            task_shared.advance(TaskState::Running);
            let outcome = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(value) => TaskOutcome::Completed(value),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(task_id = %id, error = %message, "💥 TASK: Computation panicked");
                    TaskOutcome::Failed(message)
                }
            };

            let outcome = match AssertUnwindSafe(finalizer(outcome)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => TaskOutcome::Failed(panic_message(payload.as_ref())),
            };

            task_shared.advance(TaskState::Completed);
            // Receiver dropped: nobody observes this task
            let _ = sender.send(outcome);
        });

        TaskHandle {
            id,
            shared,
            receiver,
        }
    }

    /// Run a synchronous computation on the blocking pool
    pub fn submit_blocking<T, F>(computation: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let id = Uuid::new_v4();
        let shared = TaskShared::new(TaskState::Pending);
        let (sender, receiver) = oneshot::channel();

        let task_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            task_shared.advance(TaskState::Running);
            let outcome = match tokio::task::spawn_blocking(computation).await {
                Ok(value) => TaskOutcome::Completed(value),
                Err(join_error) if join_error.is_panic() => {
                    let message = panic_message(join_error.into_panic().as_ref());
                    warn!(
                        task_id = %id,
                        error = %message,
                        "💥 TASK: Blocking computation panicked"
                    );
                    TaskOutcome::Failed(message)
                }
                Err(join_error) => TaskOutcome::Failed(join_error.to_string()),
            };
            task_shared.advance(TaskState::Completed);
            let _ = sender.send(outcome);
        });

        TaskHandle {
            id,
            shared,
            receiver,
        }
    }

    /// A handle that is already complete with `value`
    pub fn resolved<T: Send + 'static>(value: T) -> TaskHandle<T> {
        Self::from_outcome(TaskOutcome::Completed(value))
    }

    /// A handle that is already complete with a failure
    pub fn failed<T: Send + 'static>(reason: impl Into<String>) -> TaskHandle<T> {
        Self::from_outcome(TaskOutcome::Failed(reason.into()))
    }

    fn from_outcome<T: Send + 'static>(outcome: TaskOutcome<T>) -> TaskHandle<T> {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(outcome);
        TaskHandle {
            id: Uuid::new_v4(),
            shared: TaskShared::new(TaskState::Completed),
            receiver,
        }
    }
}

/// Render a panic payload as text
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {message}")
    } else {
        "panic: unknown payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_submit_completes_with_value() {
        let handle = AsyncTask::submit(async { 21 * 2 });
        assert_eq!(handle.wait().await, TaskOutcome::Completed(42));
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let handle = AsyncTask::submit(async {
            if true {
                panic!("boom");
            }
            1
        });
        match handle.wait().await {
            TaskOutcome::Failed(message) => assert!(message.contains("boom")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_finalizer_runs_before_publication() {
        let flag = Arc::new(AtomicBool::new(false));
        let observed = Arc::clone(&flag);
        let handle = AsyncTask::submit_with_finalizer(async { "done" }, move |outcome| async move {
            observed.store(true, Ordering::SeqCst);
            outcome
        });

        assert_eq!(handle.wait().await, TaskOutcome::Completed("done"));
        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_finalizer_sees_panic_as_failure() {
        let handle = AsyncTask::submit_with_finalizer(
            async {
                if true {
                    panic!("inner");
                }
                0u8
            },
            |outcome| async move {
                match outcome {
                    TaskOutcome::Failed(_) => TaskOutcome::Completed(7),
                    other => other,
                }
            },
        );
        assert_eq!(handle.wait().await, TaskOutcome::Completed(7));
    }

    #[tokio::test]
    async fn test_submit_blocking_catches_panics() {
        let ok = AsyncTask::submit_blocking(|| "sync");
        assert_eq!(ok.wait().await, TaskOutcome::Completed("sync"));

        let failing = AsyncTask::submit_blocking(|| -> u8 { panic!("blocking boom") });
        assert!(!failing.wait().await.is_success());
    }

    #[tokio::test]
    async fn test_wait_stays_pending_until_completion() {
        let (release, gate) = oneshot::channel::<()>();
        let handle = AsyncTask::submit(async move {
            let _ = gate.await;
            "released"
        });

        let mut wait = tokio_test::task::spawn(handle.wait());
        tokio_test::assert_pending!(wait.poll());

        release.send(()).unwrap();
        assert_eq!(wait.await, TaskOutcome::Completed("released"));
    }

    #[tokio::test]
    async fn test_resolved_handle_is_completed() {
        let handle = AsyncTask::resolved("busy");
        assert_eq!(handle.state(), TaskState::Completed);
        assert!(!handle.cancel());
        assert_eq!(handle.wait().await, TaskOutcome::Completed("busy"));
    }

    #[tokio::test]
    async fn test_cancel_marks_failure_without_stopping_work() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let handle = AsyncTask::submit(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
            5
        });

        assert!(handle.cancel());
        assert_eq!(handle.wait().await, TaskOutcome::Failed("cancelled".to_string()));
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_on_complete_delivers_outcome() {
        let (tx, rx) = oneshot::channel();
        AsyncTask::submit(async { "callback" }).on_complete(move |outcome| {
            let _ = tx.send(outcome);
        });
        assert_eq!(rx.await.unwrap(), TaskOutcome::Completed("callback"));
    }

    #[test]
    fn test_state_from_u8() {
        assert_eq!(TaskState::from(0), TaskState::Pending);
        assert_eq!(TaskState::from(1), TaskState::Running);
        assert_eq!(TaskState::from(2), TaskState::Completed);
        assert_eq!(TaskState::from(9), TaskState::Completed);
    }
}
