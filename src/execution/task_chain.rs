//! # TaskChain
//!
//! Ordered composition of fallible steps. Each step runs as its own
//! [`AsyncTask`], strictly after the previous one succeeded; the first failure
//! stops the chain and the remaining steps never run.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use tracing::{debug, info, warn};

use super::async_task::{AsyncTask, TaskHandle, TaskOutcome};

/// Conversion from a step's return value to continue/stop
pub trait IntoStepResult {
    fn into_step_result(self) -> Result<(), String>;
}

impl IntoStepResult for bool {
    fn into_step_result(self) -> Result<(), String> {
        if self {
            Ok(())
        } else {
            Err("step returned false".to_string())
        }
    }
}

impl IntoStepResult for () {
    fn into_step_result(self) -> Result<(), String> {
        Ok(())
    }
}

impl<E: fmt::Display> IntoStepResult for Result<(), E> {
    fn into_step_result(self) -> Result<(), String> {
        self.map_err(|e| e.to_string())
    }
}

/// How a chain ended; step numbers are 1-based
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    Succeeded {
        steps: usize,
    },
    FailedAt {
        step: usize,
        total: usize,
        reason: String,
    },
}

impl ChainOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

type Step = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), String>> + Send>;
type FinishedHook = Box<dyn FnOnce(ChainOutcome) -> BoxFuture<'static, ()> + Send>;

pub struct TaskChain {
    label: String,
    steps: Vec<Step>,
    on_finished: Option<FinishedHook>,
}

impl fmt::Debug for TaskChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskChain")
            .field("label", &self.label)
            .field("steps", &self.steps.len())
            .field("has_on_finished", &self.on_finished.is_some())
            .finish()
    }
}

impl TaskChain {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            steps: Vec::new(),
            on_finished: None,
        }
    }

    /// Append a step; it runs only if every earlier step succeeded
    pub fn add<F, Fut, R>(&mut self, step: F) -> &mut Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoStepResult + Send + 'static,
    {
        self.steps.push(Box::new(move || {
            async move { step().await.into_step_result() }.boxed()
        }));
        self
    }

    /// Run `hook` with the outcome before the chain's completion is published
    pub fn on_finished<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: FnOnce(ChainOutcome) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_finished = Some(Box::new(move |outcome| hook(outcome).boxed()));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Start executing; the chain is consumed so it can run only once
    pub fn start(self) -> TaskHandle<ChainOutcome> {
        let TaskChain {
            label,
            steps,
            on_finished,
        } = self;

        AsyncTask::submit(async move {
            let total = steps.len();
            info!(chain = %label, steps = total, "⛓️ CHAIN: Starting");

            let mut outcome = ChainOutcome::Succeeded { steps: total };
            for (index, step) in steps.into_iter().enumerate() {
                let number = index + 1;
                debug!(chain = %label, step = number, total = total, "⛓️ CHAIN: Running step");

                let result = match AsyncTask::submit(step()).wait().await {
                    TaskOutcome::Completed(result) => result,
                    TaskOutcome::Failed(reason) => Err(reason),
                };

                if let Err(reason) = result {
                    warn!(
                        chain = %label,
                        step = number,
                        total = total,
                        reason = %reason,
                        "⛓️ CHAIN: Step failed, stopping"
                    );
                    outcome = ChainOutcome::FailedAt {
                        step: number,
                        total,
                        reason,
                    };
                    break;
                }
            }

            if outcome.is_success() {
                info!(chain = %label, steps = total, "⛓️ CHAIN: All steps succeeded");
            }

            if let Some(hook) = on_finished {
                hook(outcome.clone()).await;
            }
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let mut chain = TaskChain::new("ok");
        chain.add(|| async { true }).add(|| async {}).add(|| async {
            Ok::<(), String>(())
        });
        assert_eq!(chain.len(), 3);

        let outcome = chain.start().wait().await.into_value().unwrap();
        assert_eq!(outcome, ChainOutcome::Succeeded { steps: 3 });
    }

    #[tokio::test]
    async fn test_error_result_reason_is_kept() {
        let mut chain = TaskChain::new("err");
        chain.add(|| async { Err::<(), _>("scale failed") });

        let outcome = chain.start().wait().await.into_value().unwrap();
        assert_eq!(
            outcome,
            ChainOutcome::FailedAt {
                step: 1,
                total: 1,
                reason: "scale failed".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_panicking_step_counts_as_failure() {
        let ran_after = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran_after);

        let mut chain = TaskChain::new("panics");
        chain
            .add(|| async {
                if true {
                    panic!("step exploded");
                }
                true
            })
            .add(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            });

        let outcome = chain.start().wait().await.into_value().unwrap();
        assert!(matches!(outcome, ChainOutcome::FailedAt { step: 1, total: 2, .. }));
        assert_eq!(ran_after.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_on_finished_sees_outcome() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let mut chain = TaskChain::new("hooked");
        chain.add(|| async { false }).on_finished(move |outcome| async move {
            let _ = tx.send(outcome);
        });

        let published = chain.start().wait().await.into_value().unwrap();
        let hooked = rx.await.unwrap();
        assert_eq!(published, hooked);
        assert!(!hooked.is_success());
    }

    #[tokio::test]
    async fn test_empty_chain_succeeds() {
        let chain = TaskChain::new("empty");
        assert!(chain.is_empty());
        let outcome = chain.start().wait().await.into_value().unwrap();
        assert_eq!(outcome, ChainOutcome::Succeeded { steps: 0 });
    }
}
