//! # Orchestrator
//!
//! The process-wide service that serializes mutating cluster operations.
//!
//! Callers hold a cheap, cloneable [`Orchestrator`] handle. Job creation is
//! marshalled over an `mpsc` mailbox to a single owner task, which acquires
//! the [`OperationGate`], spawns the job body and replies with its
//! [`TaskHandle`]. When a body finishes (or panics) its finalizer routes the
//! gate release back through the owner and waits for the acknowledgement
//! before the result is published to the caller.
//!
//! Read-only probes bypass the owner and the gate entirely.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::operations::{restart_chain, run_job, OperationContext};
use super::types::{DeploymentInfo, InstallationRequest, JobErrorKind, JobRequest, JobResult, RemovalRequest};
use crate::config::AppstoreConfig;
use crate::error::{AppstoreError, Result};
use crate::events::{EventPublisher, Notification, Notifier, OrchestratorEvent};
use crate::execution::{
    probes, AsyncTask, ChainOutcome, ClusterCli, ProcessQueueExecutor, ShellRunner, TaskChain,
    TaskHandle, TaskOutcome,
};
use crate::logging::log_job_operation;
use crate::state_machine::{GateTicket, OperationGate, OperationState, StateMachineError};

enum OwnerCommand {
    Submit {
        request: JobRequest,
        reply: oneshot::Sender<TaskHandle<JobResult>>,
    },
    StartRestartChain {
        deployment: String,
        reply: oneshot::Sender<TaskHandle<ChainOutcome>>,
    },
    Release {
        ticket: GateTicket,
        ack: oneshot::Sender<()>,
    },
}

/// State visible to every handle and every running job
struct Shared {
    gate: Arc<OperationGate>,
    events: EventPublisher<OrchestratorEvent>,
    notifier: Arc<dyn Notifier>,
    config: Arc<AppstoreConfig>,
    cli: ClusterCli,
}

impl Shared {
    fn announce_start(&self, state: OperationState, label: &str) {
        self.events.publish(OrchestratorEvent::StateChanged { state });
        self.events.publish(OrchestratorEvent::BusyChanged { busy: true });
        self.events.publish(OrchestratorEvent::CurrentOperationChanged {
            operation: label.to_string(),
        });
        self.events.publish(OrchestratorEvent::JobStarted {
            operation: label.to_string(),
        });
        self.notifier.notify(Notification::info(format!("Started: {label}")));
        log_job_operation(label, None, &state.to_string(), "started", None);
    }

    fn announce_idle(&self) {
        self.events.publish(OrchestratorEvent::StateChanged {
            state: OperationState::Idle,
        });
        self.events.publish(OrchestratorEvent::BusyChanged { busy: false });
        self.events.publish(OrchestratorEvent::CurrentOperationChanged {
            operation: String::new(),
        });
    }

    fn reject(&self, running: &str, requested: &str) {
        let reason = format!("Orchestrator busy with: {running} (requested: {requested})");
        warn!(running = %running, requested = %requested, "🚫 ORCHESTRATOR: Request rejected");
        self.events.publish(OrchestratorEvent::RequestRejected {
            reason: reason.clone(),
            running: running.to_string(),
            requested: requested.to_string(),
        });
        self.notifier.notify(Notification::warning(reason));
    }

    fn finish(&self, label: &str, success: bool, message: &str) {
        self.events.publish(OrchestratorEvent::JobFinished {
            operation: label.to_string(),
            success,
            message: message.to_string(),
        });
        if success {
            info!(operation = %label, "✅ ORCHESTRATOR: Job finished");
            self.notifier.notify(Notification::success(format!("{label}: {message}")));
        } else {
            warn!(operation = %label, error = %message, "❌ ORCHESTRATOR: Job failed");
            self.notifier.notify(Notification::error(format!("{label}: {message}")));
        }
        log_job_operation(
            label,
            None,
            &OperationState::Idle.to_string(),
            if success { "succeeded" } else { "failed" },
            Some(message),
        );
    }
}

/// Returns the gate through the owner task, or directly when it is gone
struct Releaser {
    mailbox: Option<mpsc::Sender<OwnerCommand>>,
    shared: Arc<Shared>,
}

impl Releaser {
    async fn release(self, ticket: GateTicket) {
        let Releaser { mailbox, shared } = self;
        let label = ticket.label().to_string();
        let Some(mailbox) = mailbox else {
            Self::release_directly(&shared, ticket);
            return;
        };

        let (ack, acked) = oneshot::channel();
        match mailbox.send(OwnerCommand::Release { ticket, ack }).await {
            Ok(()) => {
                if acked.await.is_err() {
                    error!(operation = %label, "Owner task stopped before acknowledging release");
                }
            }
            Err(mpsc::error::SendError(command)) => {
                if let OwnerCommand::Release { ticket, .. } = command {
                    Self::release_directly(&shared, ticket);
                }
            }
        }
    }

    fn release_directly(shared: &Shared, ticket: GateTicket) {
        debug!(operation = %ticket.label(), "Owner task gone, releasing gate directly");
        if shared.gate.release(ticket) {
            shared.announce_idle();
        }
    }
}

struct OwnerLoop {
    receiver: mpsc::Receiver<OwnerCommand>,
    mailbox: mpsc::WeakSender<OwnerCommand>,
    shared: Arc<Shared>,
    executor: ProcessQueueExecutor,
}

impl OwnerLoop {
    async fn run(mut self) {
        info!("🚀 ORCHESTRATOR: Owner task started");
        while let Some(command) = self.receiver.recv().await {
            match command {
                OwnerCommand::Submit { request, reply } => {
                    let handle = self.submit(request);
                    if reply.send(handle).is_err() {
                        debug!("Caller dropped before receiving its task handle");
                    }
                }
                OwnerCommand::StartRestartChain { deployment, reply } => {
                    let handle = self.start_restart_chain(&deployment);
                    if reply.send(handle).is_err() {
                        debug!("Caller dropped before receiving its chain handle");
                    }
                }
                OwnerCommand::Release { ticket, ack } => {
                    if self.shared.gate.release(ticket) {
                        self.shared.announce_idle();
                    }
                    let _ = ack.send(());
                }
            }
        }
        info!("🛑 ORCHESTRATOR: Owner task stopped");
    }

    fn releaser(&self) -> Releaser {
        Releaser {
            mailbox: self.mailbox.upgrade(),
            shared: Arc::clone(&self.shared),
        }
    }

    fn context(&self, generation: u64) -> OperationContext {
        OperationContext {
            executor: self.executor.clone(),
            cli: self.shared.cli.clone(),
            config: Arc::clone(&self.shared.config),
            gate: Arc::clone(&self.shared.gate),
            events: self.shared.events.clone(),
            generation,
        }
    }

    fn acquire(&self, state: OperationState, label: &str) -> std::result::Result<GateTicket, String> {
        match self.shared.gate.try_acquire(state, label) {
            Ok(ticket) => {
                self.shared.announce_start(state, label);
                Ok(ticket)
            }
            Err(StateMachineError::Busy { running, requested }) => {
                self.shared.reject(&running, &requested);
                Err(running)
            }
            Err(e) => {
                error!(operation = %label, error = %e, "Gate refused operation");
                Err(e.to_string())
            }
        }
    }

    fn submit(&self, request: JobRequest) -> TaskHandle<JobResult> {
        let label = request.label();
        let state = request.state();

        let ticket = match self.acquire(state, &label) {
            Ok(ticket) => ticket,
            Err(running) => return AsyncTask::resolved(JobResult::busy(&running, &label)),
        };

        let ctx = self.context(ticket.generation());
        self.run_gated(label, ticket, run_job(ctx, request))
    }

    /// Run `body` while `ticket` holds the gate; the gate is returned before
    /// the result is published, also when `body` panics
    fn run_gated<F>(&self, label: String, ticket: GateTicket, body: F) -> TaskHandle<JobResult>
    where
        F: Future<Output = JobResult> + Send + 'static,
    {
        let releaser = self.releaser();
        let shared = Arc::clone(&self.shared);

        AsyncTask::submit_with_finalizer(body, move |outcome| async move {
            let result = match outcome {
                TaskOutcome::Completed(result) => result,
                TaskOutcome::Failed(reason) => {
                    error!(operation = %label, error = %reason, "💥 ORCHESTRATOR: Job body panicked");
                    JobResult::failure(
                        JobErrorKind::InternalFault,
                        format!("Internal error: {reason}"),
                        String::new(),
                    )
                }
            };

            releaser.release(ticket).await;

            let message = if result.success && result.error_message.is_empty() {
                "Completed".to_string()
            } else {
                result.error_message.clone()
            };
            shared.finish(&label, result.success, &message);
            TaskOutcome::Completed(result)
        })
    }

    fn start_restart_chain(&self, deployment: &str) -> TaskHandle<ChainOutcome> {
        let label = format!("Auto Restart {deployment}");

        let ticket = match self.acquire(OperationState::Restarting, &label) {
            Ok(ticket) => ticket,
            Err(_) => {
                let mut chain = TaskChain::new(label);
                chain.add(|| async { false });
                return chain.start();
            }
        };

        let ctx = self.context(ticket.generation());
        let releaser = self.releaser();
        let shared = Arc::clone(&self.shared);

        let mut chain = restart_chain(ctx, deployment, &label);
        chain.on_finished(move |outcome| async move {
            releaser.release(ticket).await;
            let success = outcome.is_success();
            let message = if success {
                "Auto-restart completed"
            } else {
                "Auto-restart failed"
            };
            shared.finish(&label, success, message);
        });
        chain.start()
    }
}

/// Cloneable handle to the orchestrator service
#[derive(Clone)]
pub struct Orchestrator {
    mailbox: mpsc::Sender<OwnerCommand>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state())
            .field("current_operation", &self.current_operation())
            .finish()
    }
}

impl Orchestrator {
    /// Create the service and spawn its owner task
    ///
    /// Must be called from within a Tokio runtime. The owner task ends once
    /// every handle and every in-flight job is gone.
    pub fn start(config: Arc<AppstoreConfig>, notifier: Arc<dyn Notifier>) -> (Self, JoinHandle<()>) {
        let (orchestrator, owner) = Self::new_with_owner(config, notifier);
        let join = tokio::spawn(owner.run());
        (orchestrator, join)
    }

    fn new_with_owner(config: Arc<AppstoreConfig>, notifier: Arc<dyn Notifier>) -> (Self, OwnerLoop) {
        let cli = ClusterCli::from_config(&config);
        let executor = ProcessQueueExecutor::with_capacity(
            ShellRunner::from_config(&config.cluster),
            config.events.channel_capacity,
        );

        let shared = Arc::new(Shared {
            gate: Arc::new(OperationGate::new()),
            events: EventPublisher::new(config.events.channel_capacity),
            notifier,
            config: Arc::clone(&config),
            cli,
        });

        let (mailbox, receiver) = mpsc::channel(config.orchestration.mailbox_capacity);
        let owner = OwnerLoop {
            receiver,
            mailbox: mailbox.downgrade(),
            shared: Arc::clone(&shared),
            executor,
        };

        info!(
            kubectl = %config.cluster.kubectl,
            namespace = %config.cluster.namespace,
            "🚀 ORCHESTRATOR: Starting"
        );

        (Self { mailbox, shared }, owner)
    }

    #[instrument(skip(self, info), fields(deployment = %info.id, subscribe = info.subscribe))]
    pub async fn deploy_service(&self, info: DeploymentInfo) -> TaskHandle<JobResult> {
        self.submit(JobRequest::Deploy(info)).await
    }

    #[instrument(skip(self, manifest_path))]
    pub async fn remove_service(
        &self,
        id: &str,
        manifest_path: Option<PathBuf>,
    ) -> TaskHandle<JobResult> {
        self.submit(JobRequest::Remove(RemovalRequest {
            id: id.to_string(),
            manifest_path,
        }))
        .await
    }

    #[instrument(skip(self, request), fields(app_id = %request.app_id, commands = request.commands.len()))]
    pub async fn install_application(&self, request: InstallationRequest) -> TaskHandle<JobResult> {
        self.submit(JobRequest::Install(request)).await
    }

    pub async fn restart_deployment(&self, name: &str) -> TaskHandle<JobResult> {
        self.submit(JobRequest::Restart {
            name: name.to_string(),
        })
        .await
    }

    pub async fn scale_deployment(&self, name: &str, replicas: u32) -> TaskHandle<JobResult> {
        self.submit(JobRequest::Scale {
            name: name.to_string(),
            replicas,
        })
        .await
    }

    /// Run a labelled batch of commands under the `Installing` state
    pub async fn run_commands(&self, label: &str, commands: Vec<String>) -> TaskHandle<JobResult> {
        self.submit(JobRequest::Commands {
            label: label.to_string(),
            commands,
        })
        .await
    }

    /// Submit any gated job
    pub async fn submit(&self, request: JobRequest) -> TaskHandle<JobResult> {
        let (reply, replied) = oneshot::channel();
        if self
            .mailbox
            .send(OwnerCommand::Submit { request, reply })
            .await
            .is_err()
        {
            return Self::not_running();
        }
        replied.await.unwrap_or_else(|_| Self::not_running())
    }

    /// Submit from a thread outside the runtime, blocking until the owner
    /// task has created the job
    ///
    /// Panics if called from within an async context, like
    /// `mpsc::Sender::blocking_send`.
    pub fn submit_blocking(&self, request: JobRequest) -> Result<TaskHandle<JobResult>> {
        let (reply, replied) = oneshot::channel();
        self.mailbox
            .blocking_send(OwnerCommand::Submit { request, reply })
            .map_err(|_| {
                AppstoreError::OrchestrationError("Orchestrator owner task is not running".to_string())
            })?;
        replied.blocking_recv().map_err(|_| {
            AppstoreError::OrchestrationError("Orchestrator dropped the request".to_string())
        })
    }

    /// Build and start the five-step restart chain for `deployment`
    ///
    /// On a busy orchestrator the returned chain has a single failing step.
    pub async fn create_auto_restart_chain(&self, deployment: &str) -> TaskHandle<ChainOutcome> {
        let (reply, replied) = oneshot::channel();
        let sent = self
            .mailbox
            .send(OwnerCommand::StartRestartChain {
                deployment: deployment.to_string(),
                reply,
            })
            .await;
        if sent.is_err() {
            return AsyncTask::failed("Orchestrator owner task is not running");
        }
        replied
            .await
            .unwrap_or_else(|_| AsyncTask::failed("Orchestrator dropped the request"))
    }

    /// Ungated node readiness probe
    pub fn check_node_ready(&self, name: &str, timeout: Duration) -> TaskHandle<bool> {
        let cli = self.shared.cli.clone();
        let name = name.to_string();
        AsyncTask::submit(async move { probes::node_ready(&cli, &name, timeout).await })
    }

    /// Ungated deployment availability probe
    pub fn check_deployment_available(&self, id: &str, timeout: Duration) -> TaskHandle<bool> {
        let cli = self.shared.cli.clone();
        let id = id.to_string();
        AsyncTask::submit(async move { probes::deployment_available(&cli, &id, timeout).await })
    }

    pub fn state(&self) -> OperationState {
        self.shared.gate.state()
    }

    pub fn is_busy(&self) -> bool {
        self.shared.gate.is_busy()
    }

    pub fn current_operation(&self) -> String {
        self.shared.gate.current_operation()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &AppstoreConfig {
        &self.shared.config
    }

    fn not_running() -> TaskHandle<JobResult> {
        AsyncTask::resolved(JobResult::failure(
            JobErrorKind::InternalFault,
            "Orchestrator owner task is not running",
            String::new(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LogNotifier;

    fn owner() -> (Orchestrator, OwnerLoop) {
        let mut config = AppstoreConfig::default();
        config.cluster.kubectl = "false".to_string();
        Orchestrator::new_with_owner(Arc::new(config), Arc::new(LogNotifier))
    }

    async fn exploding_body() -> JobResult {
        if OperationState::Installing.is_mutating() {
            panic!("manifest parser exploded");
        }
        JobResult::ok("")
    }

    #[tokio::test]
    async fn test_panicking_body_releases_gate() {
        let (orchestrator, owner) = owner();
        let mut events = orchestrator.subscribe();

        let ticket = owner.acquire(OperationState::Installing, "Install nav").unwrap();
        let handle = owner.run_gated("Install nav".to_string(), ticket, exploding_body());
        let _owner_task = tokio::spawn(owner.run());

        let result = handle.wait().await.into_value().unwrap();
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(JobErrorKind::InternalFault));
        assert!(result.error_message.contains("manifest parser exploded"));
        assert!(!orchestrator.is_busy());
        assert_eq!(orchestrator.state(), OperationState::Idle);

        let mut finished = None;
        while let Ok(event) = events.try_recv() {
            if let OrchestratorEvent::JobFinished { success, .. } = event {
                finished = Some(success);
            }
        }
        assert_eq!(finished, Some(false));
    }

    #[tokio::test]
    async fn test_gate_released_directly_without_owner() {
        let (orchestrator, owner) = owner();

        let ticket = owner.acquire(OperationState::Checking, "Check nav").unwrap();
        let handle = owner.run_gated("Check nav".to_string(), ticket, async { JobResult::ok("fine") });
        drop(owner);

        let result = handle.wait().await.into_value().unwrap();
        assert!(result.success);
        assert!(!orchestrator.is_busy());
    }

    #[tokio::test]
    async fn test_busy_gate_rejects_through_owner() {
        let (orchestrator, owner) = owner();

        let _ticket = owner.acquire(OperationState::Deploying, "Deploy nav").unwrap();
        let rejected = owner.submit(JobRequest::Restart {
            name: "media".to_string(),
        });

        let result = rejected.wait().await.into_value().unwrap();
        assert!(result.is_busy_rejection());
        assert!(result.error_message.contains("Deploy nav"));
        assert_eq!(orchestrator.current_operation(), "Deploy nav");
    }

    #[tokio::test]
    async fn test_busy_restart_chain_fails_first_step() {
        let (_orchestrator, owner) = owner();

        let _ticket = owner.acquire(OperationState::Installing, "Install nav").unwrap();
        let outcome = owner.start_restart_chain("sdv-runtime").wait().await.into_value().unwrap();
        assert!(matches!(outcome, ChainOutcome::FailedAt { step: 1, total: 1, .. }));
    }
}
