//! Operation bodies
//!
//! Each body runs inside an [`AsyncTask`](crate::execution::AsyncTask) after
//! the gate was acquired; the orchestrator releases the gate once the body
//! returns or panics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::commands::CommandBuilder;
use super::types::{
    DeploymentInfo, InstallationRequest, JobErrorKind, JobRequest, JobResult, RemovalRequest,
};
use crate::config::AppstoreConfig;
use crate::events::{EventPublisher, OrchestratorEvent};
use crate::execution::{
    probes, ClusterCli, CommandSpec, ProcessErrorKind, ProcessQueueExecutor, QueueOutcome,
    TaskChain,
};
use crate::state_machine::{OperationGate, OperationState};

/// Everything an operation body needs, cloned into each job
#[derive(Clone)]
pub struct OperationContext {
    pub executor: ProcessQueueExecutor,
    pub cli: ClusterCli,
    pub config: Arc<AppstoreConfig>,
    pub gate: Arc<OperationGate>,
    pub events: EventPublisher<OrchestratorEvent>,
    /// Gate generation of the job this context belongs to
    pub generation: u64,
}

impl OperationContext {
    fn commands(&self) -> CommandBuilder<'_> {
        CommandBuilder::new(&self.cli)
    }

    /// Relabel the running operation and announce it
    fn phase(&self, state: OperationState, label: String) {
        if let Err(e) = self.gate.set_phase(self.generation, state, label.clone()) {
            debug!(error = %e, "Phase change ignored");
            return;
        }
        self.events.publish(OrchestratorEvent::StateChanged { state });
        self.events
            .publish(OrchestratorEvent::CurrentOperationChanged { operation: label });
    }

    async fn run(&self, commands: Vec<CommandSpec>) -> QueueOutcome {
        self.executor.run_commands_sync(commands).await
    }
}

pub async fn run_job(ctx: OperationContext, request: JobRequest) -> JobResult {
    match request {
        JobRequest::Deploy(info) => deploy(&ctx, info).await,
        JobRequest::Remove(request) => remove(&ctx, request).await,
        JobRequest::Install(request) => install(&ctx, request).await,
        JobRequest::Restart { name } => restart(&ctx, &name).await,
        JobRequest::Scale { name, replicas } => scale(&ctx, &name, replicas).await,
        JobRequest::Commands { label, commands } => run_batch(&ctx, &label, commands).await,
    }
}

fn failure_from(outcome: &QueueOutcome, context: &str) -> JobResult {
    let detail = outcome
        .error
        .clone()
        .unwrap_or_else(|| "unknown error".to_string());
    let kind = match outcome.error_kind {
        Some(ProcessErrorKind::Launch) => JobErrorKind::ProcessLaunchFailure,
        _ => JobErrorKind::CommandFailure,
    };
    JobResult::failure(kind, format!("{context}: {detail}"), outcome.output.clone())
}

async fn deploy(ctx: &OperationContext, info: DeploymentInfo) -> JobResult {
    let commands = ctx.commands();

    if !info.subscribe {
        ctx.phase(OperationState::Removing, format!("Undeploying {}", info.name));
        let outcome = ctx.run(vec![commands.delete_manifest(&info.manifest_path)]).await;
        return if outcome.success {
            info!(deployment = %info.id, "🗑️ DEPLOY: Manifest deleted");
            JobResult::ok(outcome.output)
        } else {
            failure_from(&outcome, &format!("Failed to undeploy {}", info.name))
        };
    }

    let node = &ctx.config.cluster.node_name;
    if !probes::node_ready(&ctx.cli, node, ctx.config.orchestration.node_probe_timeout()).await {
        warn!(
            node = %node,
            deployment = %info.id,
            "⚠️ DEPLOY: Node not ready, continuing anyway"
        );
    }

    ctx.phase(OperationState::Deploying, format!("Deploying {}", info.name));

    let cleanup = ctx.run(vec![commands.force_delete_deployment(&info.id)]).await;
    debug!(deployment = %info.id, success = cleanup.success, "Pre-deploy cleanup finished");
    sleep(ctx.config.orchestration.settle_delay()).await;

    let applied = ctx.run(vec![commands.apply_manifest(&info.manifest_path)]).await;
    if !applied.success {
        return failure_from(&applied, &format!("Failed to deploy {}", info.name));
    }

    let rollout = ctx.run(vec![commands.rollout_status(&info.id)]).await;
    let output = format!("{}{}", applied.output, rollout.output);
    if rollout.success {
        info!(deployment = %info.id, "🚀 DEPLOY: Rollout complete");
        JobResult::ok(output)
    } else {
        let detail = rollout.error.unwrap_or_default();
        warn!(
            deployment = %info.id,
            error = %detail,
            "⚠️ DEPLOY: Applied but rollout not ready"
        );
        JobResult::partial(format!("Deployment applied but not ready: {detail}"), output)
    }
}

async fn remove(ctx: &OperationContext, request: RemovalRequest) -> JobResult {
    let commands = ctx
        .commands()
        .removal(&request.id, request.manifest_path.as_deref());
    let outcome = ctx.run(commands).await;
    if outcome.success {
        info!(app_id = %request.id, "🗑️ REMOVE: Cleanup complete");
        JobResult::ok(outcome.output)
    } else {
        failure_from(&outcome, &format!("Failed to remove {}", request.id))
    }
}

/// Commands run one at a time with a pause in between; the first failure
/// aborts and is reported by its 1-based position
async fn install(ctx: &OperationContext, request: InstallationRequest) -> JobResult {
    let commands = ctx.commands().installation(&request.commands);
    let total = commands.len();
    let pause = ctx.config.orchestration.install_command_pause();
    let mut output = String::new();

    for (index, command) in commands.into_iter().enumerate() {
        let number = index + 1;
        if index > 0 {
            sleep(pause).await;
        }
        info!(
            app_id = %request.app_id,
            command_index = number,
            total = total,
            "📦 INSTALL: Running command"
        );

        let outcome = ctx.run(vec![command]).await;
        output.push_str(&outcome.output);
        if !outcome.success {
            let mut failed = failure_from(&outcome, &format!("Command {number} failed"));
            failed.output = output;
            return failed;
        }
    }

    info!(app_id = %request.app_id, category = %request.category, "📦 INSTALL: Completed");
    JobResult::ok(output)
}

async fn restart(ctx: &OperationContext, name: &str) -> JobResult {
    let outcome = ctx.run(vec![ctx.commands().rollout_restart(name)]).await;
    if outcome.success {
        JobResult::ok(outcome.output)
    } else {
        failure_from(&outcome, &format!("Failed to restart {name}"))
    }
}

async fn scale(ctx: &OperationContext, name: &str, replicas: u32) -> JobResult {
    let outcome = ctx.run(vec![ctx.commands().scale(name, replicas)]).await;
    if outcome.success {
        JobResult::ok(outcome.output)
    } else {
        failure_from(&outcome, &format!("Failed to scale {name}"))
    }
}

async fn run_batch(ctx: &OperationContext, label: &str, commands: Vec<String>) -> JobResult {
    let outcome = ctx.run(ctx.commands().installation(&commands)).await;
    if outcome.success {
        JobResult::ok(outcome.output)
    } else {
        let index = outcome.failed_index.unwrap_or_default();
        failure_from(&outcome, &format!("{label}: command {index} failed"))
    }
}

/// Five-step scale-down/scale-up cycle for `deployment`
///
/// When the first step finds no deployment, every later step succeeds
/// without touching the cluster.
pub fn restart_chain(ctx: OperationContext, deployment: &str, label: &str) -> TaskChain {
    let mut chain = TaskChain::new(label);
    let exists = Arc::new(AtomicBool::new(false));
    let restart = &ctx.config.restart;
    let (termination_timeout, termination_poll) =
        (restart.pod_termination_timeout(), restart.termination_poll_interval());
    let (ready_timeout, ready_poll) = (restart.pods_ready_timeout(), restart.ready_poll_interval());
    let scale_up_pause = restart.scale_up_pause();

    {
        let (ctx, exists, name) = (ctx.clone(), Arc::clone(&exists), deployment.to_string());
        chain.add(move || async move {
            let found = probes::deployment_exists(&ctx.cli, &name).await;
            if !found {
                info!(deployment = %name, "🔄 RESTART: Deployment not found, nothing to recycle");
            }
            exists.store(found, Ordering::SeqCst);
            true
        });
    }

    {
        let (ctx, exists, name) = (ctx.clone(), Arc::clone(&exists), deployment.to_string());
        chain.add(move || async move {
            if !exists.load(Ordering::SeqCst) {
                return true;
            }
            ctx.run(vec![ctx.commands().scale(&name, 0)]).await.success
        });
    }

    {
        let (ctx, exists, name) = (ctx.clone(), Arc::clone(&exists), deployment.to_string());
        chain.add(move || async move {
            if !exists.load(Ordering::SeqCst) {
                return true;
            }
            wait_for_termination(&ctx.cli, &name, termination_timeout, termination_poll).await
        });
    }

    {
        let (ctx, exists, name) = (ctx.clone(), Arc::clone(&exists), deployment.to_string());
        chain.add(move || async move {
            if !exists.load(Ordering::SeqCst) {
                return true;
            }
            sleep(scale_up_pause).await;
            ctx.run(vec![ctx.commands().scale(&name, 1)]).await.success
        });
    }

    {
        let (ctx, name) = (ctx, deployment.to_string());
        chain.add(move || async move {
            if !exists.load(Ordering::SeqCst) {
                return true;
            }
            wait_for_ready(&ctx.cli, &name, ready_timeout, ready_poll).await
        });
    }

    chain
}

/// Poll until the deployment reports zero replicas
pub async fn wait_for_termination(
    cli: &ClusterCli,
    name: &str,
    timeout: Duration,
    poll: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if probes::replica_count(cli, name).await == Some(0) {
            debug!(deployment = %name, "Pods terminated");
            return true;
        }
        if Instant::now() + poll > deadline {
            warn!(
                deployment = %name,
                timeout_secs = timeout.as_secs(),
                "⏱️ RESTART: Pods still running"
            );
            return false;
        }
        sleep(poll).await;
    }
}

/// Poll until ready replicas are nonzero and equal to the total
pub async fn wait_for_ready(
    cli: &ClusterCli,
    name: &str,
    timeout: Duration,
    poll: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some((ready, total)) = probes::ready_replicas(cli, name).await {
            if ready > 0 && ready == total {
                debug!(deployment = %name, ready = ready, "Pods ready");
                return true;
            }
        }
        if Instant::now() + poll > deadline {
            warn!(
                deployment = %name,
                timeout_secs = timeout.as_secs(),
                "⏱️ RESTART: Pods not ready in time"
            );
            return false;
        }
        sleep(poll).await;
    }
}
