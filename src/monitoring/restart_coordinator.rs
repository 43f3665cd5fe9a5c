//! # Restart Coordinator
//!
//! Turns connectivity-restored events into bounded runtime restarts.
//!
//! Each event passes three checks in order: the policy must be enabled, no
//! restart may be pending or running, and the cycle counter must be below its
//! limit (a "limit reached" event is emitted otherwise). An accepted event arms
//! a one-shot delay, after which the cycle counter is incremented and the
//! orchestrator's five-step restart chain runs. The counter only goes down
//! through [`RestartCoordinator::reset_cycle_count`] or a process restart.
//!
//! Manual entry points recycle the runtime, the host process, or both. They
//! refuse while offline.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::connectivity::{
    ConnectivityEvent, ConnectivityState, ConnectivityStatus, ConnectivityTracker,
};
use super::self_restart::{perform_self_restart, ProcessControl, SelfRestartOutcome};
use crate::config::RestartConfig;
use crate::events::{EventPublisher, Notification, Notifier, RestartEvent};
use crate::execution::{TaskHandle, TaskOutcome};
use crate::logging::{log_error, log_restart_operation};
use crate::orchestration::{JobResult, Orchestrator};
use crate::persistence::{RestartRecord, StateStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicyState {
    pub enabled: bool,
    pub in_progress: bool,
    pub cycle_count: u32,
    pub cycle_limit: u32,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    Disabled,
    InProgress,
    CycleLimitReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// A restart fires after `delay` as cycle number `cycle`
    Scheduled { cycle: u32, delay: Duration },
    Ignored(IgnoreReason),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RestartError {
    #[error("Cannot restart while offline")]
    Offline,

    #[error("Restart cycle limit must be at least 1")]
    InvalidCycleLimit,
}

struct CoordinatorInner {
    policy: Mutex<RestartPolicyState>,
    orchestrator: Orchestrator,
    events: EventPublisher<RestartEvent>,
    notifier: Arc<dyn Notifier>,
    connectivity: Mutex<Option<Arc<dyn ConnectivityStatus>>>,
    process_control: Arc<dyn ProcessControl>,
    store: Arc<dyn StateStore>,
    config: RestartConfig,
    runtime_deployment: String,
    record_key: String,
}

#[derive(Clone)]
pub struct RestartCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl std::fmt::Debug for RestartCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartCoordinator")
            .field("policy", &self.policy_state())
            .field("runtime_deployment", &self.inner.runtime_deployment)
            .finish()
    }
}

impl RestartCoordinator {
    /// Settings come from the orchestrator's configuration
    pub fn new(
        orchestrator: Orchestrator,
        process_control: Arc<dyn ProcessControl>,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let app_config = orchestrator.config();
        let config = app_config.restart.clone();
        let runtime_deployment = app_config.cluster.runtime_deployment.clone();
        let record_key = app_config.persistence.restart_record_key.clone();
        let capacity = app_config.events.channel_capacity;

        info!(
            enabled = config.enabled,
            cycle_limit = config.cycle_limit,
            delay_ms = config.delay_ms,
            runtime = %runtime_deployment,
            "🔄 RESTART: Coordinator initialized"
        );

        Self {
            inner: Arc::new(CoordinatorInner {
                policy: Mutex::new(RestartPolicyState {
                    enabled: config.enabled,
                    in_progress: false,
                    cycle_count: 0,
                    cycle_limit: config.cycle_limit.max(1),
                    delay_ms: config.delay_ms,
                }),
                orchestrator,
                events: EventPublisher::new(capacity),
                notifier,
                connectivity: Mutex::new(None),
                process_control,
                store,
                config,
                runtime_deployment,
                record_key,
            }),
        }
    }

    /// Feed connectivity edges from `tracker` and use it as the precondition
    /// for manual restarts
    pub fn attach(&self, tracker: Arc<ConnectivityTracker>) -> JoinHandle<()> {
        let mut events = tracker.subscribe();
        *self.inner.connectivity.lock() = Some(tracker);

        let coordinator = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ConnectivityEvent::Restored) => {
                        coordinator.on_connection_restored();
                    }
                    Ok(ConnectivityEvent::Lost) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "🔄 RESTART: Missed connectivity events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Apply the policy to one connectivity-restored event
    pub fn on_connection_restored(&self) -> RestartDecision {
        let decision = {
            let mut policy = self.inner.policy.lock();
            if !policy.enabled {
                RestartDecision::Ignored(IgnoreReason::Disabled)
            } else if policy.in_progress {
                RestartDecision::Ignored(IgnoreReason::InProgress)
            } else if policy.cycle_count >= policy.cycle_limit {
                RestartDecision::Ignored(IgnoreReason::CycleLimitReached)
            } else {
                policy.in_progress = true;
                RestartDecision::Scheduled {
                    cycle: policy.cycle_count + 1,
                    delay: Duration::from_millis(policy.delay_ms),
                }
            }
        };

        match decision {
            RestartDecision::Scheduled { cycle, delay } => {
                info!(
                    cycle = cycle,
                    delay_ms = delay.as_millis() as u64,
                    "🔄 RESTART: Scheduled"
                );
                let coordinator = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    coordinator.fire().await;
                });
            }
            RestartDecision::Ignored(IgnoreReason::CycleLimitReached) => {
                let state = self.policy_state();
                log_restart_operation(
                    "connection_restored",
                    state.cycle_count,
                    state.cycle_limit,
                    "limit_reached",
                    None,
                );
                self.inner.events.publish(RestartEvent::RestartCycleLimitReached {
                    cycle_count: state.cycle_count,
                    cycle_limit: state.cycle_limit,
                });
                self.inner.notifier.notify(Notification::warning(format!(
                    "Auto restart limit reached ({} of {})",
                    state.cycle_count, state.cycle_limit
                )));
            }
            RestartDecision::Ignored(reason) => {
                info!(reason = ?reason, "🔄 RESTART: Connection restored, not restarting");
            }
        }

        decision
    }

    async fn fire(&self) {
        let (cycle, cycle_limit) = {
            let mut policy = self.inner.policy.lock();
            policy.cycle_count += 1;
            (policy.cycle_count, policy.cycle_limit)
        };

        log_restart_operation("auto_restart", cycle, cycle_limit, "started", None);
        self.inner.events.publish(RestartEvent::RestartStarted { cycle });
        self.inner.notifier.notify(Notification::info(format!(
            "Restarting {} (cycle {cycle} of {cycle_limit})",
            self.inner.runtime_deployment
        )));

        let chain = self
            .inner
            .orchestrator
            .create_auto_restart_chain(&self.inner.runtime_deployment)
            .await;
        let success = match chain.wait().await {
            TaskOutcome::Completed(outcome) => outcome.is_success(),
            TaskOutcome::Failed(reason) => {
                log_error("restart_coordinator", "auto_restart", &reason, None);
                false
            }
        };

        self.inner.policy.lock().in_progress = false;

        log_restart_operation(
            "auto_restart",
            cycle,
            cycle_limit,
            if success { "completed" } else { "failed" },
            None,
        );
        self.inner
            .events
            .publish(RestartEvent::RestartCompleted { cycle, success });
    }

    /// Restart the runtime deployment
    pub async fn restart_runtime(&self) -> Result<TaskHandle<JobResult>, RestartError> {
        self.require_connectivity("restart runtime")?;
        Ok(self
            .inner
            .orchestrator
            .restart_deployment(&self.inner.runtime_deployment)
            .await)
    }

    /// Recycle the host process
    pub async fn restart_self(&self, reason: &str) -> Result<SelfRestartOutcome, RestartError> {
        self.require_connectivity("restart application")?;
        Ok(self.recycle_self(reason).await)
    }

    /// Restart the runtime, let it settle, then recycle the host process
    pub async fn force_restart_both(&self) -> Result<SelfRestartOutcome, RestartError> {
        self.require_connectivity("force restart")?;

        let runtime = self
            .inner
            .orchestrator
            .restart_deployment(&self.inner.runtime_deployment)
            .await;
        match runtime.wait().await {
            TaskOutcome::Completed(result) if result.success => {
                info!("🔄 RESTART: Runtime restarted, waiting before self restart")
            }
            TaskOutcome::Completed(result) => {
                warn!(error = %result.error_message, "Runtime restart failed, restarting anyway")
            }
            TaskOutcome::Failed(reason) => {
                warn!(error = %reason, "Runtime restart did not complete, restarting anyway")
            }
        }

        tokio::time::sleep(self.inner.config.runtime_settle()).await;
        Ok(self.recycle_self("Force restart of runtime and application").await)
    }

    async fn recycle_self(&self, reason: &str) -> SelfRestartOutcome {
        tokio::time::sleep(self.inner.config.self_restart_delay()).await;

        let record = RestartRecord::new(reason, self.policy_state().cycle_count);
        if let Err(e) = record.save(self.inner.store.as_ref(), &self.inner.record_key) {
            log_error(
                "restart_coordinator",
                "save_restart_record",
                &e.to_string(),
                Some(&self.inner.record_key),
            );
        }

        let outcome = perform_self_restart(
            self.inner.process_control.as_ref(),
            &self.inner.config.service_unit,
            self.inner.config.restart_exit_code,
        )
        .await;

        info!(outcome = ?outcome, reason = %reason, "♻️ SELF_RESTART: Requesting shutdown");
        self.inner.events.publish(RestartEvent::ShutdownRequested {
            exit_code: outcome.exit_code(),
        });
        outcome
    }

    /// Only a known outage refuses; before the first observation the link
    /// state is unknown and restarts are allowed
    fn require_connectivity(&self, action: &str) -> Result<(), RestartError> {
        let state = self
            .inner
            .connectivity
            .lock()
            .as_ref()
            .map(|status| status.connectivity());
        match state {
            Some(ConnectivityState::Disconnected) => {
                warn!(action = %action, "🔄 RESTART: Refused while offline");
                self.inner.notifier.notify(Notification::warning(format!(
                    "Cannot {action} while offline"
                )));
                Err(RestartError::Offline)
            }
            _ => Ok(()),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.policy.lock().enabled = enabled;
    }

    pub fn set_cycle_limit(&self, limit: u32) -> Result<(), RestartError> {
        if limit == 0 {
            return Err(RestartError::InvalidCycleLimit);
        }
        self.inner.policy.lock().cycle_limit = limit;
        Ok(())
    }

    pub fn set_delay(&self, delay: Duration) {
        self.inner.policy.lock().delay_ms = delay.as_millis() as u64;
    }

    pub fn reset_cycle_count(&self) {
        let mut policy = self.inner.policy.lock();
        info!(previous = policy.cycle_count, "🔄 RESTART: Cycle count reset");
        policy.cycle_count = 0;
    }

    pub fn policy_state(&self) -> RestartPolicyState {
        self.inner.policy.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RestartEvent> {
        self.inner.events.subscribe()
    }
}
