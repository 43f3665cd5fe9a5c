//! Reconnection after connectivity loss
//!
//! On every `Lost` edge the supervisor retries its [`Reconnect`] target with
//! exponential backoff until an attempt succeeds, connectivity comes back on
//! its own, or the configured attempt budget runs out.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backoff::ReconnectBackoff;
use super::connectivity::{ConnectivityEvent, ConnectivityStatus};
use crate::config::ReconnectConfig;

/// Something that can try to re-establish a lost connection
#[async_trait]
pub trait Reconnect: Send + Sync {
    /// One attempt; true when the connection is back
    async fn reconnect(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    Reconnected { attempts: u32 },
    /// Connectivity returned without a successful attempt
    AlreadyConnected { attempts: u32 },
    GaveUp { attempts: u32 },
}

pub struct ReconnectionSupervisor {
    target: Arc<dyn Reconnect>,
    connectivity: Arc<dyn ConnectivityStatus>,
    backoff: ReconnectBackoff,
    max_attempts: u32,
}

impl ReconnectionSupervisor {
    pub fn new(
        target: Arc<dyn Reconnect>,
        connectivity: Arc<dyn ConnectivityStatus>,
        config: &ReconnectConfig,
    ) -> Self {
        Self {
            target,
            connectivity,
            backoff: ReconnectBackoff::from_config(config),
            max_attempts: config.max_attempts,
        }
    }

    /// Retry until reconnected; the backoff restarts from the base delay on
    /// every call
    pub async fn reconnect_until_connected(&mut self) -> ReconnectOutcome {
        self.backoff.reset();
        let mut attempts = 0;

        loop {
            if self.connectivity.is_connected() {
                self.backoff.reset();
                return ReconnectOutcome::AlreadyConnected { attempts };
            }
            if self.max_attempts > 0 && attempts >= self.max_attempts {
                warn!(attempts = attempts, "🔌 RECONNECT: Giving up");
                return ReconnectOutcome::GaveUp { attempts };
            }

            let delay = self.backoff.next_delay();
            attempts += 1;
            info!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "🔌 RECONNECT: Waiting before attempt"
            );
            tokio::time::sleep(delay).await;

            if self.target.reconnect().await {
                info!(attempts = attempts, "🔌 RECONNECT: Reconnected");
                self.backoff.reset();
                return ReconnectOutcome::Reconnected { attempts };
            }
        }
    }

    /// Drive reconnection from connectivity events until the channel closes
    pub fn spawn(mut self, mut events: broadcast::Receiver<ConnectivityEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ConnectivityEvent::Lost) => {
                        let outcome = self.reconnect_until_connected().await;
                        info!(outcome = ?outcome, "🔌 RECONNECT: Outage handled");
                    }
                    Ok(ConnectivityEvent::Restored) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "🔌 RECONNECT: Missed connectivity events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::connectivity::ConnectivityState;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct FlakyTarget {
        succeed_on: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Reconnect for FlakyTarget {
        async fn reconnect(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.succeed_on
        }
    }

    struct Offline(AtomicBool);

    impl ConnectivityStatus for Offline {
        fn connectivity(&self) -> ConnectivityState {
            if self.0.load(Ordering::SeqCst) {
                ConnectivityState::Connected
            } else {
                ConnectivityState::Disconnected
            }
        }
    }

    fn config(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            max_attempts,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_target_succeeds() {
        let target = Arc::new(FlakyTarget {
            succeed_on: 3,
            calls: AtomicU32::new(0),
        });
        let mut supervisor = ReconnectionSupervisor::new(
            target.clone(),
            Arc::new(Offline(AtomicBool::new(false))),
            &config(0),
        );

        let started = tokio::time::Instant::now();
        let outcome = supervisor.reconnect_until_connected().await;
        assert_eq!(outcome, ReconnectOutcome::Reconnected { attempts: 3 });
        // 1s + 2s + 4s of backoff
        assert!(started.elapsed() >= std::time::Duration::from_secs(7));
        assert_eq!(target.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let target = Arc::new(FlakyTarget {
            succeed_on: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let mut supervisor = ReconnectionSupervisor::new(
            target,
            Arc::new(Offline(AtomicBool::new(false))),
            &config(2),
        );
        assert_eq!(
            supervisor.reconnect_until_connected().await,
            ReconnectOutcome::GaveUp { attempts: 2 }
        );
    }

    #[tokio::test]
    async fn test_stops_when_already_connected() {
        let target = Arc::new(FlakyTarget {
            succeed_on: 1,
            calls: AtomicU32::new(0),
        });
        let mut supervisor = ReconnectionSupervisor::new(
            target.clone(),
            Arc::new(Offline(AtomicBool::new(true))),
            &config(0),
        );
        assert_eq!(
            supervisor.reconnect_until_connected().await,
            ReconnectOutcome::AlreadyConnected { attempts: 0 }
        );
        assert_eq!(target.calls.load(Ordering::SeqCst), 0);
    }
}
