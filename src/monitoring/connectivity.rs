//! Connectivity edge detection
//!
//! Raw reachability observations are folded into a three-state status.
//! `Restored` fires only on a Disconnected → Connected edge and `Lost` only on
//! Connected → Disconnected, so the first observation after startup emits
//! nothing.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::constants::events;
use crate::events::EventPublisher;

/// Read access to the current connectivity status
pub trait ConnectivityStatus: Send + Sync {
    fn connectivity(&self) -> ConnectivityState;

    fn is_connected(&self) -> bool {
        self.connectivity() == ConnectivityState::Connected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    #[default]
    Unknown,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityEvent {
    Restored,
    Lost,
}

impl ConnectivityEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Restored => events::CONNECTION_RESTORED,
            Self::Lost => events::CONNECTION_LOST,
        }
    }
}

#[derive(Debug)]
pub struct ConnectivityTracker {
    state: Mutex<ConnectivityState>,
    events: EventPublisher<ConnectivityEvent>,
}

impl ConnectivityTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(ConnectivityState::Unknown),
            events: EventPublisher::new(capacity),
        }
    }

    /// Record one observation; returns the event it produced, if any
    pub fn observe(&self, connected: bool) -> Option<ConnectivityEvent> {
        let event = {
            let mut state = self.state.lock();
            let previous = *state;
            *state = if connected {
                ConnectivityState::Connected
            } else {
                ConnectivityState::Disconnected
            };

            match (previous, *state) {
                (ConnectivityState::Disconnected, ConnectivityState::Connected) => {
                    Some(ConnectivityEvent::Restored)
                }
                (ConnectivityState::Connected, ConnectivityState::Disconnected) => {
                    Some(ConnectivityEvent::Lost)
                }
                (from, to) => {
                    if from != to {
                        debug!(from = ?from, to = ?to, "📶 CONNECTIVITY: Initial status");
                    }
                    None
                }
            }
        };

        match event {
            Some(ConnectivityEvent::Restored) => info!("📶 CONNECTIVITY: Connection restored"),
            Some(ConnectivityEvent::Lost) => warn!("📶 CONNECTIVITY: Connection lost"),
            None => {}
        }
        if let Some(event) = event {
            self.events.publish(event);
        }
        event
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.lock()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }
}

impl Default for ConnectivityTracker {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ConnectivityStatus for ConnectivityTracker {
    fn connectivity(&self) -> ConnectivityState {
        self.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_is_silent() {
        let tracker = ConnectivityTracker::default();
        assert_eq!(tracker.observe(true), None);
        assert!(tracker.is_connected());

        let tracker = ConnectivityTracker::default();
        assert_eq!(tracker.observe(false), None);
        assert_eq!(tracker.state(), ConnectivityState::Disconnected);
    }

    #[test]
    fn test_edges_only() {
        let tracker = ConnectivityTracker::default();
        tracker.observe(true);
        assert_eq!(tracker.observe(true), None);
        assert_eq!(tracker.observe(false), Some(ConnectivityEvent::Lost));
        assert_eq!(tracker.observe(false), None);
        assert_eq!(tracker.observe(true), Some(ConnectivityEvent::Restored));
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let tracker = ConnectivityTracker::default();
        let mut rx = tracker.subscribe();
        tracker.observe(false);
        tracker.observe(true);
        assert_eq!(rx.recv().await.unwrap(), ConnectivityEvent::Restored);
    }
}
