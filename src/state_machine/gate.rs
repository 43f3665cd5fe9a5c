//! # Operation Gate
//!
//! The single mutex that serializes mutating cluster operations. A successful
//! [`OperationGate::try_acquire`] hands out a [`GateTicket`]; the gate returns to
//! `Idle` only when that ticket is released. Tickets are not `Clone`, so every
//! acquire pairs with at most one release.

use super::errors::{StateMachineError, StateMachineResult};
use super::states::OperationState;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Proof of gate ownership for one operation
#[derive(Debug)]
#[must_use = "a gate ticket must be released or the orchestrator stays busy"]
pub struct GateTicket {
    generation: u64,
    state: OperationState,
    label: String,
}

impl GateTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Point-in-time view of the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSnapshot {
    pub state: OperationState,
    pub label: String,
}

impl GateSnapshot {
    pub fn is_busy(&self) -> bool {
        !self.state.is_idle()
    }
}

#[derive(Debug, Default)]
struct GateInner {
    state: OperationState,
    label: String,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct OperationGate {
    inner: Mutex<GateInner>,
}

impl OperationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move from `Idle` to `state`, recording `label` as the running operation
    pub fn try_acquire(
        &self,
        state: OperationState,
        label: impl Into<String>,
    ) -> StateMachineResult<GateTicket> {
        let label = label.into();
        if state.is_idle() {
            return Err(StateMachineError::InvalidTarget(state));
        }

        let mut inner = self.inner.lock();
        if !inner.state.is_idle() {
            warn!(
                running = %inner.label,
                requested = %label,
                "🚦 GATE: Rejecting operation while busy"
            );
            return Err(StateMachineError::Busy {
                running: inner.label.clone(),
                requested: label,
            });
        }

        inner.generation = inner.generation.wrapping_add(1);
        inner.state = state;
        inner.label = label.clone();

        info!(
            state = %state,
            operation = %label,
            generation = inner.generation,
            "🚦 GATE: Acquired"
        );

        Ok(GateTicket {
            generation: inner.generation,
            state,
            label,
        })
    }

    /// Return the gate to `Idle`
    ///
    /// A ticket from an earlier generation is ignored so it cannot clear a later
    /// operation's state. Returns whether the gate changed.
    pub fn release(&self, ticket: GateTicket) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != ticket.generation || inner.state.is_idle() {
            warn!(
                operation = %ticket.label,
                generation = ticket.generation,
                current_generation = inner.generation,
                "🚦 GATE: Ignoring stale release"
            );
            return false;
        }

        inner.state = OperationState::Idle;
        inner.label.clear();
        info!(operation = %ticket.label, "🚦 GATE: Released");
        true
    }

    /// Relabel the running operation without releasing it
    pub fn set_phase(
        &self,
        generation: u64,
        state: OperationState,
        label: impl Into<String>,
    ) -> StateMachineResult<()> {
        let label = label.into();
        if state.is_idle() {
            return Err(StateMachineError::InvalidTarget(state));
        }

        let mut inner = self.inner.lock();
        if inner.generation != generation || inner.state.is_idle() {
            return Err(StateMachineError::StaleTicket { label });
        }

        debug!(from = %inner.label, to = %label, state = %state, "🚦 GATE: Phase change");
        inner.state = state;
        inner.label = label;
        Ok(())
    }

    pub fn snapshot(&self) -> GateSnapshot {
        let inner = self.inner.lock();
        GateSnapshot {
            state: inner.state,
            label: inner.label.clone(),
        }
    }

    pub fn state(&self) -> OperationState {
        self.inner.lock().state
    }

    pub fn is_busy(&self) -> bool {
        !self.state().is_idle()
    }

    pub fn current_operation(&self) -> String {
        self.inner.lock().label.clone()
    }
}
