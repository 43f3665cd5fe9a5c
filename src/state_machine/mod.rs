// State machine module for the orchestrator
//
// A single gate guards the orchestrator's operation state; every mutating
// cluster operation acquires it on entry and releases it on every exit path.

pub mod errors;
pub mod gate;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use gate::{GateSnapshot, GateTicket, OperationGate};
pub use states::OperationState;
