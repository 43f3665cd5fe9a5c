use appstore_core::state_machine::OperationState;
use proptest::prelude::*;

/// Any state a job can run under
pub fn busy_state_strategy() -> impl Strategy<Value = OperationState> {
    prop_oneof![
        Just(OperationState::Installing),
        Just(OperationState::Deploying),
        Just(OperationState::Removing),
        Just(OperationState::Checking),
        Just(OperationState::Restarting),
    ]
}

/// Operation labels as shown to the user
pub fn operation_label_strategy() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{2,9} [a-z][a-z0-9-]{0,20}"
}

/// `(base_ms, max_ms)` with `base <= max`
pub fn backoff_bounds_strategy() -> impl Strategy<Value = (u64, u64)> {
    (1u64..=10_000, 0u64..=600_000).prop_map(|(base, extra)| (base, base + extra))
}

/// A gate operation: acquire under a state, or release the ticket at an index
#[derive(Debug, Clone)]
pub enum GateOp {
    Acquire(OperationState),
    Release(usize),
}

pub fn gate_ops_strategy() -> impl Strategy<Value = Vec<GateOp>> {
    prop::collection::vec(
        prop_oneof![
            busy_state_strategy().prop_map(GateOp::Acquire),
            (0usize..8).prop_map(GateOp::Release),
        ],
        1..40,
    )
}
