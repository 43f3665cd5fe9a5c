use serde::{Deserialize, Serialize};
use std::fmt;

/// Orchestrator operation states
///
/// Anything other than `Idle` means exactly one mutating cluster operation is
/// active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// No mutating operation is running
    #[default]
    Idle,
    /// Running an application's installation command list
    Installing,
    /// Applying (or scaling) a deployment
    Deploying,
    /// Tearing down a deployment and its leftovers
    Removing,
    /// Reserved for gated verification runs
    Checking,
    /// Recycling a deployment or the runtime
    Restarting,
}

impl OperationState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Check if this state changes cluster resources
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Installing | Self::Deploying | Self::Removing | Self::Restarting
        )
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Installing => write!(f, "installing"),
            Self::Deploying => write!(f, "deploying"),
            Self::Removing => write!(f, "removing"),
            Self::Checking => write!(f, "checking"),
            Self::Restarting => write!(f, "restarting"),
        }
    }
}

impl std::str::FromStr for OperationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "installing" => Ok(Self::Installing),
            "deploying" => Ok(Self::Deploying),
            "removing" => Ok(Self::Removing),
            "checking" => Ok(Self::Checking),
            "restarting" => Ok(Self::Restarting),
            _ => Err(format!("Invalid operation state: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_string_conversion() {
        for state in [
            OperationState::Idle,
            OperationState::Installing,
            OperationState::Deploying,
            OperationState::Removing,
            OperationState::Checking,
            OperationState::Restarting,
        ] {
            assert_eq!(state.to_string().parse::<OperationState>(), Ok(state));
        }
        assert!("busy".parse::<OperationState>().is_err());
    }

    #[test]
    fn test_state_classification() {
        assert!(OperationState::Idle.is_idle());
        assert!(!OperationState::Idle.is_mutating());
        assert!(OperationState::Removing.is_mutating());
        assert!(!OperationState::Checking.is_mutating());
        assert_eq!(OperationState::default(), OperationState::Idle);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&OperationState::Restarting).unwrap();
        assert_eq!(json, "\"restarting\"");
    }
}
