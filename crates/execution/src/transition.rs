//! State machine transition validation for execution and node states.

use apollo_workflow::NodeState;

use crate::error::ExecutionError;
use crate::status::ExecutionStatus;

/// Returns `true` if the execution-level transition from `from` to `to` is valid.
#[must_use]
pub fn can_transition_execution(from: ExecutionStatus, to: ExecutionStatus) -> bool {
    matches!(
        (from, to),
        (ExecutionStatus::Pending, ExecutionStatus::Running)
            | (ExecutionStatus::Running, ExecutionStatus::Completed)
            | (ExecutionStatus::Running, ExecutionStatus::Failed)
            | (ExecutionStatus::Failed, ExecutionStatus::RolledBack)
    )
}

/// Validate an execution-level transition, returning an error if invalid.
pub fn validate_execution_transition(
    from: ExecutionStatus,
    to: ExecutionStatus,
) -> Result<(), ExecutionError> {
    if can_transition_execution(from, to) {
        Ok(())
    } else {
        Err(ExecutionError::invalid_execution_transition(from, to))
    }
}

/// Returns `true` if the node-level transition from `from` to `to` is valid.
#[must_use]
pub fn can_transition_node(from: NodeState, to: NodeState) -> bool {
    matches!(
        (from, to),
        (NodeState::Pending, NodeState::Running)
            | (NodeState::Pending, NodeState::Cancelled)
            | (NodeState::Running, NodeState::Completed)
            | (NodeState::Running, NodeState::Failed)
            | (NodeState::Running, NodeState::Retrying)
            | (NodeState::Running, NodeState::Cancelled)
            | (NodeState::Retrying, NodeState::Running)
            | (NodeState::Retrying, NodeState::Failed)
            | (NodeState::Retrying, NodeState::Cancelled)
            | (NodeState::Failed, NodeState::Recovered)
    )
}

/// Validate a node-level transition, returning an error if invalid.
pub fn validate_node_transition(from: NodeState, to: NodeState) -> Result<(), ExecutionError> {
    if can_transition_node(from, to) {
        Ok(())
    } else {
        Err(ExecutionError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ExecutionStatus::Pending, ExecutionStatus::Running, true)]
    #[case(ExecutionStatus::Running, ExecutionStatus::Completed, true)]
    #[case(ExecutionStatus::Running, ExecutionStatus::Failed, true)]
    #[case(ExecutionStatus::Failed, ExecutionStatus::RolledBack, true)]
    #[case(ExecutionStatus::Pending, ExecutionStatus::Completed, false)]
    #[case(ExecutionStatus::Completed, ExecutionStatus::Running, false)]
    #[case(ExecutionStatus::Completed, ExecutionStatus::RolledBack, false)]
    #[case(ExecutionStatus::RolledBack, ExecutionStatus::Failed, false)]
    fn execution_transitions(
        #[case] from: ExecutionStatus,
        #[case] to: ExecutionStatus,
        #[case] valid: bool,
    ) {
        assert_eq!(can_transition_execution(from, to), valid);
        assert_eq!(validate_execution_transition(from, to).is_ok(), valid);
    }

    #[rstest]
    #[case(NodeState::Pending, NodeState::Running, true)]
    #[case(NodeState::Running, NodeState::Retrying, true)]
    #[case(NodeState::Retrying, NodeState::Running, true)]
    #[case(NodeState::Failed, NodeState::Recovered, true)]
    #[case(NodeState::Completed, NodeState::Failed, false)]
    #[case(NodeState::Pending, NodeState::Completed, false)]
    fn node_transitions(#[case] from: NodeState, #[case] to: NodeState, #[case] valid: bool) {
        assert_eq!(can_transition_node(from, to), valid);
    }

    #[test]
    fn invalid_node_transition_names_both_states() {
        let err = validate_node_transition(NodeState::Completed, NodeState::Running).unwrap_err();
        assert_eq!(err.to_string(), "invalid transition from completed to running");
    }
}
