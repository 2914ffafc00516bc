//! The audit and result object of one execution.

use std::time::Duration;

use apollo_core::{ExecutionId, NodeId, WorkflowId};
use apollo_workflow::NodeState;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ExecutionError;
use crate::journal::JournalEntry;
use crate::status::ExecutionStatus;
use crate::transition::validate_execution_transition;

/// Category of the failure that ended an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A capability name did not resolve in the registry.
    CapabilityNotFound,
    /// A node attempt exceeded its timeout.
    NodeTimeout,
    /// A capability reported a failure.
    NodeExecution,
    /// A loop configured to fail reached its iteration cap.
    LoopBoundExceeded,
    /// A result could not be written to state.
    StateWrite,
    /// A rollback handler failed.
    RollbackHandler,
    /// The run was cancelled.
    Cancelled,
}

/// The originating node and detail of a terminal failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    /// The node whose failure ended the run.
    pub node_id: NodeId,
    /// Failure category.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

/// Outcome of one node within an execution.
///
/// Nodes inside loops run several times; the record keeps the latest run and
/// counts runs in `executions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    /// The node.
    pub node_id: NodeId,
    /// Final state of the latest run.
    pub state: NodeState,
    /// Result map of the latest successful run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Map<String, Value>>,
    /// Error of the latest failed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Attempts made by the latest run.
    pub attempts: u32,
    /// How many times the node ran in this execution.
    pub executions: u32,
    /// Input paths that resolved to nothing and were passed as `null`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_inputs: Vec<String>,
    /// When the latest run started.
    pub started_at: DateTime<Utc>,
    /// When the latest run finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl NodeResult {
    /// A result for a run that is just starting.
    #[must_use]
    pub fn started(node_id: NodeId) -> Self {
        Self {
            node_id,
            state: NodeState::Running,
            output: None,
            error: None,
            attempts: 0,
            executions: 1,
            missing_inputs: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Wall-clock time of the latest run, if finished.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.completed_at
            .and_then(|end| (end - self.started_at).to_std().ok())
    }
}

/// One rollback handler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackStep {
    /// The node being compensated.
    pub node_id: NodeId,
    /// The handler invoked.
    pub handler_id: NodeId,
    /// Whether the handler succeeded.
    pub success: bool,
    /// Handler error, when it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Status, per-node outcomes, visitation order, timing and final state of one run.
///
/// Mutated only by the engine driving the run; immutable once finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique id of this run.
    pub execution_id: ExecutionId,
    /// The workflow that ran.
    pub workflow_id: WorkflowId,
    /// Current status.
    pub status: ExecutionStatus,
    /// Node ids in the order they started, including repeats from loops.
    pub visited_nodes: Vec<NodeId>,
    /// Latest outcome of every node that ran, in first-visit order.
    pub per_node_results: IndexMap<NodeId, NodeResult>,
    /// State store contents when the run ended.
    pub final_state: Value,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// The failure that ended the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionFailure>,
    /// Rollback handler invocations, in the order they ran.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollback: Vec<RollbackStep>,
    /// Ordered audit log.
    #[serde(default)]
    pub journal: Vec<JournalEntry>,
}

impl ExecutionRecord {
    /// A fresh `Pending` record.
    #[must_use]
    pub fn new(execution_id: ExecutionId, workflow_id: WorkflowId) -> Self {
        Self {
            execution_id,
            workflow_id,
            status: ExecutionStatus::Pending,
            visited_nodes: Vec::new(),
            per_node_results: IndexMap::new(),
            final_state: Value::Null,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            rollback: Vec::new(),
            journal: Vec::new(),
        }
    }

    /// Move to `to`, enforcing the status machine.
    ///
    /// `Running` appends `ExecutionStarted`. Terminal statuses do not stamp
    /// anything: a `Failed` run may still become `RolledBack`, so the record
    /// is closed separately by [`finish`](Self::finish).
    pub fn transition(&mut self, to: ExecutionStatus) -> Result<(), ExecutionError> {
        if self.completed_at.is_some() {
            return Err(ExecutionError::AlreadyFinished {
                status: self.status.to_string(),
            });
        }
        validate_execution_transition(self.status, to)?;
        self.status = to;
        if to == ExecutionStatus::Running {
            let timestamp = Utc::now();
            self.started_at = timestamp;
            self.journal.push(JournalEntry::ExecutionStarted {
                timestamp,
                workflow_id: self.workflow_id.clone(),
            });
        }
        Ok(())
    }

    /// Close a terminal record: stamp `completed_at` and append the single
    /// `ExecutionFinished` entry. No transition is accepted afterwards.
    pub fn finish(&mut self) -> Result<(), ExecutionError> {
        if self.completed_at.is_some() {
            return Err(ExecutionError::AlreadyFinished {
                status: self.status.to_string(),
            });
        }
        if !self.status.is_terminal() {
            return Err(ExecutionError::NotTerminal {
                status: self.status.to_string(),
            });
        }
        let timestamp = Utc::now();
        self.completed_at = Some(timestamp);
        self.journal.push(JournalEntry::ExecutionFinished {
            timestamp,
            status: self.status,
        });
        Ok(())
    }

    /// Record that `node_id` is starting a run and return its fresh result slot.
    pub fn begin_node(&mut self, node_id: &NodeId) -> &mut NodeResult {
        self.visited_nodes.push(node_id.clone());
        let executions = self
            .per_node_results
            .get(node_id)
            .map_or(0, |r| r.executions);
        let slot = self
            .per_node_results
            .entry(node_id.clone())
            .or_insert_with(|| NodeResult::started(node_id.clone()));
        *slot = NodeResult {
            executions: executions + 1,
            ..NodeResult::started(node_id.clone())
        };
        slot
    }

    /// Mutable access to a node's latest result.
    pub fn node_mut(&mut self, node_id: &NodeId) -> Option<&mut NodeResult> {
        self.per_node_results.get_mut(node_id)
    }

    /// A node's latest result.
    #[must_use]
    pub fn node_result(&self, node_id: &NodeId) -> Option<&NodeResult> {
        self.per_node_results.get(node_id)
    }

    /// Append a journal entry.
    pub fn log(&mut self, entry: JournalEntry) {
        self.journal.push(entry);
    }

    /// Returns `true` once the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns `true` if the run completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Wall-clock duration of the run, once finished.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.completed_at
            .and_then(|end| (end - self.started_at).to_std().ok())
    }

    /// Number of times `node_id` appears in the visitation path.
    #[must_use]
    pub fn visit_count(&self, node_id: &NodeId) -> usize {
        self.visited_nodes.iter().filter(|n| *n == node_id).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record() -> ExecutionRecord {
        ExecutionRecord::new(ExecutionId::v4(), WorkflowId::new("wf").unwrap())
    }

    #[test]
    fn lifecycle_stamps_journal_and_completion() {
        let mut r = record();
        assert_eq!(r.status, ExecutionStatus::Pending);
        r.transition(ExecutionStatus::Running).unwrap();
        r.transition(ExecutionStatus::Completed).unwrap();
        assert!(r.completed_at.is_none());
        r.finish().unwrap();

        assert!(r.is_success());
        assert!(r.completed_at.is_some());
        assert!(r.duration().is_some());
        assert!(matches!(r.journal.first(), Some(JournalEntry::ExecutionStarted { .. })));
        assert!(matches!(
            r.journal.last(),
            Some(JournalEntry::ExecutionFinished {
                status: ExecutionStatus::Completed,
                ..
            })
        ));
    }

    #[test]
    fn terminal_record_rejects_further_transitions() {
        let mut r = record();
        r.transition(ExecutionStatus::Running).unwrap();
        r.transition(ExecutionStatus::Completed).unwrap();
        assert!(r.transition(ExecutionStatus::Failed).is_err());
        assert_eq!(r.status, ExecutionStatus::Completed);
    }

    #[test]
    fn failed_may_become_rolled_back() {
        let mut r = record();
        r.transition(ExecutionStatus::Running).unwrap();
        r.transition(ExecutionStatus::Failed).unwrap();
        r.transition(ExecutionStatus::RolledBack).unwrap();
        r.finish().unwrap();
        assert!(r.status.is_failure());

        let finished: Vec<_> = r
            .journal
            .iter()
            .filter(|e| matches!(e, JournalEntry::ExecutionFinished { .. }))
            .collect();
        assert_eq!(finished.len(), 1);
        assert!(matches!(
            finished[0],
            JournalEntry::ExecutionFinished {
                status: ExecutionStatus::RolledBack,
                ..
            }
        ));
    }

    #[test]
    fn finished_record_is_immutable() {
        let mut r = record();
        r.transition(ExecutionStatus::Running).unwrap();
        assert!(matches!(r.finish(), Err(ExecutionError::NotTerminal { .. })));

        r.transition(ExecutionStatus::Failed).unwrap();
        r.finish().unwrap();
        let stamped = r.completed_at;

        assert!(matches!(
            r.transition(ExecutionStatus::RolledBack),
            Err(ExecutionError::AlreadyFinished { .. })
        ));
        assert!(matches!(r.finish(), Err(ExecutionError::AlreadyFinished { .. })));
        assert_eq!(r.status, ExecutionStatus::Failed);
        assert_eq!(r.completed_at, stamped);
    }

    #[test]
    fn repeated_runs_replace_result_and_count_executions() {
        let mut r = record();
        let node = NodeId::new("body").unwrap();
        r.begin_node(&node).attempts = 3;
        let second = r.begin_node(&node);
        assert_eq!(second.attempts, 0);
        assert_eq!(second.executions, 2);
        assert_eq!(r.visit_count(&node), 2);
        assert_eq!(r.per_node_results.len(), 1);
    }
}
