//! Best-effort compensation after a terminal failure.

use std::collections::HashSet;

use apollo_core::NodeId;
use apollo_execution::{JournalEntry, RollbackStep};
use apollo_workflow::NodeState;
use chrono::Utc;
use serde_json::{Map, Value};

use super::ExecutionRun;
use crate::error::NodeError;

impl ExecutionRun<'_> {
    /// Invoke the rollback handler of every completed node, newest completion
    /// first, each once. Handler failures are logged and skipped.
    ///
    /// Returns how many handlers ran.
    pub(super) async fn rollback(&self, state: Value) -> usize {
        let order = self.rollback_order();
        let mut ran = 0;

        for node_id in order {
            let Some(node) = self.workflow.node(&node_id) else {
                continue;
            };
            let Some(handler_id) = &node.rollback_handler_id else {
                continue;
            };
            let Some(handler) = self.workflow.node(handler_id) else {
                continue;
            };
            let Some(result) = self.completed_output(&node_id) else {
                continue;
            };

            let mut input = Map::new();
            input.insert("node_id".into(), Value::String(node_id.to_string()));
            input.insert("result".into(), result);
            input.insert("state".into(), state.clone());

            let timeout = self.config.rollback_timeout();
            let error = match apollo_resilience::timeout(timeout, self.invoke(handler, input)).await {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => Some(e.to_string()),
            };
            ran += 1;

            match &error {
                None => tracing::info!(node_id = %node_id, handler_id = %handler_id, "node rolled back"),
                Some(message) => {
                    let err = NodeError::RollbackHandler {
                        node_id: node_id.clone(),
                        handler_id: handler_id.clone(),
                        message: message.clone(),
                    };
                    tracing::error!(error = %err, "rollback handler failed, continuing");
                }
            }

            let mut record = self.record.lock();
            record.log(JournalEntry::RollbackStep {
                timestamp: Utc::now(),
                node_id: node_id.clone(),
                handler_id: handler_id.clone(),
                success: error.is_none(),
            });
            record.rollback.push(RollbackStep {
                node_id,
                handler_id: handler_id.clone(),
                success: error.is_none(),
                error,
            });
        }
        ran
    }

    /// Distinct completed nodes, ordered by last completion, newest first.
    fn rollback_order(&self) -> Vec<NodeId> {
        let completions = self.completions.lock();
        let mut seen = HashSet::new();
        completions
            .iter()
            .rev()
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect()
    }

    /// The latest result of a node still marked `Completed`.
    fn completed_output(&self, node_id: &NodeId) -> Option<Value> {
        let record = self.record.lock();
        record
            .node_result(node_id)
            .filter(|r| r.state == NodeState::Completed)
            .map(|r| r.output.clone().map_or(Value::Null, Value::Object))
    }
}
