//! Execution of a single node: input mapping, retries, output mapping and
//! the error-handler path.

use std::time::Duration;

use apollo_core::NodeId;
use apollo_execution::store::{NODES_KEY, TRIGGER_KEY};
use apollo_execution::transition::validate_node_transition;
use apollo_execution::{ErrorKind, ExecutionFailure, JournalEntry, StateStore};
use apollo_resilience::{RetryPolicy, retry};
use apollo_workflow::{NodeBehavior, NodeDefinition, NodeState};
use chrono::Utc;
use serde_json::{Map, Value};

use super::ExecutionRun;
use crate::capability::CapabilityMap;
use crate::error::NodeError;
use crate::transform;

impl ExecutionRun<'_> {
    /// Execute a non-structural node and return the nodes to schedule next.
    pub(super) async fn run_node(
        &self,
        node: &NodeDefinition,
        behavior: &NodeBehavior,
        store: &mut StateStore,
    ) -> Result<Vec<NodeId>, ExecutionFailure> {
        self.begin(node);
        let input = self.resolve_inputs(node, store);

        let outcome = match behavior {
            NodeBehavior::Trigger => Ok((trigger_result(store), 1)),
            NodeBehavior::Transform(ops) => Ok((transform::apply(ops, store), 1)),
            NodeBehavior::Task | NodeBehavior::Delay { .. } | NodeBehavior::ErrorHandler => {
                self.run_with_retry(node, behavior, input).await
            }
            NodeBehavior::Condition
            | NodeBehavior::Switch
            | NodeBehavior::Merge
            | NodeBehavior::ParallelSplit { .. }
            | NodeBehavior::Loop(_) => Ok((Map::new(), 1)),
        };
        let (mut output, attempts) = match outcome {
            Ok(done) => done,
            Err(error) => return self.fail(node, error, store).await,
        };

        let next = self.successors(node, behavior, store);
        if matches!(behavior, NodeBehavior::Condition | NodeBehavior::Switch) {
            let selected = next
                .first()
                .map_or(Value::Null, |id| Value::String(id.to_string()));
            output.insert("selected".into(), selected);
        }

        match self.complete(node, output, attempts, store) {
            Ok(()) => Ok(next),
            Err(error) => self.fail(node, error, store).await,
        }
    }

    /// Start a fresh result slot for `node`.
    pub(super) fn begin(&self, node: &NodeDefinition) {
        self.record.lock().begin_node(&node.id);
        tracing::debug!(node_id = %node.id, kind = %node.kind, "node started");
    }

    /// Move a node's latest result to `to` if the state machine allows it.
    fn mark(&self, node_id: &NodeId, to: NodeState) {
        let mut record = self.record.lock();
        if let Some(result) = record.node_mut(node_id) {
            match validate_node_transition(result.state, to) {
                Ok(()) => result.state = to,
                Err(e) => tracing::debug!(node_id = %node_id, error = %e, "ignored node state change"),
            }
        }
    }

    /// Resolve `input_mapping` against the store. Missing paths become `null`.
    fn resolve_inputs(&self, node: &NodeDefinition, store: &StateStore) -> CapabilityMap {
        let mut input = Map::new();
        let mut missing = Vec::new();
        for (name, path) in &node.input_mapping {
            let value = match store.get(path) {
                Ok(value) => value.clone(),
                Err(e) => {
                    tracing::warn!(
                        node_id = %node.id,
                        input = %name,
                        error = %e,
                        "input path missing, passing null"
                    );
                    missing.push(path.clone());
                    Value::Null
                }
            };
            input.insert(name.clone(), value);
        }
        if !missing.is_empty()
            && let Some(result) = self.record.lock().node_mut(&node.id)
        {
            result.missing_inputs = missing;
        }
        input
    }

    async fn run_with_retry(
        &self,
        node: &NodeDefinition,
        behavior: &NodeBehavior,
        input: CapabilityMap,
    ) -> Result<(CapabilityMap, u32), NodeError> {
        let policy = if node.kind.is_retryable() {
            node.effective_retry(&self.fallback_retry)
        } else {
            RetryPolicy::none()
        };
        let timeout = self.timeout_for(node, behavior);

        let outcome = retry(
            &policy,
            &self.cancel,
            |attempt| {
                let input = input.clone();
                async move { self.attempt(node, behavior, attempt, input, timeout).await }
            },
            |attempt, error: &NodeError, delay| self.on_retry(node, attempt, error, delay),
        )
        .await;

        match outcome {
            Ok(done) => Ok((done.value, done.attempts)),
            Err(err) if err.is_cancelled() => Err(NodeError::Cancelled {
                node_id: node.id.clone(),
            }),
            Err(err) => Err(err.into_last_error().unwrap_or_else(|| NodeError::Cancelled {
                node_id: node.id.clone(),
            })),
        }
    }

    /// One attempt, bounded by `timeout` and raced against cancellation.
    async fn attempt(
        &self,
        node: &NodeDefinition,
        behavior: &NodeBehavior,
        attempt: u32,
        input: CapabilityMap,
        timeout: Duration,
    ) -> Result<CapabilityMap, NodeError> {
        if attempt > 1 {
            self.mark(&node.id, NodeState::Running);
        }
        {
            let mut record = self.record.lock();
            if let Some(result) = record.node_mut(&node.id) {
                result.attempts = attempt;
            }
            record.log(JournalEntry::NodeStarted {
                timestamp: Utc::now(),
                node_id: node.id.clone(),
                attempt,
            });
        }

        let work = async {
            match behavior {
                NodeBehavior::Delay { duration } => {
                    tokio::time::sleep(*duration).await;
                    let mut output = Map::new();
                    output.insert("delayed_ms".into(), Value::from(duration.as_millis() as u64));
                    Ok(output)
                }
                _ => self.invoke(node, input).await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(NodeError::Cancelled { node_id: node.id.clone() }),
            result = apollo_resilience::timeout(timeout, work) => result.unwrap_or_else(|_| {
                Err(NodeError::Timeout { node_id: node.id.clone(), timeout })
            }),
        }
    }

    /// Call the node's capability once.
    pub(super) async fn invoke(
        &self,
        node: &NodeDefinition,
        input: CapabilityMap,
    ) -> Result<CapabilityMap, NodeError> {
        let name = node.capability_name.as_deref().unwrap_or_default();
        let capability =
            self.capabilities
                .get(name)
                .ok_or_else(|| NodeError::CapabilityNotFound {
                    node_id: node.id.clone(),
                    capability: name.to_owned(),
                })?;
        capability
            .execute(input)
            .await
            .map_err(|source| NodeError::Execution {
                node_id: node.id.clone(),
                source,
            })
    }

    fn on_retry(&self, node: &NodeDefinition, attempt: u32, error: &NodeError, delay: Duration) {
        tracing::warn!(
            node_id = %node.id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "node attempt failed, retrying"
        );
        self.mark(&node.id, NodeState::Retrying);
        self.log(JournalEntry::NodeRetrying {
            timestamp: Utc::now(),
            node_id: node.id.clone(),
            attempt,
            delay_ms: delay.as_millis() as u64,
            error: error.to_string(),
        });
    }

    /// Write a successful result to state and the record.
    ///
    /// The whole result lands at `nodes.<id>`, then each output mapping
    /// copies one result field to its state path. Absent fields are skipped.
    pub(super) fn complete(
        &self,
        node: &NodeDefinition,
        output: CapabilityMap,
        attempts: u32,
        store: &mut StateStore,
    ) -> Result<(), NodeError> {
        let write_error = |source| NodeError::StateWrite {
            node_id: node.id.clone(),
            source,
        };
        store
            .set(
                &format!("{NODES_KEY}.{}", node.id),
                Value::Object(output.clone()),
            )
            .map_err(write_error)?;
        for (path, field) in &node.output_mapping {
            if let Some(value) = output.get(field) {
                store.set(path, value.clone()).map_err(write_error)?;
            }
        }

        self.mark(&node.id, NodeState::Completed);
        {
            let mut record = self.record.lock();
            if let Some(result) = record.node_mut(&node.id) {
                result.output = Some(output);
                result.attempts = attempts;
                result.completed_at = Some(Utc::now());
            }
            record.log(JournalEntry::NodeCompleted {
                timestamp: Utc::now(),
                node_id: node.id.clone(),
                attempts,
            });
        }
        self.completions.lock().push(node.id.clone());
        tracing::debug!(node_id = %node.id, attempts, "node completed");
        Ok(())
    }

    fn record_failure(&self, node_id: &NodeId, error: &NodeError) {
        let state = if error.is_cancelled() {
            NodeState::Cancelled
        } else {
            NodeState::Failed
        };
        self.close_node(node_id, state, error.to_string());
    }

    /// Close a structural node whose nested traversal failed underneath it.
    ///
    /// The node takes the failure's outcome without running its own error
    /// handler; the nested failure keeps propagating unchanged.
    pub(super) fn abandon(&self, node_id: &NodeId, failure: &ExecutionFailure) {
        let state = if failure.kind == ErrorKind::Cancelled {
            NodeState::Cancelled
        } else {
            NodeState::Failed
        };
        let message = format!("nested node {} failed: {}", failure.node_id, failure.message);
        tracing::warn!(node_id = %node_id, failed = %failure.node_id, "abandoning node after nested failure");
        self.close_node(node_id, state, message);
    }

    fn close_node(&self, node_id: &NodeId, state: NodeState, message: String) {
        self.mark(node_id, state);
        let mut record = self.record.lock();
        if let Some(result) = record.node_mut(node_id) {
            result.error = Some(message.clone());
            result.completed_at = Some(Utc::now());
        }
        record.log(JournalEntry::NodeFailed {
            timestamp: Utc::now(),
            node_id: node_id.clone(),
            error: message,
        });
    }

    /// Handle a node's terminal failure.
    ///
    /// With an error handler that succeeds, the node becomes `Recovered` and
    /// traversal continues from the handler's own edges.
    pub(super) async fn fail(
        &self,
        node: &NodeDefinition,
        error: NodeError,
        store: &mut StateStore,
    ) -> Result<Vec<NodeId>, ExecutionFailure> {
        self.record_failure(&node.id, &error);
        if error.is_cancelled() {
            return Err(error.to_failure());
        }
        let Some(handler_id) = &node.error_handler_id else {
            return Err(error.to_failure());
        };

        tracing::warn!(node_id = %node.id, handler_id = %handler_id, error = %error, "invoking error handler");
        match self.recover(node, handler_id, &error, store).await {
            Some(next) => Ok(next),
            None => Err(error.to_failure()),
        }
    }

    /// Run `handler_id` once for a failed node. `None` if it failed too.
    async fn recover(
        &self,
        failed: &NodeDefinition,
        handler_id: &NodeId,
        error: &NodeError,
        store: &mut StateStore,
    ) -> Option<Vec<NodeId>> {
        let handler = self.workflow.node(handler_id)?;
        let behavior = self.workflow.behavior(handler_id)?;
        self.begin(handler);

        let mut input = Map::new();
        input.insert("error".into(), Value::String(error.to_string()));
        input.insert("failed_node_id".into(), Value::String(failed.id.to_string()));
        input.insert("state".into(), store.snapshot());

        let timeout = self.timeout_for(handler, behavior);
        let handled = match self.attempt(handler, behavior, 1, input, timeout).await {
            Ok(output) => self.complete(handler, output, 1, store),
            Err(e) => Err(e),
        };

        match handled {
            Ok(()) => {
                self.mark(&failed.id, NodeState::Recovered);
                self.log(JournalEntry::ErrorHandled {
                    timestamp: Utc::now(),
                    node_id: failed.id.clone(),
                    handler_id: handler_id.clone(),
                });
                tracing::info!(node_id = %failed.id, handler_id = %handler_id, "node recovered");
                Some(self.successors(handler, behavior, store))
            }
            Err(handler_error) => {
                self.record_failure(handler_id, &handler_error);
                tracing::error!(
                    node_id = %failed.id,
                    handler_id = %handler_id,
                    error = %handler_error,
                    "error handler failed"
                );
                None
            }
        }
    }
}

/// The trigger exposes the caller's payload as its result.
fn trigger_result(store: &StateStore) -> CapabilityMap {
    match store.get_opt(TRIGGER_KEY) {
        Some(Value::Object(map)) => map.clone(),
        None | Some(Value::Null) => Map::new(),
        Some(other) => {
            let mut map = Map::new();
            map.insert("value".into(), other.clone());
            map
        }
    }
}
