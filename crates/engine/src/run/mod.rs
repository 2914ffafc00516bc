//! Traversal of a single execution.
//!
//! A run owns its [`ExecutionRecord`] and drives a frontier through the
//! validated graph. The main run, every parallel branch, and every loop
//! iteration are separate traversal contexts: a node executes at most once
//! per context, so loops re-run their body without a global visited set.

mod node;
mod rollback;

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use apollo_core::{ExecutionId, NodeId};
use apollo_execution::{
    ExecutionFailure, ExecutionRecord, ExecutionStatus, JournalEntry, StateStore, evaluate,
};
use apollo_resilience::RetryPolicy;
use apollo_workflow::{
    BODY_LABEL, BoundAction, Connection, DEFAULT_LABEL, EXIT_LABEL, NodeBehavior, NodeDefinition,
    ValidatedWorkflow,
};
use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::capability::CapabilityRegistry;
use crate::config::EngineConfig;
use crate::error::NodeError;

/// Nodes a traversal context must stop at instead of executing.
///
/// A branch stops at its split's merge, a loop body at its loop node. Nested
/// contexts inherit their parent's boundaries.
#[derive(Debug, Clone, Default)]
struct Scope {
    boundaries: Vec<NodeId>,
}

impl Scope {
    fn enter(&self, boundary: &NodeId) -> Self {
        let mut boundaries = self.boundaries.clone();
        boundaries.push(boundary.clone());
        Self { boundaries }
    }

    fn stops_at(&self, node_id: &NodeId) -> bool {
        self.boundaries.contains(node_id)
    }
}

/// State of one in-flight execution.
pub(crate) struct ExecutionRun<'a> {
    workflow: &'a ValidatedWorkflow,
    capabilities: &'a CapabilityRegistry,
    config: &'a EngineConfig,
    cancel: CancellationToken,
    record: Mutex<ExecutionRecord>,
    /// Node ids in completion order, repeats included.
    completions: Mutex<Vec<NodeId>>,
    fallback_retry: RetryPolicy,
}

impl<'a> ExecutionRun<'a> {
    pub(crate) fn new(
        workflow: &'a ValidatedWorkflow,
        capabilities: &'a CapabilityRegistry,
        config: &'a EngineConfig,
        execution_id: ExecutionId,
        cancel: CancellationToken,
    ) -> Self {
        let fallback_retry = workflow
            .definition()
            .config
            .retry_policy
            .clone()
            .unwrap_or_else(|| config.default_retry.clone());
        Self {
            workflow,
            capabilities,
            config,
            cancel,
            record: Mutex::new(ExecutionRecord::new(execution_id, workflow.id().clone())),
            completions: Mutex::new(Vec::new()),
            fallback_retry,
        }
    }

    /// Run to a terminal status and return the finished record.
    pub(crate) async fn drive(self, trigger: Value, context: Value) -> ExecutionRecord {
        let definition = self.workflow.definition();
        self.settle(ExecutionStatus::Running);
        tracing::info!(nodes = definition.nodes.len(), "execution started");

        let mut store = StateStore::seeded(trigger, context, definition.variables.clone());
        let entry = vec![self.workflow.trigger_id().clone()];
        let outcome = self.traverse(entry, &mut store, Scope::default()).await;

        match outcome {
            Ok(()) => self.settle(ExecutionStatus::Completed),
            Err(failure) => {
                tracing::error!(
                    node_id = %failure.node_id,
                    kind = ?failure.kind,
                    error = %failure.message,
                    "execution failed"
                );
                self.record.lock().error = Some(failure);
                self.settle(ExecutionStatus::Failed);

                if definition.rollback_enabled && self.rollback(store.snapshot()).await > 0 {
                    self.settle(ExecutionStatus::RolledBack);
                }
            }
        }

        let mut record = self.record.into_inner();
        if let Err(e) = record.finish() {
            tracing::warn!(error = %e, "execution record not finished");
        }
        record.final_state = store.into_value();
        tracing::info!(
            status = %record.status,
            visited = record.visited_nodes.len(),
            duration_ms = record.duration().map_or(0, |d| d.as_millis() as u64),
            "execution finished"
        );
        record
    }

    fn settle(&self, status: ExecutionStatus) {
        if let Err(e) = self.record.lock().transition(status) {
            tracing::warn!(error = %e, "ignored execution status change");
        }
    }

    fn log(&self, entry: JournalEntry) {
        self.record.lock().log(entry);
    }

    /// Drain a frontier within one traversal context.
    fn traverse<'s>(
        &'s self,
        start: Vec<NodeId>,
        store: &'s mut StateStore,
        scope: Scope,
    ) -> BoxFuture<'s, Result<(), ExecutionFailure>> {
        async move {
            let mut frontier: VecDeque<NodeId> = start.into();
            let mut executed: HashSet<NodeId> = HashSet::new();

            while let Some(node_id) = frontier.pop_front() {
                if scope.stops_at(&node_id) || !executed.insert(node_id.clone()) {
                    continue;
                }
                if self.cancel.is_cancelled() {
                    tracing::info!(node_id = %node_id, "cancellation observed");
                    return Err(NodeError::Cancelled { node_id }.to_failure());
                }
                let (Some(node), Some(behavior)) =
                    (self.workflow.node(&node_id), self.workflow.behavior(&node_id))
                else {
                    continue;
                };

                let next = match behavior {
                    NodeBehavior::ParallelSplit { merge } => {
                        executed.insert(merge.clone());
                        self.run_parallel(node, behavior, merge, store, &scope).await?
                    }
                    NodeBehavior::Loop(_) => self.run_loop(node, behavior, store, &scope).await?,
                    _ => self.run_node(node, behavior, store).await?,
                };
                frontier.extend(next);
            }
            Ok(())
        }
        .boxed()
    }

    /// Run every branch of a split concurrently, then its merge.
    async fn run_parallel(
        &self,
        split: &NodeDefinition,
        behavior: &NodeBehavior,
        merge_id: &NodeId,
        store: &mut StateStore,
        scope: &Scope,
    ) -> Result<Vec<NodeId>, ExecutionFailure> {
        self.begin(split);
        let starts = self.successors(split, behavior, store);
        let mut output = Map::new();
        output.insert("branches".into(), Value::from(starts.len()));
        if let Err(error) = self.complete(split, output, 1, store) {
            return self.fail(split, error, store).await;
        }

        let base = store.clone();
        let branch_scope = scope.enter(merge_id);
        let branches = starts.iter().map(|start| {
            let mut branch_store = base.clone();
            let scope = branch_scope.clone();
            let start = start.clone();
            async move {
                let outcome = self.traverse(vec![start], &mut branch_store, scope).await;
                (branch_store, outcome)
            }
        });
        let results = join_all(branches).await;

        let mut first_failure = None;
        for (branch_store, outcome) in results {
            store.merge(branch_store.changes_since(&base));
            if let Err(failure) = outcome {
                first_failure.get_or_insert(failure);
            }
        }

        self.log(JournalEntry::BranchesJoined {
            timestamp: Utc::now(),
            split_id: split.id.clone(),
            merge_id: merge_id.clone(),
            branches: starts.len(),
        });
        tracing::debug!(split = %split.id, merge = %merge_id, branches = starts.len(), "branches joined");

        if let Some(failure) = first_failure {
            return Err(failure);
        }
        match (self.workflow.node(merge_id), self.workflow.behavior(merge_id)) {
            (Some(merge), Some(merge_behavior)) => self.run_node(merge, merge_behavior, store).await,
            _ => Ok(Vec::new()),
        }
    }

    /// Run a loop body while the guard holds, up to the iteration cap.
    async fn run_loop(
        &self,
        node: &NodeDefinition,
        behavior: &NodeBehavior,
        store: &mut StateStore,
        scope: &Scope,
    ) -> Result<Vec<NodeId>, ExecutionFailure> {
        let NodeBehavior::Loop(spec) = behavior else {
            return self.run_node(node, behavior, store).await;
        };
        self.begin(node);

        let body: Vec<NodeId> = self
            .workflow
            .outgoing(&node.id)
            .into_iter()
            .filter(|c| c.has_label(BODY_LABEL))
            .map(|c| c.to_node.clone())
            .collect();
        let body_scope = scope.enter(&node.id);
        let iteration_path = StateStore::node_path(node.id.as_str(), "iteration");

        let mut iterations: u32 = 0;
        let mut bound_reached = false;
        while evaluate(&spec.guard, store) {
            if iterations >= spec.max_iterations {
                bound_reached = true;
                if spec.on_bound == BoundAction::Fail {
                    let error = NodeError::LoopBoundExceeded {
                        node_id: node.id.clone(),
                        max_iterations: spec.max_iterations,
                    };
                    return self.fail(node, error, store).await;
                }
                tracing::warn!(
                    node_id = %node.id,
                    max_iterations = spec.max_iterations,
                    "loop bound reached, leaving through exit edge"
                );
                break;
            }
            if self.cancel.is_cancelled() {
                let error = NodeError::Cancelled {
                    node_id: node.id.clone(),
                };
                return self.fail(node, error, store).await;
            }
            if let Err(source) = store.set(&iteration_path, Value::from(iterations)) {
                let error = NodeError::StateWrite {
                    node_id: node.id.clone(),
                    source,
                };
                return self.fail(node, error, store).await;
            }

            self.log(JournalEntry::LoopIteration {
                timestamp: Utc::now(),
                node_id: node.id.clone(),
                iteration: iterations,
            });
            tracing::debug!(node_id = %node.id, iteration = iterations, "loop iteration");

            if let Err(failure) = self.traverse(body.clone(), store, body_scope.clone()).await {
                self.abandon(&node.id, &failure);
                return Err(failure);
            }
            iterations += 1;
        }

        let mut output = Map::new();
        output.insert("iterations".into(), Value::from(iterations));
        output.insert("bound_reached".into(), Value::Bool(bound_reached));
        let next = self.successors(node, behavior, store);
        match self.complete(node, output, 1, store) {
            Ok(()) => Ok(next),
            Err(error) => self.fail(node, error, store).await,
        }
    }

    /// Nodes to schedule after `node` completes.
    fn successors(
        &self,
        node: &NodeDefinition,
        behavior: &NodeBehavior,
        store: &StateStore,
    ) -> Vec<NodeId> {
        let edges = self.workflow.outgoing(&node.id);
        match behavior {
            NodeBehavior::Condition | NodeBehavior::Switch => {
                let chosen = edges
                    .iter()
                    .find(|c| {
                        !c.has_label(DEFAULT_LABEL)
                            && c.guard.as_ref().is_some_and(|g| evaluate(g, store))
                    })
                    .or_else(|| edges.iter().find(|c| c.is_default()));
                match chosen {
                    Some(edge) => vec![edge.to_node.clone()],
                    None => {
                        tracing::debug!(node_id = %node.id, "no branch matched, branch ends");
                        Vec::new()
                    }
                }
            }
            NodeBehavior::Loop(_) => edges
                .into_iter()
                .filter(|c| c.has_label(EXIT_LABEL) && passes(c, store))
                .map(|c| c.to_node.clone())
                .collect(),
            _ => edges
                .into_iter()
                .filter(|c| passes(c, store))
                .map(|c| c.to_node.clone())
                .collect(),
        }
    }

    fn timeout_for(&self, node: &NodeDefinition, behavior: &NodeBehavior) -> Duration {
        if let Some(timeout) = node.timeout {
            return timeout;
        }
        let base = self
            .workflow
            .definition()
            .config
            .node_timeout
            .unwrap_or_else(|| self.config.default_timeout());
        match behavior {
            NodeBehavior::Delay { duration } => *duration + base,
            _ => base,
        }
    }
}

/// Unguarded edges always pass; guarded ones when their guard holds.
fn passes(connection: &Connection, store: &StateStore) -> bool {
    connection
        .guard
        .as_ref()
        .is_none_or(|guard| evaluate(guard, store))
}
