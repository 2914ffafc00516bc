//! Workflow execution engine.
//!
//! Holds validated workflows, dispatches executions against a shared
//! [`CapabilityRegistry`], and tracks in-flight runs, statistics, and a
//! bounded history of finished records.

use std::collections::VecDeque;
use std::sync::Arc;

use apollo_core::{ExecutionId, WorkflowId};
use apollo_execution::ExecutionRecord;
use apollo_workflow::{NodeKind, ValidatedWorkflow, WorkflowDefinition};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::capability::CapabilityRegistry;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::handle::ExecutionHandle;
use crate::run::ExecutionRun;
use crate::stats::WorkflowStatistics;

/// One row of [`WorkflowEngine::list_workflows`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    /// Workflow id.
    pub id: WorkflowId,
    /// Display name.
    pub name: String,
    /// Number of nodes.
    pub node_count: usize,
    /// Fraction of finished executions that completed.
    pub success_rate: f64,
}

/// An execution that has started and not yet finished.
#[derive(Debug)]
struct ActiveExecution {
    workflow_id: WorkflowId,
    cancel: CancellationToken,
}

type ActiveExecutions = DashMap<ExecutionId, ActiveExecution>;

/// Keeps an execution listed as active until dropped.
///
/// Dropping the execution future before it finishes drops this guard too,
/// so an abandoned run never lingers in [`WorkflowEngine::active_executions`].
struct ActiveGuard {
    running: Arc<ActiveExecutions>,
    execution_id: ExecutionId,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if self.running.remove(&self.execution_id).is_some() {
            tracing::trace!(execution_id = %self.execution_id, "execution deregistered");
        }
    }
}

/// The workflow execution engine.
///
/// Definitions are validated once at registration and shared read-only by
/// every execution. Each execution owns its state store and record; nothing
/// mutable is shared between executions.
pub struct WorkflowEngine {
    capabilities: Arc<CapabilityRegistry>,
    config: EngineConfig,
    workflows: DashMap<WorkflowId, Arc<ValidatedWorkflow>>,
    running: Arc<ActiveExecutions>,
    statistics: DashMap<WorkflowId, WorkflowStatistics>,
    history: Mutex<VecDeque<Arc<ExecutionRecord>>>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("workflows", &self.workflows.len())
            .field("running", &self.running.len())
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    /// Create an engine with default configuration.
    #[must_use]
    pub fn new(capabilities: Arc<CapabilityRegistry>) -> Self {
        Self {
            capabilities,
            config: EngineConfig::default(),
            workflows: DashMap::new(),
            running: Arc::new(DashMap::new()),
            statistics: DashMap::new(),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The capability registry executions dispatch to.
    #[must_use]
    pub fn capabilities(&self) -> &Arc<CapabilityRegistry> {
        &self.capabilities
    }

    // -- Registration --

    /// Validate `definition` and make it executable under its id.
    ///
    /// Re-registering an id replaces the previous definition; executions
    /// already running keep the version they started with.
    pub fn validate_and_register(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<WorkflowId, EngineError> {
        let workflow = ValidatedWorkflow::new(definition)?;
        let id = workflow.id().clone();

        for node in workflow.definition().nodes.iter().filter(|n| {
            matches!(n.kind, NodeKind::Task | NodeKind::ErrorHandler)
        }) {
            if let Some(name) = &node.capability_name
                && !self.capabilities.contains(name)
            {
                tracing::warn!(
                    workflow_id = %id,
                    node_id = %node.id,
                    capability = %name,
                    "capability not registered yet"
                );
            }
        }

        let replaced = self.workflows.insert(id.clone(), Arc::new(workflow)).is_some();
        tracing::info!(workflow_id = %id, replaced, "registered workflow");
        Ok(id)
    }

    /// Remove a workflow. Returns `true` if it was registered.
    pub fn unregister(&self, workflow_id: &WorkflowId) -> bool {
        let removed = self.workflows.remove(workflow_id).is_some();
        if removed {
            tracing::info!(workflow_id = %workflow_id, "unregistered workflow");
        }
        removed
    }

    /// Look up a registered workflow.
    #[must_use]
    pub fn workflow(&self, workflow_id: &WorkflowId) -> Option<Arc<ValidatedWorkflow>> {
        self.workflows.get(workflow_id).map(|w| Arc::clone(w.value()))
    }

    /// Registered workflows, sorted by id.
    #[must_use]
    pub fn list_workflows(&self) -> Vec<WorkflowSummary> {
        let mut summaries: Vec<WorkflowSummary> = self
            .workflows
            .iter()
            .map(|entry| {
                let definition = entry.value().definition();
                WorkflowSummary {
                    id: entry.key().clone(),
                    name: definition.name.clone(),
                    node_count: definition.nodes.len(),
                    success_rate: self
                        .statistics
                        .get(entry.key())
                        .map_or(0.0, |s| s.success_rate()),
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        summaries
    }

    // -- Execution --

    /// Execute a registered workflow to completion.
    ///
    /// Node failures never surface as `Err`: they are reported in the
    /// returned record. Only an unknown workflow id is an error.
    pub async fn execute(
        &self,
        workflow_id: &WorkflowId,
        trigger: Value,
        context: Value,
    ) -> Result<ExecutionRecord, EngineError> {
        let (workflow, active, cancel) = self.start(workflow_id, None)?;
        Ok(self.drive(workflow, active, cancel, trigger, context).await)
    }

    /// Like [`execute`](Self::execute), cancelled when `cancel` fires.
    pub async fn execute_with_cancellation(
        &self,
        workflow_id: &WorkflowId,
        trigger: Value,
        context: Value,
        cancel: &CancellationToken,
    ) -> Result<ExecutionRecord, EngineError> {
        let (workflow, active, token) = self.start(workflow_id, Some(cancel))?;
        Ok(self.drive(workflow, active, token, trigger, context).await)
    }

    /// Spawn an execution on the runtime and return a handle to it.
    ///
    /// The execution is registered before this returns, so
    /// [`cancel`](Self::cancel) works immediately.
    pub fn submit(
        self: &Arc<Self>,
        workflow_id: &WorkflowId,
        trigger: Value,
        context: Value,
    ) -> Result<ExecutionHandle, EngineError> {
        let (workflow, active, cancel) = self.start(workflow_id, None)?;
        let execution_id = active.execution_id;
        let engine = Arc::clone(self);
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            engine.drive(workflow, active, token, trigger, context).await
        });
        Ok(ExecutionHandle::new(execution_id, cancel, join))
    }

    /// Cancel an in-flight execution. Returns `false` if it is not running.
    pub fn cancel(&self, execution_id: ExecutionId) -> bool {
        match self.running.get(&execution_id) {
            Some(active) => {
                tracing::info!(
                    execution_id = %execution_id,
                    workflow_id = %active.workflow_id,
                    "cancelling execution"
                );
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Ids of executions currently running.
    #[must_use]
    pub fn active_executions(&self) -> Vec<ExecutionId> {
        self.running.iter().map(|e| *e.key()).collect()
    }

    fn start(
        &self,
        workflow_id: &WorkflowId,
        parent: Option<&CancellationToken>,
    ) -> Result<(Arc<ValidatedWorkflow>, ActiveGuard, CancellationToken), EngineError> {
        let workflow = self
            .workflow(workflow_id)
            .ok_or_else(|| EngineError::WorkflowNotFound {
                workflow_id: workflow_id.clone(),
            })?;
        let execution_id = ExecutionId::v4();
        let cancel = parent.map_or_else(CancellationToken::new, CancellationToken::child_token);
        self.running.insert(
            execution_id,
            ActiveExecution {
                workflow_id: workflow_id.clone(),
                cancel: cancel.clone(),
            },
        );
        let active = ActiveGuard {
            running: Arc::clone(&self.running),
            execution_id,
        };
        Ok((workflow, active, cancel))
    }

    async fn drive(
        &self,
        workflow: Arc<ValidatedWorkflow>,
        active: ActiveGuard,
        cancel: CancellationToken,
        trigger: Value,
        context: Value,
    ) -> ExecutionRecord {
        let execution_id = active.execution_id;
        let span = tracing::info_span!(
            "execution",
            execution_id = %execution_id,
            workflow_id = %workflow.id(),
        );
        let run = ExecutionRun::new(&workflow, &self.capabilities, &self.config, execution_id, cancel);
        let record = run.drive(trigger, context).instrument(span).await;

        drop(active);
        self.finish(&record);
        record
    }

    fn finish(&self, record: &ExecutionRecord) {
        self.statistics
            .entry(record.workflow_id.clone())
            .or_default()
            .record(record);

        if self.config.history_limit == 0 {
            return;
        }
        let mut history = self.history.lock();
        history.push_front(Arc::new(record.clone()));
        history.truncate(self.config.history_limit);
    }

    // -- Queries --

    /// Outcome counts for a workflow.
    ///
    /// A registered workflow that never ran reports all zeros.
    pub fn get_statistics(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<WorkflowStatistics, EngineError> {
        if let Some(stats) = self.statistics.get(workflow_id) {
            return Ok(stats.value().clone());
        }
        if self.workflows.contains_key(workflow_id) {
            return Ok(WorkflowStatistics::default());
        }
        Err(EngineError::WorkflowNotFound {
            workflow_id: workflow_id.clone(),
        })
    }

    /// Most recent finished records, newest first, optionally for one workflow.
    #[must_use]
    pub fn recent_executions(
        &self,
        workflow_id: Option<&WorkflowId>,
        limit: usize,
    ) -> Vec<Arc<ExecutionRecord>> {
        self.history
            .lock()
            .iter()
            .filter(|r| workflow_id.is_none_or(|id| &r.workflow_id == id))
            .take(limit)
            .cloned()
            .collect()
    }
}
