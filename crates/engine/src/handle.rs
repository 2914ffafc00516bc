//! Handle to an execution running on its own task.

use apollo_core::ExecutionId;
use apollo_execution::ExecutionRecord;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

/// Returned by [`WorkflowEngine::submit`](crate::WorkflowEngine::submit).
#[derive(Debug)]
pub struct ExecutionHandle {
    execution_id: ExecutionId,
    cancel: CancellationToken,
    join: JoinHandle<ExecutionRecord>,
}

impl ExecutionHandle {
    pub(crate) fn new(
        execution_id: ExecutionId,
        cancel: CancellationToken,
        join: JoinHandle<ExecutionRecord>,
    ) -> Self {
        Self {
            execution_id,
            cancel,
            join,
        }
    }

    /// Id of the spawned execution.
    #[must_use]
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Request cancellation. The run settles as `Failed`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the terminal record.
    pub async fn join(self) -> Result<ExecutionRecord, EngineError> {
        self.join
            .await
            .map_err(|e| EngineError::TaskPanicked(e.to_string()))
    }
}
