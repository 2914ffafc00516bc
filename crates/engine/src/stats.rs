//! Per-workflow execution statistics.

use std::time::Duration;

use apollo_execution::{ExecutionRecord, ExecutionStatus};
use serde::{Deserialize, Serialize};

/// Aggregate outcome counts for one workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStatistics {
    /// Finished executions.
    pub total: u64,
    /// Executions that completed.
    pub completed: u64,
    /// Executions that ended `Failed`.
    pub failed: u64,
    /// Executions that ended `RolledBack`.
    pub rolled_back: u64,
    /// Summed wall-clock time of completed executions.
    pub completed_duration: Duration,
}

impl WorkflowStatistics {
    /// Fold a finished record into the counters.
    pub fn record(&mut self, record: &ExecutionRecord) {
        self.total += 1;
        match record.status {
            ExecutionStatus::Completed => {
                self.completed += 1;
                self.completed_duration += record.duration().unwrap_or_default();
            }
            ExecutionStatus::Failed => self.failed += 1,
            ExecutionStatus::RolledBack => self.rolled_back += 1,
            ExecutionStatus::Pending | ExecutionStatus::Running => {}
        }
    }

    /// `completed / total`, or `0.0` before any execution finished.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    /// Mean duration of completed executions.
    #[must_use]
    pub fn avg_duration(&self) -> Option<Duration> {
        if self.completed == 0 {
            return None;
        }
        let nanos = self.completed_duration.as_nanos() / u128::from(self.completed);
        Some(Duration::from_nanos(nanos as u64))
    }
}
