//! Error taxonomy for task execution

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::task::TaskId;

/// Result alias for task outcomes.
pub type TaskResult<T> = std::result::Result<T, TaskError>;

/// Terminal failure of a scheduled task.
///
/// Cloneable (the underlying error is `Arc`'d) so a single outcome can settle
/// the caller's handle and be appended to a scheduler's aggregate error log.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The task was cancelled while queued or running
    #[error("task {id} was cancelled")]
    Cancelled { id: TaskId },

    /// The task ran longer than the configured timeout
    #[error("task {id} timed out after {limit:?}")]
    Timeout { id: TaskId, limit: Duration },

    /// The unit of work failed and retries (if any) are exhausted
    #[error("task {id} failed: {source}")]
    Failed {
        id: TaskId,
        #[source]
        source: Arc<anyhow::Error>,
    },
}

impl TaskError {
    /// Create a cancellation error
    pub fn cancelled(id: TaskId) -> Self {
        TaskError::Cancelled { id }
    }

    /// Create a timeout error carrying the configured limit
    pub fn timeout(id: TaskId, limit: Duration) -> Self {
        TaskError::Timeout { id, limit }
    }

    /// Wrap the unit of work's own error
    pub fn failed(id: TaskId, source: anyhow::Error) -> Self {
        TaskError::Failed {
            id,
            source: Arc::new(source),
        }
    }

    /// Id of the task this error belongs to
    pub fn task_id(&self) -> &TaskId {
        match self {
            TaskError::Cancelled { id } => id,
            TaskError::Timeout { id, .. } => id,
            TaskError::Failed { id, .. } => id,
        }
    }

    /// Whether this is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled { .. })
    }

    /// Whether this is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Timeout { .. })
    }
}
