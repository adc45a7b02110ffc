//! Awaitable handle to a submitted task

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{TaskError, TaskResult};
use crate::task::TaskId;

/// The future returned by every submission API.
///
/// Settles exactly once with the task's terminal outcome. Dropping the handle
/// does not cancel the task; the scheduler keeps driving it. If the owning
/// scheduler is dropped before the task settles, the handle resolves to
/// [`TaskError::Cancelled`].
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: TaskId,
    rx: oneshot::Receiver<TaskResult<T>>,
}

impl<T> TaskHandle<T> {
    /// Create a handle together with its settling side.
    pub fn channel(id: TaskId) -> (TaskSettler<T>, TaskHandle<T>) {
        let (tx, rx) = oneshot::channel();
        (
            TaskSettler {
                id: id.clone(),
                tx,
            },
            TaskHandle { id, rx },
        )
    }

    /// Id assigned to the task at submission.
    pub fn id(&self) -> &TaskId {
        &self.id
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = TaskResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // Settler dropped without settling: the scheduler went away.
            Poll::Ready(Err(_)) => Poll::Ready(Err(TaskError::cancelled(self.id.clone()))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Settling side of a [`TaskHandle`].
///
/// Held by the scheduler while the task is queued or running. Settling after
/// the caller dropped the handle is a no-op.
#[derive(Debug)]
pub struct TaskSettler<T> {
    id: TaskId,
    tx: oneshot::Sender<TaskResult<T>>,
}

impl<T> TaskSettler<T> {
    /// Id of the task this settler belongs to.
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Deliver the terminal outcome. Consumes the settler; a task settles
    /// exactly once.
    pub fn settle(self, outcome: TaskResult<T>) {
        let _ = self.tx.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_settles_with_value() {
        let (settler, handle) = TaskHandle::channel(TaskId::new("t1"));
        assert_eq!(handle.id().as_str(), "t1");

        settler.settle(Ok(7));
        assert_eq!(handle.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_handle_settles_with_error() {
        let (settler, handle) = TaskHandle::<u32>::channel(TaskId::new("t1"));

        settler.settle(Err(TaskError::cancelled(TaskId::new("t1"))));
        let err = handle.await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_settler_resolves_to_cancelled() {
        let (settler, handle) = TaskHandle::<u32>::channel(TaskId::new("t1"));
        drop(settler);

        let err = handle.await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.task_id().as_str(), "t1");
    }

    #[tokio::test]
    async fn test_settle_after_handle_dropped_is_noop() {
        let (settler, handle) = TaskHandle::channel(TaskId::new("t1"));
        drop(handle);
        settler.settle(Ok(1));
    }
}
