//! Static priority scheduler
//!
//! A single queue kept sorted by a fixed numeric priority (higher runs
//! first), ties broken by arrival order. Insertion finds the first queued
//! task with a strictly lower priority and splices in front of it, so
//! equal-priority tasks keep submission order.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use taskline_core::{TaskError, TaskHandle, TaskId, TaskSettler};

/// Configuration for the static priority scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityConfig {
    /// Maximum simultaneous in-flight tasks
    pub concurrency: usize,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self { concurrency: 2 }
    }
}

impl PriorityConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum concurrency (clamped to at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

/// A queued task as reported by [`PriorityScheduler::status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedPriorityTask {
    pub id: TaskId,
    pub priority: i64,
}

/// Read-only snapshot of the scheduler state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityStatus {
    pub running: usize,
    pub queue_len: usize,
    pub queued: Vec<QueuedPriorityTask>,
}

type Work<T> = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<T>> + Send>;

struct PrioritizedTask<T> {
    id: TaskId,
    priority: i64,
    work: Work<T>,
    settler: TaskSettler<T>,
}

struct State<T> {
    queue: VecDeque<PrioritizedTask<T>>,
    running: usize,
    counter: u64,
}

struct Inner<T> {
    concurrency: usize,
    state: Mutex<State<T>>,
}

/// Concurrency-limited scheduler ordering tasks by fixed numeric priority.
///
/// Cheap to clone; clones share the same queue. Must be used within a tokio
/// runtime.
pub struct PriorityScheduler<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for PriorityScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PriorityScheduler<T>
where
    T: Send + 'static,
{
    /// Create a scheduler with the given configuration.
    pub fn new(config: PriorityConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                concurrency: config.concurrency.max(1),
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    running: 0,
                    counter: 0,
                }),
            }),
        }
    }

    /// Add a task with a fixed priority (higher runs first).
    ///
    /// When `id` is `None` a counter-derived id (`task-1`, `task-2`, ...) is
    /// assigned. A failure inside the task settles only the returned handle.
    pub fn add_task<F, Fut>(&self, work: F, priority: i64, id: Option<TaskId>) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let handle = {
            let mut state = self.inner.state.lock();
            let id = id.unwrap_or_else(|| {
                state.counter += 1;
                TaskId::new(format!("task-{}", state.counter))
            });
            let (settler, handle) = TaskHandle::channel(id.clone());
            let task = PrioritizedTask {
                id: id.clone(),
                priority,
                work: Box::new(move || Box::pin(work())),
                settler,
            };

            // First queued task with a strictly lower priority; equal
            // priorities stay in submission order.
            match state.queue.iter().position(|t| t.priority < priority) {
                Some(pos) => {
                    debug!(id = %id, priority, pos, "task queued");
                    state.queue.insert(pos, task);
                }
                None => {
                    debug!(id = %id, priority, "task queued at end");
                    state.queue.push_back(task);
                }
            }
            handle
        };
        self.inner.drain();
        handle
    }

    /// Read-only snapshot: running count, queue length, and queued tasks in
    /// execution order.
    pub fn status(&self) -> PriorityStatus {
        let state = self.inner.state.lock();
        PriorityStatus {
            running: state.running,
            queue_len: state.queue.len(),
            queued: state
                .queue
                .iter()
                .map(|t| QueuedPriorityTask {
                    id: t.id.clone(),
                    priority: t.priority,
                })
                .collect(),
        }
    }
}

impl<T> Inner<T>
where
    T: Send + 'static,
{
    fn drain(self: &Arc<Self>) {
        let mut starts = Vec::new();
        {
            let mut state = self.state.lock();
            while state.running < self.concurrency {
                let Some(task) = state.queue.pop_front() else {
                    break;
                };
                state.running += 1;
                starts.push(task);
            }
        }
        for task in starts {
            let PrioritizedTask {
                id,
                priority,
                work,
                settler,
            } = task;
            debug!(id = %id, priority, "starting task");
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                match (work)().await {
                    Ok(value) => settler.settle(Ok(value)),
                    Err(err) => {
                        debug!(id = %id, error = %err, "task failed");
                        settler.settle(Err(TaskError::failed(id.clone(), err)));
                    }
                }
                inner.finish();
            });
        }
    }

    fn finish(self: &Arc<Self>) {
        {
            self.state.lock().running -= 1;
        }
        self.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop<T: Send + 'static>(
        value: T,
    ) -> impl FnOnce() -> futures::future::Ready<anyhow::Result<T>> + Send + 'static {
        move || futures::future::ready(Ok(value))
    }

    #[test]
    fn test_config_default() {
        assert_eq!(PriorityConfig::default().concurrency, 2);
    }

    #[tokio::test]
    async fn test_insertion_keeps_descending_order() {
        // Zero slots free: occupy the single slot so everything else queues.
        let scheduler = PriorityScheduler::new(PriorityConfig::new().with_concurrency(1));
        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();
        let gate = scheduler.add_task(
            move || async move {
                gate_rx.await.ok();
                Ok::<_, anyhow::Error>(0)
            },
            100,
            Some(TaskId::new("gate")),
        );

        scheduler.add_task(noop(1), 1, Some(TaskId::new("low")));
        scheduler.add_task(noop(2), 10, Some(TaskId::new("high")));
        scheduler.add_task(noop(3), 5, Some(TaskId::new("mid")));

        let status = scheduler.status();
        let order: Vec<&str> = status.queued.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec!["high", "mid", "low"]);
        assert_eq!(status.running, 1);
        assert_eq!(status.queue_len, 3);

        gate_tx.send(()).ok();
        gate.await.unwrap();
    }

    #[tokio::test]
    async fn test_default_ids_are_counter_derived() {
        let scheduler = PriorityScheduler::new(PriorityConfig::new().with_concurrency(1));
        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();
        scheduler.add_task(
            move || async move {
                gate_rx.await.ok();
                Ok::<_, anyhow::Error>(0)
            },
            0,
            None,
        );

        let second = scheduler.add_task(noop(2), 0, None);
        assert_eq!(second.id().as_str(), "task-2");
        assert_eq!(scheduler.status().queued[0].id.as_str(), "task-2");

        gate_tx.send(()).ok();
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let scheduler = PriorityScheduler::new(PriorityConfig::new().with_concurrency(1));

        let failing = scheduler.add_task(
            || async { Err::<u32, _>(anyhow::anyhow!("boom")) },
            10,
            None,
        );
        let after = scheduler.add_task(noop(7), 1, None);

        assert!(failing.await.is_err());
        assert_eq!(after.await.unwrap(), 7);
        assert_eq!(scheduler.status().running, 0);
    }
}
