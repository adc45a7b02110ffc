//! Dual-queue scheduler
//!
//! Two FIFO lanes (urgent, normal) drained under a concurrency limit. Urgent
//! always wins at each scheduling decision, but an already-running task is
//! never interrupted. No retry, timeout, or aging: this is a deliberately
//! minimal building block next to [`crate::executor::Executor`].

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use taskline_core::{TaskError, TaskHandle, TaskId, TaskSettler};

/// Configuration for the dual-queue scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualQueueConfig {
    /// Maximum simultaneous in-flight tasks
    pub concurrency: usize,
}

impl Default for DualQueueConfig {
    fn default() -> Self {
        Self { concurrency: 2 }
    }
}

impl DualQueueConfig {
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

/// Read-only snapshot of the scheduler's queues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DualQueueStatus {
    pub running: usize,
    pub urgent_len: usize,
    pub normal_len: usize,
}

#[derive(Debug, Clone, Copy)]
enum Lane {
    Urgent,
    Normal,
}

type Work<T> = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<T>> + Send>;

struct LaneTask<T> {
    id: TaskId,
    lane: Lane,
    work: Work<T>,
    settler: TaskSettler<T>,
}

struct State<T> {
    urgent: VecDeque<LaneTask<T>>,
    normal: VecDeque<LaneTask<T>>,
    running: usize,
}

struct Inner<T> {
    concurrency: usize,
    state: Mutex<State<T>>,
}

/// Two-tier priority scheduler: urgent preempts normal at the next
/// scheduling decision.
///
/// Cheap to clone; clones share the same lanes. Must be used within a tokio
/// runtime.
pub struct DualQueueScheduler<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for DualQueueScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> DualQueueScheduler<T>
where
    T: Send + 'static,
{
    /// Create a scheduler with the given configuration.
    pub fn new(config: DualQueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                concurrency: config.concurrency.max(1),
                state: Mutex::new(State {
                    urgent: VecDeque::new(),
                    normal: VecDeque::new(),
                    running: 0,
                }),
            }),
        }
    }

    /// Append a task to the normal lane.
    ///
    /// A failure inside the task settles only the returned handle; the
    /// scheduler keeps draining.
    pub fn add_normal<F, Fut>(&self, work: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.add(Lane::Normal, work)
    }

    /// Append a task to the urgent lane.
    pub fn add_urgent<F, Fut>(&self, work: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.add(Lane::Urgent, work)
    }

    fn add<F, Fut>(&self, lane: Lane, work: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let id = TaskId::generate();
        let (settler, handle) = TaskHandle::channel(id.clone());
        let task = LaneTask {
            id: id.clone(),
            lane,
            work: Box::new(move || Box::pin(work())),
            settler,
        };
        {
            let mut state = self.inner.state.lock();
            match lane {
                Lane::Urgent => {
                    state.urgent.push_back(task);
                    debug!(id = %id, queued = state.urgent.len(), "urgent task queued");
                }
                Lane::Normal => {
                    state.normal.push_back(task);
                    debug!(id = %id, queued = state.normal.len(), "normal task queued");
                }
            }
        }
        self.inner.drain();
        handle
    }

    /// Read-only snapshot of lane lengths and the running count.
    pub fn status(&self) -> DualQueueStatus {
        let state = self.inner.state.lock();
        DualQueueStatus {
            running: state.running,
            urgent_len: state.urgent.len(),
            normal_len: state.normal.len(),
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
                // Urgent lane always wins at each scheduling decision.
                let task = match state.urgent.pop_front() {
                    Some(task) => task,
                    None => match state.normal.pop_front() {
                        Some(task) => task,
                        None => break,
                    },
                };
                state.running += 1;
                starts.push(task);
            }
        }
        for task in starts {
            let LaneTask {
                id,
                lane,
                work,
                settler,
            } = task;
            debug!(id = %id, lane = ?lane, "starting task");
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
