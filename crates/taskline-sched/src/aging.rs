//! Dynamic-priority (aging) scheduler
//!
//! Prevents starvation by raising a task's effective priority the longer it
//! waits: `current = base + min(max_boost, waited_ms * aging_rate)`. Any
//! task waiting past the starvation threshold is forced straight to the
//! starvation priority and scheduled next regardless of nominal priorities.
//!
//! Priorities are recomputed and the queue re-sorted on every scheduling
//! pass, so ordering is not stable across passes. Completion of the actual
//! unit of work is the single point of forward progress: nothing else
//! advances the queue while all slots are occupied.

use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use taskline_core::{TaskError, TaskHandle, TaskId, TaskSettler};

use crate::serde_util::duration_millis;

/// Configuration for the aging scheduler.
///
/// The boost parameters encode how aggressively starvation is corrected, so
/// they are named and overridable rather than baked in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingConfig {
    /// Maximum simultaneous in-flight tasks
    pub concurrency: usize,

    /// Wait time past which a task is considered starved
    #[serde(with = "duration_millis")]
    pub starvation_threshold: Duration,

    /// Cap on the wait-time priority boost
    pub max_boost: f64,

    /// Priority gained per waited millisecond
    pub aging_rate: f64,

    /// Priority forced onto a starved task
    pub starvation_priority: f64,
}

impl Default for AgingConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            starvation_threshold: Duration::from_millis(5000),
            max_boost: 10.0,
            aging_rate: 0.005,
            starvation_priority: 10.0,
        }
    }
}

impl AgingConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum concurrency (clamped to at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the starvation threshold
    pub fn with_starvation_threshold(mut self, threshold: Duration) -> Self {
        self.starvation_threshold = threshold;
        self
    }

    /// Set the cap on the wait-time boost
    pub fn with_max_boost(mut self, max_boost: f64) -> Self {
        self.max_boost = max_boost;
        self
    }

    /// Set the priority gained per waited millisecond
    pub fn with_aging_rate(mut self, rate: f64) -> Self {
        self.aging_rate = rate;
        self
    }

    /// Set the priority forced onto starved tasks
    pub fn with_starvation_priority(mut self, priority: f64) -> Self {
        self.starvation_priority = priority;
        self
    }

    /// Effective priority for a task with the given base after waiting.
    ///
    /// Monotonically non-decreasing in wait time, capped at `max_boost`
    /// above the base.
    pub fn effective_priority(&self, base: f64, waited: Duration) -> f64 {
        let boost = (waited.as_millis() as f64 * self.aging_rate).min(self.max_boost);
        base + boost
    }
}

/// A queued task as reported by [`AgingScheduler::queue_status`]
#[derive(Debug, Clone)]
pub struct QueuedAgingTask {
    pub id: TaskId,
    pub priority: f64,
    pub waiting: Duration,
}

/// A task currently holding a slot
#[derive(Debug, Clone)]
pub struct RunningAgingTask {
    pub id: TaskId,
    /// Effective priority at the moment it was scheduled
    pub priority: f64,
    pub started_at: Instant,
}

type Work<T> = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<T>> + Send>;

struct AgingEntry<T> {
    id: TaskId,
    base_priority: f64,
    current_priority: f64,
    arrived_at: Instant,
    work: Work<T>,
    settler: TaskSettler<T>,
}

struct State<T> {
    queue: Vec<AgingEntry<T>>,
    running: Vec<RunningAgingTask>,
}

struct Inner<T> {
    config: AgingConfig,
    state: Mutex<State<T>>,
}

/// Starvation-free priority scheduler with linear aging.
///
/// Cheap to clone; clones share the same queue. Must be used within a tokio
/// runtime.
pub struct AgingScheduler<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for AgingScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> AgingScheduler<T>
where
    T: Send + 'static,
{
    /// Create a scheduler with the given configuration.
    pub fn new(config: AgingConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    queue: Vec::new(),
                    running: Vec::new(),
                }),
            }),
        }
    }

    /// Add a task with a base priority (higher runs first).
    ///
    /// If the task's current priority already exceeds the queue head's, it
    /// is inserted at the front ("insertion jump"); otherwise it is
    /// appended. Triggers a scheduling pass either way.
    pub fn add_task<F, Fut>(&self, id: TaskId, base_priority: f64, work: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let (settler, handle) = TaskHandle::channel(id.clone());
        let entry = AgingEntry {
            id: id.clone(),
            base_priority,
            current_priority: base_priority,
            arrived_at: Instant::now(),
            work: Box::new(move || Box::pin(work())),
            settler,
        };
        {
            let mut state = self.inner.state.lock();
            let jumps = state
                .queue
                .first()
                .is_some_and(|head| entry.current_priority > head.current_priority);
            if jumps {
                debug!(id = %id, priority = base_priority, "insertion jump");
                state.queue.insert(0, entry);
            } else {
                debug!(id = %id, priority = base_priority, "task queued");
                state.queue.push(entry);
            }
        }
        self.inner.drain();
        handle
    }

    /// Insert a task at the front of the queue unconditionally, bypassing
    /// priority comparison. Escape hatch for out-of-band urgency.
    pub fn add_urgent_task<F, Fut>(&self, id: TaskId, base_priority: f64, work: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let (settler, handle) = TaskHandle::channel(id.clone());
        let entry = AgingEntry {
            id: id.clone(),
            base_priority,
            current_priority: base_priority,
            arrived_at: Instant::now(),
            work: Box::new(move || Box::pin(work())),
            settler,
        };
        {
            let mut state = self.inner.state.lock();
            debug!(id = %id, priority = base_priority, "urgent task jumped the queue");
            state.queue.insert(0, entry);
        }
        self.inner.drain();
        handle
    }

    /// Read-only snapshot of the queue with freshly computed priorities and
    /// wait times.
    pub fn queue_status(&self) -> Vec<QueuedAgingTask> {
        let now = Instant::now();
        let state = self.inner.state.lock();
        state
            .queue
            .iter()
            .map(|entry| {
                let waiting = now.saturating_duration_since(entry.arrived_at);
                QueuedAgingTask {
                    id: entry.id.clone(),
                    priority: self.inner.config.effective_priority(entry.base_priority, waiting),
                    waiting,
                }
            })
            .collect()
    }

    /// Tasks currently holding a slot.
    pub fn running_tasks(&self) -> Vec<RunningAgingTask> {
        self.inner.state.lock().running.clone()
    }

    /// Number of tasks currently in flight.
    pub fn running_count(&self) -> usize {
        self.inner.state.lock().running.len()
    }
}

impl<T> Inner<T>
where
    T: Send + 'static,
{
    /// Scheduling pass: while a slot is free, recompute every queued task's
    /// priority, re-sort, apply the starvation override, and start the head.
    fn drain(self: &Arc<Self>) {
        loop {
            let entry = {
                let mut state = self.state.lock();
                if state.running.len() >= self.config.concurrency || state.queue.is_empty() {
                    return;
                }

                let now = Instant::now();
                for entry in state.queue.iter_mut() {
                    let waiting = now.saturating_duration_since(entry.arrived_at);
                    entry.current_priority =
                        self.config.effective_priority(entry.base_priority, waiting);
                }
                Self::sort_descending(&mut state.queue);

                // Hard override: anything past the threshold goes straight
                // to the starvation priority.
                let starved = state.queue.iter_mut().find(|entry| {
                    now.saturating_duration_since(entry.arrived_at) > self.config.starvation_threshold
                });
                if let Some(entry) = starved {
                    warn!(
                        id = %entry.id,
                        waited = ?now.saturating_duration_since(entry.arrived_at),
                        "starvation override"
                    );
                    entry.current_priority = self.config.starvation_priority;
                    Self::sort_descending(&mut state.queue);
                }

                let entry = state.queue.remove(0);
                state.running.push(RunningAgingTask {
                    id: entry.id.clone(),
                    priority: entry.current_priority,
                    started_at: now,
                });
                entry
            };

            let AgingEntry {
                id,
                current_priority,
                arrived_at,
                work,
                settler,
                ..
            } = entry;
            debug!(
                id = %id,
                priority = current_priority,
                waited = ?arrived_at.elapsed(),
                "starting task"
            );
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                match (work)().await {
                    Ok(value) => settler.settle(Ok(value)),
                    Err(err) => {
                        debug!(id = %id, error = %err, "task failed");
                        settler.settle(Err(TaskError::failed(id.clone(), err)));
                    }
                }
                inner.complete(&id);
            });
        }
    }

    /// Mark a task completed and free its slot. The single point of forward
    /// progress: triggers the next scheduling pass.
    fn complete(self: &Arc<Self>, id: &TaskId) {
        {
            let mut state = self.state.lock();
            // Ids are caller-supplied and may repeat; each settlement frees
            // exactly one slot.
            if let Some(pos) = state.running.iter().position(|task| &task.id == id) {
                state.running.remove(pos);
            }
        }
        debug!(id = %id, "task completed");
        self.drain();
    }

    fn sort_descending(queue: &mut [AgingEntry<T>]) {
        queue.sort_by(|a, b| {
            b.current_priority
                .partial_cmp(&a.current_priority)
                .unwrap_or(Ordering::Equal)
        });
    }
}
