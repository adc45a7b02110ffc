//! Bounded concurrency executor
//!
//! Executes submitted units of work under a global concurrency ceiling, with
//! per-task timeout, retry-with-delay, and individual or group cancellation.
//!
//! The executor is bound at construction to a single unit-of-work function;
//! each submission supplies the argument payload for one invocation. Callers
//! observe outcomes exclusively through the [`TaskHandle`] returned by
//! [`Executor::submit`], plus the aggregate results/errors logs.
//!
//! # Example
//!
//! ```ignore
//! let executor = Executor::new(
//!     |url: String, _token| async move { fetch(url).await },
//!     ExecutorConfig::default()
//!         .with_concurrency(4)
//!         .with_timeout(Duration::from_secs(5))
//!         .with_retries(2),
//! );
//!
//! let page = executor.submit("https://example.com".into()).await?;
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use taskline_core::{
    CancelToken, TaskError, TaskHandle, TaskId, TaskRecord, TaskSettler,
};

use crate::serde_util::{duration_millis, option_duration_millis};

/// Configuration for the executor
///
/// Defaults are serial execution with no timeout and no retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum simultaneous in-flight tasks
    pub concurrency: usize,

    /// Fail a running task after this long (None = disabled)
    #[serde(with = "option_duration_millis")]
    pub timeout: Option<Duration>,

    /// Maximum retry attempts after a failure
    pub retries: u32,

    /// Delay before re-attempting a failed task
    #[serde(with = "duration_millis")]
    pub retry_delay: Duration,

    /// Whether submission immediately triggers scheduling
    pub auto_start: bool,

    /// Whether an exhausted-retry failure cancels the entire batch
    pub abort_on_error: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            timeout: None,
            retries: 0,
            retry_delay: Duration::from_millis(1000),
            auto_start: true,
            abort_on_error: false,
        }
    }
}

impl ExecutorConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum concurrency (clamped to at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the per-task timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disable the per-task timeout
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Set the maximum retry attempts
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the delay before re-attempting a failed task
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set whether submission immediately triggers scheduling
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Set whether an exhausted-retry failure cancels the batch
    pub fn with_abort_on_error(mut self, abort: bool) -> Self {
        self.abort_on_error = abort;
        self
    }
}

/// Observation callbacks, all optional.
///
/// `on_error` defaults to logging via `tracing::error!` when not supplied;
/// the others default to no-ops.
pub struct ExecutorCallbacks<T> {
    on_success: Option<Arc<dyn Fn(&TaskId, &T) + Send + Sync>>,
    on_error: Option<Arc<dyn Fn(&TaskId, &TaskError) + Send + Sync>>,
    on_complete: Option<Arc<dyn Fn() + Send + Sync>>,
    on_cancel: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl<T> Default for ExecutorCallbacks<T> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
            on_complete: None,
            on_cancel: None,
        }
    }
}

impl<T> Clone for ExecutorCallbacks<T> {
    fn clone(&self) -> Self {
        Self {
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            on_complete: self.on_complete.clone(),
            on_cancel: self.on_cancel.clone(),
        }
    }
}

impl<T> fmt::Debug for ExecutorCallbacks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorCallbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_cancel", &self.on_cancel.is_some())
            .finish()
    }
}

impl<T> ExecutorCallbacks<T> {
    /// Create an empty callback set
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoked with each task's id and value on success
    pub fn on_success(mut self, f: impl Fn(&TaskId, &T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    /// Invoked with each task's id and terminal error
    pub fn on_error(mut self, f: impl Fn(&TaskId, &TaskError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Invoked once per idle transition reached by normal draining
    pub fn on_complete(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(f));
        self
    }

    /// Invoked when tasks are cancelled (individually or via `cancel_all`)
    pub fn on_cancel(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_cancel = Some(Arc::new(f));
        self
    }
}

/// A successful terminal outcome recorded in the results log
#[derive(Debug, Clone)]
pub struct TaskSuccess<T> {
    pub id: TaskId,
    pub value: T,
    pub at: DateTime<Utc>,
}

/// A failed terminal outcome recorded in the errors log
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub id: TaskId,
    pub error: TaskError,
    pub at: DateTime<Utc>,
}

type WorkFn<A, T> = Arc<dyn Fn(A, CancelToken) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

struct QueuedTask<A, T> {
    record: TaskRecord<A>,
    settler: TaskSettler<T>,
}

struct RunningTask<A, T> {
    record: TaskRecord<A>,
    settler: TaskSettler<T>,
    token: CancelToken,
}

struct State<A, T> {
    queue: VecDeque<QueuedTask<A, T>>,
    running: HashMap<TaskId, RunningTask<A, T>>,
    paused: bool,
    results: Vec<TaskSuccess<T>>,
    errors: Vec<TaskFailure>,
}

struct Inner<A, T> {
    work: WorkFn<A, T>,
    config: ExecutorConfig,
    callbacks: ExecutorCallbacks<T>,
    state: Mutex<State<A, T>>,
}

enum Attempt<T> {
    Success(T),
    Failed(anyhow::Error),
    TimedOut(Duration),
    Cancelled,
}

/// Concurrency-limited async executor with cancellation, retry, and timeout.
///
/// Cheap to clone; clones share the same queue and running set. Must be used
/// within a tokio runtime: submissions spawn their work onto the current
/// runtime.
pub struct Executor<A, T> {
    inner: Arc<Inner<A, T>>,
}

impl<A, T> Clone for Executor<A, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T> Executor<A, T>
where
    A: Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    /// Create an executor bound to a unit-of-work function.
    ///
    /// The function receives the submitted arguments plus a [`CancelToken`]
    /// it may observe cooperatively.
    pub fn new<F, Fut>(work: F, config: ExecutorConfig) -> Self
    where
        F: Fn(A, CancelToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::with_callbacks(work, config, ExecutorCallbacks::new())
    }

    /// Create an executor with observation callbacks.
    pub fn with_callbacks<F, Fut>(
        work: F,
        config: ExecutorConfig,
        callbacks: ExecutorCallbacks<T>,
    ) -> Self
    where
        F: Fn(A, CancelToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let paused = !config.auto_start;
        Self {
            inner: Arc::new(Inner {
                work: Arc::new(move |args, token| Box::pin(work(args, token))),
                config,
                callbacks,
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    running: HashMap::new(),
                    paused,
                    results: Vec::new(),
                    errors: Vec::new(),
                }),
            }),
        }
    }

    /// Enqueue a task; returns a handle that settles exactly once.
    pub fn submit(&self, args: A) -> TaskHandle<T> {
        let record = TaskRecord::new(args);
        let id = record.id.clone();
        let (settler, handle) = TaskHandle::channel(id.clone());
        {
            let mut state = self.inner.state.lock();
            state.queue.push_back(QueuedTask { record, settler });
            debug!(id = %id, queued = state.queue.len(), "task submitted");
        }
        self.inner.drain();
        handle
    }

    /// Cancel a single task by id.
    ///
    /// A queued task is removed and its handle rejected; a running task has
    /// its token signalled, its handle rejected, and its slot freed
    /// immediately. Returns whether a task was found. Unknown or completed
    /// ids are a no-op returning `false`.
    pub fn cancel(&self, id: &TaskId) -> bool {
        let found = {
            let mut state = self.inner.state.lock();
            if let Some(pos) = state.queue.iter().position(|t| &t.record.id == id) {
                if let Some(task) = state.queue.remove(pos) {
                    task.settler.settle(Err(TaskError::cancelled(id.clone())));
                }
                true
            } else if let Some(task) = state.running.remove(id) {
                task.token.cancel();
                task.settler.settle(Err(TaskError::cancelled(id.clone())));
                true
            } else {
                false
            }
        };
        if found {
            debug!(id = %id, "task cancelled");
            if let Some(callback) = &self.inner.callbacks.on_cancel {
                callback();
            }
            self.inner.drain();
        }
        found
    }

    /// Cancel every running and queued task; every pending handle rejects
    /// with [`TaskError::Cancelled`] and the running count resets to 0.
    pub fn cancel_all(&self) {
        self.inner.cancel_all();
    }

    /// Begin processing the queue (for `auto_start = false` executors).
    pub fn start(&self) {
        self.resume();
    }

    /// Stop new tasks from starting; in-flight tasks continue.
    pub fn pause(&self) {
        self.inner.state.lock().paused = true;
        debug!("executor paused");
    }

    /// Resume processing and re-trigger the scheduling pass.
    pub fn resume(&self) {
        {
            self.inner.state.lock().paused = false;
        }
        debug!("executor resumed");
        self.inner.drain();
    }

    /// Number of tasks currently in flight.
    pub fn running_count(&self) -> usize {
        self.inner.state.lock().running.len()
    }

    /// Number of tasks waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Whether nothing is running and nothing is queued.
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock();
        state.running.is_empty() && state.queue.is_empty()
    }

    /// Snapshot of the append-only results log.
    pub fn results(&self) -> Vec<TaskSuccess<T>> {
        self.inner.state.lock().results.clone()
    }

    /// Snapshot of the append-only errors log.
    pub fn errors(&self) -> Vec<TaskFailure> {
        self.inner.state.lock().errors.clone()
    }

    /// Clear both aggregate logs.
    pub fn clear_history(&self) {
        let mut state = self.inner.state.lock();
        state.results.clear();
        state.errors.clear();
    }

    /// The configuration this executor was created with.
    pub fn config(&self) -> &ExecutorConfig {
        &self.inner.config
    }
}

impl<A, T> Inner<A, T>
where
    A: Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    /// Scheduling pass: start queued tasks while slots are free.
    ///
    /// Iterative by construction; settlement paths call `drain` again from
    /// the spawned task's context, so stack depth stays constant no matter
    /// how many tasks complete in sequence.
    fn drain(self: &Arc<Self>) {
        let mut starts = Vec::new();
        {
            let mut state = self.state.lock();
            if state.paused {
                return;
            }
            while state.running.len() < self.config.concurrency {
                let Some(task) = state.queue.pop_front() else {
                    break;
                };
                let token = CancelToken::new();
                let id = task.record.id.clone();
                let args = task.record.args.clone();
                state.running.insert(
                    id.clone(),
                    RunningTask {
                        record: task.record,
                        settler: task.settler,
                        token: token.clone(),
                    },
                );
                starts.push((id, args, token));
            }
        }
        for (id, args, token) in starts {
            debug!(id = %id, "starting task");
            let inner = Arc::clone(self);
            tokio::spawn(inner.run_task(id, args, token));
        }
    }

    /// Drive one attempt of a task: race the unit of work against the
    /// optional timeout and the cancellation signal.
    async fn run_task(self: Arc<Self>, id: TaskId, args: A, token: CancelToken) {
        let fut = (self.work)(args, token.clone());
        let attempt = async {
            match self.config.timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(Ok(value)) => Attempt::Success(value),
                    Ok(Err(err)) => Attempt::Failed(err),
                    Err(_) => Attempt::TimedOut(limit),
                },
                None => match fut.await {
                    Ok(value) => Attempt::Success(value),
                    Err(err) => Attempt::Failed(err),
                },
            }
        };
        let outcome = tokio::select! {
            _ = token.cancelled() => Attempt::Cancelled,
            outcome = attempt => outcome,
        };

        match outcome {
            // cancel() already settled the handle and freed the slot.
            Attempt::Cancelled => {}
            Attempt::Success(value) => self.finish_success(&id, value),
            Attempt::Failed(err) => self.finish_failure(&id, Err(err), &token).await,
            Attempt::TimedOut(limit) => {
                debug!(id = %id, limit = ?limit, "task timed out");
                self.finish_failure(&id, Ok(limit), &token).await;
            }
        }
    }

    fn finish_success(self: &Arc<Self>, id: &TaskId, value: T) {
        let became_idle = {
            let mut state = self.state.lock();
            let Some(task) = state.running.remove(id) else {
                return; // cancelled while settling
            };
            state.results.push(TaskSuccess {
                id: id.clone(),
                value: value.clone(),
                at: Utc::now(),
            });
            task.settler.settle(Ok(value.clone()));
            state.running.is_empty() && state.queue.is_empty()
        };
        debug!(id = %id, "task succeeded");
        if let Some(callback) = &self.callbacks.on_success {
            callback(id, &value);
        }
        self.drain();
        if became_idle {
            if let Some(callback) = &self.callbacks.on_complete {
                callback();
            }
        }
    }

    /// Handle a failed or timed-out attempt. `cause` is `Ok(limit)` for a
    /// timeout and `Err(source)` for a unit-of-work failure.
    async fn finish_failure(
        self: &Arc<Self>,
        id: &TaskId,
        cause: Result<Duration, anyhow::Error>,
        token: &CancelToken,
    ) {
        let retry = {
            let mut state = self.state.lock();
            match state.running.get_mut(id) {
                None => return, // cancelled while settling
                Some(task) => {
                    if task.record.retries < self.config.retries && !token.is_cancelled() {
                        task.record.retries += 1;
                        true
                    } else {
                        false
                    }
                }
            }
        };

        if retry {
            debug!(id = %id, delay = ?self.config.retry_delay, "retrying task after delay");
            // The slot stays held through the delay: the task still counts
            // as in flight for concurrency purposes.
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(self.config.retry_delay) => {}
            }
            {
                let mut state = self.state.lock();
                let Some(task) = state.running.remove(id) else {
                    return;
                };
                // Retries go to the front of the queue, ahead of
                // never-attempted tasks.
                state.queue.push_front(QueuedTask {
                    record: task.record,
                    settler: task.settler,
                });
            }
            self.drain();
            return;
        }

        let error = match cause {
            Ok(limit) => TaskError::timeout(id.clone(), limit),
            Err(source) => TaskError::failed(id.clone(), source),
        };

        let became_idle = {
            let mut state = self.state.lock();
            let Some(task) = state.running.remove(id) else {
                return;
            };
            state.errors.push(TaskFailure {
                id: id.clone(),
                error: error.clone(),
                at: Utc::now(),
            });
            task.settler.settle(Err(error.clone()));
            state.running.is_empty() && state.queue.is_empty()
        };

        match &self.callbacks.on_error {
            Some(callback) => callback(id, &error),
            None => error!(id = %id, error = %error, "task failed"),
        }

        if self.config.abort_on_error {
            self.cancel_all();
            return;
        }

        self.drain();
        if became_idle {
            if let Some(callback) = &self.callbacks.on_complete {
                callback();
            }
        }
    }

    fn cancel_all(self: &Arc<Self>) {
        let cancelled = {
            let mut state = self.state.lock();
            let mut cancelled = 0usize;
            while let Some(task) = state.queue.pop_front() {
                let id = task.record.id.clone();
                task.settler.settle(Err(TaskError::cancelled(id)));
                cancelled += 1;
            }
            for (id, task) in state.running.drain() {
                task.token.cancel();
                task.settler.settle(Err(TaskError::cancelled(id)));
                cancelled += 1;
            }
            cancelled
        };
        if cancelled > 0 {
            warn!(cancelled, "cancelled all tasks");
            if let Some(callback) = &self.callbacks.on_cancel {
                callback();
            }
        }
    }
}
