// Bounded-concurrency task scheduling
//
// This crate provides four scheduler variants over shared taskline-core
// primitives:
// - executor: FIFO executor with a concurrency ceiling, per-task timeout,
//   retry-with-delay, and individual/group cancellation
// - dual_queue: two FIFO lanes; urgent always drains before normal
// - priority: single queue kept sorted by a fixed numeric priority, ties
//   stable by arrival order
// - aging: dynamic priority that grows with wait time, with a hard
//   starvation override
//
// Key design decisions:
// - All concurrency is logical: a scheduler bounds how many futures may be
//   simultaneously in flight, not parallel CPU work
// - A task suspends by returning a pending future; schedulers resume via the
//   future's settlement, never by polling state
// - Failures settle only the failing task's handle; a scheduler keeps
//   draining the rest
// - Only the executor exposes cancellation and timeout; the priority
//   variants are deliberately smaller building blocks

pub mod aging;
pub mod dual_queue;
pub mod executor;
pub mod priority;

mod serde_util;

pub use aging::{AgingConfig, AgingScheduler, QueuedAgingTask, RunningAgingTask};
pub use dual_queue::{DualQueueConfig, DualQueueScheduler, DualQueueStatus};
pub use executor::{Executor, ExecutorCallbacks, ExecutorConfig, TaskFailure, TaskSuccess};
pub use priority::{PriorityConfig, PriorityScheduler, PriorityStatus, QueuedPriorityTask};

// Re-export the shared primitives so callers need a single crate.
pub use taskline_core::{CancelToken, TaskError, TaskHandle, TaskId, TaskRecord, TaskResult};
