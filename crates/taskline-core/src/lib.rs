// Shared task scheduling primitives
//
// This crate defines the types every taskline scheduler variant builds on:
// - TaskId / TaskRecord: task identity and submission metadata
// - CancelToken: cooperative cancellation signal passed into units of work
// - TaskHandle / TaskSettler: the awaitable per-task outcome channel
// - TaskError: the Cancelled / Timeout / Failed taxonomy
//
// Key design decisions:
// - Scheduler variants (executor, dual-queue, priority, aging) are parallel,
//   self-contained modules; this crate is the only code they share
// - Cancellation is cooperative: cancelling wakes observers but never
//   forcibly stops work - the owning scheduler settles the handle and frees
//   the slot regardless
// - Cancelling an unknown or completed task is signalled by a `false` return
//   at the scheduler level, never by an error, so cancellation is idempotent

pub mod cancel;
pub mod error;
pub mod handle;
pub mod task;

pub use cancel::CancelToken;
pub use error::{TaskError, TaskResult};
pub use handle::{TaskHandle, TaskSettler};
pub use task::{TaskId, TaskRecord};
