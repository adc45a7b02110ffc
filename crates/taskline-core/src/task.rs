//! Task identity and submission record

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Opaque task identifier.
///
/// Generated at submission time and used for cancellation lookup and
/// correlation in callbacks and logs. Schedulers that accept caller-supplied
/// ids wrap them with [`TaskId::new`]; everything else uses
/// [`TaskId::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wrap a caller-supplied identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh time-ordered identifier.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A submitted unit of work waiting to execute.
///
/// Owned by exactly one queue (or by the running set) at any time. `args` is
/// the payload handed to the unit of work on each attempt, so it must be
/// `Clone` wherever retries are possible.
#[derive(Debug, Clone)]
pub struct TaskRecord<A> {
    /// Unique id assigned at submission
    pub id: TaskId,

    /// Argument payload passed through to the unit of work
    pub args: A,

    /// Retry attempts performed so far (starts at 0)
    pub retries: u32,

    /// When the task was submitted
    pub arrived_at: Instant,
}

impl<A> TaskRecord<A> {
    /// Create a record with a generated id, stamped now.
    pub fn new(args: A) -> Self {
        Self {
            id: TaskId::generate(),
            args,
            retries: 0,
            arrived_at: Instant::now(),
        }
    }

    /// Time spent since submission.
    pub fn waited(&self) -> Duration {
        self.arrived_at.elapsed()
    }
}
