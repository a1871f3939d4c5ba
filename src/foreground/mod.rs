//! Foreground routing — tasks the host runs on its own execution contexts.
//!
//! The scheduler never runs foreground tasks itself. It stamps each one with
//! a forwarding sequence number and hands it to a [`ForegroundSink`]. Core pieces:
//! - `queues` — `ForegroundQueues`, a per-context sink the host pumps
//! - `driver` — async loop that pumps one context on a tokio runtime

pub mod driver;
pub mod queues;

use std::fmt;
use std::time::Duration;

use crate::clock::duration_ms;
use crate::task::BoxedTask;

pub use driver::drive;
pub use queues::ForegroundQueues;

/// Opaque identifier of a host execution context (an isolate, say).
///
/// Only ever compared and hashed; never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Use the address of a host object as the key.
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize as u64)
    }

    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{:#x}", self.0)
    }
}

/// A task forwarded to the host for a particular context.
pub struct ForegroundTask {
    pub context: ContextId,
    /// Forwarding order. Strictly increasing across the whole process.
    pub sequence: u64,
    /// Monotonic time the task was posted, in milliseconds.
    pub posted_at_ms: f64,
    /// Zero for immediate tasks.
    pub delay: Duration,
    task: BoxedTask,
}

impl ForegroundTask {
    pub(crate) fn new(
        context: ContextId,
        sequence: u64,
        posted_at_ms: f64,
        delay: Duration,
        task: BoxedTask,
    ) -> Self {
        Self {
            context,
            sequence,
            posted_at_ms,
            delay,
            task,
        }
    }

    /// Monotonic time at which the task becomes eligible to run.
    /// Infinite when the delay was too large to represent.
    pub fn due_at_ms(&self) -> f64 {
        if self.delay == Duration::MAX {
            return f64::INFINITY;
        }
        self.posted_at_ms + duration_ms(self.delay)
    }

    pub fn is_delayed(&self) -> bool {
        !self.delay.is_zero()
    }

    pub fn is_due(&self, now_ms: f64) -> bool {
        self.due_at_ms() <= now_ms
    }

    /// Run the task, consuming it.
    pub fn run(self) {
        self.task.run()
    }
}

impl fmt::Debug for ForegroundTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForegroundTask")
            .field("context", &self.context)
            .field("sequence", &self.sequence)
            .field("posted_at_ms", &self.posted_at_ms)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

/// Capability the host provides for foreground execution.
///
/// `accept` is called in forwarding order while the scheduler holds its
/// forwarding lock, so it should hand the task off and return. Re-entering the
/// scheduler from the same thread is allowed.
pub trait ForegroundSink: Send + Sync {
    fn accept(&self, task: ForegroundTask);
}

/// Sink that drops everything. For hosts with no foreground loop.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl ForegroundSink for DiscardSink {
    fn accept(&self, task: ForegroundTask) {
        tracing::debug!(
            context = %task.context,
            sequence = task.sequence,
            "No foreground loop; dropping task"
        );
    }
}
