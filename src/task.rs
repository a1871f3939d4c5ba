//! Task types.
//!
//! A task is an opaque unit of work the engine hands over. Running one
//! consumes the box, so no task can run twice. Dropping the box without
//! running it is how tasks are discarded.

use std::fmt;

/// A unit of work with a single invoke-once action.
pub trait Task: Send + 'static {
    fn run(self: Box<Self>);
}

impl<F> Task for F
where
    F: FnOnce() + Send + 'static,
{
    fn run(self: Box<Self>) {
        (*self)()
    }
}

/// Owned, move-only task handle.
pub type BoxedTask = Box<dyn Task>;

/// Box a closure as a task.
pub fn task<F>(f: F) -> BoxedTask
where
    F: FnOnce() + Send + 'static,
{
    Box::new(f)
}

/// Engine's guess at how long a background task will take.
///
/// Advisory only: it is logged, never used for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExpectedRuntime {
    #[default]
    Short,
    Long,
}

impl fmt::Display for ExpectedRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Short => "short",
            Self::Long => "long",
        };
        write!(f, "{s}")
    }
}
