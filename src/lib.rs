//! Engine Platform — background worker, foreground routing and a monotonic
//! clock for an embedded script engine.

pub mod clock;
pub mod config;
pub mod error;
pub mod foreground;
pub mod platform;
pub mod scheduler;
pub mod task;

pub use config::{PlatformConfig, ShutdownPolicy};
pub use error::{Error, Result};
pub use foreground::{ContextId, DiscardSink, ForegroundQueues, ForegroundSink, ForegroundTask};
pub use platform::{EnginePlatform, GlobalPlatform};
pub use scheduler::{PlatformStats, Scheduler};
pub use task::{BoxedTask, ExpectedRuntime, Task, task};
