//! Process-wide platform — the single scheduler instance and the calls the
//! engine makes into it.
//!
//! `create` and `shutdown` are the only mutators. They are serialized by a
//! lifecycle lock; the instance itself is published through a separate
//! `RwLock` so readers (including tasks on the worker) never wait on a
//! shutdown in progress.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock, const_mutex, const_rwlock};
use tracing::{debug, info, warn};

use crate::clock;
use crate::config::PlatformConfig;
use crate::error::Result;
use crate::foreground::{ContextId, ForegroundSink};
use crate::scheduler::{self, PlatformStats, Scheduler};
use crate::task::{BoxedTask, ExpectedRuntime};

static LIFECYCLE: Mutex<()> = const_mutex(());
static INSTANCE: RwLock<Option<Arc<Scheduler>>> = const_rwlock(None);

/// The four operations an embedding engine needs from its platform.
pub trait EnginePlatform: Send + Sync {
    /// Run `task` on the background worker. The hint is advisory.
    fn post_background_task(&self, task: BoxedTask, expected_runtime: ExpectedRuntime);

    /// Hand `task` to the host's foreground loop for `context`.
    fn post_foreground_task(&self, context: ContextId, task: BoxedTask);

    /// Like [`post_foreground_task`](Self::post_foreground_task), eligible
    /// only after `delay_seconds`.
    fn post_delayed_foreground_task(&self, context: ContextId, task: BoxedTask, delay_seconds: f64);

    /// Monotonic milliseconds since an unspecified origin.
    fn monotonic_time_ms(&self) -> f64;
}

impl EnginePlatform for Scheduler {
    fn post_background_task(&self, task: BoxedTask, expected_runtime: ExpectedRuntime) {
        self.post_background(task, expected_runtime);
    }

    fn post_foreground_task(&self, context: ContextId, task: BoxedTask) {
        self.post_foreground(context, task);
    }

    fn post_delayed_foreground_task(&self, context: ContextId, task: BoxedTask, delay_seconds: f64) {
        self.post_delayed_foreground(context, task, delay_seconds);
    }

    fn monotonic_time_ms(&self) -> f64 {
        self.now_ms()
    }
}

/// Handle that routes every call to whichever instance is current.
///
/// This is what gets handed to the engine: it stays valid across
/// shutdown/create cycles, and calls made with no instance are no-ops.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalPlatform;

impl EnginePlatform for GlobalPlatform {
    fn post_background_task(&self, task: BoxedTask, expected_runtime: ExpectedRuntime) {
        post_background_task(task, expected_runtime);
    }

    fn post_foreground_task(&self, context: ContextId, task: BoxedTask) {
        post_foreground_task(context, task);
    }

    fn post_delayed_foreground_task(&self, context: ContextId, task: BoxedTask, delay_seconds: f64) {
        post_delayed_foreground_task(context, task, delay_seconds);
    }

    fn monotonic_time_ms(&self) -> f64 {
        monotonic_time_ms()
    }
}

/// Create the platform with the default configuration, if none exists.
pub fn create(sink: Arc<dyn ForegroundSink>) -> Result<()> {
    create_with_config(sink, PlatformConfig::default())
}

/// Create the platform if none exists. Thread-safe and idempotent: while an
/// instance is live, further calls return `Ok(())` without side effects (the
/// new sink and config are ignored). An invalid config is rejected before any
/// thread is spawned.
pub fn create_with_config(sink: Arc<dyn ForegroundSink>, config: PlatformConfig) -> Result<()> {
    if scheduler::on_worker_thread() {
        warn!("create() called from a background task; ignoring");
        return Ok(());
    }

    let _lifecycle = LIFECYCLE.lock();
    if INSTANCE.read().is_some() {
        debug!("Platform already created");
        return Ok(());
    }
    config.validate()?;

    let scheduler = Arc::new(Scheduler::start(config, sink)?);
    *INSTANCE.write() = Some(scheduler);
    info!("Platform created");
    Ok(())
}

/// Stop the worker, discard what is still queued and destroy the instance.
///
/// Blocks until the worker thread has exited. A no-op when nothing is live,
/// and ignored when called from a background task (it would join itself).
pub fn shutdown() {
    if scheduler::on_worker_thread() {
        warn!("shutdown() called from a background task; ignoring");
        return;
    }

    let _lifecycle = LIFECYCLE.lock();
    let Some(scheduler) = INSTANCE.write().take() else {
        debug!("Platform not running; nothing to shut down");
        return;
    };

    let discarded = scheduler.stop();
    info!(discarded, "Platform shut down");
}

/// The live instance, if any.
pub fn current() -> Option<Arc<Scheduler>> {
    INSTANCE.read().clone()
}

pub fn is_running() -> bool {
    current().is_some_and(|s| s.is_running())
}

/// Stats of the live instance.
pub fn stats() -> Option<PlatformStats> {
    current().map(|s| s.stats())
}

pub fn post_background_task(task: BoxedTask, expected_runtime: ExpectedRuntime) {
    match current() {
        Some(scheduler) => scheduler.post_background(task, expected_runtime),
        None => debug!("No platform; dropping background task"),
    }
}

pub fn post_foreground_task(context: ContextId, task: BoxedTask) {
    match current() {
        Some(scheduler) => scheduler.post_foreground(context, task),
        None => debug!(context = %context, "No platform; dropping foreground task"),
    }
}

pub fn post_delayed_foreground_task(context: ContextId, task: BoxedTask, delay_seconds: f64) {
    match current() {
        Some(scheduler) => scheduler.post_delayed_foreground(context, task, delay_seconds),
        None => debug!(context = %context, "No platform; dropping delayed foreground task"),
    }
}

/// Works with or without a live instance.
pub fn monotonic_time_ms() -> f64 {
    clock::now_ms()
}
