//! Task scheduler — background queue, worker thread and foreground routing.
//!
//! One dedicated worker drains a FIFO queue guarded by a mutex and condvar.
//! Producers only hold the lock long enough to push. Foreground tasks never
//! touch the queue; they are stamped and forwarded to the host's sink.

use std::cell::Cell;
use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, ReentrantMutex};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::clock;
use crate::config::{PlatformConfig, ShutdownPolicy};
use crate::error::PlatformError;
use crate::foreground::{ContextId, ForegroundSink, ForegroundTask};
use crate::task::{BoxedTask, ExpectedRuntime};

/// Counters describing what the scheduler has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlatformStats {
    pub background_submitted: u64,
    pub background_executed: u64,
    pub background_discarded: u64,
    pub foreground_forwarded: u64,
    pub delayed_forwarded: u64,
}

#[derive(Default)]
struct Counters {
    background_submitted: AtomicU64,
    background_executed: AtomicU64,
    background_discarded: AtomicU64,
    foreground_forwarded: AtomicU64,
    delayed_forwarded: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PlatformStats {
        PlatformStats {
            background_submitted: self.background_submitted.load(Ordering::Relaxed),
            background_executed: self.background_executed.load(Ordering::Relaxed),
            background_discarded: self.background_discarded.load(Ordering::Relaxed),
            foreground_forwarded: self.foreground_forwarded.load(Ordering::Relaxed),
            delayed_forwarded: self.delayed_forwarded.load(Ordering::Relaxed),
        }
    }
}

struct QueuedTask {
    task: BoxedTask,
    hint: ExpectedRuntime,
}

/// State shared between producers and the worker thread.
struct Shared {
    queue: Mutex<VecDeque<QueuedTask>>,
    available: Condvar,
    /// Goes true -> false once, while `queue` is locked.
    running: AtomicBool,
    policy: ShutdownPolicy,
    counters: Counters,
}

impl Shared {
    /// Block until a task is available or the worker should exit.
    fn next_task(&self) -> Option<QueuedTask> {
        let mut queue = self.queue.lock();
        loop {
            let running = self.running.load(Ordering::Acquire);
            if !running && (self.policy == ShutdownPolicy::Discard || queue.is_empty()) {
                return None;
            }
            if let Some(next) = queue.pop_front() {
                return Some(next);
            }
            self.available.wait(&mut queue);
        }
    }
}

thread_local! {
    static ON_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// True on any scheduler worker thread, including one that is shutting down.
pub(crate) fn on_worker_thread() -> bool {
    ON_WORKER.with(Cell::get)
}

/// Logs if the worker unwinds out of a task. The panic itself keeps going.
struct WorkerGuard<'a> {
    name: &'a str,
}

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(
                worker = self.name,
                "Background task panicked; worker thread is gone and no further background tasks will run"
            );
        }
    }
}

fn worker_loop(shared: Arc<Shared>, name: String) {
    ON_WORKER.with(|flag| flag.set(true));
    let _guard = WorkerGuard { name: &name };
    debug!(worker = %name, "Worker started");

    while let Some(QueuedTask { task, hint }) = shared.next_task() {
        // Queue lock is already released here.
        debug!(hint = %hint, "Running background task");
        task.run();
        shared
            .counters
            .background_executed
            .fetch_add(1, Ordering::Relaxed);
    }

    debug!(worker = %name, "Worker exiting");
}

/// The scheduler instance. Reach it through [`crate::platform`].
pub struct Scheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Held for the whole of `stop`, so a second caller waits for the first.
    stopping: Mutex<()>,
    worker_id: ThreadId,
    worker_name: String,
    sink: Arc<dyn ForegroundSink>,
    /// Next foreground sequence number. Held across `accept` so forwarding
    /// order matches sequence order; reentrant so sinks may post back.
    forwarding: ReentrantMutex<Cell<u64>>,
}

impl Scheduler {
    /// Spawn the worker and return a running scheduler.
    pub(crate) fn start(
        config: PlatformConfig,
        sink: Arc<dyn ForegroundSink>,
    ) -> Result<Self, PlatformError> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            running: AtomicBool::new(true),
            policy: config.shutdown_policy,
            counters: Counters::default(),
        });

        let mut builder = thread::Builder::new().name(config.worker_name.clone());
        if let Some(bytes) = config.worker_stack_size {
            builder = builder.stack_size(bytes);
        }

        let worker_shared = Arc::clone(&shared);
        let worker_name = config.worker_name.clone();
        let handle = builder
            .spawn(move || worker_loop(worker_shared, worker_name))
            .map_err(|source| PlatformError::WorkerSpawn {
                name: config.worker_name.clone(),
                source,
            })?;

        info!(
            worker = %config.worker_name,
            policy = %config.shutdown_policy,
            "Scheduler started"
        );

        Ok(Self {
            shared,
            worker_id: handle.thread().id(),
            worker: Mutex::new(Some(handle)),
            stopping: Mutex::new(()),
            worker_name: config.worker_name,
            sink,
            forwarding: ReentrantMutex::new(Cell::new(0)),
        })
    }

    /// Queue a task for the background worker. Never blocks on execution.
    ///
    /// After [`stop`](Self::stop) the task is dropped without running.
    pub fn post_background(&self, task: BoxedTask, hint: ExpectedRuntime) {
        {
            let mut queue = self.shared.queue.lock();
            if !self.shared.running.load(Ordering::Acquire) {
                drop(queue);
                self.shared
                    .counters
                    .background_discarded
                    .fetch_add(1, Ordering::Relaxed);
                debug!(hint = %hint, "Scheduler stopped; discarding background task");
                return;
            }
            queue.push_back(QueuedTask { task, hint });
        }
        self.shared
            .counters
            .background_submitted
            .fetch_add(1, Ordering::Relaxed);
        self.shared.available.notify_one();
    }

    /// Forward a task to the host for `context`, to run as soon as possible.
    pub fn post_foreground(&self, context: ContextId, task: BoxedTask) {
        self.forward(context, task, Duration::ZERO);
    }

    /// Forward a task that becomes eligible after `delay_seconds`.
    ///
    /// Negative or NaN delays count as zero. Delays too large to represent
    /// (including infinity) never become eligible.
    pub fn post_delayed_foreground(&self, context: ContextId, task: BoxedTask, delay_seconds: f64) {
        let delay = if delay_seconds.is_nan() || delay_seconds < 0.0 {
            warn!(
                context = %context,
                delay_seconds,
                "Invalid foreground delay; treating as zero"
            );
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(delay_seconds).unwrap_or(Duration::MAX)
        };
        self.forward(context, task, delay);
    }

    fn forward(&self, context: ContextId, task: BoxedTask, delay: Duration) {
        if !self.is_running() {
            debug!(context = %context, "Scheduler stopped; dropping foreground task");
            return;
        }

        let next = self.forwarding.lock();
        // `stop` takes this lock after clearing the flag, so anything that
        // gets past this check is forwarded before `stop` returns.
        if !self.is_running() {
            debug!(context = %context, "Scheduler stopped; dropping foreground task");
            return;
        }
        let sequence = next.get();
        next.set(sequence + 1);
        // Taken under the forwarding lock so post times follow sequence order.
        let posted_at_ms = clock::now_ms();

        debug!(
            context = %context,
            sequence,
            delay = ?delay,
            "Forwarding foreground task"
        );

        let counter = if delay.is_zero() {
            &self.shared.counters.foreground_forwarded
        } else {
            &self.shared.counters.delayed_forwarded
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.sink.accept(ForegroundTask::new(
            context,
            sequence,
            posted_at_ms,
            delay,
            task,
        ));
    }

    /// Monotonic milliseconds. Safe from any thread.
    pub fn now_ms(&self) -> f64 {
        clock::now_ms()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Whether the worker thread is still alive. False after a task panicked
    /// on it or after [`stop`](Self::stop).
    pub fn worker_alive(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn worker_thread_id(&self) -> ThreadId {
        self.worker_id
    }

    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Number of background tasks waiting in the queue.
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn stats(&self) -> PlatformStats {
        self.shared.counters.snapshot()
    }

    /// Stop the worker and wait for it. Idempotent.
    ///
    /// Returns the number of queued tasks discarded. A call from the worker
    /// thread itself would self-join, so it is ignored.
    pub(crate) fn stop(&self) -> usize {
        if self.is_worker_thread() {
            warn!(worker = %self.worker_name, "Refusing to stop the scheduler from its own worker");
            return 0;
        }

        let _stopping = self.stopping.lock();

        {
            let _queue = self.shared.queue.lock();
            self.shared.running.store(false, Ordering::Release);
        }
        self.shared.available.notify_all();

        // Wait out any forward that saw the flag still set.
        drop(self.forwarding.lock());

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(worker = %self.worker_name, "Worker thread terminated by a panicking task");
            }
        }

        let leftovers = mem::take(&mut *self.shared.queue.lock());
        let discarded = leftovers.len();
        // Dropped outside the lock; task destructors may post.
        drop(leftovers);

        if discarded > 0 {
            self.shared
                .counters
                .background_discarded
                .fetch_add(discarded as u64, Ordering::Relaxed);
        }
        info!(worker = %self.worker_name, discarded, "Scheduler stopped");
        discarded
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.is_worker_thread() {
            // Can't join ourselves; just make sure the loop exits.
            let _queue = self.shared.queue.lock();
            self.shared.running.store(false, Ordering::Release);
            return;
        }
        if self.worker.get_mut().is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;

    use tracing_test::traced_test;

    use super::*;
    use crate::foreground::ForegroundQueues;
    use crate::task::task;

    /// Sink that records `(context, sequence, delay)` in forwarding order.
    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<(ContextId, u64, Duration)>>,
    }

    impl ForegroundSink for RecordingSink {
        fn accept(&self, task: ForegroundTask) {
            self.seen
                .lock()
                .push((task.context, task.sequence, task.delay));
        }
    }

    fn start(policy: ShutdownPolicy) -> (Scheduler, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let config = PlatformConfig::default()
            .with_worker_name("scheduler-test")
            .with_shutdown_policy(policy);
        let scheduler = Scheduler::start(config, Arc::clone(&sink) as Arc<dyn ForegroundSink>)
            .unwrap();
        (scheduler, sink)
    }

    /// Block the worker until the returned sender fires.
    fn park_worker(scheduler: &Scheduler) -> std::sync::mpsc::Sender<()> {
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let (parked_tx, parked_rx) = std::sync::mpsc::channel::<()>();
        scheduler.post_background(
            task(move || {
                parked_tx.send(()).unwrap();
                let _ = release_rx.recv();
            }),
            ExpectedRuntime::Long,
        );
        parked_rx.recv().unwrap();
        release_tx
    }

    #[test]
    fn background_tasks_run_in_fifo_order() {
        let (scheduler, _) = start(ShutdownPolicy::Discard);
        let log = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        for name in ["A", "B", "C"] {
            let log = Arc::clone(&log);
            scheduler.post_background(task(move || log.lock().push(name)), ExpectedRuntime::Short);
        }
        scheduler.post_background(
            task(move || done_tx.send(()).unwrap()),
            ExpectedRuntime::Short,
        );

        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(*log.lock(), vec!["A", "B", "C"]);
        scheduler.stop();
        assert_eq!(scheduler.stats().background_executed, 4);
    }

    #[test]
    fn tasks_run_on_the_worker_thread() {
        let (scheduler, _) = start(ShutdownPolicy::Discard);
        let (tx, rx) = std::sync::mpsc::channel();
        scheduler.post_background(
            task(move || {
                let current = thread::current();
                tx.send((current.id(), current.name().map(str::to_string)))
                    .unwrap();
            }),
            ExpectedRuntime::Short,
        );

        let (id, name) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(id, scheduler.worker_thread_id());
        assert_eq!(name.as_deref(), Some("scheduler-test"));
        assert!(scheduler.worker_alive());
        scheduler.stop();
        assert!(!scheduler.worker_alive());
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 500;

        let (scheduler, _) = start(ShutdownPolicy::Drain);
        let scheduler = Arc::new(scheduler);
        let executed = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::with_capacity(THREADS * PER_THREAD)));
        let barrier = Arc::new(Barrier::new(THREADS));

        let producers: Vec<_> = (0..THREADS)
            .map(|t| {
                let scheduler = Arc::clone(&scheduler);
                let executed = Arc::clone(&executed);
                let order = Arc::clone(&order);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..PER_THREAD {
                        let executed = Arc::clone(&executed);
                        let order = Arc::clone(&order);
                        scheduler.post_background(
                            task(move || {
                                executed.fetch_add(1, Ordering::SeqCst);
                                order.lock().push((t, i));
                            }),
                            ExpectedRuntime::Short,
                        );
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        assert_eq!(scheduler.stop(), 0);
        assert_eq!(executed.load(Ordering::SeqCst), THREADS * PER_THREAD);

        // Each producer's own tasks keep their relative order.
        let order = order.lock();
        for t in 0..THREADS {
            let mine: Vec<usize> = order.iter().filter(|(p, _)| *p == t).map(|(_, i)| *i).collect();
            assert_eq!(mine, (0..PER_THREAD).collect::<Vec<_>>());
        }
    }

    #[test]
    fn stop_discards_queued_tasks_without_running_them() {
        let (scheduler, _) = start(ShutdownPolicy::Discard);
        let release = park_worker(&scheduler);

        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let ran = Arc::clone(&ran);
            scheduler.post_background(
                task(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                }),
                ExpectedRuntime::Short,
            );
        }
        assert_eq!(scheduler.queued(), 3);

        let scheduler = Arc::new(scheduler);
        let stopper = {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || scheduler.stop())
        };
        // Let the stop request land before the parked task finishes.
        while scheduler.is_running() {
            thread::yield_now();
        }
        release.send(()).unwrap();

        assert_eq!(stopper.join().unwrap(), 3);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        let stats = scheduler.stats();
        assert_eq!(stats.background_executed, 1);
        assert_eq!(stats.background_discarded, 3);
    }

    #[test]
    fn drain_policy_runs_queued_tasks_before_stopping() {
        let (scheduler, _) = start(ShutdownPolicy::Drain);
        let release = park_worker(&scheduler);

        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let ran = Arc::clone(&ran);
            scheduler.post_background(
                task(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                }),
                ExpectedRuntime::Short,
            );
        }

        let scheduler = Arc::new(scheduler);
        let stopper = {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || scheduler.stop())
        };
        while scheduler.is_running() {
            thread::yield_now();
        }
        release.send(()).unwrap();

        assert_eq!(stopper.join().unwrap(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn posting_after_stop_is_a_noop() {
        let (scheduler, sink) = start(ShutdownPolicy::Discard);
        scheduler.stop();
        assert_eq!(scheduler.stop(), 0);

        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        scheduler.post_background(
            task(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }),
            ExpectedRuntime::Short,
        );
        scheduler.post_foreground(ContextId::from_raw(1), task(|| {}));

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.queued(), 0);
        assert!(sink.seen.lock().is_empty());
        assert_eq!(scheduler.stats().background_discarded, 1);
    }

    #[test]
    fn worker_panic_is_not_swallowed() {
        let (scheduler, _) = start(ShutdownPolicy::Discard);
        scheduler.post_background(task(|| panic!("boom")), ExpectedRuntime::Short);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while scheduler.worker_alive() {
            assert!(std::time::Instant::now() < deadline, "worker never died");
            thread::sleep(Duration::from_millis(1));
        }

        // Still accepted, never run.
        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        scheduler.post_background(
            task(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }),
            ExpectedRuntime::Short,
        );
        assert_eq!(scheduler.stop(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn foreground_forwarding_preserves_submission_order() {
        let (scheduler, sink) = start(ShutdownPolicy::Discard);
        let x = ContextId::from_raw(0xA);
        let y = ContextId::from_raw(0xB);

        scheduler.post_delayed_foreground(x, task(|| {}), 0.1);
        scheduler.post_foreground(x, task(|| {}));
        scheduler.post_foreground(y, task(|| {}));
        scheduler.post_delayed_foreground(x, task(|| {}), 0.0);

        let seen = sink.seen.lock().clone();
        assert_eq!(
            seen,
            vec![
                (x, 0, Duration::from_millis(100)),
                (x, 1, Duration::ZERO),
                (y, 2, Duration::ZERO),
                (x, 3, Duration::ZERO),
            ]
        );
        let stats = scheduler.stats();
        assert_eq!(stats.foreground_forwarded, 3);
        assert_eq!(stats.delayed_forwarded, 1);
    }

    #[test]
    fn concurrent_forwarding_has_a_total_order() {
        let (scheduler, sink) = start(ShutdownPolicy::Discard);
        let scheduler = Arc::new(scheduler);

        let posters: Vec<_> = (0..4u64)
            .map(|t| {
                let scheduler = Arc::clone(&scheduler);
                thread::spawn(move || {
                    for _ in 0..250 {
                        scheduler.post_foreground(ContextId::from_raw(t), task(|| {}));
                    }
                })
            })
            .collect();
        for p in posters {
            p.join().unwrap();
        }

        let seen = sink.seen.lock();
        assert_eq!(seen.len(), 1000);
        assert!(seen.windows(2).all(|w| w[0].1 + 1 == w[1].1));
    }

    #[test]
    #[traced_test]
    fn negative_delay_is_clamped_and_logged() {
        let (scheduler, sink) = start(ShutdownPolicy::Discard);
        let ctx = ContextId::from_raw(3);
        scheduler.post_delayed_foreground(ctx, task(|| {}), -2.0);
        scheduler.post_delayed_foreground(ctx, task(|| {}), f64::NAN);
        scheduler.post_delayed_foreground(ctx, task(|| {}), f64::INFINITY);

        let seen = sink.seen.lock().clone();
        assert_eq!(seen[0].2, Duration::ZERO);
        assert_eq!(seen[1].2, Duration::ZERO);
        assert_eq!(seen[2].2, Duration::MAX);
        assert!(logs_contain("Invalid foreground delay"));
        // Logged as-is, not wrapped to a small number of milliseconds.
        assert!(logs_contain("18446744073709551615.999999999s"));
    }

    #[test]
    fn stop_waits_for_an_in_flight_forward() {
        /// Blocks the first `accept` until released.
        struct Gate {
            entered: Mutex<Option<std::sync::mpsc::Sender<()>>>,
            release: Mutex<Option<std::sync::mpsc::Receiver<()>>>,
            accepted: AtomicUsize,
        }

        impl ForegroundSink for Gate {
            fn accept(&self, _task: ForegroundTask) {
                if let Some(entered) = self.entered.lock().take() {
                    entered.send(()).unwrap();
                    let release = self.release.lock().take();
                    if let Some(release) = release {
                        let _ = release.recv();
                    }
                }
                self.accepted.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let gate = Arc::new(Gate {
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(Some(release_rx)),
            accepted: AtomicUsize::new(0),
        });
        let scheduler = Arc::new(
            Scheduler::start(PlatformConfig::default(), Arc::clone(&gate) as Arc<dyn ForegroundSink>)
                .unwrap(),
        );

        let poster = {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || scheduler.post_foreground(ContextId::from_raw(1), task(|| {})))
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let stopper = {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || scheduler.stop())
        };
        while scheduler.is_running() {
            thread::yield_now();
        }
        thread::sleep(Duration::from_millis(20));
        assert!(!stopper.is_finished(), "stop returned while a forward was in flight");

        release_tx.send(()).unwrap();
        poster.join().unwrap();
        stopper.join().unwrap();
        assert_eq!(gate.accepted.load(Ordering::SeqCst), 1);

        scheduler.post_foreground(ContextId::from_raw(1), task(|| {}));
        assert_eq!(gate.accepted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_stops_both_wait_for_the_drain() {
        let (scheduler, _) = start(ShutdownPolicy::Drain);
        let release = park_worker(&scheduler);

        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let ran = Arc::clone(&ran);
            scheduler.post_background(
                task(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                }),
                ExpectedRuntime::Short,
            );
        }

        let scheduler = Arc::new(scheduler);
        let stoppers: Vec<_> = (0..2)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                let ran = Arc::clone(&ran);
                thread::spawn(move || {
                    let discarded = scheduler.stop();
                    (discarded, ran.load(Ordering::SeqCst))
                })
            })
            .collect();
        while scheduler.is_running() {
            thread::yield_now();
        }
        release.send(()).unwrap();

        for stopper in stoppers {
            assert_eq!(stopper.join().unwrap(), (0, 3));
        }
        assert!(!scheduler.worker_alive());
    }

    #[test]
    fn sink_may_post_back_from_accept() {
        struct Bouncing {
            scheduler: Mutex<Option<std::sync::Weak<Scheduler>>>,
            seen: AtomicUsize,
        }

        impl ForegroundSink for Bouncing {
            fn accept(&self, task: ForegroundTask) {
                let first = self.seen.fetch_add(1, Ordering::SeqCst) == 0;
                let scheduler = self.scheduler.lock().clone();
                if first {
                    if let Some(s) = scheduler.and_then(|w| w.upgrade()) {
                        s.post_foreground(task.context, crate::task::task(|| {}));
                    }
                }
            }
        }

        let sink = Arc::new(Bouncing {
            scheduler: Mutex::new(None),
            seen: AtomicUsize::new(0),
        });
        let scheduler = Arc::new(
            Scheduler::start(PlatformConfig::default(), Arc::clone(&sink) as Arc<dyn ForegroundSink>)
                .unwrap(),
        );
        *sink.scheduler.lock() = Some(Arc::downgrade(&scheduler));

        scheduler.post_foreground(ContextId::from_raw(1), task(|| {}));
        assert_eq!(sink.seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn delayed_scenario_through_foreground_queues() {
        let queues = ForegroundQueues::new();
        let scheduler = Scheduler::start(
            PlatformConfig::default(),
            Arc::clone(&queues) as Arc<dyn ForegroundSink>,
        )
        .unwrap();
        let x = ContextId::from_raw(0x58);
        let log = Arc::new(Mutex::new(Vec::new()));

        let d = Arc::clone(&log);
        scheduler.post_delayed_foreground(x, task(move || d.lock().push("D")), 0.1);
        let e = Arc::clone(&log);
        scheduler.post_foreground(x, task(move || e.lock().push("E")));

        assert_eq!(queues.run_pending(x), 1);
        assert_eq!(*log.lock(), vec!["E"]);

        thread::sleep(Duration::from_millis(120));
        assert_eq!(queues.run_pending(x), 1);
        assert_eq!(*log.lock(), vec!["E", "D"]);
    }

    #[test]
    fn stats_serialize() {
        let (scheduler, _) = start(ShutdownPolicy::Discard);
        scheduler.stop();
        let json = serde_json::to_value(scheduler.stats()).unwrap();
        assert_eq!(json["background_submitted"], 0);
        assert!(json.get("delayed_forwarded").is_some());
    }
}
