//! Per-context foreground queues — a ready-made [`ForegroundSink`].
//!
//! Each context gets a ready FIFO for immediate tasks and a min-heap for
//! delayed ones. The host pumps a context from whatever thread owns it.
//! Eligible tasks come out ordered by `(due_at_ms, sequence)`, so immediate
//! tasks keep their posting order and ties go to the earlier submission.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info};

use super::{ContextId, ForegroundSink, ForegroundTask};
use crate::clock::MonotonicClock;

/// Heap entry ordered so the earliest `(due, sequence)` sits on top.
struct Delayed(ForegroundTask);

impl Delayed {
    fn key(&self) -> (f64, u64) {
        (self.0.due_at_ms(), self.0.sequence)
    }
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a_due, a_seq) = self.key();
        let (b_due, b_seq) = other.key();
        // Reversed: BinaryHeap is a max-heap.
        b_due.total_cmp(&a_due).then_with(|| b_seq.cmp(&a_seq))
    }
}

#[derive(Default)]
struct ContextQueue {
    ready: VecDeque<ForegroundTask>,
    delayed: BinaryHeap<Delayed>,
    notify: Arc<Notify>,
}

impl ContextQueue {
    fn len(&self) -> usize {
        self.ready.len() + self.delayed.len()
    }

    /// Pop the earliest eligible task with `sequence <= watermark`.
    fn pop_eligible(&mut self, now_ms: f64, watermark: u64) -> Option<ForegroundTask> {
        let ready_key = self
            .ready
            .front()
            .filter(|t| t.sequence <= watermark)
            .map(|t| (t.due_at_ms(), t.sequence));
        let delayed_key = self
            .delayed
            .peek()
            .filter(|d| d.0.is_due(now_ms) && d.0.sequence <= watermark)
            .map(Delayed::key);

        match (ready_key, delayed_key) {
            (Some(r), Some(d)) => {
                if d.0.total_cmp(&r.0).then(d.1.cmp(&r.1)) == Ordering::Less {
                    self.delayed.pop().map(|d| d.0)
                } else {
                    self.ready.pop_front()
                }
            }
            (Some(_), None) => self.ready.pop_front(),
            (None, Some(_)) => self.delayed.pop().map(|d| d.0),
            (None, None) => None,
        }
    }

    fn max_sequence(&self) -> Option<u64> {
        let ready = self.ready.back().map(|t| t.sequence);
        let delayed = self.delayed.iter().map(|d| d.0.sequence).max();
        ready.max(delayed)
    }
}

/// Foreground sink holding one queue per context.
pub struct ForegroundQueues {
    contexts: Mutex<HashMap<ContextId, ContextQueue>>,
    clock: MonotonicClock,
}

impl ForegroundQueues {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            contexts: Mutex::new(HashMap::new()),
            clock: MonotonicClock::new(),
        })
    }

    /// Take the next task that is eligible to run now, if any.
    pub fn pop_ready(&self, context: ContextId) -> Option<ForegroundTask> {
        let now = self.clock.now_ms();
        self.contexts
            .lock()
            .get_mut(&context)
            .and_then(|q| q.pop_eligible(now, u64::MAX))
    }

    /// Run at most one eligible task. Returns whether one ran.
    pub fn pump(&self, context: ContextId) -> bool {
        match self.pop_ready(context) {
            Some(task) => {
                debug!(context = %context, sequence = task.sequence, "Running foreground task");
                task.run();
                true
            }
            None => false,
        }
    }

    /// Run every task eligible right now. Tasks posted while this runs wait
    /// for the next call, so a task that re-posts itself can't starve the host.
    pub fn run_pending(&self, context: ContextId) -> usize {
        let watermark = match self.contexts.lock().get(&context).and_then(|q| q.max_sequence()) {
            Some(seq) => seq,
            None => return 0,
        };

        let mut ran = 0;
        loop {
            let now = self.clock.now_ms();
            // Lock released before the task runs; tasks may post more work.
            let next = self
                .contexts
                .lock()
                .get_mut(&context)
                .and_then(|q| q.pop_eligible(now, watermark));
            match next {
                Some(task) => {
                    debug!(context = %context, sequence = task.sequence, "Running foreground task");
                    task.run();
                    ran += 1;
                }
                None => break,
            }
        }
        ran
    }

    /// Number of tasks queued for a context, delayed ones included.
    pub fn pending(&self, context: ContextId) -> usize {
        self.contexts.lock().get(&context).map_or(0, ContextQueue::len)
    }

    /// How long until the next task for this context becomes eligible.
    ///
    /// `Some(ZERO)` when something can run now; `None` when nothing is queued
    /// or only never-due tasks remain.
    pub fn next_due_in(&self, context: ContextId) -> Option<Duration> {
        let contexts = self.contexts.lock();
        let queue = contexts.get(&context)?;
        if !queue.ready.is_empty() {
            return Some(Duration::ZERO);
        }
        let due = queue.delayed.peek()?.0.due_at_ms();
        self.clock.until(due)
    }

    /// Wakeup handle for a context; notified whenever a task is accepted for it.
    pub fn notifier(&self, context: ContextId) -> Arc<Notify> {
        Arc::clone(&self.contexts.lock().entry(context).or_default().notify)
    }

    /// Drop every task queued for a context without running any of them.
    pub fn dispose(&self, context: ContextId) -> usize {
        let removed = self.contexts.lock().remove(&context);
        let Some(queue) = removed else {
            return 0;
        };
        let discarded = queue.len();
        queue.notify.notify_waiters();
        drop(queue);

        if discarded > 0 {
            info!(context = %context, discarded, "Disposed foreground context");
        }
        discarded
    }

    /// Contexts with at least one queued task.
    pub fn contexts(&self) -> Vec<ContextId> {
        self.contexts
            .lock()
            .iter()
            .filter(|(_, q)| q.len() > 0)
            .map(|(id, _)| *id)
            .collect()
    }
}

impl ForegroundSink for ForegroundQueues {
    fn accept(&self, task: ForegroundTask) {
        let context = task.context;
        let notify = {
            let mut contexts = self.contexts.lock();
            let queue = contexts.entry(context).or_default();
            if task.is_delayed() {
                queue.delayed.push(Delayed(task));
            } else {
                queue.ready.push_back(task);
            }
            Arc::clone(&queue.notify)
        };
        notify.notify_one();
    }
}
