//! Bounded two-stage producer/consumer queue behind the tracking pipeline.
//!
//! Items enter with [`BoundedTrackingQueue::enqueue`], are picked up by a
//! worker ([`take_work`](BoundedTrackingQueue::take_work) /
//! [`complete`](BoundedTrackingQueue::complete)) and leave as results through
//! [`pop`](BoundedTrackingQueue::pop), strictly FIFO. Depth counts everything
//! enqueued and not yet popped and never exceeds the capacity.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crossbeam::utils::CachePadded;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::native::WaitResult;
use crate::time::Timeout;

/// Lifecycle of the queue. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Open,
    /// Enqueue fails; queued work still completes and can be popped.
    ShuttingDown,
    /// Drained after shutdown; pop fails.
    Closed,
    /// The worker could not finish an item. Results already produced can
    /// still be popped; everything else fails.
    Failed,
}

struct Inner<I, O> {
    state: QueueState,
    pending: VecDeque<I>,
    processing: usize,
    ready: VecDeque<O>,
}

impl<I, O> Inner<I, O> {
    fn depth(&self) -> usize {
        self.pending.len() + self.processing + self.ready.len()
    }

    fn close_if_drained(&mut self) {
        if self.state == QueueState::ShuttingDown && self.depth() == 0 {
            self.state = QueueState::Closed;
        }
    }
}

#[derive(Default)]
struct Stats {
    enqueued: AtomicUsize,
    popped: AtomicUsize,
    max_depth: AtomicUsize,
}

pub struct BoundedTrackingQueue<I, O> {
    capacity: usize,
    inner: Mutex<Inner<I, O>>,
    // depth decreased or state changed
    space: Condvar,
    // pending grew or state changed
    work: Condvar,
    // ready grew or state changed
    results: Condvar,
    stats: CachePadded<Stats>,
}

impl<I, O> BoundedTrackingQueue<I, O> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            capacity,
            inner: Mutex::new(Inner {
                state: QueueState::Open,
                pending: VecDeque::with_capacity(capacity),
                processing: 0,
                ready: VecDeque::with_capacity(capacity),
            }),
            space: Condvar::new(),
            work: Condvar::new(),
            results: Condvar::new(),
            stats: CachePadded::new(Stats::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn depth(&self) -> usize {
        self.inner.lock().depth()
    }

    pub fn state(&self) -> QueueState {
        self.inner.lock().state
    }

    /// (successful enqueues, successful pops, highest depth observed)
    pub fn stats(&self) -> (usize, usize, usize) {
        (
            self.stats.enqueued.load(Ordering::Relaxed),
            self.stats.popped.load(Ordering::Relaxed),
            self.stats.max_depth.load(Ordering::Relaxed),
        )
    }

    /// Producer: submit `item`, waiting up to `timeout` for space.
    ///
    /// Fails once the queue left `Open`; a rejected or timed-out item is dropped.
    pub fn enqueue(&self, item: I, timeout: Timeout) -> WaitResult<()> {
        let deadline = timeout.deadline_from(Instant::now());
        let mut inner = self.inner.lock();
        loop {
            if inner.state != QueueState::Open {
                return WaitResult::Failed;
            }
            if inner.depth() < self.capacity {
                break;
            }
            if timeout.is_no_wait() || !wait(&self.space, &mut inner, deadline) {
                return WaitResult::Timeout;
            }
        }

        inner.pending.push_back(item);
        let depth = inner.depth();
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        self.stats.max_depth.fetch_max(depth, Ordering::Relaxed);
        trace!(depth, "enqueued");
        drop(inner);
        self.work.notify_one();
        WaitResult::Succeeded(())
    }

    /// Consumer: take the next result, waiting up to `timeout`.
    ///
    /// After shutdown, remaining results are still returned; once drained the
    /// queue is `Closed` and this fails instead of blocking.
    pub fn pop(&self, timeout: Timeout) -> WaitResult<O> {
        let deadline = timeout.deadline_from(Instant::now());
        let mut inner = self.inner.lock();
        loop {
            if let Some(result) = inner.ready.pop_front() {
                inner.close_if_drained();
                let depth = inner.depth();
                self.stats.popped.fetch_add(1, Ordering::Relaxed);
                trace!(depth, "popped");
                drop(inner);
                self.space.notify_one();
                return WaitResult::Succeeded(result);
            }
            inner.close_if_drained();
            if matches!(inner.state, QueueState::Closed | QueueState::Failed) {
                return WaitResult::Failed;
            }
            if timeout.is_no_wait() || !wait(&self.results, &mut inner, deadline) {
                return WaitResult::Timeout;
            }
        }
    }

    /// Worker: block until an item is pending. `None` once the queue is shutting
    /// down and nothing is left to process.
    pub fn take_work(&self) -> Option<I> {
        let mut inner = self.inner.lock();
        loop {
            if inner.state == QueueState::Failed {
                return None;
            }
            if let Some(item) = inner.pending.pop_front() {
                inner.processing += 1;
                return Some(item);
            }
            if inner.state != QueueState::Open {
                return None;
            }
            self.work.wait(&mut inner);
        }
    }

    /// Worker: publish the result for the oldest item taken with `take_work`.
    pub fn complete(&self, result: O) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.processing > 0, "complete() without take_work()");
        inner.processing = inner.processing.saturating_sub(1);
        inner.ready.push_back(result);
        drop(inner);
        self.results.notify_all();
    }

    /// Worker: give up on the item taken with `take_work`. The queue stops
    /// accepting and processing items, pending ones are left for `drain`.
    pub fn fail(&self) {
        let mut inner = self.inner.lock();
        inner.processing = inner.processing.saturating_sub(1);
        if inner.state != QueueState::Closed {
            inner.state = QueueState::Failed;
        }
        warn!(depth = inner.depth(), "tracking queue failed");
        drop(inner);
        self.space.notify_all();
        self.work.notify_all();
        self.results.notify_all();
    }

    /// Stop accepting items and wake every waiter.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if inner.state == QueueState::Open {
            inner.state = QueueState::ShuttingDown;
            debug!(depth = inner.depth(), "tracking queue shutting down");
        }
        inner.close_if_drained();
        drop(inner);
        self.space.notify_all();
        self.work.notify_all();
        self.results.notify_all();
    }

    /// Remove everything still queued. Used when the owner is torn down
    /// without draining; the queue ends up `Closed`.
    pub fn drain(&self) -> (Vec<I>, Vec<O>) {
        let mut inner = self.inner.lock();
        inner.state = QueueState::Closed;
        let pending = inner.pending.drain(..).collect();
        let ready = inner.ready.drain(..).collect();
        drop(inner);
        self.space.notify_all();
        self.work.notify_all();
        self.results.notify_all();
        (pending, ready)
    }
}

/// Wait on `cv` until notified or `deadline`. Returns false on timeout.
fn wait<T>(cv: &Condvar, guard: &mut MutexGuard<'_, T>, deadline: Option<Instant>) -> bool {
    match deadline {
        None => {
            cv.wait(guard);
            true
        }
        Some(deadline) => !cv.wait_until(guard, deadline).timed_out(),
    }
}
