//! Bounded-parallelism admission gate with a runtime-adjustable limit.
//!
//! [`ConcurrencyLimiter::run`] suspends the caller until a slot is free,
//! then guarantees at most `limit` invocations are active at once. The
//! queue is strict FIFO in acquire order. [`ConcurrencyLimiter::update_limit`]
//! resizes the gate while tasks are in flight: raising the limit admits
//! queued waiters immediately, lowering it only throttles future admission
//! and never preempts a running task.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;

use tokio::sync::{oneshot, watch};

struct LimiterState {
    limit: usize,
    active: usize,
    queue: VecDeque<oneshot::Sender<()>>,
}

/// Admission gate enforcing a per-execution parallelism ceiling.
///
/// Thread-safe; designed to be wrapped in `Arc` and shared across the
/// spawned job tasks of one execution.
pub struct ConcurrencyLimiter {
    state: Mutex<LimiterState>,
    /// `true` whenever active == 0 and the queue is empty.
    idle_tx: watch::Sender<bool>,
}

impl ConcurrencyLimiter {
    /// Create a limiter. A limit of zero is clamped to one.
    pub fn new(limit: usize) -> Self {
        let (idle_tx, _) = watch::channel(true);
        Self {
            state: Mutex::new(LimiterState {
                limit: limit.max(1),
                active: 0,
                queue: VecDeque::new(),
            }),
            idle_tx,
        }
    }

    /// Run a task under the limit.
    ///
    /// Suspends until a slot is free, then invokes `task`. The slot is
    /// released when the returned future completes, whatever its output.
    pub async fn run<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire().await;
        let _slot = SlotGuard { limiter: self };
        task().await
    }

    /// Change the parallelism ceiling.
    ///
    /// Raising the limit immediately admits up to `new - old` queued
    /// waiters without waiting for a natural slot release. Lowering it
    /// never preempts in-flight tasks; the active count drains down to the
    /// new limit as tasks finish. Safe to call concurrently from multiple
    /// tasks. A limit of zero is clamped to one.
    pub fn update_limit(&self, new_limit: usize) {
        let mut state = self.state.lock().expect("limiter state poisoned");
        state.limit = new_limit.max(1);
        Self::admit_waiters(&mut state);
        self.refresh_idle(&state);
    }

    /// Number of tasks currently holding a slot.
    pub fn active_count(&self) -> usize {
        self.state.lock().expect("limiter state poisoned").active
    }

    /// Number of tasks waiting for admission.
    pub fn pending_count(&self) -> usize {
        self.state.lock().expect("limiter state poisoned").queue.len()
    }

    /// The current parallelism ceiling.
    pub fn current_limit(&self) -> usize {
        self.state.lock().expect("limiter state poisoned").limit
    }

    /// Suspend until the active count and the pending queue are both zero.
    ///
    /// Event-driven via a watch channel, so it neither polls nor deadlocks
    /// across a concurrent resize.
    pub async fn wait_idle(&self) {
        let mut rx = self.idle_tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    async fn acquire(&self) {
        let waiter = {
            let mut state = self.state.lock().expect("limiter state poisoned");
            if state.active < state.limit {
                state.active += 1;
                self.refresh_idle(&state);
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.queue.push_back(tx);
                self.refresh_idle(&state);
                Some(rx)
            }
        };

        if let Some(rx) = waiter {
            // The sender is never dropped before signalling: release and
            // resize either deliver the slot or leave the entry queued.
            let _ = rx.await;
        }
    }

    fn release(&self) {
        let mut state = self.state.lock().expect("limiter state poisoned");
        state.active -= 1;
        Self::admit_waiters(&mut state);
        self.refresh_idle(&state);
    }

    /// Hand free slots to queued waiters in FIFO order.
    ///
    /// A send failure means the waiter was cancelled while queued; its
    /// entry is discarded without consuming a slot.
    fn admit_waiters(state: &mut LimiterState) {
        while state.active < state.limit {
            match state.queue.pop_front() {
                Some(tx) => {
                    if tx.send(()).is_ok() {
                        state.active += 1;
                    }
                }
                None => break,
            }
        }
    }

    fn refresh_idle(&self, state: &LimiterState) {
        let idle = state.active == 0 && state.queue.is_empty();
        self.idle_tx.send_if_modified(|current| {
            if *current != idle {
                *current = idle;
                true
            } else {
                false
            }
        });
    }
}

/// Releases the held slot when the task future completes.
struct SlotGuard<'a> {
    limiter: &'a ConcurrencyLimiter,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
