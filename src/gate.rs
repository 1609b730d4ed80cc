//! Concurrency gate with a FIFO wait queue.
//!
//! A bounded counter of active slots plus a queue of parked waiters. When
//! a [`SlotGuard`] is dropped the slot passes straight to the oldest live
//! waiter, so the active count never exceeds the bound and waiters are
//! resumed strictly in arrival order.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, ready};

use tokio::sync::oneshot;

use crate::error::{OptimizerError, Result};

#[derive(Debug)]
struct GateState {
    active: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Limits how many operations run at once.
#[derive(Debug)]
pub struct ConcurrencyGate {
    max_concurrent: usize,
    state: Mutex<GateState>,
}

impl ConcurrencyGate {
    /// Create a gate admitting `max_concurrent` holders (minimum 1).
    pub fn new(max_concurrent: usize) -> Arc<Self> {
        Arc::new(Self {
            max_concurrent: max_concurrent.max(1),
            state: Mutex::new(GateState {
                active: 0,
                waiters: VecDeque::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take a slot, waiting in line if the gate is full.
    ///
    /// Fails with [`OptimizerError::Destroyed`] if the queue is torn down
    /// by [`close_waiters()`](Self::close_waiters) while waiting.
    pub async fn acquire(self: &Arc<Self>) -> Result<SlotGuard> {
        let rx = {
            let mut state = self.lock();
            if state.active < self.max_concurrent {
                state.active += 1;
                return Ok(SlotGuard { gate: self.clone() });
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        QueuedWaiter {
            gate: self.clone(),
            rx,
            settled: false,
        }
        .await
        .map(|()| SlotGuard { gate: self.clone() })
        .map_err(|_| OptimizerError::Destroyed)
    }

    /// Give a slot back, handing it to the oldest live waiter if any.
    fn release(&self) {
        let mut state = self.lock();
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                // slot transferred; active count unchanged
                return;
            }
        }
        state.active = state.active.saturating_sub(1);
    }

    /// Drop every queued waiter; their `acquire` calls fail.
    pub fn close_waiters(&self) {
        self.lock().waiters.clear();
    }

    /// Slots currently held.
    pub fn active(&self) -> usize {
        self.lock().active
    }

    /// Callers waiting for a slot.
    pub fn queue_len(&self) -> usize {
        let mut state = self.lock();
        state.waiters.retain(|tx| !tx.is_closed());
        state.waiters.len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

/// A held slot; released on drop.
#[derive(Debug)]
pub struct SlotGuard {
    gate: Arc<ConcurrencyGate>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.gate.release();
    }
}

/// A parked `acquire` call.
///
/// If dropped after a slot was handed to it but before it observed the
/// hand-off, the slot is released again instead of leaking.
struct QueuedWaiter {
    gate: Arc<ConcurrencyGate>,
    rx: oneshot::Receiver<()>,
    settled: bool,
}

impl Future for QueuedWaiter {
    type Output = std::result::Result<(), oneshot::error::RecvError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let outcome = ready!(Pin::new(&mut this.rx).poll(cx));
        this.settled = true;
        Poll::Ready(outcome)
    }
}

impl Drop for QueuedWaiter {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.rx.close();
        if self.rx.try_recv().is_ok() {
            self.gate.release();
        }
    }
}
