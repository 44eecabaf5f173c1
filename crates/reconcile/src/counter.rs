//! Outstanding-work counter used as a completion barrier

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Counts outstanding tasks; [`WorkCounter::wait`] blocks until it is zero.
///
/// Work is registered by taking a [`Ticket`] before the task is queued. The
/// ticket decrements the counter when dropped, so a task releases it exactly
/// once whether it succeeds, fails or is skipped.
#[derive(Debug, Default)]
pub struct WorkCounter {
    pending: Mutex<usize>,
    drained: Condvar,
}

impl WorkCounter {
    /// Create a shared counter.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register one unit of work.
    pub fn ticket(self: &Arc<Self>) -> Ticket {
        *self.pending.lock() += 1;
        Ticket {
            counter: Arc::clone(self),
        }
    }

    /// Number of tickets not yet released.
    pub fn pending(&self) -> usize {
        *self.pending.lock()
    }

    /// Block until every ticket has been released.
    pub fn wait(&self) {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.drained.wait(&mut pending);
        }
    }

    fn release(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.drained.notify_all();
        }
    }
}

/// One registered unit of work. Dropping it marks the work complete.
#[derive(Debug)]
#[must_use = "dropping a ticket immediately marks the work complete"]
pub struct Ticket {
    counter: Arc<WorkCounter>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.counter.release();
    }
}
