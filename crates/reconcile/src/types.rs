//! Core types for the reconciliation engine

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Key/value payload of a write.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Engine-level failures that are not caused by a task.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The worker thread pool could not be created.
    #[error("failed to create worker pool: {0}")]
    PoolCreation(String),

    /// The task queue has no consumers left.
    #[error("task queue disconnected")]
    Disconnected,

    /// A proposal arrived after the confirmation queue was closed.
    #[error("confirmation queue already closed, cannot accept: {0}")]
    GateClosed(String),

    /// A task failed fatally; the pool stopped executing work.
    #[error("sync aborted: {0}")]
    Aborted(String),

    /// A worker panicked while running a task.
    #[error("worker panicked while running {0}")]
    Panicked(String),
}

/// Counters shared by every component during one sync pass.
#[derive(Debug, Default)]
pub struct SyncStats {
    written: AtomicUsize,
    deleted: AtomicUsize,
    declined: AtomicUsize,
    skipped: AtomicUsize,
}

impl SyncStats {
    /// Record an applied write.
    pub fn record_write(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a confirmed destructive change.
    pub fn record_delete(&self) {
        self.deleted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a declined destructive change.
    pub fn record_decline(&self) {
        self.declined.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a resource skipped because of a recoverable problem.
    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> SyncSummary {
        SyncSummary {
            written: self.written.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            declined: self.declined.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Summary of a sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub written: usize,
    pub deleted: usize,
    pub declined: usize,
    pub skipped: usize,
}

impl SyncSummary {
    /// Total number of changes applied to the server
    pub fn total_changes(&self) -> usize {
        self.written + self.deleted
    }

    /// Whether every resource was processed without a recoverable problem
    pub fn is_clean(&self) -> bool {
        self.skipped == 0
    }
}
