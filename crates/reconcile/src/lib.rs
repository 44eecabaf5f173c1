//! # Reconcile
//!
//! An engine for one-shot, idempotent reconciliation of remote configuration.
//!
//! Desired state comes from configuration, observed state from the remote
//! system. The engine diffs them per resource kind, applies creates and
//! updates concurrently on a bounded worker pool, and holds every deletion
//! back until an operator (or a policy) confirms it.
//!
//! ## Core Concepts
//!
//! - **Task**: one remote write or delete ([`WriteTask`], [`DeleteTask`])
//! - **WorkerPool**: fixed number of workers on a bounded queue; the first
//!   fatal task error stops the pool
//! - **WorkCounter**: completion barrier; every queued task holds a ticket
//! - **ConfirmationGate**: queue of destructive tasks, drained serially
//!   after all additive work has finished
//! - **ResourceKind**: per-kind rules for protection, verification and
//!   applying a desired value
//! - **Substitutor**: fills `%{name}%` placeholders from stored secrets
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{AutoDecline, SyncContext, sync_kind};
//!
//! let ctx = SyncContext::new(store, 5)?;
//! sync_kind(&ctx, &Policies, &desired, &observed)?;
//! let summary = ctx.finish(&mut AutoDecline)?;
//! println!("{} writes", summary.written);
//! ```
//!
//! ## Provider Traits
//!
//! - [`Store`]: performs remote writes and deletes
//! - [`SecretSource`]: reads secrets for substitution
//! - [`ConfirmationPolicy`]: approves or declines destructive changes
//!
//! This allows the crate to be used without a hard dependency on a specific
//! API client or terminal library.

pub mod context;
pub mod counter;
pub mod diff;
pub mod executor;
pub mod gate;
pub mod planner;
pub mod resource;
pub mod substitute;
pub mod task;
pub mod types;

// Re-export main types at crate root
pub use context::{
    AutoConfirm, AutoDecline, ConfirmationPolicy, DEFAULT_CONFIRM_ATTEMPTS, ScriptedAnswers, Store,
    SyncContext, confirm_with_retries, parse_answer,
};
pub use counter::{Ticket, WorkCounter};
pub use diff::{DiffPlan, DiffSummary, compute_diff};
pub use executor::{DEFAULT_WORKERS, QUEUE_CAPACITY, WorkerPool};
pub use gate::ConfirmationGate;
pub use planner::{SyncPlan, sync_kind};
pub use resource::{Removal, ResourceKind};
pub use substitute::{SecretSource, Substitution, Substitutor, leftover_placeholders};
pub use task::{BoxedTask, DeleteTask, Task, WriteTask};
pub use types::{EngineError, Payload, SyncStats, SyncSummary};
