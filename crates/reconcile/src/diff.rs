//! Diff computation between desired and observed collections

use crate::resource::ResourceKind;
use anyhow::Result;
use std::collections::BTreeMap;

/// Keys partitioned by the action they need, each in key order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffPlan {
    /// Desired but not observed
    pub create: Vec<String>,
    /// Desired and observed
    pub update: Vec<String>,
    /// Observed, not desired and not protected
    pub delete: Vec<String>,
    /// Observed, not desired, but protected
    pub protected: Vec<String>,
}

impl DiffPlan {
    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            creates: self.create.len(),
            updates: self.update.len(),
            deletes: self.delete.len(),
            protected: self.protected.len(),
        }
    }
}

/// Compute the diff for one resource kind
///
/// Updates are emitted for every desired key that exists remotely; writes
/// are idempotent so no-op detection is unnecessary. [`ResourceKind::verify`]
/// runs on each of them and its error aborts the diff.
pub fn compute_diff<K: ResourceKind + ?Sized>(
    kind: &K,
    desired: &BTreeMap<String, K::Desired>,
    observed: &BTreeMap<String, K::Observed>,
) -> Result<DiffPlan> {
    let mut plan = DiffPlan::default();

    for (key, want) in desired {
        match observed.get(key) {
            Some(have) => {
                kind.verify(key, want, have)?;
                plan.update.push(key.clone());
            }
            None => plan.create.push(key.clone()),
        }
    }

    for (key, have) in observed {
        if desired.contains_key(key) {
            continue;
        }
        if kind.is_protected(key, have) {
            plan.protected.push(key.clone());
        } else {
            plan.delete.push(key.clone());
        }
    }

    Ok(plan)
}

/// Diff summary statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Number of objects to create
    pub creates: usize,
    /// Number of objects to update
    pub updates: usize,
    /// Number of deletion proposals
    pub deletes: usize,
    /// Number of unconfigured objects kept because they are protected
    pub protected: usize,
}

impl DiffSummary {
    /// Total number of actions
    pub fn total(&self) -> usize {
        self.creates + self.updates + self.deletes
    }

    /// Check if there is anything to do
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}
