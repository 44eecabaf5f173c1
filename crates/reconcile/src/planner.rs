//! Sync planner - turns a diff into queued work and deletion proposals

use crate::context::SyncContext;
use crate::diff::{DiffPlan, DiffSummary, compute_diff};
use crate::resource::ResourceKind;
use anyhow::Result;
use log::debug;
use std::collections::BTreeMap;

/// A computed diff bound to its collections
pub struct SyncPlan<'a, K: ResourceKind + ?Sized> {
    kind: &'a K,
    desired: &'a BTreeMap<String, K::Desired>,
    observed: &'a BTreeMap<String, K::Observed>,
    diff: DiffPlan,
}

impl<'a, K: ResourceKind + ?Sized> SyncPlan<'a, K> {
    /// Diff `desired` against `observed`
    pub fn new(
        kind: &'a K,
        desired: &'a BTreeMap<String, K::Desired>,
        observed: &'a BTreeMap<String, K::Observed>,
    ) -> Result<Self> {
        let diff = compute_diff(kind, desired, observed)?;
        Ok(Self {
            kind,
            desired,
            observed,
            diff,
        })
    }

    pub fn diff(&self) -> &DiffPlan {
        &self.diff
    }

    /// Apply the plan: creates and updates through the kind, deletions as
    /// proposals on the confirmation gate
    pub fn apply(&self, ctx: &SyncContext) -> Result<DiffSummary> {
        self.apply_changes(ctx)?;
        self.propose_removals(ctx)?;
        Ok(self.diff.summary())
    }

    /// Creates and updates only.
    pub fn apply_changes(&self, ctx: &SyncContext) -> Result<()> {
        for key in &self.diff.create {
            if let Some(want) = self.desired.get(key) {
                self.kind.upsert(ctx, key, want, None)?;
            }
        }

        for key in &self.diff.update {
            if let (Some(want), Some(have)) = (self.desired.get(key), self.observed.get(key)) {
                self.kind.upsert(ctx, key, want, Some(have))?;
            }
        }
        Ok(())
    }

    /// Deletion proposals only. Protected keys are logged and kept.
    pub fn propose_removals(&self, ctx: &SyncContext) -> Result<()> {
        let label = self.kind.label();
        for key in &self.diff.protected {
            debug!("Keeping protected {label} [{key}]");
        }

        for key in &self.diff.delete {
            if let Some(have) = self.observed.get(key) {
                let removal = self.kind.removal(key, have);
                ctx.propose_delete(removal.path, removal.description)?;
            }
        }
        Ok(())
    }
}

/// Diff and apply in one step
pub fn sync_kind<K: ResourceKind + ?Sized>(
    ctx: &SyncContext,
    kind: &K,
    desired: &BTreeMap<String, K::Desired>,
    observed: &BTreeMap<String, K::Observed>,
) -> Result<DiffSummary> {
    let summary = SyncPlan::new(kind, desired, observed)?.apply(ctx)?;
    debug!(
        "{}: {} create, {} update, {} proposed for deletion, {} protected",
        kind.label(),
        summary.creates,
        summary.updates,
        summary.deletes,
        summary.protected
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoDecline, ScriptedAnswers};
    use crate::resource::Removal;
    use crate::task::tests::RecordingStore;
    use crate::types::Payload;
    use std::sync::Arc;

    struct Policies;

    impl ResourceKind for Policies {
        type Desired = String;
        type Observed = ();

        fn label(&self) -> &'static str {
            "policy"
        }

        fn is_protected(&self, key: &str, _observed: &()) -> bool {
            matches!(key, "root" | "default")
        }

        fn upsert(&self, ctx: &SyncContext, key: &str, rules: &String, _observed: Option<&()>) -> Result<()> {
            let mut data = Payload::new();
            data.insert("policy".into(), rules.clone().into());
            ctx.write(format!("sys/policies/acl/{key}"), format!("Policy [{key}]"), data)
        }

        fn removal(&self, key: &str, _observed: &()) -> Removal {
            Removal::new(format!("sys/policies/acl/{key}"), format!("Policy [{key}]"))
        }
    }

    fn observed(names: &[&str]) -> BTreeMap<String, ()> {
        names.iter().map(|n| ((*n).to_string(), ())).collect()
    }

    #[test]
    fn test_policy_scenario_proposes_only_unprotected() {
        let store = Arc::new(RecordingStore::default());
        let ctx = SyncContext::new(store.clone(), 2).unwrap();
        let desired = BTreeMap::from([("app".to_string(), "path \"app/*\" {}".to_string())]);
        let observed = observed(&["app", "old", "default", "root"]);

        let summary = sync_kind(&ctx, &Policies, &desired, &observed).unwrap();
        assert_eq!(summary.deletes, 1);
        assert_eq!(summary.protected, 2);

        let mut policy = ScriptedAnswers::new(["y", "y", "y"]);
        ctx.finish(&mut policy).unwrap();

        assert_eq!(policy.prompts(), ["Delete Policy [old] at sys/policies/acl/old"]);
        assert_eq!(*store.deletes.lock(), vec!["sys/policies/acl/old".to_string()]);
        assert_eq!(store.writes.lock()[0].0, "sys/policies/acl/app");
    }

    #[test]
    fn test_split_application_defers_removals() {
        let store = Arc::new(RecordingStore::default());
        let ctx = SyncContext::new(store.clone(), 1).unwrap();
        let desired = BTreeMap::from([("app".to_string(), String::new())]);
        let observed = observed(&["old"]);

        let plan = SyncPlan::new(&Policies, &desired, &observed).unwrap();
        plan.apply_changes(&ctx).unwrap();
        assert_eq!(ctx.gate().pending(), 0);

        plan.propose_removals(&ctx).unwrap();
        assert_eq!(ctx.gate().pending(), 1);
        ctx.finish(&mut AutoDecline).unwrap();
        assert!(store.deletes.lock().is_empty());
    }

    #[test]
    fn test_rerun_writes_identical_payloads() {
        let desired = BTreeMap::from([("app".to_string(), "path \"app/*\" {}".to_string())]);

        let first_store = Arc::new(RecordingStore::default());
        let ctx = SyncContext::new(first_store.clone(), 1).unwrap();
        sync_kind(&ctx, &Policies, &desired, &observed(&["default", "root"])).unwrap();
        ctx.finish(&mut AutoDecline).unwrap();

        let second_store = Arc::new(RecordingStore::default());
        let ctx = SyncContext::new(second_store.clone(), 1).unwrap();
        let summary = sync_kind(&ctx, &Policies, &desired, &observed(&["app", "default", "root"])).unwrap();
        ctx.finish(&mut AutoDecline).unwrap();

        assert_eq!(summary.deletes, 0);
        assert_eq!(*first_store.writes.lock(), *second_store.writes.lock());
    }
}
