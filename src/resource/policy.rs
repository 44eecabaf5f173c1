//! ACL policies

use crate::engine::Session;
use anyhow::{Context, Result};
use log::info;
use reconcile::{Payload, Removal, ResourceKind, SyncContext, sync_kind};
use std::collections::BTreeMap;

/// Policies the server ships with; never removed.
const BUILTIN: [&str; 2] = ["root", "default"];

/// ACL policies keyed by name, desired value is the raw rules document
pub struct Policies;

fn path(name: &str) -> String {
    format!("sys/policies/acl/{name}")
}

fn description(name: &str) -> String {
    format!("Policy [{name}]")
}

impl ResourceKind for Policies {
    type Desired = String;
    type Observed = ();

    fn label(&self) -> &'static str {
        "policy"
    }

    fn is_protected(&self, key: &str, _observed: &()) -> bool {
        BUILTIN.contains(&key)
    }

    fn upsert(&self, ctx: &SyncContext, key: &str, rules: &String, _observed: Option<&()>) -> Result<()> {
        let mut data = Payload::new();
        data.insert("policy".into(), rules.clone().into());
        ctx.write(path(key), description(key), data)
    }

    fn removal(&self, key: &str, _observed: &()) -> Removal {
        Removal::new(path(key), description(key))
    }
}

/// Sync `policies/*.{hcl,json}`.
pub fn sync(session: &Session<'_>) -> Result<()> {
    info!("Syncing Policies");
    let desired = session.config.policy_files("policies")?;
    let observed: BTreeMap<String, ()> = session
        .backend()
        .list_policies()
        .context("Error listing policies")?
        .into_iter()
        .map(|name| (name, ()))
        .collect();

    sync_kind(session.ctx, &Policies, &desired, &observed)?;
    Ok(())
}
