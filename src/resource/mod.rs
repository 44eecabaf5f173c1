//! Per-kind sync routines
//!
//! Every kind is modeled as a [`ResourceKind`] and diffed by the same engine:
//! - desired state from the configuration directory
//! - observed state from the server, fetched fresh on every run
//! - creates and updates queued on the worker pool, removals proposed on
//!   the confirmation gate

pub mod audit;
pub mod auth;
pub mod identity;
pub mod policy;
pub mod secrets_engine;

use crate::engine::Session;
use anyhow::{Context, Result};
use reconcile::{DiffSummary, Payload, Removal, ResourceKind, SyncContext, sync_kind};
use std::collections::BTreeMap;
use vaultkit::Backend;

/// Names listed directly under `path`. Folders are ignored.
pub fn list_names(backend: &dyn Backend, path: &str) -> Result<BTreeMap<String, ()>> {
    let listing = backend
        .list(path)
        .with_context(|| format!("Error listing [{path}]"))?;
    Ok(listing
        .map(|listing| listing.keys)
        .unwrap_or_default()
        .into_iter()
        .filter(|key| !key.ends_with('/'))
        .map(|key| (key, ()))
        .collect())
}

/// Plain objects stored one per name under a base path
///
/// Covers users, group mappings and roles of auth methods and secrets
/// engines: each desired payload is written to `<base>/<name>` and every
/// unconfigured name found by listing `<base>` is proposed for removal.
pub struct PathEntries {
    label: &'static str,
    title: &'static str,
    base: String,
}

impl PathEntries {
    /// `title` prefixes descriptions, e.g. `Userpass user`.
    pub fn new(label: &'static str, title: &'static str, base: impl Into<String>) -> Self {
        Self {
            label,
            title,
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    fn path(&self, name: &str) -> String {
        format!("{}/{name}", self.base)
    }

    fn description(&self, name: &str) -> String {
        format!("{} [{}]", self.title, self.path(name))
    }

    /// Diff against the server and apply.
    pub fn sync(&self, session: &Session<'_>, desired: &BTreeMap<String, Payload>) -> Result<DiffSummary> {
        let observed = list_names(session.backend(), &self.base)?;
        sync_kind(session.ctx, self, desired, &observed)
    }
}

impl ResourceKind for PathEntries {
    type Desired = Payload;
    type Observed = ();

    fn label(&self) -> &'static str {
        self.label
    }

    fn upsert(&self, ctx: &SyncContext, key: &str, desired: &Payload, _observed: Option<&()>) -> Result<()> {
        ctx.write(self.path(key), self.description(key), desired.clone())
    }

    fn removal(&self, key: &str, _observed: &()) -> Removal {
        Removal::new(self.path(key), self.description(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::Harness;
    use reconcile::ScriptedAnswers;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_path_entries_sync() {
        let harness = Harness::new();
        harness.mock.seed("auth/userpass/users/old", json!({"policies": "x"}));
        harness.mock.seed("auth/userpass/users/bob", json!({"policies": "x"}));

        let entries = PathEntries::new("userpass user", "Userpass user", "auth/userpass/users");
        let desired = BTreeMap::from([
            ("bob".to_string(), payload(json!({"username": "bob", "policies": "dev"}))),
            ("carol".to_string(), payload(json!({"username": "carol"}))),
        ]);
        let summary = entries.sync(&harness.session(), &desired).unwrap();
        assert_eq!((summary.creates, summary.updates, summary.deletes), (1, 1, 1));

        let mut answers = ScriptedAnswers::new(["yes"]);
        harness.finish(&mut answers);
        assert_eq!(
            answers.prompts(),
            ["Delete Userpass user [auth/userpass/users/old] at auth/userpass/users/old"]
        );
        assert_eq!(harness.mock.deleted_paths(), ["auth/userpass/users/old"]);
        assert_eq!(harness.mock.stored("auth/userpass/users/bob").unwrap()["policies"], "dev");
        assert!(harness.mock.stored("auth/userpass/users/carol").is_some());
    }

    #[test]
    fn test_list_names_ignores_folders() {
        let harness = Harness::new();
        harness.mock.seed("aws/roles/deploy", json!({}));
        harness.mock.seed("aws/roles/nested/x", json!({}));

        let names = list_names(harness.session().backend(), "aws/roles").unwrap();
        assert_eq!(names.keys().collect::<Vec<_>>(), ["deploy"]);
        assert!(list_names(harness.session().backend(), "aws/none").unwrap().is_empty());
    }
}
