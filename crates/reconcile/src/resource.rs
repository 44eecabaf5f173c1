//! Resource kind trait
//!
//! A resource kind describes one family of remote objects (policies, auth
//! methods, identity entities, ...): how desired and observed values are
//! compared, which observed objects must never be removed, and how a
//! desired value is applied.

use crate::context::SyncContext;
use anyhow::Result;

/// Target of a deletion proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    /// Remote path to delete
    pub path: String,
    /// Human-readable description, e.g. `Policy [old]`
    pub description: String,
}

impl Removal {
    pub fn new(path: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            description: description.into(),
        }
    }
}

/// Core trait for reconciled resource kinds
///
/// # Example
///
/// ```
/// use reconcile::{Removal, ResourceKind, SyncContext};
///
/// struct Policies;
///
/// impl ResourceKind for Policies {
///     type Desired = String;
///     type Observed = ();
///
///     fn label(&self) -> &'static str {
///         "policy"
///     }
///
///     fn is_protected(&self, key: &str, _observed: &()) -> bool {
///         matches!(key, "root" | "default")
///     }
///
///     fn upsert(&self, ctx: &SyncContext, key: &str, rules: &String, _observed: Option<&()>) -> anyhow::Result<()> {
///         let mut data = serde_json::Map::new();
///         data.insert("policy".into(), rules.clone().into());
///         ctx.write(format!("sys/policies/acl/{key}"), format!("Policy [{key}]"), data)
///     }
///
///     fn removal(&self, key: &str, _observed: &()) -> Removal {
///         Removal::new(format!("sys/policies/acl/{key}"), format!("Policy [{key}]"))
///     }
/// }
/// ```
pub trait ResourceKind: Sync {
    /// Desired value, parsed from configuration
    type Desired;

    /// Observed value, as reported by the server
    type Observed;

    /// Kind name used in log messages
    fn label(&self) -> &'static str;

    /// Whether an observed object must never be proposed for removal
    fn is_protected(&self, _key: &str, _observed: &Self::Observed) -> bool {
        false
    }

    /// Check that an existing object can be updated in place
    ///
    /// Return an error for mismatches that make the sync unsafe, such as
    /// an existing mount of a different type. The error is fatal.
    fn verify(&self, _key: &str, _desired: &Self::Desired, _observed: &Self::Observed) -> Result<()> {
        Ok(())
    }

    /// Create (`observed` is `None`) or update an object
    ///
    /// Implementations queue work on the context, or perform it inline when
    /// later steps depend on it. Recoverable problems are logged and
    /// recorded with [`SyncContext::skip`]; errors are fatal.
    fn upsert(
        &self,
        ctx: &SyncContext,
        key: &str,
        desired: &Self::Desired,
        observed: Option<&Self::Observed>,
    ) -> Result<()>;

    /// Where and how to delete an unconfigured object
    fn removal(&self, key: &str, observed: &Self::Observed) -> Removal;
}
