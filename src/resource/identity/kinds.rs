//! Resource kinds of the identity graph
//!
//! All writes hold a ticket on the resolver's phase barrier so the next
//! phase only starts once every ID it reads has been assigned.

use super::alias::Owner;
use anyhow::Result;
use reconcile::{Removal, ResourceKind, SyncContext, WorkCounter};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use vaultkit::{Alias, Entity, Group, is_auto_generated, to_data};

/// Identity object as listed with `key_info`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Listed {
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Entities keyed by name
pub struct Entities<'a> {
    pub mount: &'a str,
    pub barrier: &'a Arc<WorkCounter>,
}

impl ResourceKind for Entities<'_> {
    type Desired = Entity;
    type Observed = Listed;

    fn label(&self) -> &'static str {
        "identity entity"
    }

    fn is_protected(&self, key: &str, _observed: &Listed) -> bool {
        is_auto_generated(key)
    }

    fn upsert(&self, ctx: &SyncContext, key: &str, entity: &Entity, _observed: Option<&Listed>) -> Result<()> {
        let path = format!("{}entity/name/{key}", self.mount);
        let data = to_data(&path, entity)?;
        ctx.write_tracked(path, format!("Identity entity [{key}]"), data, self.barrier)
    }

    fn removal(&self, key: &str, _observed: &Listed) -> Removal {
        Removal::new(format!("{}entity/name/{key}", self.mount), format!("Identity entity [{key}]"))
    }
}

/// Groups keyed by name
///
/// The desired value is written as is; the resolver fills in the ID and
/// membership before the final pass.
pub struct Groups<'a> {
    pub mount: &'a str,
    pub barrier: &'a Arc<WorkCounter>,
}

impl Groups<'_> {
    /// Queue one group write.
    ///
    /// Entity membership of external groups is managed by their alias.
    pub fn write(&self, ctx: &SyncContext, key: &str, group: &Group) -> Result<()> {
        let path = format!("{}group/name/{key}", self.mount);
        let mut data = to_data(&path, group)?;
        if group.kind == "external" {
            data.remove("member_entity_ids");
        }
        ctx.write_tracked(path, format!("Identity group [{key}]"), data, self.barrier)
    }
}

impl ResourceKind for Groups<'_> {
    type Desired = Group;
    type Observed = Listed;

    fn label(&self) -> &'static str {
        "identity group"
    }

    fn upsert(&self, ctx: &SyncContext, key: &str, group: &Group, _observed: Option<&Listed>) -> Result<()> {
        self.write(ctx, key, group)
    }

    fn removal(&self, key: &str, _observed: &Listed) -> Removal {
        Removal::new(format!("{}group/name/{key}", self.mount), format!("Identity group [{key}]"))
    }
}

/// Entity or group aliases keyed by `<mount_accessor>/<name>`
///
/// Observed aliases carry their server ID; a desired alias matching one is
/// updated by that ID instead of created.
pub struct Aliases<'a> {
    pub mount: &'a str,
    pub owner: Owner,
    pub barrier: &'a Arc<WorkCounter>,
    /// Entity names by ID, for protecting aliases of implicit entities
    pub entity_names: &'a BTreeMap<String, String>,
}

impl ResourceKind for Aliases<'_> {
    type Desired = Alias;
    type Observed = Alias;

    fn label(&self) -> &'static str {
        match self.owner {
            Owner::Entity => "identity entity alias",
            Owner::Group => "identity group alias",
        }
    }

    fn is_protected(&self, _key: &str, observed: &Alias) -> bool {
        if is_auto_generated(&observed.name) {
            return true;
        }
        self.owner == Owner::Entity
            && self
                .entity_names
                .get(&observed.canonical_id)
                .is_some_and(|name| is_auto_generated(name))
    }

    fn upsert(&self, ctx: &SyncContext, key: &str, alias: &Alias, observed: Option<&Alias>) -> Result<()> {
        let mut alias = alias.cleaned();
        if let Some(existing) = observed {
            alias.id.clone_from(&existing.id);
        }
        let path = format!("{}{}-alias", self.mount, self.owner);
        let data = to_data(&path, &alias)?;
        ctx.write_tracked(path, format!("Identity {} alias [{key}]", self.owner), data, self.barrier)
    }

    fn removal(&self, key: &str, observed: &Alias) -> Removal {
        Removal::new(
            format!("{}{}-alias/id/{}", self.mount, self.owner, observed.id),
            format!("Identity {} alias [{key}]", self.owner),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias(id: &str, name: &str, canonical_id: &str) -> Alias {
        Alias {
            id: id.into(),
            canonical_id: canonical_id.into(),
            mount_accessor: "auth_ldap_1".into(),
            name: name.into(),
            ..Alias::default()
        }
    }

    #[test]
    fn test_alias_protection() {
        let barrier = WorkCounter::new();
        let entity_names = BTreeMap::from([
            ("e1".to_string(), "entity_5f2c".to_string()),
            ("e2".to_string(), "bob".to_string()),
        ]);
        let entities = Aliases {
            mount: "identity/",
            owner: Owner::Entity,
            barrier: &barrier,
            entity_names: &entity_names,
        };

        assert!(entities.is_protected("auth_ldap_1/x", &alias("a1", "entity_77", "e2")));
        assert!(entities.is_protected("auth_ldap_1/x", &alias("a2", "carol", "e1")));
        assert!(!entities.is_protected("auth_ldap_1/bob", &alias("a3", "bob", "e2")));

        let groups = Aliases {
            owner: Owner::Group,
            ..entities
        };
        assert!(!groups.is_protected("auth_ldap_1/x", &alias("a4", "carol", "e1")));
    }

    #[test]
    fn test_alias_removal_uses_id() {
        let barrier = WorkCounter::new();
        let entity_names = BTreeMap::new();
        let kind = Aliases {
            mount: "identity/",
            owner: Owner::Group,
            barrier: &barrier,
            entity_names: &entity_names,
        };
        let removal = kind.removal("auth_ldap_1/cn=ops", &alias("a9", "cn=ops", "g1"));
        assert_eq!(removal.path, "identity/group-alias/id/a9");
        assert_eq!(removal.description, "Identity group alias [auth_ldap_1/cn=ops]");
    }

    #[test]
    fn test_implicit_entities_are_protected() {
        let barrier = WorkCounter::new();
        let kind = Entities {
            mount: "identity/",
            barrier: &barrier,
        };
        assert!(kind.is_protected("entity_5f2c", &Listed::default()));
        assert!(!kind.is_protected("alice", &Listed::default()));
    }
}
