//! Identity graph objects: entities, groups and aliases.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name prefix the server gives to entities it creates implicitly on login.
pub const AUTO_GENERATED_PREFIX: &str = "entity_";

/// Whether a name looks like an implicitly created identity object.
#[must_use]
pub fn is_auto_generated(name: &str) -> bool {
    name.starts_with(AUTO_GENERATED_PREFIX)
}

/// An identity entity.
///
/// The server only updates fields present in a write, so list and map
/// fields are always sent, empty ones included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Server-assigned ID. Never written.
    #[serde(default, skip_serializing)]
    pub id: String,
    /// Human-friendly unique name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Client-set metadata.
    #[serde(default, deserialize_with = "nullable")]
    pub metadata: BTreeMap<String, String>,
    /// Policies granted to the entity.
    #[serde(default, deserialize_with = "nullable")]
    pub policies: Vec<String>,
    /// Whether tokens tied to the entity are disabled.
    #[serde(default)]
    pub disabled: bool,
}

/// An identity group.
///
/// Like [`Entity`], empty lists and maps are still sent so that removed
/// members and policies are cleared on the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Server-assigned ID.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Unique name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Policies granted to members.
    #[serde(default, deserialize_with = "nullable")]
    pub policies: Vec<String>,
    /// IDs of member groups. Derived, never configured directly.
    #[serde(default, deserialize_with = "nullable")]
    pub member_group_ids: Vec<String>,
    /// IDs of member entities. Derived, never configured directly.
    #[serde(default, deserialize_with = "nullable")]
    pub member_entity_ids: Vec<String>,
    /// Custom metadata.
    #[serde(default, deserialize_with = "nullable")]
    pub metadata: BTreeMap<String, String>,
    /// `internal` or `external`.
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

/// A binding between an entity or group and an auth mount.
///
/// Unique on the server by `(mount_accessor, name)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    /// Server-assigned ID; set when updating an existing alias.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// ID of the owning entity or group.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub canonical_id: String,
    /// Name of the owning entity or group.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub canonical_name: String,
    /// Accessor of the auth mount.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mount_accessor: String,
    /// Path of the auth mount (`ldap/`), resolved to an accessor before writing.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mount_path: String,
    /// Type of the auth mount.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mount_type: String,
    /// Name of the identity in the auth source.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl Alias {
    /// Copy holding only the fields the alias write endpoint accepts.
    #[must_use]
    pub fn cleaned(&self) -> Self {
        Self {
            id: self.id.clone(),
            canonical_id: self.canonical_id.clone(),
            mount_accessor: self.mount_accessor.clone(),
            name: self.name.clone(),
            ..Self::default()
        }
    }

    /// Whether `other` names the same remote alias.
    #[must_use]
    pub(crate) fn same_binding(&self, other: &Self) -> bool {
        self.mount_accessor == other.mount_accessor && self.name == other.name
    }
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_id_is_never_written() {
        let entity = Entity {
            id: "abc".into(),
            name: "alice".into(),
            policies: vec!["dev".into()],
            ..Entity::default()
        };
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value, json!({"name": "alice", "metadata": {}, "policies": ["dev"], "disabled": false}));
    }

    #[test]
    fn test_group_always_sends_membership() {
        let group = Group {
            id: "g1".into(),
            name: "admins".into(),
            ..Group::default()
        };
        let value = serde_json::to_value(&group).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "g1",
                "name": "admins",
                "policies": [],
                "member_group_ids": [],
                "member_entity_ids": [],
                "metadata": {}
            })
        );
    }

    #[test]
    fn test_group_accepts_null_members() {
        let group: Group = serde_json::from_value(json!({
            "name": "admins",
            "member_entity_ids": null,
            "metadata": null,
            "type": "internal"
        }))
        .unwrap();
        assert!(group.member_entity_ids.is_empty());
        assert_eq!(group.kind, "internal");
    }

    #[test]
    fn test_alias_cleaned_drops_lookup_fields() {
        let alias = Alias {
            id: "a1".into(),
            canonical_id: "e1".into(),
            canonical_name: "alice".into(),
            mount_accessor: "auth_ldap_1".into(),
            mount_path: "ldap/".into(),
            mount_type: "ldap".into(),
            name: "alice".into(),
        };
        let value = serde_json::to_value(alias.cleaned()).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "a1",
                "canonical_id": "e1",
                "mount_accessor": "auth_ldap_1",
                "name": "alice"
            })
        );
    }

    #[test]
    fn test_is_auto_generated() {
        assert!(is_auto_generated("entity_5f2c1a"));
        assert!(!is_auto_generated("alice"));
    }
}
