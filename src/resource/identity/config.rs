//! Entity and group files of the identity engine

use crate::config::{ConfigDir, parse};
use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use vaultkit::{Alias, Entity, Group};

/// `secrets-engines/identity/entities/<name>.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityConfig {
    #[serde(default)]
    pub entity: Entity,
    #[serde(default, rename = "entity-aliases")]
    pub aliases: Vec<Alias>,
    /// Groups the entity is a member of
    #[serde(default, rename = "entity-groups")]
    pub groups: Vec<String>,
}

/// `secrets-engines/identity/groups/<name>.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupConfig {
    #[serde(default)]
    pub group: Group,
    #[serde(default, rename = "group-alias")]
    pub alias: Alias,
    /// Groups this group is a member of
    #[serde(default, rename = "group-groups")]
    pub groups: Vec<String>,
}

impl GroupConfig {
    /// Whether the file configures an alias at all.
    pub fn has_alias(&self) -> bool {
        !self.alias.name.is_empty() || !self.alias.mount_path.is_empty() || !self.alias.mount_accessor.is_empty()
    }
}

/// Entities keyed by file stem; the stem is the entity name.
pub fn load_entities(config: &ConfigDir, engine: &str) -> Result<BTreeMap<String, EntityConfig>> {
    let dir = format!("secrets-engines/{engine}/entities");
    let mut entities = BTreeMap::new();
    for (name, content) in config.json_files(&dir)? {
        let mut entity: EntityConfig = parse(&content, &format!("{dir}/{name}.json"))?;
        entity.entity.name.clone_from(&name);
        entities.insert(name, entity);
    }
    Ok(entities)
}

/// Groups keyed by file stem; the stem is the group name.
pub fn load_groups(config: &ConfigDir, engine: &str) -> Result<BTreeMap<String, GroupConfig>> {
    let dir = format!("secrets-engines/{engine}/groups");
    let mut groups = BTreeMap::new();
    for (name, content) in config.json_files(&dir)? {
        let mut group: GroupConfig = parse(&content, &format!("{dir}/{name}.json"))?;
        group.group.name.clone_from(&name);
        // Membership is derived, never taken from the file.
        group.group.member_entity_ids.clear();
        group.group.member_group_ids.clear();
        groups.insert(name, group);
    }
    Ok(groups)
}
