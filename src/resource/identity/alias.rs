//! Alias claims made by entity and group files
//!
//! An alias is unique on the server by `(mount_accessor, name)`. Claims
//! are validated and resolved against the current auth mounts before
//! anything is written, so that a configuration error never leaves the
//! identity graph half applied.

use anyhow::{Result, bail};
use log::warn;
use std::collections::BTreeMap;
use std::fmt;
use vaultkit::{Alias, MountOutput};

/// Kind of object owning an alias
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Entity,
    Group,
}

impl Owner {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of an alias: `<mount_accessor>/<name>`
pub fn alias_key(alias: &Alias) -> String {
    format!("{}/{}", alias.mount_accessor, alias.name)
}

/// Validated aliases of one owner kind, keyed by [`alias_key`]
pub struct AliasClaims<'a> {
    owner: Owner,
    auth_mounts: &'a BTreeMap<String, MountOutput>,
    claims: BTreeMap<String, Alias>,
}

impl<'a> AliasClaims<'a> {
    pub fn new(owner: Owner, auth_mounts: &'a BTreeMap<String, MountOutput>) -> Self {
        Self {
            owner,
            auth_mounts,
            claims: BTreeMap::new(),
        }
    }

    /// Validate an alias of `canonical_name` and record it.
    ///
    /// Returns `Ok(false)` when the alias is skipped with a warning: no
    /// name, an unknown mount path, or a binding already claimed earlier.
    /// Naming both or neither of the mount fields is a configuration error.
    pub fn claim(&mut self, canonical_name: &str, alias: &Alias) -> Result<bool> {
        let owner = self.owner;
        if alias.name.is_empty() {
            warn!("Alias for {owner} [{canonical_name}] missing 'name' field, skipping...");
            return Ok(false);
        }
        if !alias.mount_accessor.is_empty() && !alias.mount_path.is_empty() {
            bail!(
                "Error creating alias for {owner} [{canonical_name}]: Only one of 'mount_accessor' or 'mount_path' can be specified"
            );
        }
        if alias.mount_accessor.is_empty() && alias.mount_path.is_empty() {
            bail!("Error creating alias for {owner} [{canonical_name}]: Either 'mount_accessor' or 'mount_path' is required");
        }

        let mut alias = alias.clone();
        if alias.mount_accessor.is_empty() {
            let Some(mount) = self.auth_mounts.get(&alias.mount_path) else {
                warn!(
                    "Alias for {owner} [{canonical_name}] contains an invalid mount_path [{}]. Ensure mount is valid and in the format '<path>/'. Alias will be skipped",
                    alias.mount_path
                );
                return Ok(false);
            };
            alias.mount_accessor.clone_from(&mount.accessor);
        }

        let key = alias_key(&alias);
        if self.claims.contains_key(&key) {
            warn!("Duplicate alias [{key}] for {owner} [{canonical_name}] will not be applied");
            return Ok(false);
        }

        alias.canonical_name = canonical_name.to_string();
        self.claims.insert(key, alias);
        Ok(true)
    }

    /// Claims with `canonical_id` set from `ids` (name to ID).
    ///
    /// An owner without an ID is left out; it was not written.
    pub fn resolve(&self, ids: &BTreeMap<String, String>) -> BTreeMap<String, Alias> {
        self.claims
            .iter()
            .filter_map(|(key, alias)| {
                let id = ids.get(&alias.canonical_name)?;
                let mut alias = alias.clone();
                alias.canonical_id.clone_from(id);
                Some((key.clone(), alias))
            })
            .collect()
    }

    pub fn count(&self) -> usize {
        self.claims.len()
    }
}
