//! Named roles of the jwt, oidc and kubernetes auth methods

use super::AuthMethodConfig;
use crate::engine::Session;
use crate::resource::PathEntries;
use anyhow::{Result, bail};
use reconcile::Payload;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// How one auth type names and fills in its roles
pub(super) struct RoleFlavor {
    label: &'static str,
    title: &'static str,
    defaults: &'static [(&'static str, &'static str)],
}

pub(super) const JWT: RoleFlavor = RoleFlavor {
    label: "jwt role",
    title: "JWT/OIDC role",
    defaults: &[("bound_claims_type", "string"), ("token_type", "default")],
};

pub(super) const KUBERNETES: RoleFlavor = RoleFlavor {
    label: "kubernetes role",
    title: "Kubernetes role",
    defaults: &[("alias_name_source", "serviceaccount_uid")],
};

#[derive(Debug, Default, Deserialize)]
struct RolesConfig {
    #[serde(default)]
    roles: Vec<Payload>,
}

fn named_roles(key: &str, flavor: &RoleFlavor, config: RolesConfig) -> Result<BTreeMap<String, Payload>> {
    let mut roles = BTreeMap::new();
    for (i, mut role) in config.roles.into_iter().enumerate() {
        let name = match role.get("name") {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            _ => bail!("Error parsing additional_config.roles[{i}] on auth method [auth/{key}]. Missing 'name' field."),
        };

        for (field, value) in flavor.defaults {
            let unset = match role.get(*field) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            };
            if unset {
                role.insert((*field).to_string(), (*value).into());
            }
        }
        roles.insert(name, role);
    }
    Ok(roles)
}

pub(super) fn sync(session: &Session<'_>, key: &str, method: &AuthMethodConfig, flavor: &RoleFlavor) -> Result<()> {
    let config: RolesConfig = method.additional(key)?.unwrap_or_default();
    let desired = named_roles(key, flavor, config)?;
    PathEntries::new(flavor.label, flavor.title, format!("auth/{key}role")).sync(session, &desired)?;
    Ok(())
}
