use super::AuthMethodConfig;
use crate::engine::Session;
use crate::resource::PathEntries;
use anyhow::Result;
use reconcile::Payload;
use serde::Deserialize;
use std::collections::BTreeMap;

/// LDAP group name to the policies its members receive
#[derive(Debug, Default, Deserialize)]
struct LdapConfig {
    #[serde(default)]
    policy_map: BTreeMap<String, Vec<String>>,
}

fn group_mappings(config: LdapConfig) -> BTreeMap<String, Payload> {
    config
        .policy_map
        .into_iter()
        .map(|(group, policies)| {
            let mut data = Payload::new();
            data.insert("policies".into(), policies.into());
            (group, data)
        })
        .collect()
}

pub(super) fn sync(session: &Session<'_>, key: &str, method: &AuthMethodConfig) -> Result<()> {
    let config: LdapConfig = method.additional(key)?.unwrap_or_default();
    PathEntries::new("ldap group", "LDAP group policy map", format!("auth/{key}groups"))
        .sync(session, &group_mappings(config))?;
    Ok(())
}
