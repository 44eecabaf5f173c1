//! AWS secrets engine: root credentials, lease settings and roles

use super::Engine;
use crate::config::parse;
use crate::engine::Session;
use crate::resource::PathEntries;
use anyhow::{Context, Result, bail};
use log::debug;
use reconcile::Payload;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Contents of `aws.json`
#[derive(Debug, Default, Deserialize)]
struct AwsConfig {
    #[serde(default)]
    root_config: Payload,
    #[serde(default)]
    overwrite_root_config: bool,
    #[serde(default)]
    config_lease: Payload,
}

/// Role files with `raw_policy` given as a JSON document get it serialized
/// into `policy_document`.
fn role(content: &str, origin: &str) -> Result<Payload> {
    let mut role: Payload = parse(content, origin)?;
    if let Some(raw) = role.remove("raw_policy")
        && !raw.is_null()
    {
        let document = serde_json::to_string(&raw)
            .with_context(|| format!("Error parsing AWS role raw policy statement in [{origin}]"))?;
        role.insert("policy_document".into(), document.into());
    }
    Ok(role)
}

pub(super) fn sync(session: &Session<'_>, engine: &Engine<'_>) -> Result<()> {
    let relative = engine.file("aws.json");
    let Some(content) = session.config.json_file(&relative)? else {
        bail!(
            "AWS secrets engine config file for path [{}] not found. Cannot configure engine.",
            engine.key
        );
    };
    let Some(payload) = session.substitute_json(&content, &engine.namespace(), &relative)? else {
        return Ok(());
    };
    let config: AwsConfig = serde_json::from_value(payload.into())
        .with_context(|| format!("Error parsing secret engine config for [{}]", engine.key))?;

    let mut roles = BTreeMap::new();
    for (name, content) in session.config.json_files(&engine.file("roles"))? {
        let origin = engine.file(&format!("roles/{name}.json"));
        roles.insert(name, role(&content, &origin)?);
    }

    let key = engine.key;
    if engine.just_enabled || config.overwrite_root_config {
        let path = format!("{key}config/root");
        session
            .ctx
            .write(path.clone(), format!("AWS root config [{path}]"), config.root_config)?;
    } else {
        debug!("Root config exists for [{key}], skipping...");
    }

    let path = format!("{key}config/lease");
    session
        .ctx
        .write(path.clone(), format!("AWS lease config [{path}]"), config.config_lease)?;

    PathEntries::new("aws role", "AWS role", format!("{key}roles")).sync(session, &roles)?;
    Ok(())
}
