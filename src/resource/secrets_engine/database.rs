//! Database secrets engine: one connection config and its roles

use super::Engine;
use crate::config::parse;
use crate::engine::Session;
use crate::resource::PathEntries;
use anyhow::{Result, bail};
use std::collections::BTreeMap;

pub(super) fn sync(session: &Session<'_>, engine: &Engine<'_>) -> Result<()> {
    let key = engine.key;
    let relative = engine.file("db.json");
    let Some(content) = session.config.json_file(&relative)? else {
        bail!("Database secrets engine config file for path [{key}] not found. Cannot configure engine.");
    };
    let Some(config) = session.substitute_json(&content, &engine.namespace(), &relative)? else {
        return Ok(());
    };

    let mut roles = BTreeMap::new();
    for (name, content) in session.config.json_files(&engine.file("roles"))? {
        let origin = engine.file(&format!("roles/{name}.json"));
        roles.insert(name, parse(&content, &origin)?);
    }

    let path = format!("{key}config/db");
    session
        .ctx
        .write(path.clone(), format!("Database config [{path}]"), config)?;

    PathEntries::new("database role", "Database role", format!("{key}roles")).sync(session, &roles)?;
    Ok(())
}
