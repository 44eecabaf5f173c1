//! Secrets engines
//!
//! Every directory under `secrets-engines/` is one mount, named after the
//! directory. `config.json` holds the mount input; the identity engine is
//! built in and has none. After mounting or tuning, engines of a supported
//! type get their own configuration and roles.

mod aws;
mod database;

use crate::config::parse;
use crate::engine::{Remote, Session};
use crate::resource::identity;
use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use reconcile::{Removal, ResourceKind, SyncContext, SyncPlan};
use std::collections::BTreeMap;
use vaultkit::{MountInput, MountOutput, to_data};

/// Mount types the server manages itself; never removed.
const BUILTIN_TYPES: [&str; 5] = ["system", "cubbyhole", "identity", "kv", "generic"];

const IDENTITY: &str = "identity";

fn mount_path(key: &str) -> String {
    format!("sys/mounts/{}", key.trim_end_matches('/'))
}

/// Mounted secrets engines keyed by path (`aws/`)
///
/// The desired value is `None` for the identity engine.
pub struct SecretsEngines<'a> {
    remote: &'a Remote,
}

impl<'a> SecretsEngines<'a> {
    pub fn new(remote: &'a Remote) -> Self {
        Self { remote }
    }
}

impl ResourceKind for SecretsEngines<'_> {
    type Desired = Option<MountInput>;
    type Observed = MountOutput;

    fn label(&self) -> &'static str {
        "secrets engine"
    }

    fn is_protected(&self, _key: &str, observed: &MountOutput) -> bool {
        BUILTIN_TYPES.contains(&observed.kind.as_str())
    }

    fn verify(&self, key: &str, desired: &Option<MountInput>, observed: &MountOutput) -> Result<()> {
        if let Some(input) = desired
            && input.kind != observed.kind
        {
            bail!(
                "Secrets engine path [{key}] exists but doesn't match type; {} != {}",
                observed.kind,
                input.kind
            );
        }
        Ok(())
    }

    fn upsert(
        &self,
        ctx: &SyncContext,
        key: &str,
        desired: &Option<MountInput>,
        observed: Option<&MountOutput>,
    ) -> Result<()> {
        let Some(input) = desired else {
            if observed.is_none() {
                bail!("Secrets engine [{key}] is not mounted and has no config.json");
            }
            return Ok(());
        };

        if observed.is_none() {
            self.remote
                .backend()
                .mount(key, input)
                .with_context(|| format!("Error mounting secret type [{}] mounted at [{key}]", input.kind))?;
            ctx.stats().record_write();
            info!("Secrets engine enabled: {key} {}", input.kind);
            return Ok(());
        }

        let path = format!("{}/tune", mount_path(key));
        let data = to_data(&path, &input.tune_payload())?;
        ctx.write(path.clone(), format!("Secrets backend tune for [{path}]"), data)
    }

    fn removal(&self, key: &str, _observed: &MountOutput) -> Removal {
        let path = mount_path(key);
        Removal::new(path.clone(), format!("Secrets engine [{path}]"))
    }
}

/// One configured engine, handed to the type-specific routines
pub struct Engine<'a> {
    /// Directory name under `secrets-engines/`
    pub name: &'a str,
    /// Mount path with trailing slash
    pub key: &'a str,
    /// Mounted during this pass
    pub just_enabled: bool,
}

impl Engine<'_> {
    /// Location of an engine file relative to the configuration root.
    pub fn file(&self, relative: &str) -> String {
        format!("secrets-engines/{}/{relative}", self.name)
    }

    /// Namespace for secret substitution.
    pub fn namespace(&self) -> String {
        format!("secrets-engines/{}", self.name)
    }
}

fn load(session: &Session<'_>) -> Result<BTreeMap<String, Option<MountInput>>> {
    let mut desired = BTreeMap::new();
    for name in session.config.subdirectories("secrets-engines")? {
        let input = if name == IDENTITY {
            None
        } else {
            let relative = format!("secrets-engines/{name}/config.json");
            let Some(content) = session.config.json_file(&relative)? else {
                bail!("Config file for secret engine [{name}/] not found");
            };
            Some(parse::<MountInput>(&content, &relative)?)
        };
        desired.insert(format!("{name}/"), input);
    }
    Ok(desired)
}

/// Sync `secrets-engines/*`.
pub fn sync(session: &Session<'_>) -> Result<()> {
    info!("Syncing Secrets Engines");
    let desired = load(session)?;
    let observed = session
        .backend()
        .list_mounts()
        .context("Error listing secrets engines")?;

    let kind = SecretsEngines::new(session.remote);
    let plan = SyncPlan::new(&kind, &desired, &observed)?;
    plan.apply_changes(session.ctx)?;

    for (key, input) in &desired {
        let engine = Engine {
            name: key.trim_end_matches('/'),
            key,
            just_enabled: plan.diff().create.contains(key),
        };
        match input.as_ref().map_or(IDENTITY, |input| input.kind.as_str()) {
            IDENTITY => identity::sync(session, key)?,
            "aws" => aws::sync(session, &engine)?,
            "database" => database::sync(session, &engine)?,
            "kv" => debug!("Nothing to configure for kv engine [{key}]"),
            other => warn!("Secrets engine type [{other}] at [{key}] is not currently supported"),
        }
    }

    plan.propose_removals(session.ctx)
}
