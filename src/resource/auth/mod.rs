//! Auth methods and the objects configured inside them
//!
//! Each `auth_methods/<name>.json` describes one mount:
//!
//! ```json
//! {
//!   "auth_options": { "type": "ldap", "description": "Corporate LDAP" },
//!   "config": { "url": "ldaps://ldap.example.com", "bindpass": "%{bindpass}%" },
//!   "additional_config": { "policy_map": { "ops": ["admin"] } }
//! }
//! ```
//!
//! Mounts are enabled inline since everything else in the method depends
//! on them. `config` goes through secret substitution; `additional_config`
//! is interpreted per type.

mod ldap;
mod roles;
mod userpass;

use crate::config::parse;
use crate::engine::{Remote, Session};
use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use reconcile::{Payload, Removal, ResourceKind, SyncContext, sync_kind};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use vaultkit::{MountInput, MountOutput, to_data};

/// One auth method as configured
#[derive(Debug, Clone, Deserialize)]
pub struct AuthMethodConfig {
    pub auth_options: MountInput,
    #[serde(default)]
    pub config: Option<Payload>,
    #[serde(default)]
    pub additional_config: Option<Value>,
}

impl AuthMethodConfig {
    /// Typed view of `additional_config`; `None` when it is absent.
    fn additional<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.additional_config
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .with_context(|| format!("Unable to parse additional_config for [auth/{key}]"))
    }
}

fn mount_path(key: &str) -> String {
    format!("sys/auth/{}", key.trim_end_matches('/'))
}

/// Enabled auth methods keyed by path (`ldap/`)
pub struct AuthMethods<'a> {
    remote: &'a Remote,
}

impl<'a> AuthMethods<'a> {
    pub fn new(remote: &'a Remote) -> Self {
        Self { remote }
    }
}

impl ResourceKind for AuthMethods<'_> {
    type Desired = AuthMethodConfig;
    type Observed = MountOutput;

    fn label(&self) -> &'static str {
        "auth method"
    }

    fn is_protected(&self, key: &str, observed: &MountOutput) -> bool {
        key == "token/" && observed.kind == "token"
    }

    fn verify(&self, key: &str, desired: &AuthMethodConfig, observed: &MountOutput) -> Result<()> {
        if desired.auth_options.kind != observed.kind {
            bail!(
                "Auth mount path {key} exists but doesn't match type: {} != {}",
                desired.auth_options.kind,
                observed.kind
            );
        }
        Ok(())
    }

    fn upsert(
        &self,
        ctx: &SyncContext,
        key: &str,
        desired: &AuthMethodConfig,
        observed: Option<&MountOutput>,
    ) -> Result<()> {
        let options = &desired.auth_options;
        if observed.is_none() {
            self.remote
                .backend()
                .enable_auth(key, options)
                .with_context(|| format!("Error enabling auth method [{key}]"))?;
            ctx.stats().record_write();
            info!("Auth enabled: {key} {}", options.kind);
            return Ok(());
        }

        let path = format!("{}/tune", mount_path(key));
        let data = to_data(&path, &options.tune_payload())?;
        ctx.write(path.clone(), format!("Auth mount tune for [{path}]"), data)
    }

    fn removal(&self, key: &str, _observed: &MountOutput) -> Removal {
        let path = mount_path(key);
        Removal::new(path.clone(), format!("Auth method [{path}]"))
    }
}

/// Sync `auth_methods/*.json`, then the configuration inside each method.
pub fn sync(session: &Session<'_>) -> Result<()> {
    info!("Syncing Auth Methods");
    let mut desired = BTreeMap::new();
    for (name, content) in session.config.json_files("auth_methods")? {
        let method: AuthMethodConfig = parse(&content, &format!("auth_methods/{name}.json"))?;
        desired.insert(format!("{name}/"), method);
    }

    let observed = session.backend().list_auth().context("Error listing auth methods")?;
    sync_kind(session.ctx, &AuthMethods::new(session.remote), &desired, &observed)?;

    for (key, method) in &desired {
        configure(session, key, method)?;
    }
    Ok(())
}

fn configure(session: &Session<'_>, key: &str, method: &AuthMethodConfig) -> Result<()> {
    if let Some(config) = &method.config {
        write_config(session, key, config)?;
    }

    let kind = method.auth_options.kind.as_str();
    if method.additional_config.is_none() {
        debug!("No additional_config for [auth/{key}], {kind} objects are not managed");
        return Ok(());
    }

    match kind {
        "userpass" => userpass::sync(session, key, method),
        "ldap" => ldap::sync(session, key, method),
        "jwt" | "oidc" => roles::sync(session, key, method, &roles::JWT),
        "kubernetes" => roles::sync(session, key, method, &roles::KUBERNETES),
        other => {
            warn!("Auth type \"{other}\" not currently supported");
            Ok(())
        }
    }
}

/// Substitute secrets into `config` and write it to `auth/<path>config`.
///
/// An unresolved placeholder skips only this write.
fn write_config(session: &Session<'_>, key: &str, config: &Payload) -> Result<()> {
    let name = key.trim_end_matches('/');
    let content = serde_json::to_string(config)
        .with_context(|| format!("Unable to serialize config for [auth/{key}]"))?;
    let Some(data) = session.substitute_json(&content, &format!("auth/{name}"), &format!("auth/{key}config"))? else {
        return Ok(());
    };

    let path = format!("auth/{key}config");
    session
        .ctx
        .write(path.clone(), format!("Auth mount config for [{path}]"), data)
}
