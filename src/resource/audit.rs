//! Audit devices
//!
//! Devices cannot be tuned in place: a configured device that differs from
//! the enabled one is disabled and enabled again, which needs confirmation
//! because audit logging stops in between.

use crate::config::parse;
use crate::engine::{Remote, Session};
use anyhow::{Context, Result};
use log::info;
use reconcile::{Removal, ResourceKind, SyncContext, Task, sync_kind};
use std::collections::BTreeMap;
use vaultkit::{AuditInput, AuditOutput};

fn path(key: &str) -> String {
    format!("sys/audit/{}", key.trim_end_matches('/'))
}

fn description(key: &str) -> String {
    format!("Audit device [{}]", path(key))
}

/// Audit devices keyed by path (`file/`)
pub struct AuditDevices<'a> {
    remote: &'a Remote,
}

impl<'a> AuditDevices<'a> {
    pub fn new(remote: &'a Remote) -> Self {
        Self { remote }
    }
}

impl ResourceKind for AuditDevices<'_> {
    type Desired = AuditInput;
    type Observed = AuditOutput;

    fn label(&self) -> &'static str {
        "audit device"
    }

    fn upsert(&self, ctx: &SyncContext, key: &str, desired: &AuditInput, observed: Option<&AuditOutput>) -> Result<()> {
        match observed {
            None => {
                self.remote
                    .backend()
                    .enable_audit(key, desired)
                    .with_context(|| format!("Error enabling {}", description(key)))?;
                ctx.stats().record_write();
                info!("Audit device enabled: {key} {}", desired.kind);
                Ok(())
            }
            Some(current) if current.matches(desired) => Ok(()),
            Some(_) => ctx.propose(Box::new(RecreateAudit {
                remote: self.remote.clone(),
                key: key.to_string(),
                path: path(key),
                input: desired.clone(),
            })),
        }
    }

    fn removal(&self, key: &str, _observed: &AuditOutput) -> Removal {
        Removal::new(path(key), description(key))
    }
}

/// Disable then re-enable a device with new settings
struct RecreateAudit {
    remote: Remote,
    key: String,
    path: String,
    input: AuditInput,
}

impl Task for RecreateAudit {
    fn description(&self) -> String {
        description(&self.key)
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn confirmation_prompt(&self) -> String {
        format!("Recreate audit device [{}] to reconfigure", self.key)
    }

    fn run(&self, _worker: usize) -> Result<bool> {
        let backend = self.remote.backend();
        backend
            .disable_audit(&self.key)
            .with_context(|| format!("Error disabling {}", self.description()))?;
        backend
            .enable_audit(&self.key, &self.input)
            .with_context(|| format!("Error enabling {}", self.description()))?;
        info!("Audit device recreated: {} {}", self.key, self.input.kind);
        Ok(true)
    }
}

/// Sync `audit_devices/*.json`.
pub fn sync(session: &Session<'_>) -> Result<()> {
    info!("Syncing Audit Devices");
    let mut desired = BTreeMap::new();
    for (name, content) in session.config.json_files("audit_devices")? {
        let input: AuditInput = parse(&content, &format!("audit_devices/{name}.json"))?;
        desired.insert(format!("{name}/"), input);
    }

    let observed = session
        .backend()
        .list_audit()
        .context("Error listing audit devices")?;

    sync_kind(session.ctx, &AuditDevices::new(session.remote), &desired, &observed)?;
    Ok(())
}
