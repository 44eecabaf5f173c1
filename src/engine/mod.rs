//! Sync engine for vault-admin
//!
//! The engine wires the configuration directory, the server and the
//! reconciliation core together:
//! 1. Session - what every per-kind routine gets handed
//! 2. Remote - the server as a task store and secret source
//! 3. Executor - runs the per-kind routines and drains confirmations

pub mod executor;
pub mod prompt;
pub mod remote;

pub use executor::{SyncOptions, run_sync};
pub use prompt::policy_for;
pub use remote::Remote;

use crate::config::ConfigDir;
use anyhow::{Context, Result};
use log::warn;
use reconcile::{Payload, Substitution, Substitutor, SyncContext};
use vaultkit::Backend;

/// Everything a per-kind sync routine works with during one pass
pub struct Session<'a> {
    pub ctx: &'a SyncContext,
    pub remote: &'a Remote,
    pub config: &'a ConfigDir,
    substitutor: Substitutor<'a>,
}

impl<'a> Session<'a> {
    pub fn new(ctx: &'a SyncContext, remote: &'a Remote, config: &'a ConfigDir, secret_base_path: &str) -> Self {
        Self {
            ctx,
            remote,
            config,
            substitutor: Substitutor::new(remote, secret_base_path),
        }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.remote.backend()
    }

    /// Fill secrets into a JSON document and parse it.
    ///
    /// Returns `None` after a warning when a placeholder has no secret; the
    /// caller must then skip the resource. `origin` names the resource in
    /// messages.
    pub fn substitute_json(&self, content: &str, namespace: &str, origin: &str) -> Result<Option<Payload>> {
        match self.substitutor.substitute_json(content, namespace)? {
            Substitution::Complete(content) => serde_json::from_str(&content)
                .with_context(|| format!("{origin} is not valid JSON after secret substitution"))
                .map(Some),
            unresolved @ Substitution::Unresolved { .. } => {
                if let Some(message) = unresolved.describe() {
                    warn!("{message}");
                }
                warn!("Secret substitution failed for [{origin}], skipping");
                self.ctx.skip();
                Ok(None)
            }
        }
    }
}
