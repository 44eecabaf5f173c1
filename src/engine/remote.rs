//! Adapter from the server client to the engine's provider traits

use anyhow::{Result, bail};
use reconcile::{Payload, SecretSource, Store};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use vaultkit::Backend;

/// Shared handle on the server, usable as a task store and secret source
#[derive(Clone)]
pub struct Remote {
    backend: Arc<dyn Backend>,
}

impl Remote {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }
}

impl Store for Remote {
    fn write(&self, path: &str, data: &Payload) -> Result<()> {
        self.backend.write(path, data)?;
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.backend.delete(path)?;
        Ok(())
    }
}

impl SecretSource for Remote {
    fn read_secrets(&self, path: &str) -> Result<Option<BTreeMap<String, String>>> {
        let Some(secret) = self.backend.read(path)? else {
            return Ok(None);
        };

        let mut secrets = BTreeMap::new();
        for (key, value) in secret.data {
            match value {
                Value::String(value) => {
                    secrets.insert(key, value);
                }
                _ => bail!("Issue parsing secret [{path}]: value of [{key}] is not a string"),
            }
        }
        Ok(Some(secrets))
    }
}
