//! Backend trait and implementations for talking to the server.
//!
//! This module provides the [`Backend`] trait. [`http::HttpBackend`] talks to
//! a real server over HTTP; [`mock::MockBackend`] emulates one in memory.
//!
//! # Testing
//!
//! ```
//! use vaultkit::backend::{Backend, MockBackend};
//! use vaultkit::types::Data;
//!
//! let mock = MockBackend::new();
//! let mut data = Data::new();
//! data.insert("policy".into(), "path \"*\" {}".into());
//! mock.write("sys/policies/acl/app", &data).unwrap();
//!
//! let policies = mock.list_policies().unwrap();
//! assert!(policies.contains(&"app".to_string()));
//! ```

pub mod http;
pub mod mock;

pub use http::HttpBackend;
pub use mock::MockBackend;

use crate::error::{Error, Result};
use crate::types::{
    AuditInput, AuditOutput, Data, Health, Listing, MountInput, MountOutput, Secret,
    parse_mount_table,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Remote operations against the server's configuration namespace.
///
/// Only the five primitives are required; the mount, audit and policy
/// helpers are expressed through them.
pub trait Backend: Send + Sync {
    /// Read a path. Returns `None` when nothing exists there.
    fn read(&self, path: &str) -> Result<Option<Secret>>;

    /// List the children of a path. Returns `None` when there are none.
    fn list(&self, path: &str) -> Result<Option<Listing>>;

    /// Write data to a path. Some endpoints answer with data.
    fn write(&self, path: &str, data: &Data) -> Result<Option<Secret>>;

    /// Delete a path.
    fn delete(&self, path: &str) -> Result<()>;

    /// Query server health.
    fn health(&self) -> Result<Health>;

    /// Enabled auth methods, keyed by path (`"ldap/"`).
    fn list_auth(&self) -> Result<BTreeMap<String, MountOutput>> {
        read_table(self, "sys/auth")
    }

    /// Enable an auth method at a path.
    fn enable_auth(&self, path: &str, input: &MountInput) -> Result<()> {
        let target = format!("sys/auth/{}", path.trim_end_matches('/'));
        self.write(&target, &to_data(&target, input)?)?;
        Ok(())
    }

    /// Mounted secrets engines, keyed by path (`"aws/"`).
    fn list_mounts(&self) -> Result<BTreeMap<String, MountOutput>> {
        read_table(self, "sys/mounts")
    }

    /// Mount a secrets engine at a path.
    fn mount(&self, path: &str, input: &MountInput) -> Result<()> {
        let target = format!("sys/mounts/{}", path.trim_end_matches('/'));
        self.write(&target, &to_data(&target, input)?)?;
        Ok(())
    }

    /// Enabled audit devices, keyed by path (`"file/"`).
    fn list_audit(&self) -> Result<BTreeMap<String, AuditOutput>> {
        read_table(self, "sys/audit")
    }

    /// Enable an audit device at a path.
    fn enable_audit(&self, path: &str, input: &AuditInput) -> Result<()> {
        let target = format!("sys/audit/{}", path.trim_end_matches('/'));
        self.write(&target, &to_data(&target, input)?)?;
        Ok(())
    }

    /// Disable the audit device at a path.
    fn disable_audit(&self, path: &str) -> Result<()> {
        self.delete(&format!("sys/audit/{}", path.trim_end_matches('/')))
    }

    /// Names of all ACL policies.
    fn list_policies(&self) -> Result<Vec<String>> {
        Ok(self
            .list("sys/policies/acl")?
            .map(|listing| listing.keys)
            .unwrap_or_default())
    }

    /// Create or replace an ACL policy.
    fn put_policy(&self, name: &str, rules: &str) -> Result<()> {
        let mut data = Data::new();
        data.insert("policy".to_string(), rules.into());
        self.write(&format!("sys/policies/acl/{name}"), &data)?;
        Ok(())
    }

    /// Delete an ACL policy.
    fn delete_policy(&self, name: &str) -> Result<()> {
        self.delete(&format!("sys/policies/acl/{name}"))
    }
}

/// Serialize a value into a write payload.
pub fn to_data<T: Serialize>(path: &str, value: &T) -> Result<Data> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(Error::Other(format!(
            "payload for {path} must be an object, got {other}"
        ))),
    }
}

fn read_table<B, T>(backend: &B, path: &str) -> Result<BTreeMap<String, T>>
where
    B: Backend + ?Sized,
    T: serde::de::DeserializeOwned,
{
    match backend.read(path)? {
        Some(secret) => parse_mount_table(path, &secret.data),
        None => Ok(BTreeMap::new()),
    }
}
