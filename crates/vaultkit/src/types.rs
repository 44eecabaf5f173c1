//! Wire types shared by all backends.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Untyped key/value payload, as sent to and received from the server.
pub type Data = serde_json::Map<String, serde_json::Value>;

/// Response to a read or write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Secret {
    /// The `data` section of the response.
    pub data: Data,
}

impl Secret {
    /// Wrap a data map.
    pub fn new(data: Data) -> Self {
        Self { data }
    }

    /// Get a string field from the data.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }
}

/// Response to a list operation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Listing {
    /// Child keys. Keys ending in `/` are folders.
    #[serde(default)]
    pub keys: Vec<String>,
    /// Per-key details, present on endpoints that support it.
    #[serde(default)]
    pub key_info: Data,
}

impl Listing {
    /// Deserialize every `key_info` entry into `T`, keyed by list key.
    pub fn key_info_as<T: DeserializeOwned>(&self, path: &str) -> Result<BTreeMap<String, T>> {
        self.key_info
            .iter()
            .map(|(key, value)| {
                serde_json::from_value(value.clone())
                    .map(|info| (key.clone(), info))
                    .map_err(|e| Error::invalid(path, format!("key_info[{key}]: {e}")))
            })
            .collect()
    }
}

/// Tunable mount settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Default lease duration, e.g. `"1h"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_lease_ttl: Option<String>,
    /// Maximum lease duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_lease_ttl: Option<String>,
    /// `"unauth"` to list the mount in the UI before login, `"hidden"` otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_visibility: Option<String>,
    /// Mount description, only used when tuning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Input for enabling an auth method or mounting a secrets engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountInput {
    /// Backend type (`ldap`, `aws`, `kv`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Tunable settings.
    #[serde(default)]
    pub config: MountConfig,
    /// Backend-specific options (e.g. `{"version": "2"}` for kv).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
    /// Local-only mount (not replicated).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub local: bool,
    /// Seal-wrap the mount's storage.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub seal_wrap: bool,
}

impl MountInput {
    /// Payload for the `tune` endpoint of an existing mount.
    ///
    /// The description travels inside the tune payload, unlike at mount time.
    pub fn tune_payload(&self) -> MountConfig {
        MountConfig {
            description: Some(self.description.clone()),
            ..self.config.clone()
        }
    }
}

/// A mount as reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MountOutput {
    /// Backend type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Stable opaque identifier (e.g. `auth_ldap_1a2b3c4d`).
    #[serde(default)]
    pub accessor: String,
    /// Local-only mount.
    #[serde(default)]
    pub local: bool,
    /// Backend options.
    #[serde(default, deserialize_with = "nullable_map")]
    pub options: BTreeMap<String, String>,
}

/// Input for enabling an audit device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInput {
    /// Device type (`file`, `syslog`, `socket`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Device options (e.g. `file_path`).
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    /// Local-only device.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub local: bool,
}

/// An audit device as reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditOutput {
    /// Device type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Device options.
    #[serde(default, deserialize_with = "nullable_map")]
    pub options: BTreeMap<String, String>,
    /// Local-only device.
    #[serde(default)]
    pub local: bool,
}

impl AuditOutput {
    /// Whether the device already matches the given input.
    pub fn matches(&self, input: &AuditInput) -> bool {
        self.kind == input.kind
            && self.description == input.description
            && self.options == input.options
    }
}

/// Server health.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Health {
    /// Whether the server has been initialized.
    #[serde(default)]
    pub initialized: bool,
    /// Whether the server is sealed.
    #[serde(default)]
    pub sealed: bool,
    /// Whether this node is a standby.
    #[serde(default)]
    pub standby: bool,
    /// Server version.
    #[serde(default)]
    pub version: String,
}

impl Health {
    /// Whether the server can serve requests.
    pub fn is_ready(&self) -> bool {
        self.initialized && !self.sealed
    }
}

/// Extract the mount table (`"<path>/" -> T`) from a `sys/auth`, `sys/mounts`
/// or `sys/audit` response. Non-mount keys are ignored.
pub fn parse_mount_table<T: DeserializeOwned>(path: &str, data: &Data) -> Result<BTreeMap<String, T>> {
    data.iter()
        .filter(|(key, value)| key.ends_with('/') && value.is_object())
        .map(|(key, value)| {
            serde_json::from_value(value.clone())
                .map(|mount| (key.clone(), mount))
                .map_err(|e| Error::invalid(path, format!("{key}: {e}")))
        })
        .collect()
}

fn nullable_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}
