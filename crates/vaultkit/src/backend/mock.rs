//! In-memory server emulation for tests.
//!
//! [`MockBackend`] understands the endpoints the sync tool touches: mount
//! tables, audit devices, ACL policies, identity upserts and aliases, and a
//! generic key/value store for everything else. Every successful write and
//! delete is recorded in a journal with logical start/finish ticks, so tests
//! can assert ordering between concurrent operations.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::identity::{Alias, Entity, Group};
use crate::types::{AuditOutput, Data, Health, Listing, MountConfig, MountOutput, Secret};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Kind of journaled operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// A write.
    Write,
    /// A delete.
    Delete,
}

/// One recorded write or delete.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// Operation kind.
    pub op: Op,
    /// Path as requested.
    pub path: String,
    /// Payload, for writes.
    pub data: Option<Data>,
    /// Logical time the request arrived.
    pub started: u64,
    /// Logical time the request completed.
    pub finished: u64,
}

#[derive(Debug, Default)]
struct State {
    kv: BTreeMap<String, Data>,
    auth: BTreeMap<String, (MountOutput, MountConfig)>,
    mounts: BTreeMap<String, (MountOutput, MountConfig)>,
    audit: BTreeMap<String, AuditOutput>,
    policies: BTreeMap<String, String>,
    entities: BTreeMap<String, Entity>,
    groups: BTreeMap<String, Group>,
    entity_aliases: BTreeMap<String, Alias>,
    group_aliases: BTreeMap<String, Alias>,
    journal: Vec<JournalEntry>,
    failures: BTreeSet<String>,
    next_id: u64,
    clock: u64,
    sealed: bool,
}

impl State {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn generate_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{:08x}", self.next_id)
    }
}

/// Mock backend for testing without a server.
///
/// Clones share state, so a test can hand one clone to the code under test
/// and inspect another.
#[derive(Debug, Clone)]
pub struct MockBackend {
    state: Arc<Mutex<State>>,
    latency: Option<Duration>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a mock seeded like a fresh dev server: the `token/` auth
    /// method, the `sys/`, `cubbyhole/`, `identity/` and `secret/` mounts,
    /// and the `root` and `default` policies.
    #[must_use]
    pub fn new() -> Self {
        let mock = Self {
            state: Arc::default(),
            latency: None,
        };
        {
            let mut state = mock.lock();
            seed_mount(&mut state.auth, "token/", "token", "auth_token_00000000");
            seed_mount(&mut state.mounts, "sys/", "system", "system_00000000");
            seed_mount(&mut state.mounts, "cubbyhole/", "cubbyhole", "cubbyhole_00000000");
            seed_mount(&mut state.mounts, "identity/", "identity", "identity_00000000");
            seed_mount(&mut state.mounts, "secret/", "kv", "kv_00000000");
            state.policies.insert("root".into(), String::new());
            state.policies.insert("default".into(), String::new());
        }
        mock
    }

    /// Delay every write by `latency` while holding no lock.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make writes and deletes of `path` fail with HTTP 500.
    pub fn fail_on(&self, path: impl Into<String>) {
        self.lock().failures.insert(path.into());
    }

    /// Report the server as sealed in health checks.
    pub fn set_sealed(&self, sealed: bool) {
        self.lock().sealed = sealed;
    }

    /// Store raw data at a generic path (e.g. substitution secrets).
    pub fn seed(&self, path: &str, data: Value) {
        if let Value::Object(map) = data {
            self.lock().kv.insert(normalize(path).to_string(), map);
        }
    }

    /// Register an existing ACL policy.
    pub fn seed_policy(&self, name: &str, rules: &str) {
        self.lock().policies.insert(name.into(), rules.into());
    }

    /// Register an existing auth method; returns its accessor.
    pub fn seed_auth(&self, path: &str, kind: &str) -> String {
        let mut state = self.lock();
        let accessor = state.generate_id(&format!("auth_{kind}_"));
        seed_mount(&mut state.auth, path, kind, &accessor);
        accessor
    }

    /// Register an existing secrets engine.
    pub fn seed_mount(&self, path: &str, kind: &str) {
        let mut state = self.lock();
        let accessor = state.generate_id(&format!("{kind}_"));
        seed_mount(&mut state.mounts, path, kind, &accessor);
    }

    /// Register an existing audit device.
    pub fn seed_audit(&self, path: &str, device: AuditOutput) {
        self.lock().audit.insert(mount_key(path), device);
    }

    /// Register an existing entity; returns its ID.
    pub fn seed_entity(&self, name: &str) -> String {
        let mut state = self.lock();
        let id = state.generate_id("entity-");
        state.entities.insert(
            id.clone(),
            Entity {
                id: id.clone(),
                name: name.into(),
                ..Entity::default()
            },
        );
        id
    }

    /// Register an existing group; returns its ID.
    pub fn seed_group(&self, name: &str) -> String {
        let mut state = self.lock();
        let id = state.generate_id("group-");
        state.groups.insert(
            id.clone(),
            Group {
                id: id.clone(),
                name: name.into(),
                kind: "internal".into(),
                ..Group::default()
            },
        );
        id
    }

    /// Register an existing entity alias; returns its ID.
    pub fn seed_entity_alias(&self, name: &str, mount_accessor: &str, canonical_id: &str) -> String {
        let mut state = self.lock();
        let id = state.generate_id("alias-");
        state.entity_aliases.insert(
            id.clone(),
            Alias {
                id: id.clone(),
                canonical_id: canonical_id.into(),
                mount_accessor: mount_accessor.into(),
                name: name.into(),
                ..Alias::default()
            },
        );
        id
    }

    /// All journaled operations, in completion order.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.lock().journal.clone()
    }

    /// Paths of all successful writes, in completion order.
    pub fn written_paths(&self) -> Vec<String> {
        self.journal_paths(Op::Write)
    }

    /// Paths of all successful deletes, in completion order.
    pub fn deleted_paths(&self) -> Vec<String> {
        self.journal_paths(Op::Delete)
    }

    /// Payloads written to `path`, oldest first.
    pub fn writes_to(&self, path: &str) -> Vec<Data> {
        self.lock()
            .journal
            .iter()
            .filter(|e| e.op == Op::Write && e.path == path)
            .filter_map(|e| e.data.clone())
            .collect()
    }

    /// Data stored at a generic path.
    pub fn stored(&self, path: &str) -> Option<Data> {
        self.lock().kv.get(normalize(path)).cloned()
    }

    /// Rules of a policy.
    pub fn policy(&self, name: &str) -> Option<String> {
        self.lock().policies.get(name).cloned()
    }

    /// Entity by name.
    pub fn entity(&self, name: &str) -> Option<Entity> {
        self.lock().entities.values().find(|e| e.name == name).cloned()
    }

    /// Group by name.
    pub fn group(&self, name: &str) -> Option<Group> {
        self.lock().groups.values().find(|g| g.name == name).cloned()
    }

    /// All entity aliases.
    pub fn entity_aliases(&self) -> Vec<Alias> {
        self.lock().entity_aliases.values().cloned().collect()
    }

    /// All group aliases.
    pub fn group_aliases(&self) -> Vec<Alias> {
        self.lock().group_aliases.values().cloned().collect()
    }

    /// Tuned config of an auth method.
    pub fn auth_tune(&self, path: &str) -> Option<MountConfig> {
        self.lock().auth.get(&mount_key(path)).map(|(_, c)| c.clone())
    }

    /// Tuned config of a secrets engine.
    pub fn mount_tune(&self, path: &str) -> Option<MountConfig> {
        self.lock().mounts.get(&mount_key(path)).map(|(_, c)| c.clone())
    }

    fn journal_paths(&self, op: Op) -> Vec<String> {
        self.lock()
            .journal
            .iter()
            .filter(|e| e.op == op)
            .map(|e| e.path.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_failure(state: &State, path: &str) -> Result<()> {
        if state.failures.contains(path) {
            return Err(Error::from_response(
                path,
                500,
                r#"{"errors":["injected failure"]}"#,
            ));
        }
        Ok(())
    }
}

impl Backend for MockBackend {
    fn read(&self, path: &str) -> Result<Option<Secret>> {
        let state = self.lock();
        let path = normalize(path);
        let data = match path {
            "sys/auth" => Some(mount_table(&state.auth)),
            "sys/mounts" => Some(mount_table(&state.mounts)),
            "sys/audit" => Some(
                state
                    .audit
                    .iter()
                    .map(|(k, v)| (k.clone(), json!(v)))
                    .collect(),
            ),
            _ => {
                if let Some(name) = path.strip_prefix("sys/policies/acl/") {
                    state
                        .policies
                        .get(name)
                        .map(|rules| object(json!({"name": name, "policy": rules})))
                } else if let Some(name) = path.strip_prefix("identity/entity/name/") {
                    state
                        .entities
                        .values()
                        .find(|e| e.name == name)
                        .map(|e| with_id(json!(e), &e.id))
                } else if let Some(name) = path.strip_prefix("identity/group/name/") {
                    state
                        .groups
                        .values()
                        .find(|g| g.name == name)
                        .map(|g| object(json!(g)))
                } else {
                    state.kv.get(path).cloned()
                }
            }
        };
        Ok(data.map(Secret::new))
    }

    fn list(&self, path: &str) -> Result<Option<Listing>> {
        let state = self.lock();
        let path = normalize(path);
        let listing = match path {
            "sys/policies/acl" => Listing {
                keys: state.policies.keys().cloned().collect(),
                key_info: Data::new(),
            },
            "identity/entity/id" => info_listing(
                state
                    .entities
                    .iter()
                    .map(|(id, e)| (id, json!({"name": e.name}))),
            ),
            "identity/group/id" => info_listing(
                state
                    .groups
                    .iter()
                    .map(|(id, g)| (id, json!({"name": g.name, "type": g.kind}))),
            ),
            "identity/entity-alias/id" => {
                info_listing(state.entity_aliases.iter().map(|(id, a)| (id, alias_info(&state, a))))
            }
            "identity/group-alias/id" => {
                info_listing(state.group_aliases.iter().map(|(id, a)| (id, alias_info(&state, a))))
            }
            _ => {
                let prefix = format!("{path}/");
                let keys: BTreeSet<String> = state
                    .kv
                    .keys()
                    .filter_map(|k| k.strip_prefix(&prefix))
                    .map(|rest| match rest.split_once('/') {
                        Some((folder, _)) => format!("{folder}/"),
                        None => rest.to_string(),
                    })
                    .collect();
                Listing {
                    keys: keys.into_iter().collect(),
                    key_info: Data::new(),
                }
            }
        };
        // The server answers 404 for empty listings.
        if listing.keys.is_empty() {
            return Ok(None);
        }
        Ok(Some(listing))
    }

    fn write(&self, path: &str, data: &Data) -> Result<Option<Secret>> {
        let started = {
            let mut state = self.lock();
            Self::check_failure(&state, path)?;
            state.tick()
        };
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }

        let mut state = self.lock();
        let response = apply_write(&mut state, normalize(path), data)?;
        let finished = state.tick();
        state.journal.push(JournalEntry {
            op: Op::Write,
            path: path.to_string(),
            data: Some(data.clone()),
            started,
            finished,
        });
        Ok(response.map(Secret::new))
    }

    fn delete(&self, path: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check_failure(&state, path)?;
        let started = state.tick();
        apply_delete(&mut state, normalize(path));
        let finished = state.tick();
        state.journal.push(JournalEntry {
            op: Op::Delete,
            path: path.to_string(),
            data: None,
            started,
            finished,
        });
        Ok(())
    }

    fn health(&self) -> Result<Health> {
        let state = self.lock();
        Ok(Health {
            initialized: true,
            sealed: state.sealed,
            standby: false,
            version: "1.15.0-mock".into(),
        })
    }
}

fn apply_write(state: &mut State, path: &str, data: &Data) -> Result<Option<Data>> {
    if let Some(rest) = path.strip_prefix("sys/auth/") {
        return write_mount(state, path, rest, data, true);
    }
    if let Some(rest) = path.strip_prefix("sys/mounts/") {
        return write_mount(state, path, rest, data, false);
    }
    if let Some(name) = path.strip_prefix("sys/audit/") {
        let device: AuditOutput = serde_json::from_value(Value::Object(data.clone()))
            .map_err(|e| Error::from_response(path, 400, &e.to_string()))?;
        let key = mount_key(name);
        if state.audit.contains_key(&key) {
            return Err(rejected(path, "path already in use"));
        }
        state.audit.insert(key, device);
        return Ok(None);
    }
    if let Some(name) = path.strip_prefix("sys/policies/acl/") {
        let rules = data
            .get("policy")
            .and_then(Value::as_str)
            .ok_or_else(|| rejected(path, "'policy' parameter not supplied"))?;
        state.policies.insert(name.into(), rules.into());
        return Ok(None);
    }
    if let Some(name) = path.strip_prefix("identity/entity/name/") {
        return upsert_entity(state, name, data).map(Some);
    }
    if let Some(name) = path.strip_prefix("identity/group/name/") {
        return upsert_group(state, name, data).map(Some);
    }
    if path == "identity/entity-alias" {
        return write_alias(state, path, data, true).map(Some);
    }
    if path == "identity/group-alias" {
        return write_alias(state, path, data, false).map(Some);
    }
    if let Some(mount) = path.strip_suffix("/config/rotate-root") {
        let id = state.generate_id("AKIAMOCK");
        state.kv.insert(
            format!("{mount}/config/root"),
            object(json!({"access_key": id})),
        );
        return Ok(Some(object(json!({"access_key": id}))));
    }

    state.kv.insert(path.to_string(), data.clone());
    Ok(None)
}

fn apply_delete(state: &mut State, path: &str) {
    if let Some(rest) = path.strip_prefix("sys/auth/") {
        state.auth.remove(&mount_key(rest));
    } else if let Some(rest) = path.strip_prefix("sys/mounts/") {
        state.mounts.remove(&mount_key(rest));
    } else if let Some(rest) = path.strip_prefix("sys/audit/") {
        state.audit.remove(&mount_key(rest));
    } else if let Some(name) = path.strip_prefix("identity/entity/name/") {
        state.entities.retain(|_, e| e.name != name);
    } else if let Some(name) = path.strip_prefix("identity/group/name/") {
        state.groups.retain(|_, g| g.name != name);
    } else if let Some(id) = path.strip_prefix("identity/entity-alias/id/") {
        state.entity_aliases.remove(id);
    } else if let Some(id) = path.strip_prefix("identity/group-alias/id/") {
        state.group_aliases.remove(id);
    } else if let Some(name) = path.strip_prefix("sys/policies/acl/") {
        state.policies.remove(name);
    } else {
        state.kv.remove(path);
    }
}

fn write_mount(state: &mut State, path: &str, rest: &str, data: &Data, auth: bool) -> Result<Option<Data>> {
    if let Some(mount) = rest.strip_suffix("/tune") {
        let tune: MountConfig = serde_json::from_value(Value::Object(data.clone()))
            .map_err(|e| Error::from_response(path, 400, &e.to_string()))?;
        let table = if auth { &mut state.auth } else { &mut state.mounts };
        let (output, config) = table
            .get_mut(&mount_key(mount))
            .ok_or_else(|| rejected(path, "no mount at this path"))?;
        if let Some(description) = &tune.description {
            output.description.clone_from(description);
        }
        *config = tune;
        return Ok(None);
    }

    let kind = data
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| rejected(path, "missing mount type"))?
        .to_string();
    let key = mount_key(rest);
    let prefix = if auth { format!("auth_{kind}_") } else { format!("{kind}_") };
    let accessor = state.generate_id(&prefix);
    let config: MountConfig = data
        .get("config")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| Error::from_response(path, 400, &e.to_string()))?
        .unwrap_or_default();
    let output = MountOutput {
        kind,
        description: data
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        accessor,
        local: data.get("local").and_then(Value::as_bool).unwrap_or(false),
        options: data
            .get("options")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default(),
    };

    let table = if auth { &mut state.auth } else { &mut state.mounts };
    if table.contains_key(&key) {
        return Err(rejected(path, "path is already in use"));
    }
    table.insert(key, (output, config));
    Ok(None)
}

fn upsert_entity(state: &mut State, name: &str, data: &Data) -> Result<Data> {
    let existing = state.entities.values().find(|e| e.name == name).cloned();
    let id = match &existing {
        Some(entity) => entity.id.clone(),
        None => state.generate_id("entity-"),
    };
    let entity: Entity = merged(existing.as_ref(), data)?;
    state.entities.insert(
        id.clone(),
        Entity {
            id: id.clone(),
            name: name.into(),
            ..entity
        },
    );
    Ok(object(json!({"id": id, "name": name})))
}

fn upsert_group(state: &mut State, name: &str, data: &Data) -> Result<Data> {
    let existing = state.groups.values().find(|g| g.name == name).cloned();
    let id = match &existing {
        Some(group) => group.id.clone(),
        None => state.generate_id("group-"),
    };
    let group: Group = merged(existing.as_ref(), data)?;
    let kind = if group.kind.is_empty() {
        "internal".to_string()
    } else {
        group.kind.clone()
    };
    state.groups.insert(
        id.clone(),
        Group {
            id: id.clone(),
            name: name.into(),
            kind,
            ..group
        },
    );
    Ok(object(json!({"id": id, "name": name})))
}

/// Update semantics of identity writes: fields missing from `data` keep
/// their stored value.
fn merged<T>(existing: Option<&T>, data: &Data) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut fields = existing.map(|current| object(json!(current))).unwrap_or_default();
    fields.extend(data.clone());
    Ok(serde_json::from_value(Value::Object(fields))?)
}

fn write_alias(state: &mut State, path: &str, data: &Data, entity: bool) -> Result<Data> {
    let incoming: Alias = serde_json::from_value(Value::Object(data.clone()))?;
    if incoming.name.is_empty() || incoming.mount_accessor.is_empty() {
        return Err(rejected(path, "missing name or mount_accessor"));
    }

    let id = if incoming.id.is_empty() {
        let aliases = if entity { &state.entity_aliases } else { &state.group_aliases };
        if aliases.values().any(|a| a.same_binding(&incoming)) {
            return Err(rejected(path, "combination of mount and alias name is already in use"));
        }
        state.generate_id("alias-")
    } else {
        let aliases = if entity { &state.entity_aliases } else { &state.group_aliases };
        if !aliases.contains_key(&incoming.id) {
            return Err(Error::from_response(path, 404, r#"{"errors":["alias not found"]}"#));
        }
        incoming.id.clone()
    };

    let aliases = if entity { &mut state.entity_aliases } else { &mut state.group_aliases };
    aliases.insert(
        id.clone(),
        Alias {
            id: id.clone(),
            ..incoming.cleaned()
        },
    );
    Ok(object(json!({"id": id, "canonical_id": incoming.canonical_id})))
}

fn alias_info(state: &State, alias: &Alias) -> Value {
    let (mount_path, mount_type) = state
        .auth
        .iter()
        .find(|(_, (m, _))| m.accessor == alias.mount_accessor)
        .map(|(path, (m, _))| (path.clone(), m.kind.clone()))
        .unwrap_or_default();
    json!({
        "canonical_id": alias.canonical_id,
        "mount_accessor": alias.mount_accessor,
        "mount_path": mount_path,
        "mount_type": mount_type,
        "name": alias.name,
    })
}

fn info_listing<'a>(items: impl Iterator<Item = (&'a String, Value)>) -> Listing {
    let mut listing = Listing::default();
    for (id, info) in items {
        listing.keys.push(id.clone());
        listing.key_info.insert(id.clone(), info);
    }
    listing
}

fn mount_table(table: &BTreeMap<String, (MountOutput, MountConfig)>) -> Data {
    table
        .iter()
        .map(|(path, (mount, config))| {
            let mut value = json!(mount);
            value["config"] = json!(config);
            (path.clone(), value)
        })
        .collect()
}

fn seed_mount(
    table: &mut BTreeMap<String, (MountOutput, MountConfig)>,
    path: &str,
    kind: &str,
    accessor: &str,
) {
    table.insert(
        mount_key(path),
        (
            MountOutput {
                kind: kind.into(),
                accessor: accessor.into(),
                ..MountOutput::default()
            },
            MountConfig::default(),
        ),
    );
}

fn with_id(value: Value, id: &str) -> Data {
    let mut data = object(value);
    data.insert("id".into(), id.into());
    data
}

fn object(value: Value) -> Data {
    match value {
        Value::Object(map) => map,
        _ => Data::new(),
    }
}

fn rejected(path: &str, message: &str) -> Error {
    Error::from_response(path, 400, &json!({ "errors": [message] }).to_string())
}

fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

fn mount_key(path: &str) -> String {
    format!("{}/", path.trim_matches('/'))
}
