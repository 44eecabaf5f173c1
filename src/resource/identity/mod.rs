//! Identity secrets engine: entities, groups and their aliases
//!
//! Objects reference each other by server-assigned IDs, so the graph is
//! applied in phases. Every write of a phase holds a ticket on a private
//! barrier and the next phase starts only once the barrier is released:
//!
//! 1. Entities are upserted by name.
//! 2. Groups missing on the server are created bare, to get an ID.
//! 3. Groups are written again with resolved memberships, then aliases
//!    are bound to their owners' IDs.
//! 4. Unconfigured objects are proposed for deletion.
//!
//! Alias claims are validated before the first write so that a broken
//! alias never leaves the graph half applied.

mod alias;
mod config;
mod kinds;

use crate::engine::Session;
use alias::{AliasClaims, Owner, alias_key};
use anyhow::{Context, Result};
use kinds::{Aliases, Entities, Groups, Listed};
use log::{debug, info, warn};
use reconcile::{SyncPlan, WorkCounter};
use std::collections::BTreeMap;
use vaultkit::{Alias, Entity, Group};

/// Member names by the group they join
type Memberships<'a> = BTreeMap<&'a str, Vec<&'a str>>;

/// Identity objects currently on the server, keyed by name
fn fetch(session: &Session<'_>, path: &str) -> Result<BTreeMap<String, Listed>> {
    let listing = session
        .backend()
        .list(path)
        .with_context(|| format!("Error fetching identity objects at [{path}]"))?;
    let Some(listing) = listing else {
        return Ok(BTreeMap::new());
    };
    let listed: BTreeMap<String, Listed> = listing.key_info_as(path)?;
    Ok(listed
        .into_iter()
        .map(|(id, mut item)| {
            item.id = id;
            (item.name.clone(), item)
        })
        .collect())
}

/// Aliases currently on the server, keyed by `<mount_accessor>/<name>`
fn fetch_aliases(session: &Session<'_>, key: &str, owner: Owner) -> Result<BTreeMap<String, Alias>> {
    let path = format!("{key}{owner}-alias/id");
    let listing = session
        .backend()
        .list(&path)
        .with_context(|| format!("Error fetching identity {owner} aliases"))?;
    let Some(listing) = listing else {
        return Ok(BTreeMap::new());
    };
    let aliases: BTreeMap<String, Alias> = listing.key_info_as(&path)?;
    Ok(aliases
        .into_iter()
        .map(|(id, mut alias)| {
            alias.id = id;
            (alias_key(&alias), alias)
        })
        .collect())
}

fn ids(listed: &BTreeMap<String, Listed>) -> BTreeMap<String, String> {
    listed
        .iter()
        .map(|(name, item)| (name.clone(), item.id.clone()))
        .collect()
}

fn member_ids(members: Option<&Vec<&str>>, ids: &BTreeMap<String, String>) -> Vec<String> {
    members
        .into_iter()
        .flatten()
        .filter_map(|name| ids.get(*name).cloned())
        .collect()
}

fn warn_unconfigured(member: &str, memberships: &Memberships<'_>, groups: &BTreeMap<String, Group>) {
    for (group, members) in memberships {
        if groups.contains_key(*group) {
            continue;
        }
        for name in members {
            warn!("{member} [{name}] cannot be part of group [{group}] because it does not exist");
        }
    }
}

/// Sync the identity engine mounted at `key` (`identity/`).
pub fn sync(session: &Session<'_>, key: &str) -> Result<()> {
    info!("Syncing Identity [{key}]");
    let ctx = session.ctx;
    let engine = key.trim_end_matches('/');
    let entity_files = config::load_entities(session.config, engine)?;
    let group_files = config::load_groups(session.config, engine)?;

    let auth_mounts = session.backend().list_auth().context("Error fetching auth mounts")?;
    let mut entity_claims = AliasClaims::new(Owner::Entity, &auth_mounts);
    let mut group_claims = AliasClaims::new(Owner::Group, &auth_mounts);
    for (name, file) in &entity_files {
        for alias in &file.aliases {
            if !entity_claims.claim(name, alias)? {
                ctx.skip();
            }
        }
    }
    for (name, file) in &group_files {
        if file.has_alias() && !group_claims.claim(name, &file.alias)? {
            ctx.skip();
        }
    }

    let mut entity_memberships = Memberships::new();
    for (name, file) in &entity_files {
        for group in &file.groups {
            entity_memberships.entry(group.as_str()).or_default().push(name.as_str());
        }
    }
    let mut group_memberships = Memberships::new();
    for (name, file) in &group_files {
        for parent in &file.groups {
            group_memberships.entry(parent.as_str()).or_default().push(name.as_str());
        }
    }

    let barrier = WorkCounter::new();
    let pool = ctx.pool();

    // Entities
    let entities: BTreeMap<String, Entity> = entity_files
        .iter()
        .map(|(name, file)| (name.clone(), file.entity.clone()))
        .collect();
    let observed_entities = fetch(session, &format!("{key}entity/id"))?;
    let entity_kind = Entities {
        mount: key,
        barrier: &barrier,
    };
    let entity_plan = SyncPlan::new(&entity_kind, &entities, &observed_entities)?;
    entity_plan.apply_changes(ctx)?;
    pool.wait_for(&barrier)?;

    // New groups, bare
    let bare_groups: BTreeMap<String, Group> = group_files
        .iter()
        .map(|(name, file)| (name.clone(), file.group.clone()))
        .collect();
    let group_kind = Groups {
        mount: key,
        barrier: &barrier,
    };
    let observed_groups = fetch(session, &format!("{key}group/id"))?;
    let new_groups = SyncPlan::new(&group_kind, &bare_groups, &observed_groups)?;
    for name in &new_groups.diff().create {
        if let Some(group) = bare_groups.get(name) {
            group_kind.write(ctx, name, group)?;
        }
    }
    pool.wait_for(&barrier)?;

    // Memberships and aliases
    let entity_ids = ids(&fetch(session, &format!("{key}entity/id"))?);
    let current_groups = fetch(session, &format!("{key}group/id"))?;
    let group_ids = ids(&current_groups);

    let mut groups = BTreeMap::new();
    for (name, group) in &bare_groups {
        let mut group = group.clone();
        group.id = group_ids.get(name).cloned().unwrap_or_default();
        group.member_entity_ids = member_ids(entity_memberships.get(name.as_str()), &entity_ids);
        group.member_group_ids = member_ids(group_memberships.get(name.as_str()), &group_ids);
        groups.insert(name.clone(), group);
    }
    let group_plan = SyncPlan::new(&group_kind, &groups, &current_groups)?;
    group_plan.apply_changes(ctx)?;
    warn_unconfigured("Entity", &entity_memberships, &groups);
    warn_unconfigured("Group", &group_memberships, &groups);

    let entity_names: BTreeMap<String, String> = entity_ids
        .iter()
        .map(|(name, id)| (id.clone(), name.clone()))
        .collect();
    let entity_aliases = entity_claims.resolve(&entity_ids);
    let observed_entity_aliases = fetch_aliases(session, key, Owner::Entity)?;
    let entity_alias_kind = Aliases {
        mount: key,
        owner: Owner::Entity,
        barrier: &barrier,
        entity_names: &entity_names,
    };
    let entity_alias_plan = SyncPlan::new(&entity_alias_kind, &entity_aliases, &observed_entity_aliases)?;
    entity_alias_plan.apply_changes(ctx)?;

    let group_aliases = group_claims.resolve(&group_ids);
    let observed_group_aliases = fetch_aliases(session, key, Owner::Group)?;
    let group_alias_kind = Aliases {
        mount: key,
        owner: Owner::Group,
        barrier: &barrier,
        entity_names: &entity_names,
    };
    let group_alias_plan = SyncPlan::new(&group_alias_kind, &group_aliases, &observed_group_aliases)?;
    group_alias_plan.apply_changes(ctx)?;
    pool.wait_for(&barrier)?;

    debug!(
        "Identity [{key}]: {} entities, {} groups, {} of {} entity aliases, {} of {} group aliases bound",
        entities.len(),
        groups.len(),
        entity_aliases.len(),
        entity_claims.count(),
        group_aliases.len(),
        group_claims.count()
    );

    entity_plan.propose_removals(ctx)?;
    group_plan.propose_removals(ctx)?;
    entity_alias_plan.propose_removals(ctx)?;
    group_alias_plan.propose_removals(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::Harness;
    use reconcile::{AutoDecline, ScriptedAnswers};
    use std::time::Duration;
    use vaultkit::{JournalEntry, MockBackend, Op};

    const KEY: &str = "identity/";

    fn no_answers() -> ScriptedAnswers {
        ScriptedAnswers::new(Vec::<String>::new())
    }

    #[test]
    fn test_entity_joins_new_group() {
        let harness = Harness::new();
        harness.mock.seed_auth("userpass", "userpass");
        harness
            .file(
                "secrets-engines/identity/entities/alice.json",
                r#"{
                    "entity": {"policies": ["dev"]},
                    "entity-aliases": [{"name": "alice", "mount_path": "userpass/"}],
                    "entity-groups": ["admins"]
                }"#,
            )
            .file("secrets-engines/identity/groups/admins.json", r#"{"group": {"policies": ["admin"]}}"#);

        sync(&harness.session(), KEY).unwrap();
        harness.finish(&mut no_answers());

        let alice = harness.mock.entity("alice").unwrap();
        let admins = harness.mock.group("admins").unwrap();
        assert_eq!(admins.member_entity_ids, [alice.id.clone()]);
        assert_eq!(admins.policies, ["admin"]);

        let aliases = harness.mock.entity_aliases();
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases[0].canonical_id, alice.id);
        assert_eq!(aliases[0].name, "alice");
    }

    #[test]
    fn test_group_joins_parent_group() {
        let harness = Harness::new();
        harness
            .file("secrets-engines/identity/groups/admins.json", r#"{"group": {}}"#)
            .file("secrets-engines/identity/groups/ops.json", r#"{"group-groups": ["admins"]}"#);

        sync(&harness.session(), KEY).unwrap();
        harness.finish(&mut no_answers());

        let ops = harness.mock.group("ops").unwrap();
        let admins = harness.mock.group("admins").unwrap();
        assert_eq!(admins.member_group_ids, [ops.id]);
        assert!(ops.member_group_ids.is_empty());
    }

    #[test]
    fn test_removed_membership_cleared_on_server() {
        let harness = Harness::new();
        harness
            .file(
                "secrets-engines/identity/entities/alice.json",
                r#"{"entity": {"policies": ["dev"]}, "entity-groups": ["admins"]}"#,
            )
            .file("secrets-engines/identity/groups/admins.json", r#"{"group": {"policies": ["admin"]}}"#);
        sync(&harness.session(), KEY).unwrap();
        harness.finish(&mut no_answers());
        assert_eq!(harness.mock.group("admins").unwrap().member_entity_ids.len(), 1);

        let next = Harness::with_mock(harness.mock.clone(), 4);
        next.file("secrets-engines/identity/entities/alice.json", "{}")
            .file("secrets-engines/identity/groups/admins.json", "{}");
        sync(&next.session(), KEY).unwrap();
        next.finish(&mut no_answers());

        let admins = harness.mock.group("admins").unwrap();
        assert!(admins.member_entity_ids.is_empty());
        assert!(admins.policies.is_empty());
        assert!(harness.mock.entity("alice").unwrap().policies.is_empty());
    }

    #[test]
    fn test_unconfigured_memberships_only_warn() {
        let harness = Harness::new();
        harness
            .file(
                "secrets-engines/identity/entities/alice.json",
                r#"{"entity-groups": ["admins", "ghosts"]}"#,
            )
            .file("secrets-engines/identity/groups/admins.json", "{}")
            .file("secrets-engines/identity/groups/ops.json", r#"{"group-groups": ["admins", "missing"]}"#);

        sync(&harness.session(), KEY).unwrap();
        let summary = harness.finish(&mut no_answers());

        assert!(harness.mock.group("ghosts").is_none());
        assert!(harness.mock.group("missing").is_none());
        assert!(
            harness
                .mock
                .written_paths()
                .iter()
                .all(|p| !p.ends_with("/ghosts") && !p.ends_with("/missing"))
        );
        let alice = harness.mock.entity("alice").unwrap();
        let ops = harness.mock.group("ops").unwrap();
        let admins = harness.mock.group("admins").unwrap();
        assert_eq!(admins.member_entity_ids, [alice.id]);
        assert_eq!(admins.member_group_ids, [ops.id]);
        assert_eq!(summary.skipped, 0);
    }

    #[test]
    fn test_phases_never_overlap() {
        let harness = Harness::with_mock(MockBackend::new().with_latency(Duration::from_millis(5)), 4);
        for name in ["alice", "bob", "carol"] {
            harness.file(
                &format!("secrets-engines/identity/entities/{name}.json"),
                r#"{"entity-groups": ["admins", "devs"]}"#,
            );
        }
        harness
            .file("secrets-engines/identity/groups/admins.json", "{}")
            .file("secrets-engines/identity/groups/devs.json", "{}");

        sync(&harness.session(), KEY).unwrap();
        harness.finish(&mut no_answers());

        let writes: Vec<_> = harness
            .mock
            .journal()
            .into_iter()
            .filter(|entry| entry.op == Op::Write)
            .collect();
        let entity_writes: Vec<_> = writes
            .iter()
            .filter(|w| w.path.starts_with("identity/entity/name/"))
            .collect();
        let group_writes: Vec<_> = writes
            .iter()
            .filter(|w| w.path.starts_with("identity/group/name/"))
            .collect();
        assert_eq!(entity_writes.len(), 3);
        assert_eq!(group_writes.len(), 4);

        let entities_done = entity_writes.iter().map(|w| w.finished).max().unwrap();
        assert!(group_writes.iter().all(|w| w.started > entities_done));

        let (bare, full): (Vec<&&JournalEntry>, Vec<_>) = group_writes
            .iter()
            .partition(|w| w.data.as_ref().is_some_and(|d| !d.contains_key("id")));
        assert_eq!(bare.len(), 2);
        let bare_done = bare.iter().map(|w| w.finished).max().unwrap();
        assert!(full.iter().all(|w| w.started > bare_done));
    }

    #[test]
    fn test_duplicate_alias_creates_one_alias() {
        let harness = Harness::new();
        harness.mock.seed_auth("userpass", "userpass");
        for name in ["alice", "bob"] {
            harness.file(
                &format!("secrets-engines/identity/entities/{name}.json"),
                r#"{"entity-aliases": [{"name": "shared", "mount_path": "userpass/"}]}"#,
            );
        }

        sync(&harness.session(), KEY).unwrap();
        let summary = harness.finish(&mut no_answers());

        let aliases = harness.mock.entity_aliases();
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases[0].canonical_id, harness.mock.entity("alice").unwrap().id);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_conflicting_mount_fields_abort_before_writes() {
        let harness = Harness::new();
        let accessor = harness.mock.seed_auth("userpass", "userpass");
        harness.file(
            "secrets-engines/identity/entities/alice.json",
            &format!(r#"{{"entity-aliases": [{{"name": "alice", "mount_path": "userpass/", "mount_accessor": "{accessor}"}}]}}"#),
        );

        let err = sync(&harness.session(), KEY).unwrap_err();
        assert!(err.to_string().contains("Only one of 'mount_accessor' or 'mount_path'"));
        harness.finish(&mut AutoDecline);
        assert!(harness.mock.written_paths().is_empty());
    }

    #[test]
    fn test_existing_alias_updated_by_id() {
        let harness = Harness::new();
        let accessor = harness.mock.seed_auth("userpass", "userpass");
        let alice = harness.mock.seed_entity("alice");
        let alias_id = harness.mock.seed_entity_alias("alice", &accessor, &alice);
        harness.file(
            "secrets-engines/identity/entities/alice.json",
            r#"{"entity-aliases": [{"name": "alice", "mount_path": "userpass/"}]}"#,
        );

        sync(&harness.session(), KEY).unwrap();
        harness.finish(&mut no_answers());

        let writes = harness.mock.writes_to("identity/entity-alias");
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0]["id"], alias_id.as_str());
        assert_eq!(harness.mock.entity_aliases().len(), 1);
    }

    #[test]
    fn test_unclaimed_objects_proposed_and_implicit_kept() {
        let harness = Harness::new();
        let accessor = harness.mock.seed_auth("userpass", "userpass");
        let old = harness.mock.seed_entity("old");
        let implicit = harness.mock.seed_entity("entity_5f2c1a");
        let stale = harness.mock.seed_entity_alias("stale", &accessor, &old);
        harness.mock.seed_entity_alias("carol", &accessor, &implicit);
        harness.mock.seed_group("legacy");
        harness.file("secrets-engines/identity/entities/alice.json", "{}");

        sync(&harness.session(), KEY).unwrap();
        let mut answers = ScriptedAnswers::new(["y", "n", "y"]);
        let summary = harness.finish(&mut answers);

        assert_eq!(
            answers.prompts(),
            [
                "Delete Identity entity [old] at identity/entity/name/old".to_string(),
                "Delete Identity group [legacy] at identity/group/name/legacy".to_string(),
                format!("Delete Identity entity alias [{accessor}/stale] at identity/entity-alias/id/{stale}"),
            ]
        );
        assert_eq!(summary.deleted, 2);
        assert_eq!(summary.declined, 1);
        assert!(harness.mock.entity("entity_5f2c1a").is_some());
        assert!(harness.mock.group("legacy").is_some());
        assert_eq!(harness.mock.entity_aliases().len(), 1);
    }

    #[test]
    fn test_group_alias_bound_to_group() {
        let harness = Harness::new();
        let accessor = harness.mock.seed_auth("ldap", "ldap");
        harness.file(
            "secrets-engines/identity/groups/admins.json",
            r#"{"group": {"type": "external"}, "group-alias": {"name": "cn=admins", "mount_path": "ldap/"}}"#,
        );

        sync(&harness.session(), KEY).unwrap();
        harness.finish(&mut no_answers());

        let admins = harness.mock.group("admins").unwrap();
        let aliases = harness.mock.group_aliases();
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases[0].canonical_id, admins.id);
        assert_eq!(aliases[0].mount_accessor, accessor);
        assert_eq!(admins.kind, "external");
        let writes = harness.mock.writes_to("identity/group/name/admins");
        assert!(!writes.is_empty());
        assert!(writes.iter().all(|w| !w.contains_key("member_entity_ids")));
    }
}
