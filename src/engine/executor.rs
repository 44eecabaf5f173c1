//! Sync driver - runs every per-kind routine against one shared context

use anyhow::{Context as AnyhowContext, Result};
use log::{error, info};
use reconcile::{ConfirmationPolicy, SyncContext, SyncSummary};
use std::sync::{Arc, Mutex};

use super::{Remote, Session};
use crate::config::ConfigDir;
use crate::resource::{audit, auth, policy, secrets_engine};

/// Routines running concurrently: audit devices, policies, and auth methods
/// followed by secrets engines.
const PRODUCERS: usize = 3;

/// Options for one sync pass
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Prefix of the secrets used for placeholder substitution
    pub secret_base_path: String,
    /// Number of workers applying writes
    pub workers: usize,
}

/// Reconcile the server with the configuration directory
///
/// Writes run on the worker pool while the routines are still producing.
/// Deletions are confirmed one by one through `policy` once every write
/// has finished. The first fatal error stops the pool and is returned.
pub fn run_sync(
    remote: &Remote,
    config: &ConfigDir,
    opts: &SyncOptions,
    policy: &mut dyn ConfirmationPolicy,
) -> Result<SyncSummary> {
    let ctx = SyncContext::new(Arc::new(remote.clone()), opts.workers)?;
    let session = Session::new(&ctx, remote, config, &opts.secret_base_path);
    let errors: Mutex<Vec<anyhow::Error>> = Mutex::new(Vec::new());

    let producers = rayon::ThreadPoolBuilder::new()
        .num_threads(PRODUCERS)
        .thread_name(|i| format!("producer-{i}"))
        .build()
        .context("Failed to create sync thread pool")?;

    producers.scope(|s| {
        s.spawn(|_| record_failure(&session, &errors, audit::sync(&session)));
        s.spawn(|_| record_failure(&session, &errors, policy::sync(&session)));
        s.spawn(|_| {
            // Alias mount resolution reads the auth mounts this enables.
            let result = auth::sync(&session).and_then(|()| secrets_engine::sync(&session));
            record_failure(&session, &errors, result);
        });
    });

    if let Some(err) = into_errors(errors).into_iter().next() {
        return Err(err);
    }

    info!("Main processing complete - waiting for remaining tasks to complete");
    ctx.finish(policy)
}

/// Stop the pool on the first producer failure so the other routines bail
/// out at their next submission.
fn record_failure(session: &Session<'_>, errors: &Mutex<Vec<anyhow::Error>>, result: Result<()>) {
    let Err(err) = result else {
        return;
    };
    error!("{err:#}");
    session.ctx.pool().abort(format!("{err:#}"));
    match errors.lock() {
        Ok(mut locked) => locked.push(err),
        Err(poisoned) => poisoned.into_inner().push(err),
    }
}

fn into_errors(errors: Mutex<Vec<anyhow::Error>>) -> Vec<anyhow::Error> {
    match errors.into_inner() {
        Ok(collected) => collected,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::BASE_PATH;
    use reconcile::{AutoConfirm, AutoDecline};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use vaultkit::{AuditOutput, MockBackend};

    fn write(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn options() -> SyncOptions {
        SyncOptions {
            secret_base_path: BASE_PATH.to_string(),
            workers: 4,
        }
    }

    fn fixture(dir: &Path) {
        write(
            dir,
            "audit_devices/file.json",
            r#"{"type": "file", "description": "", "options": {"file_path": "/var/log/vault_audit.log"}}"#,
        );
        write(dir, "policies/app.hcl", "path \"app/*\" { capabilities = [\"read\"] }");
        write(
            dir,
            "auth_methods/userpass.json",
            r#"{
                "auth_options": {"type": "userpass", "description": "people"},
                "additional_config": {"users": [{"username": "Alice", "policies": "app"}]}
            }"#,
        );
        write(dir, "secrets-engines/identity/entities/alice.json", r#"{
            "entity": {"policies": ["app"]},
            "entity-aliases": [{"name": "alice", "mount_path": "userpass/"}],
            "entity-groups": ["admins"]
        }"#);
        write(dir, "secrets-engines/identity/groups/admins.json", r#"{"group": {"policies": ["admin"]}}"#);
    }

    #[test]
    fn test_full_sync_against_mock() {
        let tmp = TempDir::new().unwrap();
        fixture(tmp.path());
        let mock = MockBackend::new();
        mock.seed_policy("old", "path \"old/*\" {}");
        let remote = Remote::new(Arc::new(mock.clone()));

        let summary = run_sync(&remote, &ConfigDir::new(tmp.path()), &options(), &mut AutoConfirm).unwrap();

        assert_eq!(summary.deleted, 1);
        assert!(mock.policy("app").is_some());
        assert!(mock.policy("old").is_none());
        assert_eq!(mock.stored("auth/userpass/users/alice").unwrap()["policies"], "app");

        let alice = mock.entity("alice").unwrap();
        let admins = mock.group("admins").unwrap();
        assert_eq!(admins.member_entity_ids, vec![alice.id.clone()]);
        let aliases = mock.entity_aliases();
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases[0].canonical_id, alice.id);
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        fixture(tmp.path());
        let mock = MockBackend::new();
        let remote = Remote::new(Arc::new(mock.clone()));
        let config = ConfigDir::new(tmp.path());

        run_sync(&remote, &config, &options(), &mut AutoConfirm).unwrap();
        let first = mock.writes_to("identity/group/name/admins");
        let second = run_sync(&remote, &config, &options(), &mut AutoConfirm).unwrap();

        assert_eq!(second.deleted, 0);
        assert_eq!(second.declined, 0);
        assert_eq!(mock.entity_aliases().len(), 1);
        let writes = mock.writes_to("identity/group/name/admins");
        assert_eq!(writes.last(), first.last());
    }

    #[test]
    fn test_declined_deletions_leave_server_untouched() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "policies/app.hcl", "path \"app/*\" {}");
        let mock = MockBackend::new();
        mock.seed_policy("old", "");
        mock.seed_audit(
            "syslog",
            AuditOutput {
                kind: "syslog".into(),
                ..AuditOutput::default()
            },
        );
        let remote = Remote::new(Arc::new(mock.clone()));

        let summary = run_sync(&remote, &ConfigDir::new(tmp.path()), &options(), &mut AutoDecline).unwrap();
        assert_eq!(summary.declined, 2);
        assert!(mock.policy("old").is_some());
        assert!(mock.deleted_paths().is_empty());
    }

    #[test]
    fn test_remote_write_failure_is_fatal() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "policies/app.hcl", "path \"app/*\" {}");
        let mock = MockBackend::new();
        mock.seed_policy("old", "");
        mock.fail_on("sys/policies/acl/app");
        let remote = Remote::new(Arc::new(mock.clone()));

        let result = run_sync(&remote, &ConfigDir::new(tmp.path()), &options(), &mut AutoConfirm);
        assert!(result.is_err());
        assert!(mock.deleted_paths().is_empty());
    }

    #[test]
    fn test_mount_type_mismatch_aborts() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "auth_methods/ldap.json",
            r#"{"auth_options": {"type": "ldap"}}"#,
        );
        write(tmp.path(), "policies/app.hcl", "path \"app/*\" {}");
        let mock = MockBackend::new();
        mock.seed_auth("ldap", "userpass");
        let remote = Remote::new(Arc::new(mock.clone()));

        let err = run_sync(&remote, &ConfigDir::new(tmp.path()), &options(), &mut AutoConfirm).unwrap_err();
        assert!(format!("{err:#}").contains("doesn't match type"));
    }

    #[test]
    fn test_record_failure_recovers_poisoned_mutex() {
        let mock = MockBackend::new();
        let remote = Remote::new(Arc::new(mock));
        let ctx = SyncContext::new(Arc::new(remote.clone()), 1).unwrap();
        let config = ConfigDir::new(".");
        let session = Session::new(&ctx, &remote, &config, BASE_PATH);

        let errors = Arc::new(Mutex::new(Vec::new()));
        let poisoned = Arc::clone(&errors);
        let _ = std::thread::spawn(move || {
            let _guard = poisoned.lock().unwrap();
            panic!("intentional poison");
        })
        .join();

        record_failure(&session, &errors, Err(anyhow::anyhow!("boom")));
        let collected = into_errors(Arc::try_unwrap(errors).unwrap());
        assert_eq!(collected.len(), 1);
        assert!(ctx.pool().wait().is_err());
    }
}
