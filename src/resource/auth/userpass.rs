use super::AuthMethodConfig;
use crate::engine::Session;
use crate::resource::PathEntries;
use anyhow::{Result, bail};
use reconcile::Payload;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Default, Deserialize)]
struct UserpassConfig {
    #[serde(default)]
    users: Vec<Payload>,
}

/// Users keyed by lowercased username, the way the server stores them.
fn users(key: &str, config: UserpassConfig) -> Result<BTreeMap<String, Payload>> {
    let mut users = BTreeMap::new();
    for (i, user) in config.users.into_iter().enumerate() {
        let Some(Value::String(username)) = user.get("username") else {
            bail!("Error parsing additional_config.users[{i}] on auth method [auth/{key}]. Missing 'username' field.");
        };
        let username = username.to_lowercase();
        users.insert(username, user);
    }
    Ok(users)
}

pub(super) fn sync(session: &Session<'_>, key: &str, method: &AuthMethodConfig) -> Result<()> {
    let config: UserpassConfig = method.additional(key)?.unwrap_or_default();
    let desired = users(key, config)?;
    PathEntries::new("userpass user", "Userpass user", format!("auth/{key}users")).sync(session, &desired)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::Harness;
    use reconcile::ScriptedAnswers;
    use serde_json::json;

    #[test]
    fn test_usernames_are_lowercased() {
        let config: UserpassConfig = serde_json::from_value(json!({
            "users": [{"username": "Alice", "password": "x"}, {"username": "bob"}]
        }))
        .unwrap();
        let users = users("userpass/", config).unwrap();
        assert_eq!(users.keys().collect::<Vec<_>>(), ["alice", "bob"]);
        assert_eq!(users["alice"]["username"], "Alice");
    }

    #[test]
    fn test_missing_username_is_fatal() {
        let config: UserpassConfig = serde_json::from_value(json!({"users": [{"policies": "x"}]})).unwrap();
        let err = users("userpass/", config).unwrap_err();
        assert!(err.to_string().contains("users[0]"));
    }

    #[test]
    fn test_users_synced_under_mount() {
        let harness = Harness::new();
        harness.mock.seed_auth("userpass", "userpass");
        harness.mock.seed("auth/userpass/users/mallory", json!({"policies": "root"}));
        harness.file(
            "auth_methods/userpass.json",
            r#"{"auth_options": {"type": "userpass"}, "additional_config": {"users": [{"username": "Alice", "policies": "dev"}]}}"#,
        );

        super::super::sync(&harness.session()).unwrap();
        let mut answers = ScriptedAnswers::new(["y"]);
        harness.finish(&mut answers);

        assert_eq!(
            answers.prompts(),
            ["Delete Userpass user [auth/userpass/users/mallory] at auth/userpass/users/mallory"]
        );
        assert_eq!(harness.mock.stored("auth/userpass/users/alice").unwrap()["policies"], "dev");
        assert!(harness.mock.stored("auth/userpass/users/mallory").is_none());
    }
}
