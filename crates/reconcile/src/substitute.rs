//! Secret substitution - fills `%{name}%` placeholders from the remote store

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%\{[A-Za-z0-9_]+\}%").expect("placeholder pattern is valid"));

/// Source of flat key/value secrets
pub trait SecretSource: Send + Sync {
    /// Read the secrets stored at `path`
    ///
    /// Returns `None` when nothing is stored there, and an error when the
    /// read fails or a value is not a string.
    fn read_secrets(&self, path: &str) -> Result<Option<BTreeMap<String, String>>>;
}

/// Outcome of a substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Substitution {
    /// Every placeholder was resolved
    Complete(String),
    /// Some placeholders had no secret; the resource must be skipped
    Unresolved {
        namespace: String,
        placeholders: Vec<String>,
    },
}

impl Substitution {
    /// The substituted content, if complete
    pub fn complete(self) -> Option<String> {
        match self {
            Self::Complete(content) => Some(content),
            Self::Unresolved { .. } => None,
        }
    }

    /// Warning text for an unresolved substitution
    pub fn describe(&self) -> Option<String> {
        match self {
            Self::Complete(_) => None,
            Self::Unresolved {
                namespace,
                placeholders,
            } => Some(format!(
                "The following substitutions were detected but not found in secret path [{namespace}]: {}",
                placeholders.join(", ")
            )),
        }
    }
}

/// Resolves placeholders against secrets under a base path
///
/// Secrets for a namespace are read from `<base_path><namespace>`.
pub struct Substitutor<'a> {
    source: &'a dyn SecretSource,
    base_path: String,
}

impl<'a> Substitutor<'a> {
    pub fn new(source: &'a dyn SecretSource, base_path: impl Into<String>) -> Self {
        Self {
            source,
            base_path: base_path.into(),
        }
    }

    /// Substitute secret values verbatim.
    pub fn substitute(&self, content: &str, namespace: &str) -> Result<Substitution> {
        self.substitute_with(content, namespace, |value| value.to_string())
    }

    /// Substitute into a JSON document.
    ///
    /// Placeholders sit inside JSON strings, so values are escaped as JSON
    /// string content.
    pub fn substitute_json(&self, content: &str, namespace: &str) -> Result<Substitution> {
        self.substitute_with(content, namespace, json_escape)
    }

    fn substitute_with(
        &self,
        content: &str,
        namespace: &str,
        escape: impl Fn(&str) -> String,
    ) -> Result<Substitution> {
        let path = format!("{}{}", self.base_path, namespace);
        let mut output = content.to_string();

        if PLACEHOLDER.is_match(content) {
            let secrets = self
                .source
                .read_secrets(&path)
                .with_context(|| format!("Error reading substitution secrets from {path}"))?;
            for (key, value) in secrets.unwrap_or_default() {
                output = output.replace(&format!("%{{{key}}}%"), &escape(&value));
            }
        }

        let placeholders = leftover_placeholders(&output);
        if placeholders.is_empty() {
            Ok(Substitution::Complete(output))
        } else {
            Ok(Substitution::Unresolved {
                namespace: namespace.to_string(),
                placeholders,
            })
        }
    }
}

/// Placeholders still present in `content`, in order of appearance
pub fn leftover_placeholders(content: &str) -> Vec<String> {
    PLACEHOLDER
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn json_escape(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}
