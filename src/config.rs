use crate::cli::Cli;
use anyhow::{Context, Result, bail};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// ============================================================================
// Settings
// ============================================================================

/// Validated runtime settings
///
/// The token is not kept here; it goes straight into the backend.
#[derive(Debug, Clone)]
pub struct Settings {
    pub configuration_path: PathBuf,
    pub vault_addr: String,
    pub skip_verify: bool,
    pub secret_base_path: String,
    pub workers: usize,
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let configuration_path = required(
            cli.configuration_path.as_deref(),
            "ConfigurationPath",
            "CONFIGURATION_PATH",
            "configuration-path",
            'c',
        )?;
        let vault_addr = required(cli.vault_addr.as_deref(), "VaultAddress", "VAULT_ADDR", "vault-addr", 'a')?;

        let expanded = shellexpand::tilde(configuration_path);
        let configuration_path = PathBuf::from(expanded.as_ref());
        if !configuration_path.is_dir() {
            bail!(
                "Configuration path {} does not exist or is not a directory",
                configuration_path.display()
            );
        }

        if cli.concurrent == 0 {
            bail!("Invalid value '0' for concurrency, at least one worker is required");
        }

        Ok(Self {
            configuration_path,
            vault_addr: vault_addr.trim_end_matches('/').to_string(),
            skip_verify: cli.skip_verify,
            secret_base_path: normalize_base_path(&cli.vault_secret_base_path),
            workers: cli.concurrent,
        })
    }
}

fn required<'a>(value: Option<&'a str>, field: &str, env: &str, long: &str, short: char) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => bail!(
            "{field} required but not set. Use environment variable {env} or command line options: --{long}, -{short}"
        ),
    }
}

/// Secrets live at `<base><namespace>`, so the base always ends in `/`.
fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim().trim_start_matches('/');
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

// ============================================================================
// Configuration Directory
// ============================================================================

/// The on-disk description of the desired server state
#[derive(Debug, Clone)]
pub struct ConfigDir {
    root: PathBuf,
}

impl ConfigDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// JSON files directly under `relative`, keyed by file stem.
    ///
    /// A missing directory yields an empty map. Files with another
    /// extension are skipped with a warning; invalid JSON is fatal.
    pub fn json_files(&self, relative: &str) -> Result<BTreeMap<String, String>> {
        self.files_with(relative, &["json"])
    }

    /// Policy documents (`.hcl` or `.json`) under `relative`.
    pub fn policy_files(&self, relative: &str) -> Result<BTreeMap<String, String>> {
        self.files_with(relative, &["hcl", "json"])
    }

    /// Names of the directories directly under `relative`, sorted.
    pub fn subdirectories(&self, relative: &str) -> Result<Vec<String>> {
        let dir = self.path(relative);
        if !dir.is_dir() {
            debug!("No directory at {}", dir.display());
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Could not read {}", dir.display()))?;
            if entry.file_type().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    /// Read one JSON file, or `None` if it does not exist.
    pub fn json_file(&self, relative: &str) -> Result<Option<String>> {
        let path = self.path(relative);
        if !path.is_file() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    fn files_with(&self, relative: &str, extensions: &[&str]) -> Result<BTreeMap<String, String>> {
        let dir = self.path(relative);
        let mut files = BTreeMap::new();
        if !dir.is_dir() {
            debug!("No configuration found at {}", dir.display());
            return Ok(files);
        }

        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Could not read {}", dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
            if !extensions.contains(&extension) {
                warn!(
                    "File has wrong extension. Will not be processed: {}",
                    path.display()
                );
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!("File name is not valid UTF-8. Will not be processed: {}", path.display());
                continue;
            };

            let content = if extension == "json" {
                read_json(path)?
            } else {
                fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?
            };
            files.insert(stem.to_string(), content);
        }

        Ok(files)
    }
}

fn read_json(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&content)
        .with_context(|| format!("File is not valid JSON: {}", path.display()))?;
    Ok(content)
}

/// Parse a configuration document into its typed form.
pub fn parse<T: DeserializeOwned>(content: &str, origin: &str) -> Result<T> {
    serde_json::from_str(content).with_context(|| format!("Error parsing configuration {origin}"))
}
