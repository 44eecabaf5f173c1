mod cli;
mod config;
mod engine;
mod resource;
mod rotate;
mod ui;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::Cli;
use config::{ConfigDir, Settings};
use engine::{Remote, SyncOptions, policy_for, run_sync};
use log::info;
use std::sync::Arc;
use vaultkit::{ErrorCategory, HttpBackend};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("Vault Admin version: {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    env_logger::Builder::new()
        .filter_level(if cli.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .format_timestamp(None)
        .init();

    run(cli).inspect_err(report_remote_error)
}

/// Category of the server error behind `err`, if any.
fn remote_category(err: &anyhow::Error) -> Option<ErrorCategory> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<vaultkit::Error>())
        .map(vaultkit::Error::category)
}

/// Point at the likely cause when a server call is behind the failure.
fn report_remote_error(err: &anyhow::Error) {
    if let Some(category) = remote_category(err) {
        ui::warn(&format!("{category}: {}", category.advice()));
    }
}

fn run(mut cli: Cli) -> Result<()> {
    let settings = Settings::from_cli(&cli)?;
    let backend = HttpBackend::new(&settings.vault_addr, cli.vault_token.take(), settings.skip_verify);

    let health = vaultkit::Backend::health(&backend)
        .with_context(|| format!("Cannot reach Vault server at {}", settings.vault_addr))?;
    if !health.is_ready() {
        bail!(
            "Vault server at {} is not ready (initialized: {}, sealed: {})",
            settings.vault_addr,
            health.initialized,
            health.sealed
        );
    }
    info!("Connected to Vault {} at {}", health.version, settings.vault_addr);

    if cli.rotate_creds {
        let rotated = rotate::rotate_credentials(&backend)?;
        ui::success(&format!("Rotated root credentials of {rotated} AWS secrets engine(s)"));
        return Ok(());
    }

    let remote = Remote::new(Arc::new(backend));
    let config = ConfigDir::new(&settings.configuration_path);
    let options = SyncOptions {
        secret_base_path: settings.secret_base_path.clone(),
        workers: settings.workers,
    };
    let mut policy = policy_for(cli.confirm);
    let summary = run_sync(&remote, &config, &options, policy.as_mut())?;
    ui::print_summary(&summary);
    Ok(())
}
