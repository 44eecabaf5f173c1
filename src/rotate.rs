//! Root credential rotation for AWS secrets engines

use anyhow::{Context, Result};
use log::{info, warn};
use reconcile::Payload;
use vaultkit::Backend;

/// Rotate the root credentials of every mounted AWS engine.
///
/// A failed rotation is logged and the remaining engines are still
/// rotated. Returns the number of engines rotated.
pub fn rotate_credentials(backend: &dyn Backend) -> Result<usize> {
    let mounts = backend.list_mounts().context("Error listing secrets engines")?;

    let mut rotated = 0;
    for (path, mount) in mounts.iter().filter(|(_, mount)| mount.kind == "aws") {
        match backend.write(&format!("{path}config/rotate-root"), &Payload::new()) {
            Ok(response) => {
                let access_key = response
                    .as_ref()
                    .and_then(|secret| secret.get_str("access_key"))
                    .unwrap_or_default();
                info!("Rotated key for [{path}]. New access key: {access_key}");
                rotated += 1;
            }
            Err(e) => warn!("Cannot rotate [{path}] ({}): {e}", mount.kind),
        }
    }
    Ok(rotated)
}
