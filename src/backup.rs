//! One-time pristine backup of the live directory.
//!
//! The backup is taken before the first overlay is ever applied and is never
//! refreshed afterwards; its presence on disk is the signal that bootstrap
//! already happened. Every later apply pass starts by restoring the live
//! directory from it, which is what makes re-application order-independent
//! across runs.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::fsutil::copy_dir_recursive;

/// Create the backup if it does not exist yet.
///
/// Returns `true` when this call bootstrapped the backup (first run). A
/// failed copy is fatal: without a pristine snapshot later runs cannot
/// guarantee clean re-application.
pub fn ensure_backup(live_dir: &Path, backup_dir: &Path) -> Result<bool> {
    if backup_dir.exists() {
        return Ok(false);
    }

    if let Err(err) = copy_dir_recursive(live_dir, backup_dir) {
        // A partial snapshot must not be mistaken for a completed bootstrap
        // on the next run.
        let _ = fs::remove_dir_all(backup_dir);
        return Err(err).with_context(|| {
            format!(
                "Failed to back up {} to {}",
                live_dir.display(),
                backup_dir.display()
            )
        });
    }

    info!("Backed up {} to {}", live_dir.display(), backup_dir.display());
    Ok(true)
}

/// Restore the live directory from the backup: a plain recursive overwrite
/// copy, not a diff-based sync.
pub fn restore(backup_dir: &Path, live_dir: &Path) -> Result<()> {
    debug!("Restoring {} from backup", live_dir.display());
    copy_dir_recursive(backup_dir, live_dir).with_context(|| {
        format!(
            "Failed to restore {} from {}",
            live_dir.display(),
            backup_dir.display()
        )
    })
}
