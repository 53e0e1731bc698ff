//! Ordered overlay application onto the live directory.
//!
//! Overlays are processed strictly in resolved order: the selected service
//! pack first, then each remaining patch ascending by name. Later overlays
//! are expected to overwrite files written by earlier ones, which gives
//! deterministic last-writer-wins semantics per canonical artifact name.
//!
//! Failures are tolerated at artifact granularity: a file that cannot be
//! copied or digested is logged and skipped, and the containing overlay is
//! still recorded as applied once its pass completes. The next pass restores
//! from backup and retries everything.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::bundle::{canonical_file_name, ManifestInspector};
use crate::digest::sha256_hex;
use crate::fsutil::{copy_dir_recursive, copy_file_preserving_mtime};
use crate::layout::Layout;
use crate::overlay::OverlayDirectory;
use crate::session::PatchSession;
use crate::verify::Ledger;

/// Apply every resolved overlay to the live directory, in order.
///
/// Artifact digests land in the session ledger and each overlay's name is
/// appended to the session's applied buffer; the caller persists both.
pub fn apply_all(
    layout: &Layout,
    inspector: &dyn ManifestInspector,
    session: &mut PatchSession,
) -> Result<()> {
    let overlays: Vec<OverlayDirectory> =
        session.resolved.overlays_in_order().cloned().collect();

    for overlay in overlays {
        info!("Applying - {}", overlay.name);
        let failures = apply_overlay_dir(&overlay, layout.live_dir(), inspector, &mut session.ledger);
        if failures > 0 {
            warn!(
                "{} applied with {failures} failed artifact(s); it is still recorded as applied",
                overlay.name
            );
        }
        session.applied.push(overlay.name.clone());
    }

    Ok(())
}

/// Apply one overlay directory; returns the number of artifacts that failed.
fn apply_overlay_dir(
    overlay: &OverlayDirectory,
    live_dir: &Path,
    inspector: &dyn ManifestInspector,
    ledger: &mut Ledger,
) -> usize {
    let artifacts = match overlay.artifact_paths() {
        Ok(artifacts) => artifacts,
        Err(err) => {
            error!("Could not enumerate {}: {err:#}", overlay.name);
            return 1;
        }
    };

    let mut failures = 0;
    for src in artifacts {
        if let Err(err) = apply_artifact(&src, live_dir, inspector, ledger) {
            error!("Failed to apply {}: {err:#}", src.display());
            failures += 1;
        }
    }
    failures
}

fn apply_artifact(
    src: &Path,
    live_dir: &Path,
    inspector: &dyn ManifestInspector,
    ledger: &mut Ledger,
) -> Result<()> {
    let name = canonical_file_name(src, inspector);
    let dest = live_dir.join(&name);

    if src.is_dir() {
        // Service-pack payloads may contain whole directories; those carry
        // no single content digest.
        copy_dir_recursive(src, &dest)?;
        return Ok(());
    }

    copy_file_preserving_mtime(src, &dest)
        .with_context(|| format!("copying into {}", live_dir.display()))?;
    let digest = sha256_hex(src)?;
    debug!("Patched {name} (SHA-256: {digest})");
    ledger.insert(name, digest);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::OsgiInspector;
    use crate::overlay::resolve::resolve;
    use std::fs;
    use tempfile::TempDir;

    fn session_for(temp: &TempDir) -> (Layout, PatchSession) {
        let layout = Layout::discover(temp.path()).unwrap();
        fs::create_dir_all(layout.live_dir()).unwrap();
        let resolved = resolve(layout.patches_dir(), layout.servicepacks_dir()).unwrap();
        (layout, PatchSession::new(resolved))
    }

    #[test]
    fn later_patch_wins_for_same_artifact_name() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("patches/patch0001")).unwrap();
        fs::create_dir_all(temp.path().join("patches/patch0002")).unwrap();
        fs::write(temp.path().join("patches/patch0001/core.jar"), "from 0001").unwrap();
        fs::write(temp.path().join("patches/patch0002/core.jar"), "from 0002").unwrap();

        let (layout, mut session) = session_for(&temp);
        apply_all(&layout, &OsgiInspector, &mut session).unwrap();

        assert_eq!(
            fs::read_to_string(layout.live_dir().join("core.jar")).unwrap(),
            "from 0002"
        );
        assert_eq!(session.applied, vec!["patch0001", "patch0002"]);
        assert_eq!(session.ledger.len(), 1);
    }

    #[test]
    fn servicepack_is_applied_before_patches() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("servicepacks/servicepack0001/lib")).unwrap();
        fs::write(
            temp.path().join("servicepacks/servicepack0001/lib/core.jar"),
            "from pack",
        )
        .unwrap();
        fs::create_dir_all(temp.path().join("patches/patch0001")).unwrap();
        fs::write(temp.path().join("patches/patch0001/core.jar"), "from patch").unwrap();

        let (layout, mut session) = session_for(&temp);
        apply_all(&layout, &OsgiInspector, &mut session).unwrap();

        assert_eq!(session.applied, vec!["servicepack0001", "patch0001"]);
        // The patch sorts after the pack, so its copy is the live one.
        assert_eq!(
            fs::read_to_string(layout.live_dir().join("core.jar")).unwrap(),
            "from patch"
        );
    }

    #[test]
    fn servicepack_directory_artifacts_are_copied() {
        let temp = TempDir::new().unwrap();
        let lib = temp.path().join("servicepacks/servicepack0001/lib");
        fs::create_dir_all(lib.join("config.dir")).unwrap();
        fs::write(lib.join("config.dir/settings.xml"), "<cfg/>").unwrap();

        let (layout, mut session) = session_for(&temp);
        apply_all(&layout, &OsgiInspector, &mut session).unwrap();

        assert_eq!(
            fs::read_to_string(layout.live_dir().join("config.dir/settings.xml")).unwrap(),
            "<cfg/>"
        );
        // Directories are not tracked in the ledger.
        assert!(session.ledger.is_empty());
    }

    #[test]
    fn broken_overlay_is_still_recorded_as_applied() {
        let temp = TempDir::new().unwrap();
        // A service pack without its lib/ directory fails enumeration.
        fs::create_dir_all(temp.path().join("servicepacks/servicepack0001")).unwrap();
        fs::create_dir_all(temp.path().join("patches/patch0001")).unwrap();
        fs::write(temp.path().join("patches/patch0001/core.jar"), "ok").unwrap();

        let (layout, mut session) = session_for(&temp);
        apply_all(&layout, &OsgiInspector, &mut session).unwrap();

        assert_eq!(session.applied, vec!["servicepack0001", "patch0001"]);
        assert!(layout.live_dir().join("core.jar").is_file());
    }
}
