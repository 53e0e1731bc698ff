//! Public engine operations.
//!
//! These are the contracts the server launcher consumes at startup, in
//! order: a drift pre-check, an informational overlay diff, the
//! bootstrap-and-apply pass, and a verification pass that refreshes the
//! checksum ledger. All of them run to completion synchronously, strictly
//! before the component that uses the live directory starts.

use anyhow::{ensure, Context, Result};
use tracing::{debug, info};

use crate::apply;
use crate::backup;
use crate::bundle::OsgiInspector;
use crate::diff::{diff_orders, OverlayDiff};
use crate::fsutil;
use crate::layout::Layout;
use crate::overlay::resolve::resolve;
use crate::overlay::{classify, Classification};
use crate::session::PatchSession;
use crate::verify;

/// Outcome of a full apply pass.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    /// Whether this pass created the one-time backup (first run).
    pub bootstrapped: bool,
    /// Overlay names applied, in application order.
    pub applied: Vec<String>,
}

/// Full bootstrap-and-apply pass.
///
/// Creates the one-time backup if this is the first run, otherwise restores
/// the live directory from it so the pass starts from the pristine base.
/// Then applies the resolved overlay set in order and atomically replaces
/// the applied-overlay log.
pub fn apply_overlays(layout: &Layout) -> Result<ApplyReport> {
    let live_dir = layout.live_dir();
    ensure!(
        live_dir.is_dir(),
        "live directory {} does not exist",
        live_dir.display()
    );

    let backup_dir = layout.backup_dir();
    let bootstrapped = backup::ensure_backup(live_dir, &backup_dir)?;
    if !bootstrapped {
        // Re-application must never depend on what previous runs left behind.
        backup::restore(&backup_dir, live_dir)?;
    }

    debug!("Applying patches ...");
    let resolved = resolve(layout.patches_dir(), layout.servicepacks_dir())?;
    let mut session = PatchSession::new(resolved);
    apply::apply_all(layout, &OsgiInspector, &mut session)?;

    layout.ensure_metadata_dir()?;
    fsutil::write_lines_atomic(&layout.applied_log_path(), &session.applied)
        .context("Failed to write applied overlay log")?;

    info!(
        "Applied {} overlay(s) to {}",
        session.applied.len(),
        live_dir.display()
    );
    Ok(ApplyReport {
        bootstrapped,
        applied: session.applied,
    })
}

/// Report which overlays appeared or disappeared since the previous apply
/// pass. Reporting only: mutates nothing on disk.
pub fn compute_overlay_diff(layout: &Layout) -> Result<OverlayDiff> {
    debug!("Checking for patch changes ...");
    let resolved = resolve(layout.patches_dir(), layout.servicepacks_dir())?;
    let current = resolved.apply_order();

    let log_path = layout.applied_log_path();
    let diff = if log_path.is_file() {
        let previous = fsutil::read_lines(&log_path)?;
        diff_orders(&current, &previous)
    } else {
        OverlayDiff::all_added(&current)
    };

    for name in &diff.added {
        if classify(name) == Classification::ServicePack {
            info!("New service pack available - {name}");
        } else {
            info!("New patch available - {name}");
        }
    }
    for name in &diff.reverted {
        info!("{name} has been reverted");
    }
    if !diff.is_changed() {
        debug!("No new patch or service pack detected");
    }

    Ok(diff)
}

/// Verify live artifacts against their expected digests and refresh the
/// ledger file. Returns the accumulated warnings.
pub fn verify_integrity(layout: &Layout, verbose: bool) -> Result<Vec<String>> {
    let resolved = resolve(layout.patches_dir(), layout.servicepacks_dir())?;
    layout.ensure_metadata_dir()?;
    verify::verify(layout, &resolved, &OsgiInspector, verbose)
}

/// Cheap pre-check: has anything tracked by the last ledger drifted?
pub fn has_drifted(layout: &Layout) -> Result<bool> {
    let resolved = resolve(layout.patches_dir(), layout.servicepacks_dir())?;
    verify::has_drifted(layout, &resolved, &OsgiInspector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    fn install(temp: &TempDir) -> Layout {
        fs::create_dir_all(temp.path().join("plugins")).unwrap();
        fs::write(temp.path().join("plugins/base.jar"), "base").unwrap();
        Layout::discover(temp.path()).unwrap()
    }

    fn add_patch(root: &Path, name: &str, files: &[(&str, &str)]) {
        let dir = root.join("patches").join(name);
        fs::create_dir_all(&dir).unwrap();
        for (file, content) in files {
            fs::write(dir.join(file), content).unwrap();
        }
    }

    fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
        let mut out = BTreeMap::new();
        for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
            if entry.file_type().is_file() {
                let rel = entry.path().strip_prefix(dir).unwrap();
                out.insert(
                    rel.to_string_lossy().into_owned(),
                    fs::read(entry.path()).unwrap(),
                );
            }
        }
        out
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let layout = install(&temp);
        add_patch(temp.path(), "patch0001", &[("core.jar", "patched")]);

        let first = apply_overlays(&layout).unwrap();
        assert!(first.bootstrapped);
        let after_first = snapshot(layout.live_dir());
        let log_first = fs::read_to_string(layout.applied_log_path()).unwrap();

        let second = apply_overlays(&layout).unwrap();
        assert!(!second.bootstrapped);
        assert_eq!(snapshot(layout.live_dir()), after_first);
        assert_eq!(
            fs::read_to_string(layout.applied_log_path()).unwrap(),
            log_first
        );
    }

    #[test]
    fn last_writer_wins_across_patches() {
        let temp = TempDir::new().unwrap();
        let layout = install(&temp);
        add_patch(temp.path(), "patch0001", &[("core.jar", "first")]);
        add_patch(temp.path(), "patch0002", &[("core.jar", "second")]);

        apply_overlays(&layout).unwrap();

        assert_eq!(
            fs::read_to_string(layout.live_dir().join("core.jar")).unwrap(),
            "second"
        );
    }

    #[test]
    fn backup_is_created_exactly_once() {
        let temp = TempDir::new().unwrap();
        let layout = install(&temp);
        add_patch(temp.path(), "patch0001", &[("core.jar", "v1")]);

        apply_overlays(&layout).unwrap();
        let backup_mtime = fs::metadata(layout.backup_dir().join("base.jar"))
            .unwrap()
            .modified()
            .unwrap();

        // The backup must not be recopied even though the live dir changed.
        apply_overlays(&layout).unwrap();
        assert_eq!(
            fs::metadata(layout.backup_dir().join("base.jar"))
                .unwrap()
                .modified()
                .unwrap(),
            backup_mtime
        );
        assert!(!layout.backup_dir().join("core.jar").exists());
    }

    #[test]
    fn removed_patch_overwrites_revert_on_reapply() {
        let temp = TempDir::new().unwrap();
        let layout = install(&temp);
        add_patch(temp.path(), "patch0001", &[("base.jar", "patched base")]);

        apply_overlays(&layout).unwrap();
        assert_eq!(
            fs::read_to_string(layout.live_dir().join("base.jar")).unwrap(),
            "patched base"
        );

        // Reverting the patch reverts its overwrite via the restore that
        // precedes every pass.
        fs::remove_dir_all(temp.path().join("patches/patch0001")).unwrap();
        apply_overlays(&layout).unwrap();
        assert_eq!(
            fs::read_to_string(layout.live_dir().join("base.jar")).unwrap(),
            "base"
        );
    }

    #[test]
    fn diff_reports_added_and_reverted() {
        let temp = TempDir::new().unwrap();
        let layout = install(&temp);
        add_patch(temp.path(), "patch0001", &[("a.jar", "a")]);
        add_patch(temp.path(), "patch0003", &[("c.jar", "c")]);
        apply_overlays(&layout).unwrap();

        fs::remove_dir_all(temp.path().join("patches/patch0001")).unwrap();
        add_patch(temp.path(), "patch0002", &[("b.jar", "b")]);
        add_patch(temp.path(), "patch0004", &[("d.jar", "d")]);

        let diff = compute_overlay_diff(&layout).unwrap();
        assert_eq!(diff.added, vec!["patch0002", "patch0004"]);
        assert_eq!(diff.reverted, vec!["patch0001"]);
    }

    #[test]
    fn diff_on_first_run_reports_all_added_and_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let layout = install(&temp);
        add_patch(temp.path(), "patch0001", &[("a.jar", "a")]);

        let diff = compute_overlay_diff(&layout).unwrap();
        assert_eq!(diff.added, vec!["patch0001"]);
        assert!(diff.reverted.is_empty());
        assert!(!layout.applied_log_path().exists());
    }

    #[test]
    fn servicepack_subsumption_end_to_end() {
        let temp = TempDir::new().unwrap();
        let layout = install(&temp);
        add_patch(temp.path(), "patch0001", &[("old.jar", "from patch")]);

        let pack = temp.path().join("servicepacks/servicepack0001");
        fs::create_dir_all(pack.join("lib")).unwrap();
        fs::write(pack.join("lib/old.jar"), "from pack").unwrap();
        fs::write(pack.join("servicepack_patches.txt"), "patch0001\n").unwrap();

        let report = apply_overlays(&layout).unwrap();
        assert_eq!(report.applied, vec!["servicepack0001"]);
        assert_eq!(
            fs::read_to_string(layout.live_dir().join("old.jar")).unwrap(),
            "from pack"
        );
    }

    #[test]
    fn drift_after_external_modification() {
        let temp = TempDir::new().unwrap();
        let layout = install(&temp);
        add_patch(temp.path(), "patch0001", &[("core.jar", "patched")]);

        apply_overlays(&layout).unwrap();
        let warnings = verify_integrity(&layout, true).unwrap();
        assert!(warnings.is_empty());
        assert!(!has_drifted(&layout).unwrap());

        // One byte changed out of band.
        fs::write(layout.live_dir().join("core.jar"), "patchedX").unwrap();
        assert!(has_drifted(&layout).unwrap());
    }

    #[test]
    fn verify_after_apply_is_clean() {
        let temp = TempDir::new().unwrap();
        let layout = install(&temp);
        add_patch(
            temp.path(),
            "patch0001",
            &[("core.jar", "v1"), ("util.jar", "u1")],
        );
        add_patch(temp.path(), "patch0002", &[("core.jar", "v2")]);

        apply_overlays(&layout).unwrap();
        let warnings = verify_integrity(&layout, false).unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");

        let ledger = crate::verify::read_ledger(&layout.ledger_path()).unwrap();
        assert_eq!(ledger.len(), 2);
    }
}
