//! Integrity verification against the checksum ledger.
//!
//! The ledger maps canonical artifact names to the digest of the overlay
//! source that should be live. `verify` walks the freshly resolved overlay
//! set, reports every artifact whose live copy is missing or diverged, and
//! persists a fresh ledger for the next run. `has_drifted` is the cheap
//! short-circuiting pre-check a launcher runs at startup to decide whether a
//! forced re-apply is warranted.
//!
//! Verification never fails the pass: findings are warnings, not errors.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::bundle::{canonical_file_name, ManifestInspector};
use crate::digest::sha256_hex;
use crate::fsutil;
use crate::layout::Layout;
use crate::overlay::resolve::ResolvedOverlays;

/// Canonical artifact name -> hex digest, ordered for stable output.
pub type Ledger = BTreeMap<String, String>;

/// Where the most recent copy of an artifact comes from.
#[derive(Debug, Clone)]
pub struct ArtifactSource {
    pub path: PathBuf,
    /// Name of the overlay directory that supplies it.
    pub overlay: String,
}

/// Read a persisted ledger; a missing file yields an empty ledger.
///
/// Lines are `name:digest`; the digest follows the last `:` since bundle
/// names never contain one but defensively splitting from the right keeps a
/// stray colon in a name from corrupting the mapping.
pub fn read_ledger(path: &Path) -> Result<Ledger> {
    let mut ledger = Ledger::new();
    if !path.is_file() {
        return Ok(ledger);
    }
    for line in fsutil::read_lines(path)? {
        match line.rsplit_once(':') {
            Some((name, digest)) if !name.is_empty() && !digest.is_empty() => {
                ledger.insert(name.to_string(), digest.to_string());
            }
            _ => warn!("Skipping malformed ledger line: {line}"),
        }
    }
    Ok(ledger)
}

/// Atomically persist a ledger as `name:digest` lines.
pub fn write_ledger(path: &Path, ledger: &Ledger) -> Result<()> {
    let lines: Vec<String> = ledger
        .iter()
        .map(|(name, digest)| format!("{name}:{digest}"))
        .collect();
    fsutil::write_lines_atomic(path, &lines)
        .with_context(|| format!("Failed to write ledger {}", path.display()))
}

/// The most recent source for every canonical artifact name across the
/// resolved overlay set.
///
/// Overlays are visited in application order, so a later overlay's artifact
/// replaces an earlier one's under the same canonical name, mirroring the
/// last-writer-wins copy semantics of the applier. Directory artifacts are
/// excluded: they have no single content digest to track.
pub fn latest_artifacts(
    resolved: &ResolvedOverlays,
    inspector: &dyn ManifestInspector,
) -> Result<BTreeMap<String, ArtifactSource>> {
    let mut latest = BTreeMap::new();
    for overlay in resolved.overlays_in_order() {
        for path in overlay.artifact_paths()? {
            if !path.is_file() {
                continue;
            }
            let name = canonical_file_name(&path, inspector);
            latest.insert(
                name,
                ArtifactSource {
                    path,
                    overlay: overlay.name.clone(),
                },
            );
        }
    }
    Ok(latest)
}

/// Verify the live directory against expected artifact digests and persist a
/// fresh ledger.
///
/// Returns the accumulated warnings; an empty list means everything checked
/// out. `verbose` raises the start/completion log severity for runs that
/// follow a fresh apply pass.
pub fn verify(
    layout: &Layout,
    resolved: &ResolvedOverlays,
    inspector: &dyn ManifestInspector,
    verbose: bool,
) -> Result<Vec<String>> {
    if verbose {
        info!("Patch verification started");
    } else {
        debug!("Patch verification started");
    }

    let latest = latest_artifacts(resolved, inspector)?;
    let mut warnings = Vec::new();
    let mut fresh = Ledger::new();

    for (name, source) in &latest {
        let expected = match sha256_hex(&source.path) {
            Ok(digest) => digest,
            Err(err) => {
                error!("Could not digest {}: {err:#}", source.path.display());
                continue;
            }
        };
        fresh.insert(name.clone(), expected.clone());

        let live = layout.live_dir().join(name);
        let diverged = if live.is_file() {
            match sha256_hex(&live) {
                Ok(actual) => actual != expected,
                Err(err) => {
                    error!("Could not digest {}: {err:#}", live.display());
                    true
                }
            }
        } else {
            true
        };
        if diverged {
            warnings.push(format!(
                "{name} (SHA-256: {expected}) has been patched with {}, but not applied",
                source.overlay
            ));
        }
    }

    write_ledger(&layout.ledger_path(), &fresh)?;

    if warnings.is_empty() {
        if verbose {
            info!("Patch verification successfully completed");
        } else {
            debug!("Patch verification successfully completed");
        }
    } else {
        warn!("Problems found during patch verification. See below for details:");
        for warning in &warnings {
            warn!("{warning}");
        }
        warn!(
            "Patch verification completed with warnings. See {} for details",
            layout.patch_log_path().display()
        );
    }

    Ok(warnings)
}

/// Cheap startup drift check against the previously persisted ledger.
///
/// Short-circuits on the first tracked artifact whose live digest no longer
/// matches the recorded one, or which the previous ledger has never seen.
/// Without a previous ledger there is nothing to compare against.
pub fn has_drifted(
    layout: &Layout,
    resolved: &ResolvedOverlays,
    inspector: &dyn ManifestInspector,
) -> Result<bool> {
    let ledger_path = layout.ledger_path();
    if !ledger_path.is_file() {
        return Ok(false);
    }
    let previous = read_ledger(&ledger_path)?;

    for (name, _source) in latest_artifacts(resolved, inspector)? {
        let Some(recorded) = previous.get(&name) else {
            debug!("{name} has been added");
            return Ok(true);
        };
        let live = layout.live_dir().join(&name);
        if !live.is_file() {
            debug!("{name} is tracked but missing from the live directory");
            return Ok(true);
        }
        if sha256_hex(&live)? != *recorded {
            debug!("{name} has been updated");
            return Ok(true);
        }
    }
    Ok(false)
}
