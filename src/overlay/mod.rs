//! Overlay directory classification and discovery.
//!
//! Overlays are directories named to sort lexically in application order:
//! `patch<NNNN>` under the patches root and `servicepack<NNNN>` under the
//! service-packs root. Anything else is invisible to the engine, including
//! the reserved `patch0000` backup directory.

pub mod resolve;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Reserved name of the pristine backup directory under the patches root.
pub const BACKUP_DIR_NAME: &str = "patch0000";

/// Subdirectory of a service pack holding its artifacts.
pub const SERVICEPACK_LIB_DIR: &str = "lib";

/// Manifest file inside a service pack listing the patch names it subsumes,
/// one per line.
pub const SERVICEPACK_MANIFEST_FILE: &str = "servicepack_patches.txt";

const PATCH_PREFIX: &str = "patch";
const SERVICEPACK_PREFIX: &str = "servicepack";

/// The two kinds of applicable overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    Patch,
    ServicePack,
}

/// Outcome of classifying a directory name against the naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Patch,
    ServicePack,
    Unrecognized,
}

/// Classify a directory name. This is the single place holding the overlay
/// naming rule.
pub fn classify(name: &str) -> Classification {
    if name == BACKUP_DIR_NAME {
        // The backup snapshot is never an applicable overlay.
        return Classification::Unrecognized;
    }
    if name.starts_with(SERVICEPACK_PREFIX) {
        Classification::ServicePack
    } else if name.starts_with(PATCH_PREFIX) {
        Classification::Patch
    } else {
        Classification::Unrecognized
    }
}

/// A discovered overlay directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayDirectory {
    /// Directory name; doubles as the sort key.
    pub name: String,
    pub path: PathBuf,
    pub kind: OverlayKind,
}

impl OverlayDirectory {
    /// Directory whose entries are this overlay's artifacts.
    pub fn artifacts_dir(&self) -> PathBuf {
        match self.kind {
            OverlayKind::Patch => self.path.clone(),
            OverlayKind::ServicePack => self.path.join(SERVICEPACK_LIB_DIR),
        }
    }

    /// Paths of the artifacts this overlay lays onto the live directory,
    /// sorted by file name.
    ///
    /// Patch artifacts are the regular files directly inside the patch
    /// directory. Service-pack artifacts are the entries of its `lib/`
    /// subdirectory, which may themselves be directories since the live tree
    /// contains directories.
    pub fn artifact_paths(&self) -> Result<Vec<PathBuf>> {
        let dir = self.artifacts_dir();
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("Failed to read overlay directory: {}", dir.display()))?
        {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let keep = match self.kind {
                OverlayKind::Patch => file_type.is_file(),
                OverlayKind::ServicePack => file_type.is_file() || file_type.is_dir(),
            };
            if keep {
                out.push(entry.path());
            }
        }
        out.sort();
        Ok(out)
    }
}

/// List overlay directories of `kind` directly under `root`, sorted ascending
/// by name. A missing root yields an empty list.
pub fn scan_overlays(root: &Path, kind: OverlayKind) -> Result<Vec<OverlayDirectory>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for entry in fs::read_dir(root)
        .with_context(|| format!("Failed to read overlay root: {}", root.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let matches = match (classify(&name), kind) {
            (Classification::Patch, OverlayKind::Patch) => true,
            (Classification::ServicePack, OverlayKind::ServicePack) => true,
            _ => false,
        };
        if matches {
            out.push(OverlayDirectory {
                name,
                path: entry.path(),
                kind,
            });
        }
    }

    // Names are zero-padded, so lexical order is application order.
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}
