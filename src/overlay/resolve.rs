//! Overlay set resolution.
//!
//! Determines what a full apply pass would lay down: the single most recent
//! service pack (older ones are superseded outright, never merged) followed
//! by every patch the selected service pack does not subsume, in ascending
//! name order.

use anyhow::Result;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

use crate::fsutil;
use crate::overlay::{
    scan_overlays, OverlayDirectory, OverlayKind, SERVICEPACK_MANIFEST_FILE,
};

/// The resolved overlay set for one run.
#[derive(Debug, Clone)]
pub struct ResolvedOverlays {
    /// Lexically last service pack, if any exists.
    pub service_pack: Option<OverlayDirectory>,
    /// Patches not subsumed by the selected service pack, ascending by name.
    pub patches: Vec<OverlayDirectory>,
    /// Patch names the selected service pack declares as already included.
    pub subsumed: BTreeSet<String>,
}

impl ResolvedOverlays {
    /// Overlay names in application order: service pack first, then patches.
    pub fn apply_order(&self) -> Vec<String> {
        self.overlays_in_order().map(|o| o.name.clone()).collect()
    }

    /// Overlays in application order.
    pub fn overlays_in_order(&self) -> impl Iterator<Item = &OverlayDirectory> {
        self.service_pack.iter().chain(self.patches.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.service_pack.is_none() && self.patches.is_empty()
    }
}

/// Resolve the overlay set from the two roots.
pub fn resolve(patches_root: &Path, servicepacks_root: &Path) -> Result<ResolvedOverlays> {
    let service_pack = scan_overlays(servicepacks_root, OverlayKind::ServicePack)?
        .into_iter()
        .last();

    let mut subsumed = BTreeSet::new();
    if let Some(pack) = &service_pack {
        debug!("Selected service pack {}", pack.name);
        match read_subsumption_manifest(pack) {
            Ok(names) => subsumed = names,
            Err(err) => {
                // Recoverable: apply every patch separately.
                warn!(
                    "Could not read {} for {}: {err:#}; applying all patches",
                    SERVICEPACK_MANIFEST_FILE, pack.name
                );
            }
        }
    }

    let patches = scan_overlays(patches_root, OverlayKind::Patch)?
        .into_iter()
        .filter(|patch| !subsumed.contains(&patch.name))
        .collect();

    Ok(ResolvedOverlays {
        service_pack,
        patches,
        subsumed,
    })
}

fn read_subsumption_manifest(pack: &OverlayDirectory) -> Result<BTreeSet<String>> {
    let path = pack.path.join(SERVICEPACK_MANIFEST_FILE);
    Ok(fsutil::read_lines(&path)?.into_iter().collect())
}
