//! Per-pass engine state.
//!
//! One `PatchSession` is created per apply pass and threaded through the
//! applier, so repeated passes (including in tests) never share mutable
//! state.

use crate::overlay::resolve::ResolvedOverlays;
use crate::verify::Ledger;

/// State accumulated while one overlay apply pass runs.
#[derive(Debug)]
pub struct PatchSession {
    /// The overlay set this pass applies, in resolved order.
    pub resolved: ResolvedOverlays,
    /// Digests recorded while applying, keyed by canonical artifact name.
    pub ledger: Ledger,
    /// Overlay names in application order; flushed wholesale to the
    /// applied-overlay log once the pass completes.
    pub applied: Vec<String>,
}

impl PatchSession {
    pub fn new(resolved: ResolvedOverlays) -> Self {
        Self {
            resolved,
            ledger: Ledger::new(),
            applied: Vec::new(),
        }
    }
}
