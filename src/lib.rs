//! Overlay patch engine for component-based middleware installations.
//!
//! Manages incremental updates layered onto a fixed base installation:
//! numbered **patches** and consolidated **service packs** copied onto the
//! live `plugins/` directory in a deterministic order. The engine runs at
//! process startup, before anything uses the live directory.
//!
//! Guarantees:
//!
//! - **Deterministic order** - the single most recent service pack first,
//!   then every non-subsumed patch ascending by name; later overlays
//!   overwrite earlier ones per canonical artifact name.
//! - **Order-independent re-application** - a one-time pristine backup of
//!   the live directory is taken before the first overlay is ever applied,
//!   and every later pass restores from it before copying.
//! - **Change tracking** - the applied-overlay log from the previous run is
//!   diffed against the freshly resolved set to report added and reverted
//!   overlays.
//! - **Drift detection** - SHA-256 digests of installed artifacts are kept
//!   in a ledger; out-of-band modifications surface as warnings and as a
//!   cheap startup pre-check.
//!
//! # Example
//!
//! ```rust,ignore
//! use patch_engine::{engine, Layout};
//! use std::path::Path;
//!
//! let layout = Layout::discover(Path::new("/opt/server"))?;
//! if engine::has_drifted(&layout)? {
//!     engine::apply_overlays(&layout)?;
//! }
//! engine::verify_integrity(&layout, false)?;
//! ```

pub mod apply;
pub mod backup;
pub mod bundle;
pub mod diff;
pub mod digest;
pub mod engine;
pub mod fsutil;
pub mod layout;
pub mod overlay;
pub mod session;
pub mod verify;

pub use diff::OverlayDiff;
pub use engine::{apply_overlays, compute_overlay_diff, has_drifted, verify_integrity, ApplyReport};
pub use layout::Layout;
