//! Installation layout and configuration.
//!
//! Every path the engine touches is derived from a single installation root:
//!
//! ```text
//! <root>/plugins/                              live deployment directory
//! <root>/patches/patch<NNNN>/                  patch overlays
//! <root>/patches/patch0000/                    pristine backup (reserved)
//! <root>/patches/.metadata/prePatchedDir.txt   applied-overlay log
//! <root>/patches/.metadata/prePatchedJARs.txt  checksum ledger
//! <root>/servicepacks/servicepack<NNNN>/       service-pack overlays
//! <root>/logs/patches.log                      operation log
//! ```
//!
//! Directory names can be overridden through `conf/patch.toml`, and the
//! patches root relocated wholesale via `PATCH_ENGINE_PATCHES_DIR`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::overlay::BACKUP_DIR_NAME;

/// Environment variable relocating the patches root (backup, patch overlays
/// and metadata move with it).
pub const PATCHES_DIR_ENV: &str = "PATCH_ENGINE_PATCHES_DIR";

const CONFIG_FILE: &str = "conf/patch.toml";
const METADATA_DIR: &str = ".metadata";
const APPLIED_LOG_FILE: &str = "prePatchedDir.txt";
const LEDGER_FILE: &str = "prePatchedJARs.txt";
const PATCH_LOG_FILE: &str = "patches.log";

/// Optional directory-name overrides, read from `conf/patch.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LayoutConfig {
    plugins_dir: Option<String>,
    patches_dir: Option<String>,
    servicepacks_dir: Option<String>,
    logs_dir: Option<String>,
}

/// Resolved filesystem layout of one installation.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
    plugins_dir: PathBuf,
    patches_dir: PathBuf,
    servicepacks_dir: PathBuf,
    logs_dir: PathBuf,
}

impl Layout {
    /// Resolve the layout for an installation root, honouring the optional
    /// config file and the environment override.
    pub fn discover(root: &Path) -> Result<Self> {
        let config = Self::load_config(root)?;
        let mut layout = Self {
            root: root.to_path_buf(),
            plugins_dir: root.join(config.plugins_dir.as_deref().unwrap_or("plugins")),
            patches_dir: root.join(config.patches_dir.as_deref().unwrap_or("patches")),
            servicepacks_dir: root.join(
                config.servicepacks_dir.as_deref().unwrap_or("servicepacks"),
            ),
            logs_dir: root.join(config.logs_dir.as_deref().unwrap_or("logs")),
        };

        if let Ok(dir) = env::var(PATCHES_DIR_ENV) {
            if !dir.is_empty() {
                layout.patches_dir = PathBuf::from(dir);
            }
        }

        Ok(layout)
    }

    fn load_config(root: &Path) -> Result<LayoutConfig> {
        let path = root.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(LayoutConfig::default());
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The live deployment directory, the only directory mutated by overlay
    /// application.
    pub fn live_dir(&self) -> &Path {
        &self.plugins_dir
    }

    pub fn patches_dir(&self) -> &Path {
        &self.patches_dir
    }

    pub fn servicepacks_dir(&self) -> &Path {
        &self.servicepacks_dir
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.patches_dir.join(BACKUP_DIR_NAME)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.patches_dir.join(METADATA_DIR)
    }

    /// Metadata directory, created on demand.
    pub fn ensure_metadata_dir(&self) -> Result<PathBuf> {
        let dir = self.metadata_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create metadata directory {}", dir.display()))?;
        Ok(dir)
    }

    pub fn applied_log_path(&self) -> PathBuf {
        self.metadata_dir().join(APPLIED_LOG_FILE)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.metadata_dir().join(LEDGER_FILE)
    }

    pub fn patch_log_path(&self) -> PathBuf {
        self.logs_dir.join(PATCH_LOG_FILE)
    }
}
