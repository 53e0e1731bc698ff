//! Canonical artifact naming from embedded bundle metadata.
//!
//! Component bundles carry their declared name and version inside a jar
//! manifest. When both attributes are present the artifact is renamed to the
//! canonical `{name}_{version}.jar` form before it lands in the live
//! directory; otherwise the original file name is kept. Metadata that is
//! missing or unparsable is silently tolerated.
//!
//! The inspection step is a pluggable capability so the canonicalization
//! rule can be tested with synthetic inputs.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::debug;

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
const SYMBOLIC_NAME_ATTR: &str = "Bundle-SymbolicName";
const VERSION_ATTR: &str = "Bundle-Version";

/// Declared identity recovered from a bundle's embedded metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleIdentity {
    pub name: String,
    pub version: String,
}

/// Recovers a declared (name, version) pair from raw bundle bytes.
pub trait ManifestInspector {
    fn inspect(&self, bytes: &[u8]) -> Option<BundleIdentity>;
}

/// Inspector for OSGi bundles: a zip archive with `META-INF/MANIFEST.MF`
/// carrying `Bundle-SymbolicName` and `Bundle-Version` attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsgiInspector;

impl ManifestInspector for OsgiInspector {
    fn inspect(&self, bytes: &[u8]) -> Option<BundleIdentity> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).ok()?;
        let mut entry = archive.by_name(MANIFEST_PATH).ok()?;
        let mut text = String::new();
        entry.read_to_string(&mut text).ok()?;

        let attrs = parse_manifest(&text);
        let name = attrs.get(SYMBOLIC_NAME_ATTR)?;
        let version = attrs.get(VERSION_ATTR)?;

        // Bundle-SymbolicName may carry directives, e.g. `;singleton:=true`.
        let name = name.split(';').next().unwrap_or(name.as_str()).trim();
        if name.is_empty() {
            return None;
        }

        Some(BundleIdentity {
            name: name.to_string(),
            version: version.trim().to_string(),
        })
    }
}

/// Parse a jar manifest into main-section attributes.
///
/// Manifest values wrap at 72 bytes; a line starting with a single space
/// continues the previous value.
fn parse_manifest(text: &str) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    let mut current: Option<(String, String)> = None;

    for raw in text.lines() {
        let line = raw.trim_end_matches('\r');
        if line.is_empty() {
            // Blank line ends the main section; per-entry sections follow.
            break;
        }
        if let Some(rest) = line.strip_prefix(' ') {
            if let Some((_, value)) = current.as_mut() {
                value.push_str(rest);
            }
            continue;
        }
        if let Some((key, value)) = current.take() {
            attrs.insert(key, value);
        }
        if let Some((key, value)) = line.split_once(':') {
            current = Some((key.trim().to_string(), value.trim_start().to_string()));
        }
    }
    if let Some((key, value)) = current.take() {
        attrs.insert(key, value);
    }
    attrs
}

/// Derive the canonical file name for an artifact.
///
/// Jar files whose metadata declares both a name and a version become
/// `{name}_{version}.jar`; everything else keeps its original file name.
pub fn canonical_file_name(path: &Path, inspector: &dyn ManifestInspector) -> String {
    let original = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if !original.ends_with(".jar") || path.is_dir() {
        return original;
    }

    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!("Could not read {} for metadata inspection: {err}", path.display());
            return original;
        }
    };

    match inspector.inspect(&bytes) {
        Some(identity) => format!("{}_{}.jar", identity.name, identity.version),
        None => original,
    }
}
