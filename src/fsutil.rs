//! Filesystem primitives shared by the overlay engine.
//!
//! Copies preserve symlinks and file modification times, so a live directory
//! restored from the backup is indistinguishable from the snapshot that was
//! taken of it.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::Path;
use walkdir::WalkDir;

/// Copy a single file, overwriting the destination and carrying over the
/// source's modification time.
pub fn copy_file_preserving_mtime(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    fs::copy(src, dst)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;

    let mtime = fs::metadata(src)
        .with_context(|| format!("Failed to stat {}", src.display()))?
        .modified()
        .with_context(|| format!("No modification time for {}", src.display()))?;
    let dst_file = File::options()
        .write(true)
        .open(dst)
        .with_context(|| format!("Failed to open {} for timestamping", dst.display()))?;
    dst_file
        .set_modified(mtime)
        .with_context(|| format!("Failed to set modification time on {}", dst.display()))?;

    Ok(())
}

/// Recursively copy a directory tree with overwrite semantics.
///
/// Symlinks are preserved (not followed) and regular files keep their
/// modification times. Existing destination files are overwritten in place;
/// nothing is deleted from the destination.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    if !dst.exists() {
        fs::create_dir_all(dst)
            .with_context(|| format!("Failed to create directory: {}", dst.display()))?;
    }

    for entry in WalkDir::new(src).follow_links(false) {
        let entry =
            entry.with_context(|| format!("Failed to walk directory: {}", src.display()))?;
        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let dst_path = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            if dst_path.exists() || dst_path.is_symlink() {
                fs::remove_file(&dst_path)?;
            }
            std::os::unix::fs::symlink(&target, &dst_path)
                .with_context(|| format!("Failed to create symlink: {}", dst_path.display()))?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&dst_path)
                .with_context(|| format!("Failed to create directory: {}", dst_path.display()))?;
        } else {
            copy_file_preserving_mtime(entry.path(), &dst_path)?;
        }
    }

    Ok(())
}

/// Replace `dst` with `src` by rename, falling back to copy+delete when the
/// rename crosses filesystems.
pub fn atomic_replace(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, dst).with_context(|| {
                format!("Failed to copy {} to {}", src.display(), dst.display())
            })?;
            fs::remove_file(src)
                .with_context(|| format!("Failed to remove {}", src.display()))?;
            Ok(())
        }
    }
}

/// Write `lines` to `path` as a newline-terminated text file, replacing any
/// previous content wholesale.
///
/// The file is staged next to its destination and renamed into place so a
/// failed write never leaves a truncated log behind.
pub fn write_lines_atomic(path: &Path, lines: &[String]) -> Result<()> {
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, text).with_context(|| format!("Failed to write {}", tmp.display()))?;
    atomic_replace(&tmp, path)
}

/// Read a newline-separated text file into trimmed, non-empty lines.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(text
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect())
}
