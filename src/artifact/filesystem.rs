//! Filesystem helpers for the working directories.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use walkdir::WalkDir;

/// Add the owner write bit to everything under `root`.
///
/// Files copied off a read-only ISO mount keep their 0444/0555 modes, which
/// would make the later checksum and assembly steps unable to replace them.
/// Symlinks are skipped; chmod would follow them.
pub fn make_writable(root: &Path) -> Result<()> {
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.with_context(|| format!("walking '{}'", root.display()))?;
        if entry.path_is_symlink() {
            continue;
        }
        let metadata = entry
            .metadata()
            .with_context(|| format!("reading metadata of '{}'", entry.path().display()))?;
        let mode = metadata.permissions().mode();
        if mode & 0o200 == 0 {
            fs::set_permissions(entry.path(), fs::Permissions::from_mode(mode | 0o200))
                .with_context(|| format!("making '{}' writable", entry.path().display()))?;
        }
    }
    Ok(())
}

/// Atomically move a file by renaming, with fallback to copy+delete.
///
/// Used for the download-to-`.part`-then-rename pattern so an interrupted
/// download never looks like a finished one.
pub fn atomic_move(src: &Path, dst: &Path) -> Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            // Different filesystem
            fs::copy(src, dst)
                .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
            fs::remove_file(src)
                .with_context(|| format!("Failed to remove {}", src.display()))?;
            Ok(())
        }
    }
}

/// Remove a directory tree. Returns whether anything was removed.
pub fn remove_dir_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("removing '{}'", path.display())),
    }
}

/// Remove a file. Returns whether anything was removed.
pub fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("removing '{}'", path.display())),
    }
}
