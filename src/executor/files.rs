//! File handlers for the mutable root: overlay copies, modes, host name,
//! resolver seeding.

use anyhow::{bail, Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::config::FileMode;

/// Copy `source` to `dest`, creating any missing parent directories.
pub fn copy_into_root(source: &Path, dest: &Path) -> Result<()> {
    if !source.is_file() {
        bail!("file not found: {}", source.display());
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory '{}'", parent.display()))?;
    }
    fs::copy(source, dest).with_context(|| {
        format!("copying '{}' -> '{}'", source.display(), dest.display())
    })?;
    Ok(())
}

/// Set the exact permission bits of `path`.
pub fn apply_mode(path: &Path, mode: FileMode) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode.bits()))
        .with_context(|| format!("setting mode {} on '{}'", mode, path.display()))
}

/// Overwrite `<root>/etc/hostname` with `hostname` plus a newline.
pub fn write_hostname(root: &Path, hostname: &str) -> Result<()> {
    let path = root.join("etc/hostname");
    write_replacing(&path, &format!("{}\n", hostname))
}

/// Copy the host resolver configuration into the root so package managers
/// inside the isolated environment can resolve names.
pub fn seed_resolv_conf(host_resolv: &Path, root: &Path) -> Result<()> {
    let content = fs::read(host_resolv)
        .with_context(|| format!("reading host resolver config '{}'", host_resolv.display()))?;
    let dest = root.join("etc/resolv.conf");
    write_replacing(&dest, content)
}

/// Write a regular file at `path`, replacing a symlink rather than writing
/// through it (a live root's resolv.conf usually points into /run).
fn write_replacing(path: &Path, content: impl AsRef<[u8]>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory '{}'", parent.display()))?;
    }
    if path.is_symlink() {
        fs::remove_file(path)
            .with_context(|| format!("removing symlink '{}'", path.display()))?;
    }
    fs::write(path, content).with_context(|| format!("writing '{}'", path.display()))
}
