//! Overlay manifest (`files/paths.json`).
//!
//! Maps an asset name under the project's `files/` directory to an absolute
//! destination inside the image:
//!
//! ```json
//! { "motd": "/etc/motd", "sddm.conf": "/etc/sddm.conf.d/kde_settings.conf" }
//! ```
//!
//! Entries are kept in file order so a later entry targeting the same
//! destination wins, as it would with sequential copies.

use anyhow::{bail, Context, Result};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// One `name -> destination` line of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayEntry {
    pub name: String,
    pub destination: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayManifest {
    pub entries: Vec<OverlayEntry>,
}

impl<'de> Deserialize<'de> for OverlayManifest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ManifestVisitor;

        impl<'de> Visitor<'de> for ManifestVisitor {
            type Value = OverlayManifest;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping file names to destination paths")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, destination)) = map.next_entry::<String, String>()? {
                    entries.push(OverlayEntry { name, destination });
                }
                Ok(OverlayManifest { entries })
            }
        }

        deserializer.deserialize_map(ManifestVisitor)
    }
}

/// An overlay entry resolved to concrete host paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    pub name: String,
    /// Asset file on the host.
    pub source: PathBuf,
    /// Target file inside the mutable root, with symlinks already resolved.
    pub destination: PathBuf,
}

impl PathMapping {
    /// Resolve `entry` against the asset root and the mutable root.
    ///
    /// Does not check that the source exists; callers decide how to treat that.
    pub fn resolve(entry: &OverlayEntry, assets_dir: &Path, root: &Path) -> Result<Self> {
        let name = Path::new(&entry.name);
        if name.as_os_str().is_empty()
            || name
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!(
                "overlay name '{}' must be a relative path inside the asset directory",
                entry.name
            );
        }

        let source = assets_dir.join(name);
        let destination = copy_destination(root, &entry.destination, &source)?;
        Ok(Self {
            name: entry.name.clone(),
            source,
            destination,
        })
    }
}

/// Symlinks followed while resolving one destination before giving up.
const MAX_SYMLINK_HOPS: usize = 40;

/// Map an absolute in-image path (`/etc/hostname`) onto the mutable root.
///
/// Rejects relative paths and `..`. Symlinks already present in the root are
/// followed the way the image itself would see them: absolute targets are
/// re-rooted under `root` and `..` in a target stops at `root`, so the result
/// never points outside it.
pub fn destination_in_root(root: &Path, destination: impl AsRef<Path>) -> Result<PathBuf> {
    let dest = destination.as_ref();
    if !dest.is_absolute() {
        bail!("destination '{}' must be an absolute path", dest.display());
    }

    let mut pending: VecDeque<OsString> = VecDeque::new();
    for component in dest.components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(part) => pending.push_back(part.to_os_string()),
            Component::ParentDir | Component::Prefix(_) => {
                bail!("destination '{}' must not contain '..'", dest.display());
            }
        }
    }
    if pending.is_empty() {
        bail!("destination '{}' does not name a file", dest.display());
    }

    let mut resolved: Vec<OsString> = Vec::new();
    let mut hops = 0;
    while let Some(part) = pending.pop_front() {
        // `..` only comes from link targets; it stops at the root
        if part == ".." {
            resolved.pop();
            continue;
        }
        let candidate = rooted(root, &resolved).join(&part);
        let is_link = fs::symlink_metadata(&candidate)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            resolved.push(part);
            continue;
        }

        hops += 1;
        if hops > MAX_SYMLINK_HOPS {
            bail!(
                "destination '{}': too many levels of symbolic links",
                dest.display()
            );
        }
        let target = fs::read_link(&candidate)
            .with_context(|| format!("reading symlink '{}'", candidate.display()))?;
        if target.is_absolute() {
            resolved.clear();
        }
        for component in target.components().rev() {
            match component {
                Component::Normal(p) => pending.push_front(p.to_os_string()),
                Component::ParentDir => pending.push_front(OsString::from("..")),
                _ => {}
            }
        }
    }
    if resolved.is_empty() {
        bail!("destination '{}' resolves to the image root", dest.display());
    }
    Ok(rooted(root, &resolved))
}

/// Where a copy of `source` to `destination` lands.
///
/// A destination ending in `/` or naming an existing directory receives the
/// file under its own name, like `cp file dir/`.
pub fn copy_destination(root: &Path, destination: &str, source: &Path) -> Result<PathBuf> {
    let dest = destination_in_root(root, destination)?;
    if !destination.ends_with('/') && !dest.is_dir() {
        return Ok(dest);
    }
    let file_name = source
        .file_name()
        .with_context(|| format!("source '{}' has no file name", source.display()))?;
    destination_in_root(root, Path::new(destination).join(file_name))
}

fn rooted(root: &Path, parts: &[OsString]) -> PathBuf {
    let mut path = root.to_path_buf();
    path.extend(parts);
    path
}
