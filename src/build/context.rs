//! Build configuration and the paths derived from it.
//!
//! [`BuildConfig`] replaces what used to be process-wide constants (download
//! URL, output root, project root). It is constructed once, optionally from a
//! TOML file, and handed to the pipeline by value. [`BuildContext`] is the
//! fixed set of working paths computed from it.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::artifact::squashfs::SquashfsOptions;

/// Base image fetched when no other URL is configured.
pub const DEFAULT_ISO_URL: &str =
    "https://files.kde.org/neon/images/user/20251127-0745/neon-user-20251127-0745.iso";
pub const DEFAULT_OUTPUT_DIR: &str = "/output/container";
pub const DEFAULT_VOLUME_LABEL: &str = "Custom Neon";
pub const DEFAULT_ROOTFS_IMAGE: &str = "casper/filesystem.squashfs";
pub const DEFAULT_PACKAGE_MANIFEST: &str = "casper/filesystem.manifest";

/// Immutable configuration for one build run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Where the base image is downloaded from.
    pub iso_url: String,
    /// Root for the cached image, the working trees and the final image.
    pub output_dir: PathBuf,
    /// Root for `dependencies.yml`, `setup.yml` and the `files/` asset tree.
    pub project_dir: PathBuf,
    /// ISO volume label of the assembled image.
    pub volume_label: String,
    /// Options for rebuilding the compressed root filesystem.
    pub squashfs: SquashfsOptions,
    /// Compressed root filesystem, relative to the extracted image tree.
    pub rootfs_image: PathBuf,
    /// Installed-package manifest, relative to the extracted image tree.
    pub package_manifest: PathBuf,
    /// Treat an unreadable or invalid declarative file as fatal.
    pub strict_config: bool,
    /// Check host tools and privileges before the first stage.
    pub preflight: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            iso_url: DEFAULT_ISO_URL.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            project_dir: PathBuf::from("."),
            volume_label: DEFAULT_VOLUME_LABEL.to_string(),
            squashfs: SquashfsOptions::default(),
            rootfs_image: PathBuf::from(DEFAULT_ROOTFS_IMAGE),
            package_manifest: PathBuf::from(DEFAULT_PACKAGE_MANIFEST),
            strict_config: false,
            preflight: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuildConfigToml {
    iso_url: Option<String>,
    output_dir: Option<String>,
    project_dir: Option<String>,
    volume_label: Option<String>,
    rootfs_image: Option<String>,
    package_manifest: Option<String>,
    strict_config: Option<bool>,
    preflight: Option<bool>,
    squashfs: Option<SquashfsToml>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SquashfsToml {
    compression: Option<String>,
    block_size: Option<String>,
    xattrs: Option<bool>,
}

impl BuildConfig {
    /// Load from a TOML file. Relative `output_dir`/`project_dir` values are
    /// resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading build config '{}'", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&raw, base)
            .with_context(|| format!("parsing build config '{}'", path.display()))
    }

    /// Parse TOML; every key is optional and falls back to [`BuildConfig::default`].
    pub fn from_toml_str(raw: &str, base: &Path) -> Result<Self> {
        let parsed: BuildConfigToml = toml::from_str(raw)?;
        let mut config = Self::default();

        if let Some(url) = parsed.iso_url {
            config.iso_url = url.trim().to_string();
        }
        if let Some(dir) = parsed.output_dir {
            config.output_dir = resolve_path(base, dir.trim());
        }
        if let Some(dir) = parsed.project_dir {
            config.project_dir = resolve_path(base, dir.trim());
        }
        if let Some(label) = parsed.volume_label {
            config.volume_label = label;
        }
        if let Some(image) = parsed.rootfs_image {
            config.rootfs_image = PathBuf::from(image.trim());
        }
        if let Some(manifest) = parsed.package_manifest {
            config.package_manifest = PathBuf::from(manifest.trim());
        }
        if let Some(strict) = parsed.strict_config {
            config.strict_config = strict;
        }
        if let Some(preflight) = parsed.preflight {
            config.preflight = preflight;
        }
        if let Some(squashfs) = parsed.squashfs {
            if let Some(compression) = squashfs.compression {
                config.squashfs.compression = compression;
            }
            if let Some(block_size) = squashfs.block_size {
                config.squashfs.block_size = block_size;
            }
            if let Some(xattrs) = squashfs.xattrs {
                config.squashfs.xattrs = xattrs;
            }
        }

        Ok(config)
    }
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

/// Every filesystem location a run touches. Created once, read-only after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    /// Cached base image (`prebuild.iso`).
    pub cache_image: PathBuf,
    /// Final assembled image (`build.iso`).
    pub output_image: PathBuf,
    /// Writable copy of the base image tree.
    pub extract_dir: PathBuf,
    /// Mutable root: the exploded compressed root filesystem.
    pub rootfs_dir: PathBuf,
    /// Loop mount point for the base image.
    pub mount_dir: PathBuf,
    /// Compressed root filesystem inside `extract_dir`.
    pub rootfs_image: PathBuf,
    /// Package manifest inside `extract_dir`.
    pub package_manifest: PathBuf,
    pub project_dir: PathBuf,
    pub dependencies_file: PathBuf,
    pub setup_file: PathBuf,
    /// Asset root that overlay source names resolve against.
    pub assets_dir: PathBuf,
    pub overlay_manifest: PathBuf,
}

impl BuildContext {
    pub fn new(config: &BuildConfig) -> Self {
        let out = &config.output_dir;
        let extract_dir = out.join("iso-extract");
        let assets_dir = config.project_dir.join("files");
        Self {
            cache_image: out.join("prebuild.iso"),
            output_image: out.join("build.iso"),
            rootfs_dir: out.join("squashfs-root"),
            mount_dir: out.join("iso-mount"),
            rootfs_image: extract_dir.join(&config.rootfs_image),
            package_manifest: extract_dir.join(&config.package_manifest),
            extract_dir,
            project_dir: config.project_dir.clone(),
            dependencies_file: config.project_dir.join("dependencies.yml"),
            setup_file: config.project_dir.join("setup.yml"),
            overlay_manifest: assets_dir.join("paths.json"),
            assets_dir,
        }
    }

    /// Resolve a project-relative path (legacy overlay sources).
    pub fn project_path(&self, path: &str) -> PathBuf {
        resolve_path(&self.project_dir, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = BuildConfig::default();
        let ctx = BuildContext::new(&config);

        assert_eq!(ctx.cache_image, PathBuf::from("/output/container/prebuild.iso"));
        assert_eq!(ctx.output_image, PathBuf::from("/output/container/build.iso"));
        assert_eq!(
            ctx.rootfs_image,
            PathBuf::from("/output/container/iso-extract/casper/filesystem.squashfs")
        );
        assert_eq!(
            ctx.package_manifest,
            PathBuf::from("/output/container/iso-extract/casper/filesystem.manifest")
        );
        assert_eq!(ctx.overlay_manifest, PathBuf::from("./files/paths.json"));
    }

    #[test]
    fn test_from_toml_overrides_and_resolves_relative_dirs() {
        let raw = r#"
            iso_url = "https://example.invalid/base.iso"
            output_dir = "out"
            project_dir = "/srv/project"
            volume_label = "My Build"
            strict_config = true

            [squashfs]
            compression = "zstd"
        "#;
        let config = BuildConfig::from_toml_str(raw, Path::new("/etc/remaster")).unwrap();

        assert_eq!(config.iso_url, "https://example.invalid/base.iso");
        assert_eq!(config.output_dir, PathBuf::from("/etc/remaster/out"));
        assert_eq!(config.project_dir, PathBuf::from("/srv/project"));
        assert_eq!(config.volume_label, "My Build");
        assert!(config.strict_config);
        assert!(config.preflight);
        assert_eq!(config.squashfs.compression, "zstd");
        assert_eq!(config.squashfs.block_size, "1M");
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        let result = BuildConfig::from_toml_str("iso_path = \"x\"\n", Path::new("."));
        assert!(result.is_err());
    }

    #[test]
    fn test_project_path_keeps_absolute() {
        let config = BuildConfig {
            project_dir: PathBuf::from("/srv/project"),
            ..Default::default()
        };
        let ctx = BuildContext::new(&config);

        assert_eq!(ctx.project_path("files/a"), PathBuf::from("/srv/project/files/a"));
        assert_eq!(ctx.project_path("/opt/a"), PathBuf::from("/opt/a"));
    }
}
