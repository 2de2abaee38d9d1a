//! Squashfs extraction and creation (`unsquashfs` / `mksquashfs`).

use anyhow::Result;
use std::ffi::OsString;
use std::path::Path;

use crate::process::Cmd;

/// Options for building a squashfs image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SquashfsOptions {
    /// Compression algorithm (gzip, zstd, xz, lzo, lz4).
    ///
    /// Default: "xz" (what casper-based live images ship with)
    pub compression: String,

    /// Block size (e.g., "128K", "256K", "512K", "1M").
    ///
    /// Default: "1M"
    pub block_size: String,

    /// Whether to include extended attributes.
    ///
    /// Default: true (mksquashfs's own default; file capabilities live there)
    pub xattrs: bool,
}

impl Default for SquashfsOptions {
    fn default() -> Self {
        Self {
            compression: "xz".to_string(),
            block_size: "1M".to_string(),
            xattrs: true,
        }
    }
}

/// Arguments for `mksquashfs <source> <output> ...`.
pub fn mksquashfs_args(source_dir: &Path, output: &Path, options: &SquashfsOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        source_dir.into(),
        output.into(),
        "-comp".into(),
        options.compression.as_str().into(),
        "-b".into(),
        options.block_size.as_str().into(),
    ];
    if !options.xattrs {
        args.push("-no-xattrs".into());
    }
    args
}

/// Build a squashfs image from a directory.
///
/// `output` must not exist; mksquashfs would append to it otherwise.
pub fn build_squashfs(source_dir: &Path, output: &Path, options: &SquashfsOptions) -> Result<()> {
    Cmd::new("mksquashfs")
        .args(mksquashfs_args(source_dir, output, options))
        .error_msg("mksquashfs failed. Install squashfs-tools.")
        .run_interactive()
}

/// Extract a squashfs image into `destination` (which must not exist).
pub fn extract_squashfs(image: &Path, destination: &Path) -> Result<()> {
    Cmd::new("unsquashfs")
        .arg("-d")
        .arg_path(destination)
        .arg_path(image)
        .error_msg(format!("unsquashfs failed extracting {}", image.display()))
        .run()?;
    Ok(())
}
