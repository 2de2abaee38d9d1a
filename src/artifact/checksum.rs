//! Checksum manifests.
//!
//! - `md5sum.txt` inside the image tree, which casper's integrity check reads
//! - `<image>.sha256` next to the assembled image

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::process::Cmd;

/// Name of the in-tree checksum manifest.
pub const MD5SUM_FILE: &str = "md5sum.txt";

/// md5sum is invoked on this many files at a time to stay under ARG_MAX.
const MD5SUM_BATCH: usize = 256;

/// Regular files under `tree`, relative and sorted, minus `excluded` paths
/// and the manifest itself. Symlinks are not followed and not listed.
pub fn checksum_targets(tree: &Path, excluded: &[&Path]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(tree).follow_links(false) {
        let entry =
            entry.with_context(|| format!("walking image tree '{}'", tree.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(tree)
            .with_context(|| format!("'{}' escaped the tree", entry.path().display()))?
            .to_path_buf();
        if rel == Path::new(MD5SUM_FILE) || excluded.iter().any(|ex| rel == *ex) {
            continue;
        }
        files.push(rel);
    }
    files.sort();
    Ok(files)
}

/// `md5sum ./a ./b ...` run from `tree`; returns lines of `<hash>  ./<path>`.
pub fn md5sum_lines(tree: &Path, files: &[PathBuf]) -> Result<String> {
    let mut out = String::new();
    for batch in files.chunks(MD5SUM_BATCH) {
        let result = Cmd::new("md5sum")
            .args(batch.iter().map(|f| Path::new(".").join(f)))
            .dir(tree)
            .error_msg("md5sum failed. Install coreutils.")
            .run()?;
        out.push_str(&result.stdout);
    }
    Ok(out)
}

/// Write `<image>.sha256` containing `<hex>  <file name>`.
///
/// Uses just the file name so `sha256sum -c` works from the output directory.
pub fn write_image_checksum(image: &Path) -> Result<PathBuf> {
    let hash = sha256_file(image)?;
    let filename = image
        .file_name()
        .context("image path has no file name")?
        .to_string_lossy();

    let mut checksum_path = image.as_os_str().to_os_string();
    checksum_path.push(".sha256");
    let checksum_path = PathBuf::from(checksum_path);

    fs::write(&checksum_path, format!("{}  {}\n", hash, filename))
        .with_context(|| format!("writing '{}'", checksum_path.display()))?;
    Ok(checksum_path)
}

fn sha256_file(path: &Path) -> Result<String> {
    let f = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 1024 * 1024];
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
