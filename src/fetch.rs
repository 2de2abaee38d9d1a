//! Base image retrieval.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::artifact::filesystem::{atomic_move, remove_file_if_exists};
use crate::process::Cmd;

/// Download transport.
pub trait Fetcher {
    /// Download `url` to `dest`, overwriting it.
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// [`Fetcher`] backed by `wget`.
#[derive(Debug, Clone, Default)]
pub struct WgetFetcher;

impl Fetcher for WgetFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        Cmd::new("wget")
            .arg("-O")
            .arg_path(dest)
            .arg(url)
            .error_msg(format!("downloading {} failed", url))
            .run_interactive()
    }
}

/// Outcome of [`fetch_base_image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    AlreadyPresent,
    Downloaded,
}

/// Make sure `cache` holds the base image, downloading it if missing.
///
/// The download lands in `<cache>.part` and is renamed into place only once
/// complete, so an aborted run never leaves a file that looks finished.
pub fn fetch_base_image(fetcher: &dyn Fetcher, cache: &Path, url: &str) -> Result<FetchOutcome> {
    if cache.is_file() {
        info!(path = %cache.display(), "base image already cached, skipping download");
        return Ok(FetchOutcome::AlreadyPresent);
    }

    if let Some(parent) = cache.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating cache directory '{}'", parent.display()))?;
    }

    let partial = partial_path(cache);
    if remove_file_if_exists(&partial)? {
        info!(path = %partial.display(), "removed stale partial download");
    }

    info!(url, "downloading base image");
    if let Err(e) = fetcher.fetch(url, &partial) {
        if let Err(cleanup) = remove_file_if_exists(&partial) {
            warn!("could not remove partial download: {cleanup:#}");
        }
        return Err(e);
    }
    atomic_move(&partial, cache)?;
    Ok(FetchOutcome::Downloaded)
}

fn partial_path(cache: &Path) -> PathBuf {
    let mut name = cache.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}
