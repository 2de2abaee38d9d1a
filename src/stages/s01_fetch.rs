use anyhow::{Context, Result};
use std::fs;

use crate::build::context::BuildContext;
use crate::fetch::{fetch_base_image, FetchOutcome, Fetcher};

/// Stage 1: make sure the base image is in the cache.
pub fn run(ctx: &BuildContext, fetcher: &dyn Fetcher, url: &str) -> Result<FetchOutcome> {
    let output_dir = ctx
        .output_image
        .parent()
        .context("output image has no parent directory")?;
    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating output directory '{}'", output_dir.display()))?;

    fetch_base_image(fetcher, &ctx.cache_image, url)
}
