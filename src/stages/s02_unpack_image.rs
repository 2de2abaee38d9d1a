//! Stage 2: copy the base image tree into a writable working directory.
//!
//! mount (read-only loop) -> rsync -> umount -> u+w on the copy.

use anyhow::{Context, Result};
use std::fs;
use tracing::{info, warn};

use crate::artifact::filesystem::make_writable;
use crate::artifact::ImageTools;
use crate::build::context::BuildContext;
use crate::process::ensure_exists;

pub fn run(ctx: &BuildContext, tools: &dyn ImageTools) -> Result<()> {
    ensure_exists(&ctx.cache_image, "Base image")?;
    for dir in [&ctx.extract_dir, &ctx.mount_dir] {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating directory '{}'", dir.display()))?;
    }

    info!(image = %ctx.cache_image.display(), "extracting image contents");
    tools.mount_image(&ctx.cache_image, &ctx.mount_dir)?;

    let copied = tools.copy_tree(&ctx.mount_dir, &ctx.extract_dir);
    // Unmount even when the copy failed; the copy error wins if both fail.
    let unmounted = tools.unmount(&ctx.mount_dir);
    match (copied, unmounted) {
        (Err(copy_err), Err(umount_err)) => {
            warn!("unmounting after failed copy also failed: {umount_err:#}");
            return Err(copy_err);
        }
        (Err(copy_err), Ok(())) => return Err(copy_err),
        (Ok(()), Err(umount_err)) => return Err(umount_err),
        (Ok(()), Ok(())) => {}
    }

    make_writable(&ctx.extract_dir)?;
    info!(dir = %ctx.extract_dir.display(), "image extracted");
    Ok(())
}
