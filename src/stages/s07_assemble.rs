//! Stage 7: refresh `md5sum.txt` and assemble the bootable image.
//!
//! The boot catalog is rewritten by xorriso during assembly, so hashing it
//! beforehand would record a value that no longer matches.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::artifact::checksum::{checksum_targets, write_image_checksum, MD5SUM_FILE};
use crate::artifact::{ImageTools, IsoOptions};
use crate::build::context::BuildContext;

pub fn run(ctx: &BuildContext, tools: &dyn ImageTools, options: &IsoOptions) -> Result<()> {
    let tree = &ctx.extract_dir;

    info!("updating checksums");
    let files = checksum_targets(tree, &[Path::new(&options.boot_catalog)])?;
    let lines = tools.md5sums(tree, &files)?;
    let manifest = tree.join(MD5SUM_FILE);
    fs::write(&manifest, lines)
        .with_context(|| format!("writing '{}'", manifest.display()))?;

    info!(output = %ctx.output_image.display(), label = %options.label, "creating image");
    tools.assemble_image(tree, &ctx.output_image, options)?;

    let checksum = write_image_checksum(&ctx.output_image)?;
    info!(checksum = %checksum.display(), "image created: {}", ctx.output_image.display());
    Ok(())
}
