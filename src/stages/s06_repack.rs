//! Stage 6: rebuild the compressed root filesystem and the package manifest.

use anyhow::{Context, Result};
use std::fs;
use tracing::info;

use crate::artifact::filesystem::remove_file_if_exists;
use crate::artifact::ImageTools;
use crate::build::context::BuildContext;
use crate::component::{shell, Script};
use crate::executor::{run_script, IsolatedExecutor};

/// Lists installed packages as `<name> <version>` lines.
pub const MANIFEST_QUERY: &str = r"dpkg-query -W --showformat='${Package} ${Version}\n'";

pub const SCRIPT_NAME: &str = "package_manifest.sh";

pub fn run(ctx: &BuildContext, tools: &dyn ImageTools, executor: &dyn IsolatedExecutor) -> Result<()> {
    info!(image = %ctx.rootfs_image.display(), "repacking root filesystem");
    remove_file_if_exists(&ctx.rootfs_image)?;
    tools.build_rootfs(&ctx.rootfs_dir, &ctx.rootfs_image)?;

    // Reads the package database as left by stages 4 and 5
    let script = Script::new(vec![shell(MANIFEST_QUERY)]);
    let output = run_script(executor, &ctx.rootfs_dir, SCRIPT_NAME, &script.render())
        .context("querying installed packages failed")?;
    if let Some(parent) = ctx.package_manifest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory '{}'", parent.display()))?;
    }
    fs::write(&ctx.package_manifest, &output.stdout)
        .with_context(|| format!("writing package manifest '{}'", ctx.package_manifest.display()))?;

    info!(
        packages = output.stdout.lines().count(),
        manifest = %ctx.package_manifest.display(),
        "root filesystem repacked"
    );
    Ok(())
}
