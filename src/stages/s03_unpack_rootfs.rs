//! Stage 3: explode the compressed root filesystem into the mutable root and
//! seed it with the host's resolver configuration.

use anyhow::{bail, Result};
use std::path::Path;
use tracing::info;

use crate::artifact::filesystem::remove_dir_if_exists;
use crate::artifact::ImageTools;
use crate::build::context::BuildContext;
use crate::executor::files::seed_resolv_conf;

/// Host resolver configuration copied into the root.
pub const HOST_RESOLV_CONF: &str = "/etc/resolv.conf";

pub fn run(ctx: &BuildContext, tools: &dyn ImageTools, host_resolv: &Path) -> Result<()> {
    if !ctx.rootfs_image.is_file() {
        bail!(
            "root filesystem image not found: {}\n  The base image does not look like a casper live image.",
            ctx.rootfs_image.display()
        );
    }

    // unsquashfs refuses to extract into an existing directory
    if remove_dir_if_exists(&ctx.rootfs_dir)? {
        info!(dir = %ctx.rootfs_dir.display(), "removed stale root from a previous run");
    }

    info!(image = %ctx.rootfs_image.display(), "extracting root filesystem");
    tools.extract_rootfs(&ctx.rootfs_image, &ctx.rootfs_dir)?;

    info!("setting up network for the isolated environment");
    seed_resolv_conf(host_resolv, &ctx.rootfs_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::testing::FakeTools;
    use crate::build::context::BuildConfig;
    use std::fs;
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> BuildContext {
        BuildContext::new(&BuildConfig {
            output_dir: temp.path().join("out"),
            ..Default::default()
        })
    }

    #[test]
    fn test_missing_rootfs_image_is_explicit() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        let tools = FakeTools::default();

        let err = run(&ctx, &tools, Path::new(HOST_RESOLV_CONF)).unwrap_err();

        assert!(err.to_string().contains("casper/filesystem.squashfs"));
        assert!(tools.calls().is_empty());
    }

    #[test]
    fn test_extract_and_seed_resolver() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        fs::create_dir_all(ctx.rootfs_image.parent().unwrap()).unwrap();
        fs::write(&ctx.rootfs_image, "squash").unwrap();
        fs::create_dir_all(ctx.rootfs_dir.join("leftover")).unwrap();
        let host_resolv = temp.path().join("resolv.conf");
        fs::write(&host_resolv, "nameserver 192.0.2.1\n").unwrap();
        let tools = FakeTools::default();

        run(&ctx, &tools, &host_resolv).unwrap();

        assert_eq!(tools.calls(), ["extract"]);
        assert!(!ctx.rootfs_dir.join("leftover").exists());
        assert_eq!(
            fs::read_to_string(ctx.rootfs_dir.join("etc/resolv.conf")).unwrap(),
            "nameserver 192.0.2.1\n"
        );
    }
}
