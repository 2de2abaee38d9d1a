use anyhow::{Context, Result};
use std::fs;
use std::io;
use tracing::info;

use crate::artifact::filesystem::remove_dir_if_exists;
use crate::build::context::BuildContext;

/// Stage 8: remove the working directories unless `keep` is set.
///
/// Tolerates directories that never got created; an earlier abort may have
/// left only part of the working tree behind.
pub fn run(ctx: &BuildContext, keep: bool) -> Result<()> {
    if keep {
        info!(
            extract = %ctx.extract_dir.display(),
            rootfs = %ctx.rootfs_dir.display(),
            "keeping extracted files as requested"
        );
        return Ok(());
    }

    info!("cleaning up temporary files");
    remove_dir_if_exists(&ctx.extract_dir)?;
    remove_dir_if_exists(&ctx.rootfs_dir)?;

    // Only an empty mount point is removed; anything inside means it is
    // still mounted.
    match fs::remove_dir(&ctx.mount_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e)
                .with_context(|| format!("removing mount point '{}'", ctx.mount_dir.display()))
        }
    }
    info!("cleanup complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::context::BuildConfig;
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> BuildContext {
        BuildContext::new(&BuildConfig {
            output_dir: temp.path().to_path_buf(),
            ..Default::default()
        })
    }

    #[test]
    fn test_cleanup_removes_working_dirs() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        fs::create_dir_all(ctx.extract_dir.join("casper")).unwrap();
        fs::create_dir_all(ctx.rootfs_dir.join("etc")).unwrap();
        fs::create_dir_all(&ctx.mount_dir).unwrap();
        fs::write(&ctx.cache_image, "iso").unwrap();

        run(&ctx, false).unwrap();

        assert!(!ctx.extract_dir.exists());
        assert!(!ctx.rootfs_dir.exists());
        assert!(!ctx.mount_dir.exists());
        assert!(ctx.cache_image.exists());
    }

    #[test]
    fn test_cleanup_tolerates_partial_tree() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        fs::create_dir_all(&ctx.extract_dir).unwrap();

        run(&ctx, false).unwrap();
        run(&ctx, false).unwrap();

        assert!(!ctx.extract_dir.exists());
    }

    #[test]
    fn test_keep_preserves_everything() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        fs::create_dir_all(&ctx.rootfs_dir).unwrap();

        run(&ctx, true).unwrap();

        assert!(ctx.rootfs_dir.exists());
    }
}
