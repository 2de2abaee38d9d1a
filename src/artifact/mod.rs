//! Image artifacts and the host tools that produce them.
//!
//! - [`iso`] - loop mounting, tree copies, xorriso assembly
//! - [`squashfs`] - unsquashfs / mksquashfs wrappers
//! - [`checksum`] - `md5sum.txt` and `<image>.sha256`
//! - [`filesystem`] - permission fixups, atomic moves, directory removal
//!
//! The pipeline never calls the wrappers directly. It goes through
//! [`ImageTools`], which [`HostTools`] implements with the real binaries and
//! tests implement with in-memory fakes.

pub mod checksum;
pub mod filesystem;
pub mod iso;
pub mod squashfs;

use anyhow::Result;
use std::path::{Path, PathBuf};

pub use iso::IsoOptions;
pub use squashfs::SquashfsOptions;

/// Host operations on images and trees.
pub trait ImageTools {
    /// Mount `image` read-only at `mount_dir`.
    fn mount_image(&self, image: &Path, mount_dir: &Path) -> Result<()>;

    fn unmount(&self, mount_dir: &Path) -> Result<()>;

    /// Copy the contents of `src` into `dst`, preserving attributes.
    fn copy_tree(&self, src: &Path, dst: &Path) -> Result<()>;

    /// Unpack a root filesystem image into `dest`, which must not exist.
    fn extract_rootfs(&self, image: &Path, dest: &Path) -> Result<()>;

    /// Pack `source` into a root filesystem image at `output`.
    fn build_rootfs(&self, source: &Path, output: &Path) -> Result<()>;

    /// md5 lines (`<hash>  ./<rel>`) for `files`, relative to `tree`.
    fn md5sums(&self, tree: &Path, files: &[PathBuf]) -> Result<String>;

    /// Assemble a bootable image from `tree`.
    fn assemble_image(&self, tree: &Path, output: &Path, options: &IsoOptions) -> Result<()>;
}

/// [`ImageTools`] backed by mount, rsync, squashfs-tools, md5sum and xorriso.
#[derive(Debug, Clone, Default)]
pub struct HostTools {
    pub squashfs: SquashfsOptions,
}

impl HostTools {
    pub fn new(squashfs: SquashfsOptions) -> Self {
        Self { squashfs }
    }
}

impl ImageTools for HostTools {
    fn mount_image(&self, image: &Path, mount_dir: &Path) -> Result<()> {
        iso::mount_loop(image, mount_dir)
    }

    fn unmount(&self, mount_dir: &Path) -> Result<()> {
        iso::unmount(mount_dir)
    }

    fn copy_tree(&self, src: &Path, dst: &Path) -> Result<()> {
        iso::rsync_tree(src, dst)
    }

    fn extract_rootfs(&self, image: &Path, dest: &Path) -> Result<()> {
        squashfs::extract_squashfs(image, dest)
    }

    fn build_rootfs(&self, source: &Path, output: &Path) -> Result<()> {
        squashfs::build_squashfs(source, output, &self.squashfs)
    }

    fn md5sums(&self, tree: &Path, files: &[PathBuf]) -> Result<String> {
        checksum::md5sum_lines(tree, files)
    }

    fn assemble_image(&self, tree: &Path, output: &Path, options: &IsoOptions) -> Result<()> {
        iso::run_xorriso(tree, output, options)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording fake for [`ImageTools`].
    //!
    //! Simulates each tool with plain file operations so pipeline tests run
    //! without root or squashfs-tools.

    use super::*;
    use anyhow::bail;
    use std::cell::RefCell;
    use std::fs;

    /// Files written into the extracted root by the fake `extract_rootfs`.
    pub const FAKE_ROOTFS_FILES: &[(&str, &str)] = &[
        ("etc/hostname", "neon\n"),
        ("etc/os-release", "NAME=\"KDE neon\"\n"),
    ];

    #[derive(Default)]
    pub struct FakeTools {
        pub calls: RefCell<Vec<String>>,
        /// Directory whose contents the fake mount exposes.
        pub image_contents: PathBuf,
        pub fail_copy: bool,
        pub fail_assemble: bool,
    }

    impl FakeTools {
        pub fn new(image_contents: &Path) -> Self {
            Self {
                image_contents: image_contents.to_path_buf(),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn record(&self, call: &str) {
            self.calls.borrow_mut().push(call.to_string());
        }
    }

    fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
        for entry in walkdir::WalkDir::new(src) {
            let entry = entry?;
            let target = dst.join(entry.path().strip_prefix(src)?);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
        Ok(())
    }

    impl ImageTools for FakeTools {
        fn mount_image(&self, image: &Path, mount_dir: &Path) -> Result<()> {
            self.record("mount");
            if !image.is_file() {
                bail!("no image at {}", image.display());
            }
            fs::create_dir_all(mount_dir)?;
            copy_dir(&self.image_contents, mount_dir)
        }

        fn unmount(&self, mount_dir: &Path) -> Result<()> {
            self.record("unmount");
            fs::remove_dir_all(mount_dir)?;
            fs::create_dir_all(mount_dir)?;
            Ok(())
        }

        fn copy_tree(&self, src: &Path, dst: &Path) -> Result<()> {
            self.record("copy");
            if self.fail_copy {
                bail!("rsync: simulated failure");
            }
            copy_dir(src, dst)
        }

        fn extract_rootfs(&self, image: &Path, dest: &Path) -> Result<()> {
            self.record("extract");
            if !image.is_file() {
                bail!("no rootfs image at {}", image.display());
            }
            for (rel, content) in FAKE_ROOTFS_FILES {
                let path = dest.join(rel);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, content)?;
            }
            Ok(())
        }

        fn build_rootfs(&self, source: &Path, output: &Path) -> Result<()> {
            self.record("squash");
            if output.exists() {
                bail!("{} already exists", output.display());
            }
            fs::write(output, format!("squashed {}", source.display()))?;
            Ok(())
        }

        fn md5sums(&self, _tree: &Path, files: &[PathBuf]) -> Result<String> {
            self.record("md5sums");
            Ok(files
                .iter()
                .map(|f| format!("00000000000000000000000000000000  ./{}\n", f.display()))
                .collect())
        }

        fn assemble_image(&self, tree: &Path, output: &Path, options: &IsoOptions) -> Result<()> {
            self.record("assemble");
            if self.fail_assemble {
                bail!("xorriso: simulated failure");
            }
            fs::write(output, format!("{} from {}", options.label, tree.display()))?;
            Ok(())
        }
    }
}
