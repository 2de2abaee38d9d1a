//! ISO image handling: loop mounting the base image and assembling the
//! final hybrid image with `xorriso`.

use anyhow::Result;
use std::ffi::OsString;
use std::path::Path;

use crate::process::Cmd;

/// Options for assembling a bootable image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoOptions {
    /// Volume label.
    pub label: String,

    /// El Torito BIOS boot image, relative to the tree root.
    pub bios_boot_image: String,

    /// El Torito boot catalog, relative to the tree root.
    ///
    /// xorriso regenerates this file, so it is left out of checksum manifests.
    pub boot_catalog: String,

    /// EFI system partition image, relative to the tree root.
    pub efi_boot_image: String,
}

impl IsoOptions {
    /// Hybrid BIOS (isolinux) + UEFI (GRUB efi.img) layout of casper-based images.
    pub fn hybrid(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            bios_boot_image: "isolinux/isolinux.bin".to_string(),
            boot_catalog: "isolinux/boot.cat".to_string(),
            efi_boot_image: "boot/grub/efi.img".to_string(),
        }
    }
}

/// Arguments for `xorriso -as mkisofs` producing a hybrid, El Torito image.
pub fn xorriso_args(tree: &Path, output: &Path, options: &IsoOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-as", "mkisofs", "-r", "-V"].map(OsString::from).to_vec();
    args.push(OsString::from(&options.label));
    args.push(OsString::from("-o"));
    args.push(output.as_os_str().to_os_string());
    args.extend(["-J", "-l"].map(OsString::from));

    // BIOS: El Torito no-emulation boot with boot info table
    args.push(OsString::from("-b"));
    args.push(OsString::from(&options.bios_boot_image));
    args.push(OsString::from("-c"));
    args.push(OsString::from(&options.boot_catalog));
    args.extend(["-no-emul-boot", "-boot-load-size", "4", "-boot-info-table"].map(OsString::from));

    // UEFI: alternate El Torito entry, exposed as a GPT partition for USB boot
    args.extend(["-eltorito-alt-boot", "-e"].map(OsString::from));
    args.push(OsString::from(&options.efi_boot_image));
    args.extend(["-no-emul-boot", "-isohybrid-gpt-basdat"].map(OsString::from));

    args.push(tree.as_os_str().to_os_string());
    args
}

/// Run xorriso to create the bootable image.
pub fn run_xorriso(tree: &Path, output: &Path, options: &IsoOptions) -> Result<()> {
    Cmd::new("xorriso")
        .args(xorriso_args(tree, output, options))
        .error_msg("xorriso failed. Install xorriso.")
        .run_interactive()
}

/// Loop-mount `image` read-only at `mount_dir`.
pub fn mount_loop(image: &Path, mount_dir: &Path) -> Result<()> {
    Cmd::new("mount")
        .args(["-o", "loop,ro"])
        .arg_path(image)
        .arg_path(mount_dir)
        .error_msg(format!("mounting {} failed", image.display()))
        .run()?;
    Ok(())
}

pub fn unmount(mount_dir: &Path) -> Result<()> {
    Cmd::new("umount")
        .arg_path(mount_dir)
        .error_msg(format!("unmounting {} failed", mount_dir.display()))
        .run()?;
    Ok(())
}

/// Copy a tree preserving attributes (`rsync -a src/ dst/`).
pub fn rsync_tree(src: &Path, dst: &Path) -> Result<()> {
    // Trailing slashes: copy the contents, not the directory itself
    let mut src_arg = src.as_os_str().to_os_string();
    src_arg.push("/");
    let mut dst_arg = dst.as_os_str().to_os_string();
    dst_arg.push("/");

    Cmd::new("rsync")
        .arg("-a")
        .arg(src_arg)
        .arg(dst_arg)
        .error_msg("rsync failed copying image contents. Install rsync.")
        .run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xorriso_args_hybrid_layout() {
        let args = xorriso_args(
            Path::new("/work/iso-extract"),
            Path::new("/work/build.iso"),
            &IsoOptions::hybrid("Custom Neon"),
        );
        let rendered: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        let joined = rendered.join(" ");

        assert!(joined.starts_with("-as mkisofs -r -V Custom Neon -o /work/build.iso -J -l"));
        assert!(joined.contains("-b isolinux/isolinux.bin -c isolinux/boot.cat -no-emul-boot"));
        assert!(joined.contains("-boot-load-size 4 -boot-info-table"));
        assert!(joined.contains("-eltorito-alt-boot -e boot/grub/efi.img -no-emul-boot"));
        assert!(joined.contains("-isohybrid-gpt-basdat"));
        assert_eq!(rendered.last().unwrap(), "/work/iso-extract");
        // The label is a single argument even with a space in it
        assert!(rendered.iter().any(|a| a == "Custom Neon"));
    }
}
