//! Preflight checks for build validation.
//!
//! Validates that the host system has required tools and privileges before
//! building. This prevents cryptic errors halfway through a run, after the
//! base image has already been unpacked.
//!
//! # Example
//!
//! ```rust
//! use iso_remaster::preflight::{command_exists, check_required_tools};
//!
//! // Check a single command
//! if !command_exists("mksquashfs") {
//!     println!("squashfs-tools not installed");
//! }
//!
//! // Check multiple tools
//! let tools = &[("mksquashfs", "squashfs-tools"), ("xorriso", "xorriso")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::{bail, Result};
use tracing::debug;

/// Check if a command exists on the host system's `PATH`.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Required host tools for remastering an image.
///
/// Each tuple is (command_name, package_name).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("wget", "wget"),
    ("mount", "mount"),
    ("umount", "mount"),
    ("rsync", "rsync"),
    ("unsquashfs", "squashfs-tools"),
    ("mksquashfs", "squashfs-tools"),
    ("chroot", "coreutils"),
    ("md5sum", "coreutils"),
    ("xorriso", "xorriso"),
];

/// Check that specific tools are available.
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err` with list of missing tools and their packages
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let mut missing = Vec::new();

    for (tool, package) in tools {
        if !command_exists(tool) {
            missing.push((*tool, *package));
        }
    }

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

/// Loop mounts and chroot both need root.
pub fn require_root() -> Result<()> {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        bail!(
            "must run as root (effective uid is {}): mounting images and chroot require it",
            euid
        );
    }
    Ok(())
}

/// Run every host check: privileges first, then [`REQUIRED_TOOLS`].
pub fn check_host() -> Result<()> {
    require_root()?;
    check_required_tools(REQUIRED_TOOLS)?;
    debug!(tools = REQUIRED_TOOLS.len(), "preflight passed");
    Ok(())
}
