//! Isolated execution against the mutable root.
//!
//! [`IsolatedExecutor`] is the one capability the install and setup stages
//! need from the host: run a script with a directory substituted as `/`.
//! [`ChrootExecutor`] is the production implementation; tests use fakes.
//!
//! [`run_script`] owns the staging protocol around it: write the script under
//! `<root>/tmp`, mark it executable, run it, and remove it again whether or
//! not it succeeded, so no build-time tooling ends up in the image.

pub mod chroot;
pub mod files;

pub use chroot::ChrootExecutor;

use anyhow::{bail, Context, Result};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory inside the mutable root where scripts are staged.
pub const SCRIPT_DIR: &str = "tmp";

/// Result of one isolated run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code; `None` when the process died from a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs a script with `root` as the filesystem root.
pub trait IsolatedExecutor {
    /// Execute `script`, an absolute path as seen from inside `root`.
    ///
    /// A non-zero exit is reported through [`ExecOutput::code`]; `Err` is
    /// reserved for failing to launch at all.
    fn run(&self, root: &Path, script: &Path) -> Result<ExecOutput>;
}

/// Stage `content` as `/tmp/<file_name>` inside `root`, run it, remove it.
///
/// Fails if the script exits non-zero; the error carries its stderr.
pub fn run_script(
    executor: &dyn IsolatedExecutor,
    root: &Path,
    file_name: &str,
    content: &str,
) -> Result<ExecOutput> {
    let host_dir = root.join(SCRIPT_DIR);
    fs::create_dir_all(&host_dir)
        .with_context(|| format!("creating script directory '{}'", host_dir.display()))?;

    let host_path = host_dir.join(file_name);
    fs::write(&host_path, content)
        .with_context(|| format!("writing script '{}'", host_path.display()))?;
    fs::set_permissions(&host_path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("marking '{}' executable", host_path.display()))?;

    let in_root = in_root_path(file_name);
    debug!(script = %in_root.display(), root = %root.display(), "running isolated script");
    let result = executor.run(root, &in_root);

    // Remove before inspecting the result so a failure never leaves it behind.
    match fs::remove_file(&host_path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("removing script '{}'", host_path.display()))
        }
    }

    let output = result.with_context(|| format!("launching isolated script '{}'", file_name))?;
    if !output.stdout.trim().is_empty() {
        debug!(script = file_name, "{}", output.stdout.trim_end());
    }
    if !output.success() {
        bail!(
            "isolated script '{}' failed\n  Exit code: {}\n  stderr: {}",
            file_name,
            output
                .code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "killed by signal".to_string()),
            output.stderr.trim()
        );
    }
    Ok(output)
}

fn in_root_path(file_name: &str) -> PathBuf {
    Path::new("/").join(SCRIPT_DIR).join(file_name)
}
