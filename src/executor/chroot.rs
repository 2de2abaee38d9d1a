//! `chroot(8)`-backed isolated execution.

use anyhow::Result;
use std::path::Path;

use super::{ExecOutput, IsolatedExecutor};
use crate::process::Cmd;

/// Runs scripts through the host's `chroot` binary. Requires root.
///
/// Network access inside the chroot relies on `/etc/resolv.conf` having been
/// seeded into the root beforehand.
#[derive(Debug, Clone, Default)]
pub struct ChrootExecutor;

impl IsolatedExecutor for ChrootExecutor {
    fn run(&self, root: &Path, script: &Path) -> Result<ExecOutput> {
        let result = Cmd::new("chroot")
            .arg_path(root)
            .arg_path(script)
            .allow_fail()
            .run()?;

        Ok(ExecOutput {
            code: result.status.code(),
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }
}
