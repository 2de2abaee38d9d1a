//! External command execution.
//!
//! Every host tool the pipeline touches (mount, rsync, unsquashfs, mksquashfs,
//! chroot, md5sum, xorriso, wget) goes through [`Cmd`], so failures all carry
//! the same shape: the caller's message, the exit code, and trimmed stderr.

use anyhow::{bail, Context, Result};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, or -1 when the process was killed by a signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

/// Builder for an external command.
///
/// ```rust,ignore
/// use iso_remaster::process::Cmd;
///
/// Cmd::new("umount")
///     .arg_path(mount_dir)
///     .error_msg("umount failed")
///     .run()?;
/// ```
#[derive(Debug, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    dir: Option<PathBuf>,
    error_msg: Option<String>,
    allow_fail: bool,
}

impl Cmd {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            dir: None,
            error_msg: None,
            allow_fail: false,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    /// Run the command from `dir` instead of the current directory.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.dir = Some(dir.to_path_buf());
        self
    }

    /// Message used as the head of the error when the command fails.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Return a non-zero exit as a normal [`CommandResult`] instead of an error.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Human-readable rendering for logs.
    pub fn display(&self) -> String {
        let mut rendered = self.program.to_string_lossy().into_owned();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&arg.to_string_lossy());
        }
        rendered
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run to completion with stdout and stderr captured.
    pub fn run(&self) -> Result<CommandResult> {
        tracing::debug!(command = %self.display(), "running");

        let output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to execute '{}'", self.program.to_string_lossy()))?;

        let result = CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() && !self.allow_fail {
            bail!(
                "{}\n  Command: {}\n  Exit code: {}\n  stderr: {}",
                self.failure_head(),
                self.display(),
                result.code(),
                result.stderr.trim()
            );
        }

        Ok(result)
    }

    /// Run with stdout/stderr inherited so the operator sees progress.
    pub fn run_interactive(&self) -> Result<()> {
        tracing::debug!(command = %self.display(), "running (interactive)");

        let status = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("failed to execute '{}'", self.program.to_string_lossy()))?;

        if !status.success() && !self.allow_fail {
            bail!(
                "{}\n  Command: {}\n  Exit code: {}",
                self.failure_head(),
                self.display(),
                status.code().unwrap_or(-1)
            );
        }

        Ok(())
    }

    fn failure_head(&self) -> String {
        self.error_msg
            .clone()
            .unwrap_or_else(|| format!("{} failed", self.program.to_string_lossy()))
    }
}

/// Fail with a clear message when a required path is missing.
pub fn ensure_exists(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        bail!("{} not found: {}", what, path.display());
    }
    Ok(())
}
