//! Typed script operations.
//!
//! Install and setup steps are described as [`Op`] values, not strings.
//! Ordering decisions are made on the `Vec<Op>`; only [`Script::render`]
//! turns them into shell text, right before the script is handed to the
//! isolated executor.
//!
//! # Example
//!
//! ```rust
//! use iso_remaster::component::{apt_install, apt_update, Script};
//!
//! let script = Script::new(vec![apt_update(), apt_install(["curl", "git"])]);
//! assert!(script.render().ends_with(
//!     "DEBIAN_FRONTEND=noninteractive apt-get install -y curl git\n"
//! ));
//! ```

use std::fmt;

/// Interpreter line of every generated script.
pub const SHEBANG: &str = "#!/bin/bash";
/// Abort on the first failing line.
pub const ABORT_ON_ERROR: &str = "set -e";

/// A single operation inside a generated script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    // ─────────────────────────────────────────────────────────────────────
    // APT
    // ─────────────────────────────────────────────────────────────────────
    /// Fetch a repository signing key and add it to the key store.
    AddAptKey(String),

    /// Refresh the package index.
    AptUpdate,

    /// Register a repository (`ppa:...` or a `deb ...` line).
    AddAptRepository(String),

    /// Install packages non-interactively in one invocation.
    AptInstall(Vec<String>),

    // ─────────────────────────────────────────────────────────────────────
    // Other package formats
    // ─────────────────────────────────────────────────────────────────────
    /// Install one snap; `classic` selects unconfined mode.
    SnapInstall { name: String, classic: bool },

    /// Install Python packages in one invocation.
    PipInstall(Vec<String>),

    // ─────────────────────────────────────────────────────────────────────
    // Escape hatch
    // ─────────────────────────────────────────────────────────────────────
    /// Operator-supplied shell text, emitted verbatim.
    Shell(String),
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::AddAptKey(url) => write!(f, "wget -qO- {} | apt-key add -", shell_quote(url)),
            Op::AptUpdate => write!(f, "apt-get update"),
            Op::AddAptRepository(repo) => {
                write!(f, "add-apt-repository -y {}", shell_quote(repo))
            }
            Op::AptInstall(packages) => write!(
                f,
                "DEBIAN_FRONTEND=noninteractive apt-get install -y {}",
                join_quoted(packages)
            ),
            Op::SnapInstall { name, classic } => {
                if *classic {
                    write!(f, "snap install --classic {}", shell_quote(name))
                } else {
                    write!(f, "snap install {}", shell_quote(name))
                }
            }
            Op::PipInstall(packages) => write!(f, "pip3 install {}", join_quoted(packages)),
            Op::Shell(text) => write!(f, "{}", text),
        }
    }
}

/// An ordered list of operations rendered as one abort-on-error script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    ops: Vec<Op>,
}

impl Script {
    pub fn new(ops: Vec<Op>) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Shebang, `set -e`, then one line per op.
    pub fn render(&self) -> String {
        let mut out = format!("{SHEBANG}\n{ABORT_ON_ERROR}\n");
        for op in &self.ops {
            out.push_str(&op.to_string());
            out.push('\n');
        }
        out
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper functions for readable op lists
// ─────────────────────────────────────────────────────────────────────────────

pub fn add_apt_key(url: impl Into<String>) -> Op {
    Op::AddAptKey(url.into())
}

pub fn apt_update() -> Op {
    Op::AptUpdate
}

pub fn add_apt_repository(repo: impl Into<String>) -> Op {
    Op::AddAptRepository(repo.into())
}

pub fn apt_install(packages: impl IntoIterator<Item = impl Into<String>>) -> Op {
    Op::AptInstall(packages.into_iter().map(Into::into).collect())
}

pub fn snap_install(name: impl Into<String>, classic: bool) -> Op {
    Op::SnapInstall {
        name: name.into(),
        classic,
    }
}

pub fn pip_install(packages: impl IntoIterator<Item = impl Into<String>>) -> Op {
    Op::PipInstall(packages.into_iter().map(Into::into).collect())
}

pub fn shell(text: impl Into<String>) -> Op {
    Op::Shell(text.into())
}

/// Quote a single shell word. Plain words are left alone.
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-~^".contains(c));
    if plain {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

fn join_quoted(words: &[String]) -> String {
    words
        .iter()
        .map(|w| shell_quote(w))
        .collect::<Vec<_>>()
        .join(" ")
}
