//! Declarative build inputs.
//!
//! - [`dependencies`] - `dependencies.yml`: repositories, keys and packages
//! - [`setup`] - `setup.yml`: host name, legacy file copies, commands
//! - [`overlay`] - `files/paths.json`: asset name to in-image destination
//!
//! All three files are optional. A missing file means "nothing of that kind".
//! A file that cannot be read or parsed is reported loudly and replaced by
//! the empty document, unless the build runs with `strict_config`, in which
//! case it is fatal. Required artifacts (the base image, the embedded root
//! filesystem) are never tolerated this way.

pub mod dependencies;
pub mod overlay;
pub mod setup;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub use dependencies::{DependencySpec, SnapPackage};
pub use overlay::{OverlayEntry, OverlayManifest, PathMapping};
pub use setup::{Configurations, FileEntry, FileMode, SetupCommand, SetupSpec, DEFAULT_PRIORITY};

/// Why a declarative file could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid {format} in '{}': {message}", .path.display())]
    Parse {
        path: PathBuf,
        format: Format,
        message: String,
    },
}

/// Serialization format of a declarative file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Format::Yaml => write!(f, "YAML"),
            Format::Json => write!(f, "JSON"),
        }
    }
}

/// Parse a document. Empty (or whitespace-only) input is the default value.
pub fn parse_document<T>(raw: &str, format: Format, path: &Path) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    if raw.trim().is_empty() {
        return Ok(T::default());
    }

    let parsed = match format {
        Format::Yaml => serde_yaml::from_str(raw).map_err(|e| e.to_string()),
        Format::Json => serde_json::from_str(raw).map_err(|e| e.to_string()),
    };

    parsed.map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        format,
        message,
    })
}

/// Read and parse a document. `Ok(None)` means the file does not exist.
pub fn read_document<T>(path: &Path, format: Format) -> Result<Option<T>, ConfigError>
where
    T: DeserializeOwned + Default,
{
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    parse_document(&raw, format, path).map(Some)
}

/// Load a declarative file, falling back to the empty document.
///
/// `what` names the file in log lines ("dependency spec", "setup spec").
pub fn load_or_empty<T>(path: &Path, format: Format, what: &str, strict: bool) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    match read_document(path, format) {
        Ok(Some(doc)) => {
            info!(path = %path.display(), "loaded {what}");
            Ok(doc)
        }
        Ok(None) => {
            info!(path = %path.display(), "no {what} found; nothing to apply");
            Ok(T::default())
        }
        Err(e) if strict => Err(anyhow::Error::new(e).context(format!("loading {what}"))),
        Err(e) => {
            warn!("{e}");
            warn!(
                path = %path.display(),
                "falling back to an empty {what}; none of its operations will run"
            );
            Ok(T::default())
        }
    }
}

/// `key:` with no value in YAML means the same as leaving the key out.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
