//! `dependencies.yml` schema.
//!
//! ```yaml
//! apt_keys: [https://example.org/key.asc]
//! apt_repositories: ["ppa:example/tools"]
//! apt_packages: [curl, git]
//! snap_packages:
//!   - htop
//!   - { name: code, classic: true }
//! pip_packages: [requests]
//! ```

use serde::Deserialize;

use super::nullable;

/// Packages and package sources to install into the mutable root.
///
/// Every list is optional; an absent list means no operations of that kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencySpec {
    /// Repository signing key URLs.
    #[serde(default, deserialize_with = "nullable")]
    pub apt_keys: Vec<String>,
    /// Repository entries as accepted by `add-apt-repository`.
    #[serde(default, deserialize_with = "nullable")]
    pub apt_repositories: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub apt_packages: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub snap_packages: Vec<SnapPackage>,
    #[serde(default, deserialize_with = "nullable")]
    pub pip_packages: Vec<String>,
}

impl DependencySpec {
    pub fn is_empty(&self) -> bool {
        self.apt_keys.is_empty()
            && self.apt_repositories.is_empty()
            && self.apt_packages.is_empty()
            && self.snap_packages.is_empty()
            && self.pip_packages.is_empty()
    }
}

/// A snap is either a bare name or `{ name, classic }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SnapPackage {
    Name(String),
    Entry(SnapEntry),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapEntry {
    pub name: String,
    /// Install with `--classic` (unconfined).
    #[serde(default)]
    pub classic: bool,
}

impl SnapPackage {
    pub fn name(&self) -> &str {
        match self {
            SnapPackage::Name(name) => name,
            SnapPackage::Entry(entry) => &entry.name,
        }
    }

    pub fn classic(&self) -> bool {
        match self {
            SnapPackage::Name(_) => false,
            SnapPackage::Entry(entry) => entry.classic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_document, Format};
    use std::path::Path;

    fn parse(raw: &str) -> DependencySpec {
        parse_document(raw, Format::Yaml, Path::new("dependencies.yml")).unwrap()
    }

    #[test]
    fn test_full_document() {
        let spec = parse(
            r#"
apt_keys:
  - https://example.org/key.asc
apt_repositories:
  - "ppa:example/tools"
apt_packages: [curl, git]
snap_packages:
  - htop
  - name: code
    classic: true
  - name: jq
pip_packages: [requests]
"#,
        );

        assert_eq!(spec.apt_keys, vec!["https://example.org/key.asc"]);
        assert_eq!(spec.apt_repositories, vec!["ppa:example/tools"]);
        assert_eq!(spec.apt_packages, vec!["curl", "git"]);
        assert_eq!(spec.pip_packages, vec!["requests"]);

        let snaps: Vec<(&str, bool)> = spec
            .snap_packages
            .iter()
            .map(|s| (s.name(), s.classic()))
            .collect();
        assert_eq!(snaps, vec![("htop", false), ("code", true), ("jq", false)]);
    }

    #[test]
    fn test_absent_and_null_lists_are_empty() {
        let spec = parse("apt_packages:\npip_packages: []\n");
        assert!(spec.is_empty());
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        let result = parse_document::<DependencySpec>(
            "apt_pkgs: [curl]\n",
            Format::Yaml,
            Path::new("dependencies.yml"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_snap_entry_rejects_unknown_field() {
        let result = parse_document::<DependencySpec>(
            "snap_packages:\n  - { name: code, channel: edge }\n",
            Format::Yaml,
            Path::new("dependencies.yml"),
        );
        assert!(result.is_err());
    }
}
