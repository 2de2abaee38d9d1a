//! `setup.yml` schema.
//!
//! ```yaml
//! configurations:
//!   hostname: mybuild
//! files:
//!   - source: files/motd
//!     destination: /etc/motd
//!     permissions: "644"
//! commands:
//!   - name: touch-marker
//!     description: Leave a marker behind
//!     command: touch /opt/marker
//!     priority: 10
//! ```

use serde::Deserialize;
use std::fmt;

use super::nullable;

/// Priority of a command that does not declare one.
pub const DEFAULT_PRIORITY: i64 = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetupSpec {
    #[serde(default, deserialize_with = "nullable")]
    pub configurations: Configurations,
    /// Legacy per-entry file copies.
    #[serde(default, deserialize_with = "nullable")]
    pub files: Vec<FileEntry>,
    #[serde(default, deserialize_with = "nullable")]
    pub commands: Vec<SetupCommand>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configurations {
    pub hostname: Option<String>,
}

/// Legacy overlay entry: copy `source` (project-relative) to `destination`
/// (absolute inside the image).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileEntry {
    pub source: String,
    pub destination: String,
    pub permissions: Option<FileMode>,
}

/// A command run inside the isolated environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetupCommand {
    pub name: String,
    pub description: Option<String>,
    pub command: String,
    #[serde(default = "default_priority")]
    pub priority: i64,
}

fn default_priority() -> i64 {
    DEFAULT_PRIORITY
}

impl SetupSpec {
    /// Commands in execution order: ascending priority, ties in declaration order.
    pub fn ordered_commands(&self) -> Vec<&SetupCommand> {
        let mut commands: Vec<&SetupCommand> = self.commands.iter().collect();
        // sort_by_key is stable
        commands.sort_by_key(|cmd| cmd.priority);
        commands
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.hostname.is_none() && self.files.is_empty() && self.commands.is_empty()
    }
}

/// Unix permission bits parsed from an octal string such as `"755"` or `"0640"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct FileMode(u32);

impl FileMode {
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl TryFrom<String> for FileMode {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl std::str::FromStr for FileMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
        if digits.is_empty() || digits.len() > 4 {
            return Err(format!(
                "permissions '{raw}' must be 1 to 4 octal digits (e.g. \"755\")"
            ));
        }
        let mode = u32::from_str_radix(digits, 8)
            .map_err(|_| format!("permissions '{raw}' is not an octal number"))?;
        Ok(FileMode(mode))
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_document, Format};
    use std::path::Path;

    fn parse(raw: &str) -> Result<SetupSpec, crate::config::ConfigError> {
        parse_document(raw, Format::Yaml, Path::new("setup.yml"))
    }

    fn command(name: &str, priority: i64) -> SetupCommand {
        SetupCommand {
            name: name.into(),
            description: None,
            command: format!("echo {name}"),
            priority,
        }
    }

    #[test]
    fn test_is_empty() {
        assert!(SetupSpec::default().is_empty());
        assert!(parse("configurations: {}\nfiles: []\ncommands: []\n").unwrap().is_empty());
        assert!(!parse("configurations: {hostname: box}\n").unwrap().is_empty());
        assert!(!parse("commands:\n  - {name: a, command: 'true'}\n").unwrap().is_empty());
    }

    #[test]
    fn test_full_document() {
        let spec = parse(
            r#"
configurations:
  hostname: mybuild
files:
  - source: files/motd
    destination: /etc/motd
    permissions: "644"
  - source: files/tool
    destination: /usr/local/bin/tool
commands:
  - name: touch-marker
    description: Leave a marker behind
    command: touch /opt/marker
    priority: 10
  - name: defaulted
    command: "true"
"#,
        )
        .unwrap();

        assert_eq!(spec.configurations.hostname.as_deref(), Some("mybuild"));
        assert_eq!(spec.files.len(), 2);
        assert_eq!(spec.files[0].permissions, Some(FileMode(0o644)));
        assert_eq!(spec.files[1].permissions, None);
        assert_eq!(spec.commands[0].priority, 10);
        assert_eq!(spec.commands[1].priority, DEFAULT_PRIORITY);
        assert_eq!(spec.commands[1].description, None);
    }

    #[test]
    fn test_ordering_is_stable_by_priority() {
        let spec = SetupSpec {
            commands: vec![
                command("thirty", 30),
                command("ten-a", 10),
                command("ten-b", 10),
                command("fifty", 50),
            ],
            ..Default::default()
        };

        let order: Vec<&str> = spec
            .ordered_commands()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(order, vec!["ten-a", "ten-b", "thirty", "fifty"]);
    }

    #[test]
    fn test_negative_priority_runs_first() {
        let spec = SetupSpec {
            commands: vec![command("late", DEFAULT_PRIORITY), command("early", -5)],
            ..Default::default()
        };
        assert_eq!(spec.ordered_commands()[0].name, "early");
    }

    #[test]
    fn test_file_mode_parsing() {
        assert_eq!("755".parse::<FileMode>().unwrap().bits(), 0o755);
        assert_eq!("0640".parse::<FileMode>().unwrap().bits(), 0o640);
        assert_eq!("0o600".parse::<FileMode>().unwrap().bits(), 0o600);
        assert_eq!("4755".parse::<FileMode>().unwrap().bits(), 0o4755);
        assert!("789".parse::<FileMode>().is_err());
        assert!("rwx".parse::<FileMode>().is_err());
        assert!("".parse::<FileMode>().is_err());
        assert!("07555".parse::<FileMode>().is_err());
        assert_eq!(FileMode(0o755).to_string(), "0755");
    }

    #[test]
    fn test_invalid_permissions_reject_document() {
        let result = parse(
            "files:\n  - { source: a, destination: /a, permissions: \"9z\" }\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(parse("configuration:\n  hostname: x\n").is_err());
        assert!(parse("configurations:\n  timezone: UTC\n").is_err());
        assert!(parse("commands:\n  - { name: a, command: b, prio: 1 }\n").is_err());
    }

    #[test]
    fn test_command_requires_name_and_command() {
        assert!(parse("commands:\n  - { command: b }\n").is_err());
        assert!(parse("commands:\n  - { name: a }\n").is_err());
    }
}
