//! Positional argument validation: `<command> <databases> [version]`.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Result, RunnerError};

/// Usage line shown whenever the positional arguments are rejected.
pub const USAGE: &str = "Usage: runner <status|update> <database1[,database2,...]> [version]";

/// Migration verb passed through to the external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Report which changesets have not yet been applied.
    Status,
    /// Apply pending changesets.
    Update,
}

impl Command {
    /// The verb as the migration tool expects it on its command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Status => "status",
            Command::Update => "update",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = RunnerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "status" => Ok(Command::Status),
            "update" => Ok(Command::Update),
            _ => Err(RunnerError::Usage(format!(
                "Invalid command '{}'. Valid commands: status, update\n{}",
                s, USAGE
            ))),
        }
    }
}

/// Validated positional arguments for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: Command,
    /// Raw comma-separated database list, filtered later by the selector.
    pub databases: String,
    /// Explicit changeset version label; `None` selects the newest file.
    pub version: Option<String>,
}

impl Invocation {
    /// Validate raw positional tokens.
    ///
    /// Requires at least two tokens and a recognized command as the first.
    /// Tokens after the optional version are ignored. Pure: touches nothing
    /// outside its arguments.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self> {
        if tokens.len() < 2 {
            return Err(RunnerError::Usage(format!(
                "Expected at least 2 arguments, got {}\n{}",
                tokens.len(),
                USAGE
            )));
        }

        let command: Command = tokens[0].as_ref().parse()?;
        let version = tokens
            .get(2)
            .map(|v| v.as_ref().trim().to_string())
            .filter(|v| !v.is_empty());

        Ok(Invocation {
            command,
            databases: tokens[1].as_ref().to_string(),
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_with_version() {
        let inv = Invocation::parse(&["status", "orders,billing", "v3"]).unwrap();
        assert_eq!(inv.command, Command::Status);
        assert_eq!(inv.databases, "orders,billing");
        assert_eq!(inv.version.as_deref(), Some("v3"));
    }

    #[test]
    fn test_parse_update_without_version() {
        let inv = Invocation::parse(&["update", "orders"]).unwrap();
        assert_eq!(inv.command, Command::Update);
        assert!(inv.version.is_none());
    }

    #[test]
    fn test_too_few_tokens() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            Invocation::parse(&empty),
            Err(RunnerError::Usage(_))
        ));
        assert!(matches!(
            Invocation::parse(&["status"]),
            Err(RunnerError::Usage(_))
        ));
    }

    #[test]
    fn test_unknown_command() {
        for bad in ["rollback", "STATUS", "", "updates"] {
            let err = Invocation::parse(&[bad, "orders"]).unwrap_err();
            assert!(matches!(err, RunnerError::Usage(_)), "{bad}");
            assert!(err.to_string().contains(USAGE));
        }
    }

    #[test]
    fn test_blank_version_is_none() {
        let inv = Invocation::parse(&["update", "orders", "  "]).unwrap();
        assert!(inv.version.is_none());
    }

    #[test]
    fn test_command_display_roundtrip() {
        assert_eq!(Command::Status.to_string(), "status");
        assert_eq!("update".parse::<Command>().unwrap(), Command::Update);
    }
}
