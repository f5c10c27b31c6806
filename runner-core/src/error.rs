//! Error types for runner operations.

use std::path::PathBuf;

use thiserror::Error;

/// Join a list of names for display, substituting a marker for an empty list.
pub fn format_names(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

/// All error types that runner operations can produce.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Wrong number of arguments or an unrecognized command word.
    #[error("{0}")]
    Usage(String),

    /// Invalid or missing configuration (TOML parse errors, bad template, etc.).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The changeset directory does not exist.
    #[error("Changeset directory '{}' does not exist", .0.display())]
    MissingDirectory(PathBuf),

    /// A changeset was requested by version label but no such file exists.
    #[error("Changeset '{version}' not found. Available versions: {}", format_names(.available))]
    ChangesetNotFound {
        version: String,
        available: Vec<String>,
    },

    /// The changeset directory holds no candidate files.
    #[error("No changesets available in '{}'", .0.display())]
    NoChangesets(PathBuf),

    /// The selected changeset exists but cannot be read.
    #[error("Changeset '{}' is not readable: {reason}", .path.display())]
    ChangesetUnreadable { path: PathBuf, reason: String },

    /// None of the requested databases are in the context mapping.
    #[error("No valid databases in '{requested}'. Valid databases: {}", format_names(.valid))]
    NoValidDatabases {
        requested: String,
        valid: Vec<String>,
    },

    /// A `${key}` placeholder in the connection template has no value.
    #[error("Placeholder '{key}' not found. Available placeholders: {available}")]
    PlaceholderNotFound { key: String, available: String },

    /// The migration tool could not be started at all.
    #[error("Failed to launch '{program}': {reason}")]
    ToolLaunchFailed { program: String, reason: String },

    /// The migration tool returned a non-zero exit code for a database.
    #[error("Migration tool failed for database '{database}' with exit code {exit_code}")]
    ExecutionFailed { database: String, exit_code: i32 },

    /// A script could not be converted into a changeset.
    #[error("Changeset generation failed with {error_count} error(s): {details}")]
    GenerationFailed { error_count: usize, details: String },

    /// Generation produced warnings and warnings were configured to be fatal.
    #[error("Changeset generation stopped: {warning_count} warning(s) and --fail-on-warnings is set")]
    GenerationWarnings { warning_count: usize },

    /// A filesystem I/O operation failed.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, RunnerError>`.
pub type Result<T> = std::result::Result<T, RunnerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changeset_not_found_lists_versions() {
        let err = RunnerError::ChangesetNotFound {
            version: "v9".to_string(),
            available: vec!["v1".to_string(), "v2".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Changeset 'v9' not found. Available versions: v1, v2"
        );
    }

    #[test]
    fn test_empty_list_marker() {
        let err = RunnerError::NoValidDatabases {
            requested: "x".to_string(),
            valid: vec![],
        };
        assert!(err.to_string().ends_with("Valid databases: (none)"));
    }
}
