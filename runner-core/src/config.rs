//! Configuration loading and resolution.
//!
//! Supports TOML config files, environment variables, and CLI overrides
//! with a defined priority order (CLI > env > TOML > defaults). The result
//! is built once at process start and treated as immutable for the run.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Result, RunnerError};

/// Apply an optional owned value directly to a target field.
macro_rules! apply_option {
    ($opt:expr => $target:expr) => {
        if let Some(v) = $opt {
            $target = v;
        }
    };
}

/// Apply an optional owned value, wrapping it in `Some()`.
macro_rules! apply_option_some {
    ($opt:expr => $target:expr) => {
        if let Some(v) = $opt {
            $target = Some(v);
        }
    };
}

/// Clone a borrowed optional value directly to a target field.
macro_rules! apply_option_clone {
    ($opt:expr => $target:expr) => {
        if let Some(ref v) = $opt {
            $target = v.clone();
        }
    };
}

/// Default connection template for the managed MongoDB cluster.
pub const DEFAULT_CONNECTION_TEMPLATE: &str =
    "mongodb+srv://${user}:${password}@${host}/${database}?retryWrites=true&w=majority&authSource=admin";

/// Fixed mapping from database name to the Liquibase context label used for it.
///
/// Names are listed in lexicographic order when reported back to the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextMap(BTreeMap<String, String>);

impl ContextMap {
    /// Build a mapping from `(database, context)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Context label for a database, if the database is known.
    pub fn get(&self, database: &str) -> Option<&str> {
        self.0.get(database).map(String::as_str)
    }

    /// All known database names.
    pub fn names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn insert(&mut self, database: String, context: String) {
        self.0.insert(database, context);
    }
}

/// Top-level configuration for a runner invocation.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// Where changeset files live and how they are named.
    pub changesets: ChangesetSettings,
    /// Connection endpoint template and the credentials substituted into it.
    pub connection: ConnectionConfig,
    /// External migration tool invocation settings.
    pub tool: ToolConfig,
    /// Database name → context label allow-list.
    pub contexts: ContextMap,
    /// Script-to-changeset generation settings.
    pub generate: GenerateConfig,
}

/// Changeset directory settings.
#[derive(Debug, Clone)]
pub struct ChangesetSettings {
    /// Directory scanned for changeset files.
    pub directory: PathBuf,
    /// File extension (without the dot) identifying changeset files.
    pub extension: String,
}

impl Default for ChangesetSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("json_changesets"),
            extension: "xml".to_string(),
        }
    }
}

/// Connection endpoint configuration.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Endpoint template with `${key}` placeholders; `${database}` is filled per target.
    pub template: String,
    /// Cluster host substituted for `${host}`.
    pub host: Option<String>,
    /// User substituted for `${user}`.
    pub user: Option<String>,
    /// Password substituted for `${password}`.
    pub password: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            template: DEFAULT_CONNECTION_TEMPLATE.to_string(),
            host: None,
            user: None,
            password: None,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("template", &self.template)
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// External migration tool settings.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Program to execute (looked up on `PATH` when not a path).
    pub command: String,
    /// Arguments placed before the generated ones (e.g. `-jar liquibase.jar`).
    pub args: Vec<String>,
    /// Search path handed to the tool as `--classpath`.
    pub classpath: Vec<PathBuf>,
    /// Value of the tool's `--logLevel` option.
    pub log_level: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            command: "liquibase".to_string(),
            args: Vec::new(),
            classpath: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

impl ToolConfig {
    /// Join the classpath entries with the platform separator, if any are set.
    pub fn joined_classpath(&self) -> Result<Option<OsString>> {
        if self.classpath.is_empty() {
            return Ok(None);
        }
        std::env::join_paths(&self.classpath)
            .map(Some)
            .map_err(|e| RunnerError::ConfigError(format!("Invalid classpath entry: {}", e)))
    }
}

/// Changeset generation settings.
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    /// Context used when a script does not declare one.
    pub default_context: String,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            default_context: "liquibase_test".to_string(),
        }
    }
}

// ── TOML deserialization structs ──

#[derive(Deserialize, Default)]
struct TomlConfig {
    changesets: Option<TomlChangesetSettings>,
    connection: Option<TomlConnectionConfig>,
    tool: Option<TomlToolConfig>,
    contexts: Option<BTreeMap<String, String>>,
    generate: Option<TomlGenerateConfig>,
}

#[derive(Deserialize, Default)]
struct TomlChangesetSettings {
    directory: Option<String>,
    extension: Option<String>,
}

#[derive(Deserialize, Default)]
struct TomlConnectionConfig {
    template: Option<String>,
    host: Option<String>,
    user: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize, Default)]
struct TomlToolConfig {
    command: Option<String>,
    args: Option<Vec<String>>,
    classpath: Option<Vec<String>>,
    log_level: Option<String>,
}

#[derive(Deserialize, Default)]
struct TomlGenerateConfig {
    default_context: Option<String>,
}

/// CLI overrides that take highest priority.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override the changeset directory.
    pub changesets_dir: Option<PathBuf>,
    /// Override the connection endpoint template.
    pub template: Option<String>,
    /// Override the migration tool program.
    pub tool_command: Option<String>,
    /// Override the tool log level.
    pub log_level: Option<String>,
}

/// File mode when group or others have any access.
#[cfg(unix)]
fn open_permissions(path: &str) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(path).ok()?.permissions().mode();
    (mode & 0o077 != 0).then_some(mode)
}

impl RunnerConfig {
    /// Load configuration with the following priority (highest wins):
    /// 1. CLI arguments
    /// 2. Environment variables
    /// 3. TOML config file
    /// 4. Built-in defaults
    pub fn load(config_path: Option<&str>, overrides: &CliOverrides) -> Result<Self> {
        let mut config = RunnerConfig::default();

        let toml_path = config_path.unwrap_or("runner.toml");
        if let Ok(content) = std::fs::read_to_string(toml_path) {
            // The file usually carries the cluster password.
            #[cfg(unix)]
            if let Some(mode) = open_permissions(toml_path) {
                log::warn!("Config file has overly permissive permissions. Consider chmod 600.; path={}, mode={:o}", toml_path, mode);
            }
            config.apply_toml_str(&content).map_err(|e| match e {
                RunnerError::ConfigError(msg) => RunnerError::ConfigError(format!(
                    "Failed to parse config file '{}': {}",
                    toml_path, msg
                )),
                other => other,
            })?;
        } else if config_path.is_some() {
            return Err(RunnerError::ConfigError(format!(
                "Config file '{}' not found",
                toml_path
            )));
        }

        config.apply_env(
            std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
        );
        config.apply_cli(overrides);
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML document and layer it over the current values.
    pub fn apply_toml_str(&mut self, content: &str) -> Result<()> {
        let toml_config: TomlConfig =
            toml::from_str(content).map_err(|e| RunnerError::ConfigError(e.to_string()))?;
        self.apply_toml(toml_config);
        Ok(())
    }

    fn apply_toml(&mut self, toml: TomlConfig) {
        if let Some(c) = toml.changesets {
            if let Some(v) = c.directory {
                self.changesets.directory = PathBuf::from(v);
            }
            if let Some(v) = c.extension {
                self.changesets.extension = normalize_extension(&v);
            }
        }

        if let Some(c) = toml.connection {
            apply_option!(c.template => self.connection.template);
            apply_option_some!(c.host => self.connection.host);
            apply_option_some!(c.user => self.connection.user);
            apply_option_some!(c.password => self.connection.password);
        }

        if let Some(t) = toml.tool {
            apply_option!(t.command => self.tool.command);
            apply_option!(t.args => self.tool.args);
            if let Some(v) = t.classpath {
                self.tool.classpath = v.into_iter().map(PathBuf::from).collect();
            }
            apply_option!(t.log_level => self.tool.log_level);
        }

        if let Some(contexts) = toml.contexts {
            for (database, context) in contexts {
                self.contexts.insert(database, context);
            }
        }

        if let Some(g) = toml.generate {
            apply_option!(g.default_context => self.generate.default_context);
        }
    }

    /// Layer `RUNNER_*` variables from the given environment over the current values.
    pub fn apply_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "RUNNER_CHANGESETS_DIR" => self.changesets.directory = PathBuf::from(value),
                "RUNNER_CONNECTION_TEMPLATE" => self.connection.template = value,
                "RUNNER_CONNECTION_HOST" => self.connection.host = Some(value),
                "RUNNER_CONNECTION_USER" => self.connection.user = Some(value),
                "RUNNER_CONNECTION_PASSWORD" => self.connection.password = Some(value),
                "RUNNER_TOOL_COMMAND" => self.tool.command = value,
                "RUNNER_TOOL_CLASSPATH" => {
                    self.tool.classpath = std::env::split_paths(&value).collect();
                }
                "RUNNER_LOG_LEVEL" => self.tool.log_level = value,
                _ => {
                    if let Some(database) = key.strip_prefix("RUNNER_CONTEXT_") {
                        if !database.is_empty() {
                            self.contexts.insert(database.to_lowercase(), value);
                        }
                    }
                }
            }
        }
    }

    fn apply_cli(&mut self, overrides: &CliOverrides) {
        apply_option_clone!(overrides.changesets_dir => self.changesets.directory);
        apply_option_clone!(overrides.template => self.connection.template);
        apply_option_clone!(overrides.tool_command => self.tool.command);
        apply_option_clone!(overrides.log_level => self.tool.log_level);
    }

    fn validate(&self) -> Result<()> {
        if !self.connection.template.contains("${database}") {
            return Err(RunnerError::ConfigError(format!(
                "Connection template must contain ${{database}}: {}",
                self.connection.template
            )));
        }
        if self.tool.command.trim().is_empty() {
            return Err(RunnerError::ConfigError(
                "Migration tool command is empty".to_string(),
            ));
        }
        if self.contexts.is_empty() {
            log::warn!("No database contexts configured; every database name will be rejected");
        }
        Ok(())
    }
}

/// Strip a leading dot from a configured extension.
fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_string()
}
