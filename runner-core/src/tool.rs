//! The external migration tool, abstracted to "run once, return an exit code".

use std::ffi::OsString;
use std::path::Path;
use std::process::{Command as ProcessCommand, ExitStatus};

use crate::config::ToolConfig;
use crate::endpoint::Endpoint;
use crate::error::{Result, RunnerError};
use crate::invocation::Command;

/// Everything the tool needs for one database.
#[derive(Debug, Clone, Copy)]
pub struct ToolInvocation<'a> {
    pub database: &'a str,
    pub endpoint: &'a Endpoint,
    pub changeset: &'a Path,
    pub context: &'a str,
    pub command: Command,
}

/// Capability to run the migration tool for a single database.
///
/// Implementations block until the tool finishes and return its exit code.
/// An `Err` means the tool could not be run at all.
pub trait MigrationTool {
    fn run(&mut self, invocation: &ToolInvocation<'_>) -> Result<i32>;
}

/// Runs the configured program as a child process, inheriting stdio.
#[derive(Debug, Clone)]
pub struct ProcessTool {
    program: String,
    leading_args: Vec<String>,
    classpath: Option<OsString>,
    log_level: String,
}

impl ProcessTool {
    pub fn from_config(config: &ToolConfig) -> Result<Self> {
        Ok(Self {
            program: config.command.clone(),
            leading_args: config.args.clone(),
            classpath: config.joined_classpath()?,
            log_level: config.log_level.clone(),
        })
    }

    /// Build the argument list; `expose` controls whether the endpoint carries credentials.
    fn build_args(&self, invocation: &ToolInvocation<'_>, expose: bool) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.leading_args.iter().map(OsString::from).collect();

        if let Some(ref classpath) = self.classpath {
            let mut arg = OsString::from("--classpath=");
            arg.push(classpath);
            args.push(arg);
        }

        let url = if expose {
            invocation.endpoint.expose()
        } else {
            invocation.endpoint.redacted()
        };
        args.push(OsString::from(format!("--url={}", url)));

        let mut changelog = OsString::from("--changeLogFile=");
        changelog.push(invocation.changeset.as_os_str());
        args.push(changelog);

        args.push(OsString::from(format!("--contexts={}", invocation.context)));
        args.push(OsString::from(format!("--logLevel={}", self.log_level)));
        args.push(OsString::from(invocation.command.as_str()));
        args
    }

    /// Printable command line with the password masked.
    pub fn describe(&self, invocation: &ToolInvocation<'_>) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(
            self.build_args(invocation, false)
                .iter()
                .map(|a| a.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl MigrationTool for ProcessTool {
    fn run(&mut self, invocation: &ToolInvocation<'_>) -> Result<i32> {
        log::debug!("Running: {}", self.describe(invocation));

        let status = ProcessCommand::new(&self.program)
            .args(self.build_args(invocation, true))
            .status()
            .map_err(|e| RunnerError::ToolLaunchFailed {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        Ok(exit_code(status))
    }
}

/// Numeric exit code of a finished child; signals map to 128 + signal on Unix.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
