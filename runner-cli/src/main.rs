//! CLI entry point for the changeset runner.
//! Provides clap-based argument handling for the positional run form and
//! the `generate` / `changesets` subcommands, plus exit code mapping
//! based on error type.

mod output;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;

use runner_core::config::{CliOverrides, RunnerConfig};
use runner_core::error::RunnerError;
use runner_core::{GenerateRequest, Invocation, Runner};

/// Top-level CLI definition with global flags and subcommand dispatch.
#[derive(Parser, Debug)]
#[command(
    name = "runner",
    about = "Apply one Liquibase changeset to a list of MongoDB databases, stopping at the first failure",
    override_usage = "runner [OPTIONS] <status|update> <database1[,database2,...]> [version]\n       runner [OPTIONS] <COMMAND>",
    version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_HASH"), " ", env!("BUILD_TIME"), ")"
    ),
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Config file path
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<String>,

    /// Changeset directory (overrides config)
    #[arg(long, value_name = "DIR", global = true)]
    changesets: Option<PathBuf>,

    /// Connection template with ${database} (overrides config)
    #[arg(long, value_name = "TEMPLATE", global = true)]
    url_template: Option<String>,

    /// Migration tool program (overrides config)
    #[arg(long, value_name = "PROGRAM", global = true)]
    tool: Option<String>,

    /// Log level passed to the migration tool (overrides config)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Show the per-database plan without invoking the tool
    #[arg(long, global = true)]
    dry_run: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Enable verbose/debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// <status|update> <database1[,database2,...]> [version]
    #[arg(value_name = "ARGS")]
    args: Vec<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Subcommands besides the positional run form.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a mongo shell script into a changeset file
    Generate {
        /// Script to convert
        #[arg(long, value_name = "PATH")]
        js_file: PathBuf,

        /// Version label; the file is written as <label>.xml
        #[arg(long, value_name = "LABEL")]
        version: String,

        /// Author recorded on every changeSet
        #[arg(long, value_name = "NAME")]
        author: String,

        /// Treat validation warnings as errors
        #[arg(long)]
        fail_on_warnings: bool,
    },

    /// List available changesets and the default pick
    Changesets,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    // Set up logging (suppress when JSON output is requested)
    let filter = if cli.json {
        "error"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    env_logger::Builder::new()
        .parse_env(env_logger::Env::default().default_filter_or(filter))
        .format_target(false)
        .format_timestamp(None)
        .init();

    if let Err(e) = run(cli) {
        print_error(&e);
        process::exit(exit_code(&e));
    }
}

/// Map error types to process exit codes.
///
/// A failed tool run exits with the tool's own code.
fn exit_code(error: &RunnerError) -> i32 {
    match error {
        RunnerError::ExecutionFailed { exit_code, .. } => *exit_code,
        RunnerError::ToolLaunchFailed { .. } => 127,
        _ => 1,
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => log::error!("Failed to serialize output: {}", e),
    }
}

fn load_config(cli: &Cli) -> Result<RunnerConfig, RunnerError> {
    let overrides = CliOverrides {
        changesets_dir: cli.changesets.clone(),
        template: cli.url_template.clone(),
        tool_command: cli.tool.clone(),
        log_level: cli.log_level.clone(),
    };
    RunnerConfig::load(cli.config.as_deref(), &overrides)
}

/// Validate arguments, build configuration and dispatch.
fn run(cli: Cli) -> Result<(), RunnerError> {
    let json_output = cli.json;

    if let Some(command) = &cli.command {
        let runner = Runner::new(load_config(&cli)?);
        match command {
            Commands::Generate {
                js_file,
                version,
                author,
                fail_on_warnings,
            } => {
                let report = runner.generate(&GenerateRequest {
                    script: js_file.clone(),
                    version: version.clone(),
                    author: author.clone(),
                    fail_on_warnings: *fail_on_warnings,
                })?;
                if json_output {
                    print_json(&report);
                } else {
                    output::print_generate_report(&report);
                }
            }
            Commands::Changesets => {
                let listing = runner.changesets()?;
                if json_output {
                    print_json(&listing);
                } else {
                    output::print_changeset_list(&listing);
                }
            }
        }
        return Ok(());
    }

    // Positional form: reject bad arguments before touching the filesystem.
    let invocation = Invocation::parse(&cli.args)?;
    let runner = Runner::new(load_config(&cli)?);

    if cli.dry_run {
        let plan = runner.plan(&invocation)?;
        if json_output {
            print_json(&plan);
        } else {
            output::print_plan(&plan);
        }
        return Ok(());
    }

    let report = runner.run(&invocation)?;
    if json_output {
        print_json(&report);
    } else {
        output::print_run_summary(&report);
    }

    match report.failure {
        Some(failure) => Err(RunnerError::ExecutionFailed {
            database: failure.database,
            exit_code: failure.exit_code,
        }),
        None => Ok(()),
    }
}

/// Print a formatted error message with actionable hints to stderr.
fn print_error(error: &RunnerError) {
    eprintln!("{} {}", "ERROR:".red().bold(), error);

    match error {
        RunnerError::ConfigError(_) => {
            eprintln!(
                "{}",
                "Hint: Check your runner.toml or the RUNNER_* environment variables.".dimmed()
            );
        }
        RunnerError::MissingDirectory(_) | RunnerError::NoChangesets(_) => {
            eprintln!(
                "{}",
                "Hint: Pass --changesets <DIR> or set [changesets] directory in runner.toml."
                    .dimmed()
            );
        }
        RunnerError::ChangesetNotFound { .. } => {
            eprintln!(
                "{}",
                "Hint: Run 'runner changesets' to list versions, or omit the version to use the newest file."
                    .dimmed()
            );
        }
        RunnerError::NoValidDatabases { .. } => {
            eprintln!(
                "{}",
                "Hint: Add the database to [contexts] in runner.toml or set RUNNER_CONTEXT_<NAME>."
                    .dimmed()
            );
        }
        RunnerError::PlaceholderNotFound { key, .. } => {
            eprintln!(
                "{}",
                format!(
                    "Hint: Set {key} under [connection] or RUNNER_CONNECTION_{}.",
                    key.to_uppercase()
                )
                .dimmed()
            );
        }
        RunnerError::ToolLaunchFailed { .. } => {
            eprintln!(
                "{}",
                "Hint: Install the migration tool or point --tool / [tool] command at it."
                    .dimmed()
            );
        }
        RunnerError::GenerationFailed { .. } | RunnerError::GenerationWarnings { .. } => {
            eprintln!(
                "{}",
                "Hint: Fix the script and run 'runner generate' again; nothing was written."
                    .dimmed()
            );
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_run_form() {
        let cli = Cli::try_parse_from(["runner", "update", "orders,billing", "v3"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.args, vec!["update", "orders,billing", "v3"]);
        let invocation = Invocation::parse(&cli.args).unwrap();
        assert_eq!(invocation.version.as_deref(), Some("v3"));
    }

    #[test]
    fn test_global_flags_before_positionals() {
        let cli = Cli::try_parse_from([
            "runner",
            "--dry-run",
            "--json",
            "--changesets",
            "sets",
            "status",
            "orders",
        ])
        .unwrap();
        assert!(cli.dry_run);
        assert!(cli.json);
        assert_eq!(cli.changesets, Some(PathBuf::from("sets")));
        assert_eq!(cli.args, vec!["status", "orders"]);
    }

    #[test]
    fn test_missing_positionals_parse_but_fail_validation() {
        let cli = Cli::try_parse_from(["runner", "status"]).unwrap();
        let err = Invocation::parse(&cli.args).unwrap_err();
        assert_eq!(exit_code(&err), 1);
    }

    #[test]
    fn test_generate_subcommand() {
        let cli = Cli::try_parse_from([
            "runner",
            "generate",
            "--js-file",
            "seed.js",
            "--version",
            "v7",
            "--author",
            "dana",
            "--fail-on-warnings",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Generate {
                js_file,
                version,
                author,
                fail_on_warnings,
            }) => {
                assert_eq!(js_file, PathBuf::from("seed.js"));
                assert_eq!(version, "v7");
                assert_eq!(author, "dana");
                assert!(fail_on_warnings);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_generate_requires_author() {
        assert!(Cli::try_parse_from([
            "runner",
            "generate",
            "--js-file",
            "seed.js",
            "--version",
            "v7"
        ])
        .is_err());
    }

    #[test]
    fn test_changesets_subcommand() {
        let cli = Cli::try_parse_from(["runner", "changesets", "--json"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Changesets)));
        assert!(cli.json);
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(
            exit_code(&RunnerError::ExecutionFailed {
                database: "c".to_string(),
                exit_code: 4,
            }),
            4
        );
        assert_eq!(
            exit_code(&RunnerError::ToolLaunchFailed {
                program: "liquibase".to_string(),
                reason: "not found".to_string(),
            }),
            127
        );
        assert_eq!(exit_code(&RunnerError::NoChangesets(PathBuf::from("x"))), 1);
        assert_eq!(exit_code(&RunnerError::Usage("bad".to_string())), 1);
    }
}
