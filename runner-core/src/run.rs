//! Fail-fast execution of one changeset across a list of databases.
//!
//! Each database moves `Pending → Running → Succeeded | Failed`. The first
//! `Failed` aborts the run and every database still `Pending` is abandoned.
//! The decision after each tool invocation lives in [`complete`], which is
//! pure and needs no process to test.

use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;

use crate::config::RunnerConfig;
use crate::endpoint::{self, Endpoint};
use crate::error::Result;
use crate::invocation::{Command, Invocation};
use crate::locator::{self, ChangesetSource, ResolvedChangeset};
use crate::selector;
use crate::tool::{MigrationTool, ToolInvocation};

/// Per-database execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum TargetState {
    /// Not attempted yet (or abandoned after an earlier failure).
    Pending,
    /// The tool is running for this database.
    Running,
    /// The tool exited with code 0.
    Succeeded,
    /// The tool exited with a non-zero code.
    Failed { exit_code: i32 },
}

/// What the loop does after a database finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Move on to the next database.
    Continue,
    /// Stop the run and exit with this code.
    Abort { exit_code: i32 },
}

/// Final state of a database and the loop's next step, given the tool's exit code.
pub fn complete(exit_code: i32) -> (TargetState, NextAction) {
    if exit_code == 0 {
        (TargetState::Succeeded, NextAction::Continue)
    } else {
        (
            TargetState::Failed { exit_code },
            NextAction::Abort { exit_code },
        )
    }
}

/// One database ready to run.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedTarget {
    pub database: String,
    pub context: String,
    pub endpoint: Endpoint,
}

/// Everything resolved before the first invocation: command, changeset, targets.
#[derive(Debug, Clone, Serialize)]
pub struct RunPlan {
    pub command: Command,
    pub changeset: ResolvedChangeset,
    pub targets: Vec<PlannedTarget>,
    /// Requested names that are not in the context mapping.
    pub skipped: Vec<String>,
}

/// Resolve changeset, databases and endpoints for an invocation.
///
/// Fails before anything is executed if any of the three cannot be resolved.
pub fn plan(
    config: &RunnerConfig,
    invocation: &Invocation,
    source: &dyn ChangesetSource,
) -> Result<RunPlan> {
    let changeset = locator::locate(source, invocation.version.as_deref())?;
    let selection = selector::select(&invocation.databases, &config.contexts)?;

    let targets = selection
        .targets
        .into_iter()
        .map(|target| {
            let endpoint = endpoint::render(&config.connection, &target.database)?;
            Ok(PlannedTarget {
                database: target.database,
                context: target.context,
                endpoint,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RunPlan {
        command: invocation.command,
        changeset,
        targets,
        skipped: selection.skipped,
    })
}

/// Result for one database within a run.
#[derive(Debug, Clone, Serialize)]
pub struct TargetOutcome {
    pub database: String,
    pub context: String,
    #[serde(flatten)]
    pub state: TargetState,
    /// Wall time of the tool invocation; `None` if never attempted.
    pub execution_time_ms: Option<u128>,
}

/// The database whose failure stopped the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunFailure {
    pub database: String,
    pub exit_code: i32,
}

/// Report returned after a run, whether it completed or aborted.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub command: Command,
    pub changeset_version: String,
    pub changeset_path: PathBuf,
    /// One entry per planned database, in execution order.
    pub outcomes: Vec<TargetOutcome>,
    pub skipped: Vec<String>,
    pub succeeded: usize,
    pub failure: Option<RunFailure>,
    pub total_time_ms: u128,
}

impl RunReport {
    /// Databases never attempted because an earlier one failed.
    pub fn abandoned(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.state == TargetState::Pending)
            .map(|o| o.database.as_str())
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Run the plan's command for each target in order, stopping at the first failure.
///
/// Each invocation blocks until the tool exits. An error from the tool
/// itself (e.g. it cannot be launched) ends the run immediately.
pub fn execute(plan: &RunPlan, tool: &mut dyn MigrationTool) -> Result<RunReport> {
    let run_started = Instant::now();
    let mut outcomes: Vec<TargetOutcome> = plan
        .targets
        .iter()
        .map(|t| TargetOutcome {
            database: t.database.clone(),
            context: t.context.clone(),
            state: TargetState::Pending,
            execution_time_ms: None,
        })
        .collect();
    let mut failure = None;

    for (target, outcome) in plan.targets.iter().zip(outcomes.iter_mut()) {
        outcome.state = TargetState::Running;
        log::info!(
            "{} '{}' on {} (context {})",
            plan.command,
            plan.changeset.version(),
            target.database,
            target.context
        );
        log::debug!("Endpoint for {}: {}", target.database, target.endpoint);

        let invocation = ToolInvocation {
            database: &target.database,
            endpoint: &target.endpoint,
            changeset: plan.changeset.path(),
            context: &target.context,
            command: plan.command,
        };

        let started = Instant::now();
        let exit_code = tool.run(&invocation)?;
        outcome.execution_time_ms = Some(started.elapsed().as_millis());

        let (state, action) = complete(exit_code);
        outcome.state = state;

        match action {
            NextAction::Continue => {
                log::info!("{}: {} succeeded", target.database, plan.command);
            }
            NextAction::Abort { exit_code } => {
                log::error!(
                    "{}: {} failed with exit code {}",
                    target.database,
                    plan.command,
                    exit_code
                );
                failure = Some(RunFailure {
                    database: target.database.clone(),
                    exit_code,
                });
                break;
            }
        }
    }

    let succeeded = outcomes
        .iter()
        .filter(|o| o.state == TargetState::Succeeded)
        .count();

    Ok(RunReport {
        command: plan.command,
        changeset_version: plan.changeset.version().to_string(),
        changeset_path: plan.changeset.path().to_path_buf(),
        outcomes,
        skipped: plan.skipped.clone(),
        succeeded,
        failure,
        total_time_ms: run_started.elapsed().as_millis(),
    })
}
