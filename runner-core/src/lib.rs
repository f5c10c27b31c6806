//! Fail-fast changeset runner for a fleet of MongoDB databases.
//!
//! Resolves one versioned changeset file, filters a requested database list
//! against the context allow-list, then drives an external migration tool
//! once per database, stopping at the first failure.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use runner_core::config::{CliOverrides, RunnerConfig};
//! use runner_core::invocation::Invocation;
//! use runner_core::Runner;
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunnerConfig::load(None, &CliOverrides::default())?;
//! let runner = Runner::new(config);
//! let invocation = Invocation::parse(&["update", "orders,billing"])?;
//! let report = runner.run(&invocation)?;
//! println!("Updated {} database(s)", report.succeeded);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`config`] - Configuration loading (TOML, env vars, CLI overrides)
//! - [`invocation`] - Positional argument validation
//! - [`locator`] - Changeset discovery and version selection
//! - [`selector`] - Database filtering against the context mapping
//! - [`endpoint`] - `${key}` connection template rendering
//! - [`tool`] - External migration tool invocation
//! - [`run`] - Planning and the fail-fast execution loop
//! - [`generate`] - Mongo shell script to changeset conversion
//! - [`error`] - Error types

pub mod config;
pub mod endpoint;
pub mod error;
pub mod generate;
pub mod invocation;
pub mod locator;
pub mod run;
pub mod selector;
pub mod tool;

use config::RunnerConfig;
use error::Result;

pub use config::CliOverrides;
pub use error::RunnerError;
pub use generate::{GenerateReport, GenerateRequest};
pub use invocation::{Command, Invocation};
pub use locator::{ChangesetListing, ChangesetSource, DirectorySource};
pub use run::{RunPlan, RunReport};
pub use tool::{MigrationTool, ProcessTool};

/// Main entry point for the runner library.
///
/// Holds the immutable configuration for a process and exposes each
/// operation the CLI offers.
pub struct Runner {
    pub config: RunnerConfig,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// The configured changeset directory as a [`ChangesetSource`].
    pub fn source(&self) -> DirectorySource {
        DirectorySource::from_settings(&self.config.changesets)
    }

    /// Resolve the changeset and targets without running anything.
    pub fn plan(&self, invocation: &Invocation) -> Result<RunPlan> {
        self.plan_with(invocation, &self.source())
    }

    /// Like [`Runner::plan`] with an explicit changeset source.
    pub fn plan_with(
        &self,
        invocation: &Invocation,
        source: &dyn ChangesetSource,
    ) -> Result<RunPlan> {
        run::plan(&self.config, invocation, source)
    }

    /// Execute a plan with the given tool, stopping at the first failure.
    pub fn execute(&self, plan: &RunPlan, tool: &mut dyn MigrationTool) -> Result<RunReport> {
        run::execute(plan, tool)
    }

    /// Plan and execute with the configured external program.
    pub fn run(&self, invocation: &Invocation) -> Result<RunReport> {
        let plan = self.plan(invocation)?;
        let mut tool = ProcessTool::from_config(&self.config.tool)?;
        self.execute(&plan, &mut tool)
    }

    /// List available changesets and the default pick.
    pub fn changesets(&self) -> Result<ChangesetListing> {
        locator::list(&self.source())
    }

    /// Convert a mongo shell script into a changeset file.
    pub fn generate(&self, request: &GenerateRequest) -> Result<GenerateReport> {
        generate::generate(&self.config, request)
    }
}
