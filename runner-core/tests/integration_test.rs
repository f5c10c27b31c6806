//! Integration tests for runner-core.
//!
//! Uses real temporary directories for changeset discovery and, on Unix,
//! a shell script standing in for the migration tool.
//!
//! Run with: cargo test --test integration_test

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use runner_core::config::{ContextMap, RunnerConfig};
use runner_core::error::RunnerError;
use runner_core::locator::{self, DirectorySource, SelectionMode};
use runner_core::run::TargetState;
use runner_core::tool::{MigrationTool, ToolInvocation};
use runner_core::{GenerateRequest, Invocation, Runner};

/// Create `<dir>/<name>` with the given modification time (seconds after the epoch).
fn changeset(dir: &Path, name: &str, mtime_secs: u64) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, "<databaseChangeLog/>\n").unwrap();
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(mtime_secs))
        .unwrap();
    path
}

fn test_config(changesets: &Path) -> RunnerConfig {
    let mut config = RunnerConfig::default();
    config.changesets.directory = changesets.to_path_buf();
    config.connection.template = "mongodb://localhost:27017/${database}".to_string();
    config.contexts = ContextMap::from_pairs([
        ("alpha", "alpha_ctx"),
        ("beta", "beta_ctx"),
        ("gamma", "gamma_ctx"),
        ("delta", "delta_ctx"),
    ]);
    config
}

/// Records every call; returns scripted exit codes (0 once exhausted).
struct StubTool {
    codes: Vec<i32>,
    calls: Vec<(String, String, String)>,
}

impl StubTool {
    fn new(codes: &[i32]) -> Self {
        Self {
            codes: codes.to_vec(),
            calls: Vec::new(),
        }
    }
}

impl MigrationTool for StubTool {
    fn run(&mut self, invocation: &ToolInvocation<'_>) -> runner_core::error::Result<i32> {
        self.calls.push((
            invocation.database.to_string(),
            invocation.context.to_string(),
            invocation.changeset.display().to_string(),
        ));
        Ok(self.codes.get(self.calls.len() - 1).copied().unwrap_or(0))
    }
}

// ── Discovery ──

#[test]
fn test_latest_changeset_by_modification_time() {
    let dir = tempfile::tempdir().unwrap();
    changeset(dir.path(), "v1.xml", 1_000);
    let newest = changeset(dir.path(), "v2.xml", 3_000);
    changeset(dir.path(), "v10.xml", 2_000);
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
    fs::create_dir(dir.path().join("archive.xml")).unwrap();

    let source = DirectorySource::new(dir.path(), "xml");
    let resolved = locator::locate(&source, None).unwrap();
    assert_eq!(resolved.version(), "v2");
    assert_eq!(resolved.path(), newest.as_path());
    assert_eq!(resolved.mode, SelectionMode::Latest);
}

#[test]
fn test_explicit_version_not_found_lists_others() {
    let dir = tempfile::tempdir().unwrap();
    changeset(dir.path(), "v1.xml", 1_000);
    changeset(dir.path(), "v2.xml", 2_000);

    let source = DirectorySource::new(dir.path(), "xml");
    match locator::locate(&source, Some("v9")) {
        Err(RunnerError::ChangesetNotFound { version, available }) => {
            assert_eq!(version, "v9");
            assert_eq!(available, vec!["v1", "v2"]);
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn test_explicit_version_ignores_mtime() {
    let dir = tempfile::tempdir().unwrap();
    changeset(dir.path(), "v1.xml", 1_000);
    changeset(dir.path(), "v2.xml", 2_000);

    let source = DirectorySource::new(dir.path(), "xml");
    let resolved = locator::locate(&source, Some("v1")).unwrap();
    assert_eq!(resolved.version(), "v1");
    assert_eq!(resolved.mode, SelectionMode::Explicit);
}

#[test]
fn test_missing_and_empty_directories() {
    let dir = tempfile::tempdir().unwrap();
    let missing = DirectorySource::new(dir.path().join("absent"), "xml");
    assert!(matches!(
        locator::locate(&missing, None),
        Err(RunnerError::MissingDirectory(_))
    ));

    let empty = DirectorySource::new(dir.path(), "xml");
    assert!(matches!(
        locator::locate(&empty, None),
        Err(RunnerError::NoChangesets(_))
    ));
}

#[test]
fn test_changeset_listing_marks_latest() {
    let dir = tempfile::tempdir().unwrap();
    changeset(dir.path(), "b.xml", 5_000);
    changeset(dir.path(), "a.xml", 1_000);

    let runner = Runner::new(test_config(dir.path()));
    let listing = runner.changesets().unwrap();
    let versions: Vec<&str> = listing.entries.iter().map(|e| e.version.as_str()).collect();
    assert_eq!(versions, vec!["a", "b"]);
    assert_eq!(listing.latest.as_deref(), Some("b"));
}

// ── Planning and execution with a stub tool ──

#[test]
fn test_fail_fast_stops_at_third_database() {
    let dir = tempfile::tempdir().unwrap();
    changeset(dir.path(), "v1.xml", 1_000);

    let runner = Runner::new(test_config(dir.path()));
    let invocation = Invocation::parse(&["update", "alpha,beta,gamma,delta"]).unwrap();
    let plan = runner.plan(&invocation).unwrap();

    let mut tool = StubTool::new(&[0, 0, 4]);
    let report = runner.execute(&plan, &mut tool).unwrap();

    let attempted: Vec<&str> = tool.calls.iter().map(|c| c.0.as_str()).collect();
    assert_eq!(attempted, vec!["alpha", "beta", "gamma"]);
    assert_eq!(report.succeeded, 2);
    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.database, "gamma");
    assert_eq!(failure.exit_code, 4);
    assert_eq!(report.abandoned(), vec!["delta"]);
    assert_eq!(report.outcomes[2].state, TargetState::Failed { exit_code: 4 });
}

#[test]
fn test_unknown_databases_skipped_and_contexts_passed() {
    let dir = tempfile::tempdir().unwrap();
    let path = changeset(dir.path(), "v1.xml", 1_000);

    let runner = Runner::new(test_config(dir.path()));
    let invocation = Invocation::parse(&["status", "alpha, nope ,,gamma"]).unwrap();
    let plan = runner.plan(&invocation).unwrap();
    assert_eq!(plan.skipped, vec!["nope"]);

    let mut tool = StubTool::new(&[]);
    let report = runner.execute(&plan, &mut tool).unwrap();
    assert!(report.all_succeeded());
    assert_eq!(
        tool.calls,
        vec![
            (
                "alpha".to_string(),
                "alpha_ctx".to_string(),
                path.display().to_string()
            ),
            (
                "gamma".to_string(),
                "gamma_ctx".to_string(),
                path.display().to_string()
            ),
        ]
    );
}

#[test]
fn test_no_valid_databases_never_invokes_tool() {
    let dir = tempfile::tempdir().unwrap();
    changeset(dir.path(), "v1.xml", 1_000);

    let runner = Runner::new(test_config(dir.path()));
    let invocation = Invocation::parse(&["update", "x,y"]).unwrap();
    match runner.plan(&invocation) {
        Err(RunnerError::NoValidDatabases { valid, .. }) => {
            assert_eq!(valid, vec!["alpha", "beta", "delta", "gamma"]);
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn test_missing_tool_is_launch_failure() {
    let dir = tempfile::tempdir().unwrap();
    changeset(dir.path(), "v1.xml", 1_000);

    let mut config = test_config(dir.path());
    config.tool.command = dir
        .path()
        .join("no-such-tool")
        .display()
        .to_string();
    let runner = Runner::new(config);
    let invocation = Invocation::parse(&["status", "alpha"]).unwrap();
    assert!(matches!(
        runner.run(&invocation),
        Err(RunnerError::ToolLaunchFailed { .. })
    ));
}

// ── Generated changesets feed the runner ──

#[test]
fn test_generated_changeset_becomes_latest() {
    let dir = tempfile::tempdir().unwrap();
    let sets = dir.path().join("json_changesets");
    fs::create_dir(&sets).unwrap();
    changeset(&sets, "v1.xml", 1_000);

    let script = dir.path().join("v2.js");
    fs::write(
        &script,
        "// @context: alpha_ctx\n// @author: dana\n// @description: add index\n// @version: 2\n\
         db.getCollection(\"orders\").createIndex({ \"sku\": 1 }, { \"name\": \"sku_1\" });\n",
    )
    .unwrap();

    let runner = Runner::new(test_config(&sets));
    let report = runner
        .generate(&GenerateRequest {
            script,
            version: "v2".to_string(),
            author: "dana".to_string(),
            fail_on_warnings: true,
        })
        .unwrap();
    assert_eq!(report.output_path, sets.join("v2.xml"));

    let resolved = locator::locate(&runner.source(), None).unwrap();
    assert_eq!(resolved.version(), "v2");
    let xml = fs::read_to_string(resolved.path()).unwrap();
    assert!(xml.contains("\"name\": \"sku_1\""));
}

// ── Real child processes ──

#[cfg(unix)]
mod process {
    use super::*;

    /// Shell script that logs its arguments and exits 4 for `gamma`.
    fn fake_tool(dir: &Path, log: &Path) -> PathBuf {
        let script = dir.join("fake-liquibase.sh");
        fs::write(
            &script,
            format!(
                "echo \"$@\" >> '{}'\ncase \"$*\" in *\"/gamma \"*) exit 4;; esac\nexit 0\n",
                log.display()
            ),
        )
        .unwrap();
        script
    }

    fn shell_config(sets: &Path, script: &Path) -> RunnerConfig {
        let mut config = test_config(sets);
        config.tool.command = "sh".to_string();
        config.tool.args = vec![script.display().to_string()];
        config.tool.log_level = "warning".to_string();
        config
    }

    #[test]
    fn test_child_exit_code_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let sets = dir.path().join("sets");
        fs::create_dir(&sets).unwrap();
        changeset(&sets, "v1.xml", 1_000);
        let log = dir.path().join("calls.log");
        let script = fake_tool(dir.path(), &log);

        let runner = Runner::new(shell_config(&sets, &script));
        let invocation = Invocation::parse(&["update", "alpha,beta,gamma,delta"]).unwrap();
        let report = runner.run(&invocation).unwrap();

        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.database, "gamma");
        assert_eq!(failure.exit_code, 4);

        let calls = fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = calls.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("--url=mongodb://localhost:27017/alpha"));
        assert!(lines[0].contains("--contexts=alpha_ctx"));
        assert!(lines[0].contains("--logLevel=warning"));
        assert!(lines[0].ends_with(" update"));
        assert!(lines[2].contains("/gamma "));
        assert!(!calls.contains("delta"));
    }

    #[test]
    fn test_all_succeed_with_status() {
        let dir = tempfile::tempdir().unwrap();
        let sets = dir.path().join("sets");
        fs::create_dir(&sets).unwrap();
        let path = changeset(&sets, "v1.xml", 1_000);
        let log = dir.path().join("calls.log");
        let script = fake_tool(dir.path(), &log);

        let runner = Runner::new(shell_config(&sets, &script));
        let invocation = Invocation::parse(&["status", "alpha,beta", "v1"]).unwrap();
        let report = runner.run(&invocation).unwrap();

        assert!(report.all_succeeded());
        assert_eq!(report.succeeded, 2);
        let calls = fs::read_to_string(&log).unwrap();
        assert!(calls
            .lines()
            .all(|l| l.contains(&format!("--changeLogFile={}", path.display()))
                && l.ends_with(" status")));
    }
}
