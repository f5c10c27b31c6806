//! Changeset generation from mongo shell scripts.
//!
//! A `.js` script is scanned for supported operations, validated, normalized
//! and written as `<changesets dir>/<version>.<extension>` in the Liquibase
//! MongoDB XML format the runner executes.

pub mod render;
pub mod script;

use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::RunnerConfig;
use crate::error::{Result, RunnerError};

use render::ChangelogMeta;
pub use script::{Extraction, IndexSpec, Operation, ScriptOperation};

/// Input for one generation run.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub script: PathBuf,
    pub version: String,
    pub author: String,
    pub fail_on_warnings: bool,
}

/// One emitted changeSet.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedChangeset {
    pub id: String,
    pub operation: &'static str,
    pub collection: String,
    pub line: usize,
}

/// Result of a successful generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateReport {
    pub output_path: PathBuf,
    pub context: String,
    /// False when the script declared no context and the default was used.
    pub context_declared: bool,
    pub changesets: Vec<GeneratedChangeset>,
    pub warnings: Vec<String>,
}

fn validate_version_label(version: &str) -> Result<()> {
    let invalid = version.trim().is_empty()
        || version == "."
        || version == ".."
        || version.contains(['/', '\\']);
    if invalid {
        return Err(RunnerError::Usage(format!(
            "Invalid version label '{}': must be a plain file name",
            version
        )));
    }
    Ok(())
}

/// Generate a changelog from `request.script` into the changeset directory.
///
/// Nothing is written when the script has errors, or has warnings and
/// `fail_on_warnings` is set.
pub fn generate(config: &RunnerConfig, request: &GenerateRequest) -> Result<GenerateReport> {
    validate_version_label(&request.version)?;

    let content = fs::read_to_string(&request.script).map_err(|e| {
        RunnerError::Usage(format!(
            "Cannot read script '{}': {}",
            request.script.display(),
            e
        ))
    })?;

    let declared = script::extract_context(&content);
    let context_declared = declared.is_some();
    let context = declared.unwrap_or_else(|| config.generate.default_context.clone());
    if !context_declared {
        log::warn!(
            "No context declared in '{}', using default '{}'",
            request.script.display(),
            context
        );
    }

    let extraction = script::extract(&content);
    for warning in &extraction.warnings {
        log::warn!("{}", warning);
    }

    if !extraction.errors.is_empty() {
        return Err(RunnerError::GenerationFailed {
            error_count: extraction.errors.len(),
            details: extraction.errors.join("; "),
        });
    }
    if request.fail_on_warnings && !extraction.warnings.is_empty() {
        return Err(RunnerError::GenerationWarnings {
            warning_count: extraction.warnings.len(),
        });
    }

    let meta = ChangelogMeta {
        version: &request.version,
        author: &request.author,
        context: &context,
    };
    let xml = render::render_changelog(&meta, &extraction.operations, &extraction.warnings);

    let directory = &config.changesets.directory;
    fs::create_dir_all(directory)?;
    let output_path = directory.join(format!(
        "{}.{}",
        request.version, config.changesets.extension
    ));
    fs::write(&output_path, xml)?;

    let base = render::base_id(&request.version);
    let total = extraction.operations.len();
    let changesets = extraction
        .operations
        .iter()
        .enumerate()
        .map(|(i, op)| GeneratedChangeset {
            id: render::changeset_id(&base, i, total),
            operation: op.operation.name(),
            collection: op.operation.collection().to_string(),
            line: op.line,
        })
        .collect();

    log::info!(
        "Generated {} with {} changeset(s) for context '{}'",
        output_path.display(),
        total.max(1),
        context
    );

    Ok(GenerateReport {
        output_path,
        context,
        context_declared,
        changesets,
        warnings: extraction.warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn config_in(dir: &std::path::Path) -> RunnerConfig {
        let mut config = RunnerConfig::default();
        config.changesets.directory = dir.join("json_changesets");
        config
    }

    fn write_script(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("script.js");
        fs::write(&path, body).unwrap();
        path
    }

    fn request(script: PathBuf) -> GenerateRequest {
        GenerateRequest {
            script,
            version: "v4".to_string(),
            author: "dana".to_string(),
            fail_on_warnings: false,
        }
    }

    const SCRIPT: &str = "// @context: orders_ctx\n// @author: dana\n// @description: seed\n// @version: 4\n\
        db.createCollection(\"orders\");\n\
        db.getCollection(\"orders\").insertOne({ \"sku\": \"A1\" });\n";

    #[test]
    fn test_generate_writes_changelog() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let report = generate(&config, &request(write_script(dir.path(), SCRIPT))).unwrap();

        assert_eq!(report.context, "orders_ctx");
        assert!(report.context_declared);
        assert!(report.warnings.is_empty());
        assert_eq!(
            report.output_path,
            dir.path().join("json_changesets").join("v4.xml")
        );
        let ids: Vec<&str> = report.changesets.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["4.1", "4.2"]);

        let xml = fs::read_to_string(&report.output_path).unwrap();
        assert!(xml.contains("context=\"orders_ctx\""));
        assert!(xml.contains("<mongodb:insertOne collectionName=\"orders\">"));
    }

    #[test]
    fn test_default_context_when_undeclared() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let script = write_script(dir.path(), "db.createCollection(\"orders\");\n");
        let report = generate(&config, &request(script)).unwrap();
        assert_eq!(report.context, "liquibase_test");
        assert!(!report.context_declared);
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn test_errors_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let script = write_script(dir.path(), "db.getCollection('u').aggregate([]);\n");
        let err = generate(&config, &request(script)).unwrap_err();
        assert!(matches!(
            err,
            RunnerError::GenerationFailed { error_count: 1, .. }
        ));
        assert!(!dir.path().join("json_changesets").join("v4.xml").exists());
    }

    #[test]
    fn test_fail_on_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let script = write_script(dir.path(), "db.createCollection(\"orders\");\n");
        let mut req = request(script);
        req.fail_on_warnings = true;
        assert!(matches!(
            generate(&config, &req),
            Err(RunnerError::GenerationWarnings { .. })
        ));
    }

    #[test]
    fn test_rejects_path_like_version() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let mut req = request(write_script(dir.path(), SCRIPT));
        req.version = "../escape".to_string();
        assert!(matches!(
            generate(&config, &req),
            Err(RunnerError::Usage(_))
        ));
    }

    #[test]
    fn test_missing_script() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let req = request(dir.path().join("absent.js"));
        match generate(&config, &req) {
            Err(RunnerError::Usage(message)) => assert!(message.contains("absent.js")),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
