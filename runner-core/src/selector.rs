//! Database list filtering against the context allow-list.

use serde::Serialize;

use crate::config::ContextMap;
use crate::error::{Result, RunnerError};

/// A database accepted for the run, with its resolved context label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub database: String,
    pub context: String,
}

/// Outcome of filtering a raw database list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    /// Accepted databases in order of first appearance.
    pub targets: Vec<Target>,
    /// Names that were not in the mapping.
    pub skipped: Vec<String>,
}

/// Split a comma-separated list and keep only names present in `contexts`.
///
/// Pieces are trimmed and empty pieces discarded. Unknown names are dropped
/// with a warning; the call fails only when nothing is left.
pub fn select(raw: &str, contexts: &ContextMap) -> Result<Selection> {
    let mut targets = Vec::new();
    let mut skipped = Vec::new();

    for piece in raw.split(',') {
        let name = piece.trim();
        if name.is_empty() {
            log::warn!("Ignoring empty database name in '{}'", raw);
            continue;
        }

        match contexts.get(name) {
            Some(context) => targets.push(Target {
                database: name.to_string(),
                context: context.to_string(),
            }),
            None => {
                log::warn!("Skipping unknown database '{}'", name);
                skipped.push(name.to_string());
            }
        }
    }

    if targets.is_empty() {
        return Err(RunnerError::NoValidDatabases {
            requested: raw.to_string(),
            valid: contexts.names(),
        });
    }

    Ok(Selection { targets, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contexts() -> ContextMap {
        ContextMap::from_pairs([("a", "ctx_a"), ("c", "ctx_c"), ("orders", "orders_ctx")])
    }

    fn names(selection: &Selection) -> Vec<&str> {
        selection.targets.iter().map(|t| t.database.as_str()).collect()
    }

    #[test]
    fn test_trims_and_drops_unknown_and_empty() {
        let selection = select("a, b ,,c", &contexts()).unwrap();
        assert_eq!(names(&selection), vec!["a", "c"]);
        assert_eq!(selection.skipped, vec!["b"]);
    }

    #[test]
    fn test_preserves_input_order() {
        let selection = select("orders,c,a", &contexts()).unwrap();
        assert_eq!(names(&selection), vec!["orders", "c", "a"]);
    }

    #[test]
    fn test_records_context() {
        let selection = select("orders", &contexts()).unwrap();
        assert_eq!(
            selection.targets,
            vec![Target {
                database: "orders".to_string(),
                context: "orders_ctx".to_string(),
            }]
        );
    }

    #[test]
    fn test_duplicates_are_kept() {
        let selection = select("a,a", &contexts()).unwrap();
        assert_eq!(names(&selection), vec!["a", "a"]);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let err = select("A,ORDERS", &contexts()).unwrap_err();
        assert!(matches!(err, RunnerError::NoValidDatabases { .. }));
    }

    #[test]
    fn test_none_known_lists_valid_names() {
        match select("x, y", &contexts()) {
            Err(RunnerError::NoValidDatabases { requested, valid }) => {
                assert_eq!(requested, "x, y");
                assert_eq!(valid, vec!["a", "c", "orders"]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_only_separators() {
        assert!(select(" , ,", &contexts()).is_err());
    }
}
