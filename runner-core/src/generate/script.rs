//! Mongo shell script parsing: context header, supported operations, validation.
//!
//! Extraction is regex based and expects the `db.getCollection("name")`
//! form. Anything else the runner cannot express as a changeset is
//! reported as an error rather than silently dropped.

use std::sync::LazyLock;

use regex_lite::{Captures, Regex};
use serde::Serialize;

/// Lines searched for a context declaration.
const CONTEXT_SCAN_LINES: usize = 10;

/// Lines searched for the recommended header fields.
const HEADER_SCAN_LINES: usize = 15;

/// `db.getCollection("name")` prefix shared by most operation patterns.
const GET_COLLECTION: &str = r#"db\.getCollection\s*\(\s*["']([^"']+)["']\s*\)\s*"#;

/// Context declarations in priority order: an explicit context wins over a
/// database line wherever each appears in the header.
static CONTEXT_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)//\s*@?context\s*:?\s*([A-Za-z0-9_]+)",
        r"(?i)/\*\s*@?context\s*:?\s*([A-Za-z0-9_]+)\s*\*/",
        r"(?i)//\s*@?database\s*:?\s*([A-Za-z0-9_]+)",
        r"(?i)/\*\s*@?database\s*:?\s*([A-Za-z0-9_]+)\s*\*/",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

static HEADER_RES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    ["context", "author", "description", "version"]
        .into_iter()
        .map(|field| {
            let re = Regex::new(&format!(r"(?i)//\s*@?{}\s*:", field)).unwrap();
            (field, re)
        })
        .collect()
});

static COLLECTION_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

static DOT_ACCESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"db\.[A-Za-z_][A-Za-z0-9_]*\.").unwrap());

static UNSUPPORTED_RES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\.find\s*\(", "find() operations are not supported in changesets"),
        (r"\.aggregate\s*\(", "aggregate() operations are not supported in changesets"),
        (r"\.mapReduce\s*\(", "mapReduce() operations are not supported in changesets"),
        (r"\.distinct\s*\(", "distinct() operations are not supported in changesets"),
    ]
    .into_iter()
    .map(|(pattern, message)| (Regex::new(pattern).unwrap(), message))
    .collect()
});

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"function\s*\(").unwrap());

static SINGLE_QUOTED_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'([^']*)'(\s*:)").unwrap());

static INDEX_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']?name["']?\s*:\s*["']([^"']+)["']"#).unwrap()
});

/// Date rewrites applied to payloads, in order.
static DATE_REWRITES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r#"new\s+Date\s*\(\s*"([^"]+)"\s*\)"#, r#"ISODate("${1}")"#),
        (r"new\s+Date\s*\(\s*'([^']+)'\s*\)", r#"ISODate("${1}")"#),
        (r"new\s+Date\s*\(\s*\)", "ISODate()"),
        (
            r#"ISODate\s*\(\s*"(\d{4}-\d{2}-\d{2})"\s*\)"#,
            r#"ISODate("${1}T00:00:00.000Z")"#,
        ),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect()
});

/// Which shell call a pattern recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternKind {
    InsertMany,
    InsertOne,
    Insert,
    UpdateOne,
    UpdateMany,
    ReplaceOne,
    DeleteOne,
    DeleteMany,
    Remove,
    CreateIndex,
    DropIndex,
    CreateCollection,
    DropCollection,
}

static OPERATION_RES: LazyLock<Vec<(PatternKind, Regex)>> = LazyLock::new(|| {
    let gc = GET_COLLECTION;
    let filter_update = r"\s*\(\s*(\{.*?\})\s*,\s*(\{.*?\})\s*(?:,\s*(\{.*?\}))?\s*\)\s*;?";
    let filter_opts = r"\s*\(\s*(\{.*?\})\s*(?:,\s*(\{.*?\}))?\s*\)\s*;?";
    [
        (PatternKind::InsertMany, format!(r"{gc}\.insertMany\s*\(\s*(\[.*?\])\s*\)\s*;?")),
        (PatternKind::InsertOne, format!(r"{gc}\.insertOne\s*\(\s*(\{{.*?\}})\s*\)\s*;?")),
        (
            PatternKind::Insert,
            format!(r"{gc}\.insert\s*\(\s*(\{{.*?\}}|\[.*?\])\s*\)\s*;?"),
        ),
        (PatternKind::UpdateOne, format!(r"{gc}\.updateOne{filter_update}")),
        (PatternKind::UpdateMany, format!(r"{gc}\.updateMany{filter_update}")),
        (PatternKind::ReplaceOne, format!(r"{gc}\.replaceOne{filter_update}")),
        (PatternKind::DeleteOne, format!(r"{gc}\.deleteOne{filter_opts}")),
        (PatternKind::DeleteMany, format!(r"{gc}\.deleteMany{filter_opts}")),
        (PatternKind::Remove, format!(r"{gc}\.remove{filter_opts}")),
        (PatternKind::CreateIndex, format!(r"{gc}\.createIndex{filter_opts}")),
        (
            PatternKind::DropIndex,
            format!(r#"{gc}\.dropIndex\s*\(\s*(["'][^"']*["']|\{{.*?\}})\s*\)\s*;?"#),
        ),
        (
            PatternKind::CreateCollection,
            r#"db\.createCollection\s*\(\s*["']([^"']+)["']\s*(?:,\s*(\{.*?\}))?\s*\)\s*;?"#
                .to_string(),
        ),
        (
            PatternKind::DropCollection,
            r#"db\.dropCollection\s*\(\s*["']([^"']+)["']\s*\)\s*;?"#.to_string(),
        ),
        (PatternKind::DropCollection, format!(r"{gc}\.drop\s*\(\s*\)\s*;?")),
        (
            PatternKind::DropCollection,
            r"db\.([A-Za-z_][A-Za-z0-9_]*)\s*\.drop\s*\(\s*\)\s*;?".to_string(),
        ),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(&format!("(?s){}", pattern)).unwrap()))
    .collect()
});

/// How an index to drop is identified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSpec {
    Name(String),
    Keys(String),
}

/// A supported operation with its (normalized) JSON payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Operation {
    CreateCollection {
        collection: String,
        options: Option<String>,
    },
    DropCollection {
        collection: String,
    },
    InsertOne {
        collection: String,
        document: String,
    },
    /// `insertMany` and legacy `insert`.
    InsertMany {
        collection: String,
        documents: String,
    },
    /// `updateOne` / `updateMany`.
    Update {
        collection: String,
        filter: String,
        update: String,
        multi: bool,
    },
    ReplaceOne {
        collection: String,
        filter: String,
        replacement: String,
    },
    /// `deleteOne` (limit 1), `deleteMany` and `remove` (limit 0).
    Delete {
        collection: String,
        filter: String,
        limit: u8,
    },
    CreateIndex {
        collection: String,
        keys: String,
        options: Option<String>,
    },
    DropIndex {
        collection: String,
        index: IndexSpec,
    },
}

impl Operation {
    pub fn collection(&self) -> &str {
        match self {
            Operation::CreateCollection { collection, .. }
            | Operation::DropCollection { collection }
            | Operation::InsertOne { collection, .. }
            | Operation::InsertMany { collection, .. }
            | Operation::Update { collection, .. }
            | Operation::ReplaceOne { collection, .. }
            | Operation::Delete { collection, .. }
            | Operation::CreateIndex { collection, .. }
            | Operation::DropIndex { collection, .. } => collection,
        }
    }

    /// Short operation name for reports and XML comments.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateCollection { .. } => "createCollection",
            Operation::DropCollection { .. } => "dropCollection",
            Operation::InsertOne { .. } => "insertOne",
            Operation::InsertMany { .. } => "insertMany",
            Operation::Update { multi: false, .. } => "updateOne",
            Operation::Update { multi: true, .. } => "updateMany",
            Operation::ReplaceOne { .. } => "replaceOne",
            Operation::Delete { limit: 1, .. } => "deleteOne",
            Operation::Delete { .. } => "deleteMany",
            Operation::CreateIndex { .. } => "createIndex",
            Operation::DropIndex { .. } => "dropIndex",
        }
    }

    /// Payloads checked for unsafe constructs, labelled by field.
    fn payloads(&self) -> Vec<(&'static str, &str)> {
        match self {
            Operation::InsertOne { document, .. } => vec![("documents", document.as_str())],
            Operation::InsertMany { documents, .. } => vec![("documents", documents.as_str())],
            Operation::Update { filter, update, .. } => {
                vec![("filter", filter.as_str()), ("update", update.as_str())]
            }
            Operation::ReplaceOne {
                filter,
                replacement,
                ..
            } => vec![("filter", filter.as_str()), ("update", replacement.as_str())],
            Operation::Delete { filter, .. } => vec![("filter", filter.as_str())],
            _ => Vec::new(),
        }
    }

    fn clean_payloads(&mut self) {
        match self {
            Operation::InsertOne { document, .. } => *document = clean_payload(document),
            Operation::InsertMany { documents, .. } => *documents = clean_payload(documents),
            Operation::Update { filter, update, .. } => {
                *filter = clean_payload(filter);
                *update = clean_payload(update);
            }
            Operation::ReplaceOne {
                filter,
                replacement,
                ..
            } => {
                *filter = clean_payload(filter);
                *replacement = clean_payload(replacement);
            }
            Operation::Delete { filter, .. } => *filter = clean_payload(filter),
            _ => {}
        }
    }
}

/// An operation and the script line it starts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptOperation {
    pub line: usize,
    #[serde(flatten)]
    pub operation: Operation,
}

/// Everything found in a script.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Extraction {
    /// Valid operations in source order.
    pub operations: Vec<ScriptOperation>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Context declared in the first lines of a script, if any.
///
/// Accepts `// @context: name`, `/* context: name */` and `// DATABASE: name`,
/// tried in that order.
pub fn extract_context(content: &str) -> Option<String> {
    let head: String = content
        .lines()
        .take(CONTEXT_SCAN_LINES)
        .collect::<Vec<_>>()
        .join("\n");
    CONTEXT_RES.iter().find_map(|re| {
        re.captures(&head)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// Warnings for recommended header fields missing from the first lines.
pub fn header_warnings(content: &str) -> Vec<String> {
    let head: String = content
        .lines()
        .take(HEADER_SCAN_LINES)
        .collect::<Vec<_>>()
        .join("\n");
    HEADER_RES
        .iter()
        .filter(|(_, re)| !re.is_match(&head))
        .map(|(field, _)| format!("Header: Missing recommended header field: @{}", field))
        .collect()
}

/// Remove `//` and `/* */` comments outside string literals.
///
/// Newlines are kept (including those inside block comments) so byte
/// offsets in the result map to the same line numbers as the input.
pub fn strip_comments(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' | '`' => {
                quote = Some(c);
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Normalize a JSON-ish payload for embedding in a changeset.
///
/// Rewrites `new Date(...)` to `ISODate(...)`, pads bare dates to midnight
/// UTC, double-quotes single-quoted keys, collapses whitespace and writes
/// `, ` and `: ` separators. String literals are left untouched.
pub fn clean_payload(payload: &str) -> String {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return "{}".to_string();
    }

    let mut cleaned = trimmed.to_string();
    for (re, replacement) in DATE_REWRITES.iter() {
        cleaned = re.replace_all(&cleaned, *replacement).into_owned();
    }
    cleaned = SINGLE_QUOTED_KEY_RE
        .replace_all(&cleaned, r#""${1}"${2}"#)
        .into_owned();

    normalize_spacing(&cleaned)
}

fn normalize_spacing(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut pending_space = false;

    for c in s.chars() {
        if let Some(q) = quote {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if c == ',' || c == ':' {
            out.push(c);
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        if matches!(c, '"' | '\'' | '`') {
            quote = Some(c);
        }
        out.push(c);
    }

    out
}

/// Index name from `createIndex` options, if given.
pub fn index_name(options: Option<&str>) -> Option<String> {
    options
        .and_then(|o| INDEX_NAME_RE.captures(o))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn group(caps: &Captures<'_>, i: usize) -> Option<String> {
    caps.get(i).map(|m| m.as_str().to_string())
}

fn build_operation(kind: PatternKind, caps: &Captures<'_>) -> Option<Operation> {
    let collection = group(caps, 1)?;
    let op = match kind {
        PatternKind::InsertMany | PatternKind::Insert => Operation::InsertMany {
            collection,
            documents: group(caps, 2)?,
        },
        PatternKind::InsertOne => Operation::InsertOne {
            collection,
            document: group(caps, 2)?,
        },
        PatternKind::UpdateOne | PatternKind::UpdateMany => Operation::Update {
            collection,
            filter: group(caps, 2)?,
            update: group(caps, 3)?,
            multi: kind == PatternKind::UpdateMany,
        },
        PatternKind::ReplaceOne => Operation::ReplaceOne {
            collection,
            filter: group(caps, 2)?,
            replacement: group(caps, 3)?,
        },
        PatternKind::DeleteOne | PatternKind::DeleteMany | PatternKind::Remove => {
            Operation::Delete {
                collection,
                filter: group(caps, 2)?,
                limit: u8::from(kind == PatternKind::DeleteOne),
            }
        }
        PatternKind::CreateIndex => Operation::CreateIndex {
            collection,
            keys: group(caps, 2)?,
            options: group(caps, 3),
        },
        PatternKind::DropIndex => {
            let spec = group(caps, 2)?;
            let index = if spec.starts_with('"') || spec.starts_with('\'') {
                IndexSpec::Name(spec.trim_matches(|c: char| c == '"' || c == '\'').to_string())
            } else {
                IndexSpec::Keys(spec.trim().to_string())
            };
            Operation::DropIndex { collection, index }
        }
        PatternKind::CreateCollection => Operation::CreateCollection {
            collection,
            options: group(caps, 2),
        },
        PatternKind::DropCollection => Operation::DropCollection { collection },
    };
    Some(op)
}

/// Check one operation; returns `(errors, warnings)`.
fn validate_operation(op: &Operation) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let collection = op.collection();
    if !COLLECTION_NAME_RE.is_match(collection) {
        errors.push(format!(
            "Invalid collection name format: '{}'. Use alphanumeric and underscore only.",
            collection
        ));
    }

    if let Operation::InsertOne { document: docs, .. }
    | Operation::InsertMany {
        documents: docs, ..
    } = op
    {
        if docs.contains("new Date(") && !docs.contains("ISODate(") {
            warnings.push("Found 'new Date()' - converting to 'ISODate()' format".to_string());
        }
        if SINGLE_QUOTED_KEY_RE.is_match(docs) {
            warnings.push(
                "Found single quotes for object keys - converting to double quotes".to_string(),
            );
        }
    }

    for (field, payload) in op.payloads() {
        if FUNCTION_RE.is_match(payload) {
            errors.push(format!("JavaScript functions not supported in {}", field));
        }
        if payload.contains("eval(") || payload.contains("$where") {
            warnings.push(format!("Potentially unsafe operation found in {}", field));
        }
    }

    (errors, warnings)
}

/// Errors for constructs that cannot be turned into a changeset.
fn unsupported_constructs(code: &str) -> Vec<String> {
    let mut errors = Vec::new();

    let dot_access = DOT_ACCESS_RE
        .find_iter(code)
        .any(|m| !code[m.end()..].starts_with("drop()"));
    if dot_access {
        errors.push(
            "Unsupported operation: Use db.getCollection('name') instead of db.collection"
                .to_string(),
        );
    }

    for (re, message) in UNSUPPORTED_RES.iter() {
        if re.is_match(code) {
            errors.push(format!("Unsupported operation: {}", message));
        }
    }

    errors
}

/// Extract, validate and normalize every supported operation in a script.
pub fn extract(content: &str) -> Extraction {
    let mut extraction = Extraction {
        warnings: header_warnings(content),
        ..Extraction::default()
    };

    let code = strip_comments(content);
    extraction.errors.extend(unsupported_constructs(&code));

    let mut found: Vec<(usize, Operation)> = Vec::new();
    for (kind, re) in OPERATION_RES.iter() {
        for caps in re.captures_iter(&code) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if let Some(op) = build_operation(*kind, &caps) {
                found.push((whole.start(), op));
            }
        }
    }
    found.sort_by_key(|(offset, _)| *offset);

    for (offset, mut op) in found {
        let line = code[..offset].matches('\n').count() + 1;
        let position = extraction.operations.len() + 1;
        let (errors, warnings) = validate_operation(&op);

        if !errors.is_empty() {
            log::debug!("Skipping invalid {} at line {}: {:?}", op.name(), line, errors);
            extraction.errors.extend(
                errors
                    .into_iter()
                    .map(|e| format!("Operation {} (line {}): {}", position, line, e)),
            );
            continue;
        }
        extraction.warnings.extend(
            warnings
                .into_iter()
                .map(|w| format!("Operation {} (line {}): {}", position, line, w)),
        );

        op.clean_payloads();
        log::debug!(
            "Found {} on collection '{}' at line {}",
            op.name(),
            op.collection(),
            line
        );
        extraction.operations.push(ScriptOperation {
            line,
            operation: op,
        });
    }

    extraction
}
