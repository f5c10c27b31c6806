//! Liquibase MongoDB XML changelog rendering.

use std::sync::LazyLock;

use regex_lite::Regex;

use super::script::{index_name, IndexSpec, Operation, ScriptOperation};

static FIRST_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

const CHANGELOG_OPEN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<databaseChangeLog
    xmlns="http://www.liquibase.org/xml/ns/dbchangelog"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
    xmlns:mongodb="http://www.liquibase.org/xml/ns/dbchangelog-ext"
    xsi:schemaLocation="
        http://www.liquibase.org/xml/ns/dbchangelog
        http://www.liquibase.org/xml/ns/dbchangelog/dbchangelog-4.5.xsd
        http://www.liquibase.org/xml/ns/dbchangelog-ext
        http://www.liquibase.org/xml/ns/dbchangelog/dbchangelog-ext.xsd">"#;

const CHANGELOG_CLOSE: &str = "</databaseChangeLog>";

/// Attribution shared by every changeSet in one file.
#[derive(Debug, Clone, Copy)]
pub struct ChangelogMeta<'a> {
    pub version: &'a str,
    pub author: &'a str,
    pub context: &'a str,
}

/// Numeric changeSet id base: the first digit run of the version label.
pub fn base_id(version: &str) -> String {
    FIRST_NUMBER_RE
        .find(version)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "1".to_string())
}

/// Id of the `index`-th (zero based) changeSet out of `total`.
pub fn changeset_id(base: &str, index: usize, total: usize) -> String {
    if total == 1 {
        base.to_string()
    } else {
        format!("{}.{}", base, index + 1)
    }
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Comment bodies may not contain `--`.
fn comment(text: &str) -> String {
    let mut body = text.trim_end_matches('-').to_string();
    while body.contains("--") {
        body = body.replace("--", "- -");
    }
    format!("<!-- {} -->", body)
}

fn cdata(text: &str) -> String {
    text.replace("]]>", "]]]]><![CDATA[>")
}

fn push_cdata(lines: &mut Vec<String>, element: &str, body: &[String]) {
    lines.push(format!("            <mongodb:{}><![CDATA[", element));
    lines.extend(body.iter().map(|l| format!("            {}", cdata(l))));
    lines.push(format!("            ]]></mongodb:{}>", element));
}

fn push_run_command(lines: &mut Vec<String>, body: Vec<String>) {
    lines.push("        <mongodb:runCommand>".to_string());
    push_cdata(lines, "command", &body);
    lines.push("        </mongodb:runCommand>".to_string());
}

fn render_operation(lines: &mut Vec<String>, op: &Operation, position: usize) {
    let collection = op.collection();
    let attr = escape_attr(collection);

    match op {
        Operation::CreateCollection { .. } => {
            lines.push(format!(
                "        <mongodb:createCollection collectionName=\"{}\" />",
                attr
            ));
        }
        Operation::DropCollection { .. } => {
            lines.push(format!(
                "        <mongodb:dropCollection collectionName=\"{}\" />",
                attr
            ));
        }
        Operation::InsertOne { document, .. } => {
            lines.push(format!(
                "        <mongodb:insertOne collectionName=\"{}\">",
                attr
            ));
            push_cdata(lines, "document", &[document.clone()]);
            lines.push("        </mongodb:insertOne>".to_string());
        }
        Operation::InsertMany { documents, .. } => {
            let documents = if documents.starts_with('[') {
                documents.clone()
            } else {
                format!("[{}]", documents)
            };
            lines.push(format!(
                "        <mongodb:insertMany collectionName=\"{}\">",
                attr
            ));
            push_cdata(lines, "documents", &[documents]);
            lines.push("        </mongodb:insertMany>".to_string());
        }
        Operation::CreateIndex { keys, options, .. } => {
            let name = index_name(options.as_deref())
                .unwrap_or_else(|| format!("{}_index_{}", collection, position));
            push_run_command(
                lines,
                vec![
                    "{".to_string(),
                    format!("    \"createIndexes\": \"{}\",", collection),
                    "    \"indexes\": [".to_string(),
                    "        {".to_string(),
                    format!("            \"key\": {},", keys),
                    format!("            \"name\": \"{}\"", name),
                    "        }".to_string(),
                    "    ]".to_string(),
                    "}".to_string(),
                ],
            );
        }
        Operation::Update {
            filter,
            update,
            multi,
            ..
        } => {
            push_run_command(
                lines,
                vec![
                    "{".to_string(),
                    format!("    \"update\": \"{}\",", collection),
                    "    \"updates\": [".to_string(),
                    "        {".to_string(),
                    format!("            \"q\": {},", filter),
                    format!("            \"u\": {},", update),
                    format!("            \"multi\": {}", multi),
                    "        }".to_string(),
                    "    ]".to_string(),
                    "}".to_string(),
                ],
            );
        }
        Operation::ReplaceOne {
            filter,
            replacement,
            ..
        } => {
            push_run_command(
                lines,
                vec![
                    "{".to_string(),
                    format!("    \"findAndModify\": \"{}\",", collection),
                    format!("    \"query\": {},", filter),
                    format!("    \"update\": {},", replacement),
                    "    \"new\": true".to_string(),
                    "}".to_string(),
                ],
            );
        }
        Operation::Delete { filter, limit, .. } => {
            push_run_command(
                lines,
                vec![
                    "{".to_string(),
                    format!("    \"delete\": \"{}\",", collection),
                    "    \"deletes\": [".to_string(),
                    "        {".to_string(),
                    format!("            \"q\": {},", filter),
                    format!("            \"limit\": {}", limit),
                    "        }".to_string(),
                    "    ]".to_string(),
                    "}".to_string(),
                ],
            );
        }
        Operation::DropIndex { index, .. } => match index {
            IndexSpec::Name(name) => {
                lines.push(format!(
                    "        <mongodb:dropIndex collectionName=\"{}\" indexName=\"{}\" />",
                    attr,
                    escape_attr(name)
                ));
            }
            IndexSpec::Keys(keys) => {
                lines.push(format!(
                    "        <mongodb:dropIndex collectionName=\"{}\">",
                    attr
                ));
                push_cdata(lines, "keys", &[keys.clone()]);
                lines.push("        </mongodb:dropIndex>".to_string());
            }
        },
    }
}

/// Numbered warning list embedded at the top of a changelog.
pub fn warning_report(warnings: &[String]) -> Vec<String> {
    let mut report = vec!["WARNINGS:".to_string()];
    report.extend(
        warnings
            .iter()
            .enumerate()
            .map(|(i, w)| format!("{}. {}", i + 1, w)),
    );
    report.push("Changelog generated; review the warnings above.".to_string());
    report
}

/// Render a complete changelog document.
pub fn render_changelog(
    meta: &ChangelogMeta<'_>,
    operations: &[ScriptOperation],
    warnings: &[String],
) -> String {
    let base = base_id(meta.version);
    let author = escape_attr(meta.author);
    let context = escape_attr(meta.context);

    let mut lines = vec![CHANGELOG_OPEN.to_string()];

    if !warnings.is_empty() {
        lines.push(format!("    {}", comment("VALIDATION REPORT")));
        for line in warning_report(warnings) {
            lines.push(format!("    {}", comment(&line)));
        }
        lines.push(format!("    {}", comment("END VALIDATION REPORT")));
        lines.push(String::new());
    }

    let open = |id: &str| {
        format!(
            "    <changeSet id=\"{}\" author=\"{}\" context=\"{}\">",
            id, author, context
        )
    };

    if operations.is_empty() {
        lines.push(open(&base));
        lines.push(format!(
            "        {}",
            comment("No valid MongoDB operations found in the script")
        ));
        lines.push("    </changeSet>".to_string());
    }

    for (i, op) in operations.iter().enumerate() {
        lines.push(open(&changeset_id(&base, i, operations.len())));
        lines.push(format!(
            "        {}",
            comment(&format!(
                "{} operation on {} (from line {})",
                op.operation.name().to_uppercase(),
                op.operation.collection(),
                op.line
            ))
        ));
        render_operation(&mut lines, &op.operation, i + 1);
        lines.push("    </changeSet>".to_string());
    }

    lines.push(CHANGELOG_CLOSE.to_string());
    let mut xml = lines.join("\n");
    xml.push('\n');
    xml
}
