//! Terminal output formatting for runner commands.
//! Uses comfy-table for tabular output and colored for
//! status-aware terminal styling.

use colored::Colorize;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};

use runner_core::locator::SelectionMode;
use runner_core::run::{TargetOutcome, TargetState};
use runner_core::{ChangesetListing, GenerateReport, RunPlan, RunReport};

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.into_iter().map(Cell::new).collect::<Vec<_>>());
    table
}

fn print_skipped(skipped: &[String]) {
    if !skipped.is_empty() {
        println!(
            "{}",
            format!("Skipped unknown database(s): {}", skipped.join(", ")).yellow()
        );
    }
}

/// Print the dry-run plan: which changeset runs where.
pub fn print_plan(plan: &RunPlan) {
    let how = match plan.changeset.mode {
        SelectionMode::Explicit => "requested",
        SelectionMode::Latest => "most recent",
    };
    println!(
        "{}",
        format!(
            "Would run '{}' with changeset '{}' ({}, {})",
            plan.command,
            plan.changeset.version(),
            how,
            plan.changeset.path().display()
        )
        .bold()
    );

    let mut table = new_table(vec!["#", "Database", "Context", "Endpoint"]);
    for (i, target) in plan.targets.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&target.database),
            Cell::new(&target.context),
            Cell::new(target.endpoint.redacted()),
        ]);
    }
    println!("{table}");
    print_skipped(&plan.skipped);
    println!("{}", "Dry run: the migration tool was not invoked.".dimmed());
}

fn format_outcome(outcome: &TargetOutcome) -> String {
    match outcome.state {
        TargetState::Succeeded => {
            let ms = outcome.execution_time_ms.unwrap_or_default();
            format!("{} {} ({}ms)", "✓".green(), outcome.database, ms)
        }
        TargetState::Failed { exit_code } => format!(
            "{} {} (exit code {})",
            "✗".red(),
            outcome.database,
            exit_code
        ),
        TargetState::Pending | TargetState::Running => {
            format!("{} {} (not attempted)", "-".dimmed(), outcome.database)
        }
    }
}

/// Print a run report summary.
pub fn print_run_summary(report: &RunReport) {
    for outcome in &report.outcomes {
        println!("  {}", format_outcome(outcome));
    }
    print_skipped(&report.skipped);

    match report.failure {
        None => println!(
            "{}",
            format!(
                "'{}' succeeded on {} database(s) using {} ({}ms)",
                report.command,
                report.succeeded,
                report.changeset_path.display(),
                report.total_time_ms
            )
            .green()
            .bold()
        ),
        Some(ref failure) => {
            println!(
                "{}",
                format!(
                    "'{}' failed on {} with exit code {} after {} success(es)",
                    report.command, failure.database, failure.exit_code, report.succeeded
                )
                .red()
                .bold()
            );
            let abandoned = report.abandoned();
            if !abandoned.is_empty() {
                println!(
                    "{}",
                    format!("Not attempted: {}", abandoned.join(", ")).dimmed()
                );
            }
        }
    }
}

/// Print available changesets, marking the default pick.
pub fn print_changeset_list(listing: &ChangesetListing) {
    if listing.entries.is_empty() {
        println!(
            "{}",
            format!("No changesets found in {}.", listing.directory.display()).yellow()
        );
        return;
    }

    let mut table = new_table(vec!["Version", "Modified", "File", "Default"]);
    for entry in &listing.entries {
        let is_latest = listing.latest.as_deref() == Some(entry.version.as_str());
        table.add_row(vec![
            Cell::new(&entry.version),
            Cell::new(entry.modified.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(entry.path.display()),
            Cell::new(if is_latest { "yes" } else { "" }),
        ]);
    }
    println!("{table}");
}

/// Print the outcome of a changeset generation.
pub fn print_generate_report(report: &GenerateReport) {
    if report.changesets.is_empty() {
        println!(
            "{}",
            "No supported operations found; wrote an empty changeset.".yellow()
        );
    } else {
        let mut table = new_table(vec!["Id", "Operation", "Collection", "Line"]);
        for cs in &report.changesets {
            table.add_row(vec![
                Cell::new(&cs.id),
                Cell::new(cs.operation),
                Cell::new(&cs.collection),
                Cell::new(cs.line),
            ]);
        }
        println!("{table}");
    }

    if !report.context_declared {
        println!(
            "{}",
            format!("No context declared; used default '{}'.", report.context).yellow()
        );
    }
    for warning in &report.warnings {
        println!("  {} {}", "!".yellow(), warning);
    }

    println!(
        "{}",
        format!(
            "Wrote {} (context '{}', {} warning(s))",
            report.output_path.display(),
            report.context,
            report.warnings.len()
        )
        .green()
        .bold()
    );
}
