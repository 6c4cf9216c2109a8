//! Rendering of apply and teardown reports

use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use serde_json::json;
use stackflow_core::{Action, ApplyReport, Outcome, TeardownReport};
use std::fmt::Write;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn marker(action: Action) -> ColoredString {
    match action {
        Action::Created => "+".green().bold(),
        Action::Updated => "~".yellow().bold(),
        Action::Replaced => "±".magenta().bold(),
        Action::Unchanged => "=".dimmed(),
        Action::Deleted => "-".red().bold(),
    }
}

/// A dry run reports what it would do
fn verb(action: Action, dry_run: bool) -> String {
    match (action, dry_run) {
        (Action::Created, true) => "create".to_string(),
        (Action::Updated, true) => "update".to_string(),
        (Action::Replaced, true) => "replace".to_string(),
        (Action::Deleted, true) => "delete".to_string(),
        (Action::Unchanged, true) => "no change".to_string(),
        (action, false) => action.to_string(),
    }
}

fn outcome_line(out: &mut String, outcome: &Outcome, dry_run: bool) {
    let id = if outcome.handle.provider_id().is_empty() {
        String::new()
    } else {
        outcome.handle.provider_id().to_string()
    };
    let _ = writeln!(
        out,
        "  {} {:<28} {:<10} {:<10} {}",
        marker(outcome.action),
        outcome.spec,
        outcome.handle.kind().to_string(),
        verb(outcome.action, dry_run),
        id.dimmed()
    );
    if let Some(diff) = &outcome.diff {
        for line in diff.lines() {
            let line = if line.starts_with('+') && !line.starts_with("+++") {
                line.green()
            } else if line.starts_with('-') && !line.starts_with("---") {
                line.red()
            } else {
                line.dimmed()
            };
            let _ = writeln!(out, "      {}", line);
        }
    }
}

pub fn render_apply(report: &ApplyReport, format: OutputFormat) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(report)?);
    }

    let mut out = String::new();
    for outcome in &report.outcomes {
        outcome_line(&mut out, outcome, report.dry_run);
    }
    let _ = writeln!(out);

    let summary = report.summary();
    let line = if report.dry_run {
        format!("Plan: {}", summary).bold()
    } else {
        format!("✓ Apply complete: {} ({} ms)", summary, report.duration_ms)
            .green()
            .bold()
    };
    let _ = writeln!(out, "{}", line);
    Ok(out)
}

pub fn render_teardown(report: &TeardownReport, dry_run: bool) -> String {
    let mut out = String::new();

    for outcome in &report.deleted {
        let state = match (dry_run, outcome.handle.provider_id().is_empty()) {
            (_, true) => "absent".dimmed(),
            (true, false) => "delete".normal(),
            (false, false) => "deleted".normal(),
        };
        let _ = writeln!(
            out,
            "  {} {:<28} {:<10} {}",
            marker(Action::Deleted),
            outcome.spec,
            outcome.handle.kind().to_string(),
            state
        );
    }
    for failure in &report.failed {
        let _ = writeln!(
            out,
            "  {} {:<28} {}",
            "✗".red().bold(),
            failure.spec,
            failure.error.to_string().red()
        );
    }
    for name in &report.blocked {
        let _ = writeln!(
            out,
            "  {} {:<28} {}",
            "!".yellow().bold(),
            name,
            "kept, a dependent resource could not be deleted".yellow()
        );
    }
    for name in &report.skipped {
        let _ = writeln!(out, "  {} {:<28} {}", "·".dimmed(), name, "external, skipped".dimmed());
    }
    let _ = writeln!(out);

    let line = if dry_run {
        format!(
            "Would delete {} resource(s). Re-run with --yes to delete them.",
            report
                .deleted
                .iter()
                .filter(|o| !o.handle.provider_id().is_empty())
                .count()
        )
        .bold()
    } else if report.is_success() {
        format!(
            "✓ Destroy complete: {} deleted ({} ms)",
            report.deleted.len(),
            report.duration_ms
        )
        .green()
        .bold()
    } else {
        format!(
            "✗ Destroy finished with {} failure(s), {} resource(s) kept",
            report.failed.len(),
            report.blocked.len()
        )
        .red()
        .bold()
    };
    let _ = writeln!(out, "{}", line);
    out
}

/// Machine-readable teardown summary
pub fn teardown_json(report: &TeardownReport) -> serde_json::Value {
    json!({
        "deleted": report.deleted,
        "failed": report
            .failed
            .iter()
            .map(|f| json!({ "spec": f.spec, "error": f.error.to_string() }))
            .collect::<Vec<_>>(),
        "blocked": report.blocked,
        "skipped": report.skipped,
        "duration_ms": report.duration_ms,
    })
}
