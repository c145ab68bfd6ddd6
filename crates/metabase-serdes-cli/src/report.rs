//! Text and JSON renderings of command results.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write as _;

use metabase_serdes_changes::{ChangePlan, ChangeRequest, PlanRejection, RejectedChange};
use metabase_serdes_graph::{
    BuildStats, EntityRecord, ExportGraph, Reference, Resolution, SkippedMember,
};
use metabase_serdes_model::{Diagnostic, DiagnosticSummary, EntityId, Severity};

#[derive(Debug, Serialize)]
pub struct IndexReport<'a> {
    pub generated_at: String,
    pub export: String,
    pub stats: &'a BuildStats,
    pub summary: DiagnosticSummary,
    pub entities: Vec<&'a EntityRecord>,
    pub diagnostics: &'a [Diagnostic],
    pub skipped: &'a [SkippedMember],
}

impl<'a> IndexReport<'a> {
    pub fn new(export: String, graph: &'a ExportGraph) -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            export,
            stats: &graph.stats,
            summary: graph.summary(),
            entities: graph.index.records().collect(),
            diagnostics: &graph.diagnostics,
            skipped: &graph.skipped,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RefsReport<'a> {
    pub id: &'a EntityId,
    pub resolution: Resolution,
    pub record: Option<&'a EntityRecord>,
    pub outgoing: &'a [Reference],
    pub incoming: &'a [Reference],
}

impl<'a> RefsReport<'a> {
    pub fn new(id: &'a EntityId, graph: &'a ExportGraph) -> Self {
        Self {
            id,
            resolution: graph.resolve(id),
            record: graph.index.get(id),
            outgoing: graph.outgoing(id),
            incoming: graph.incoming(id),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanOutcome<'a> {
    Planned { plan: &'a ChangePlan },
    Rejected { rejection: &'a PlanRejection },
}

/// Contents of `change_plan.json`.
#[derive(Debug, Serialize)]
pub struct PlanReport<'a> {
    pub generated_at: String,
    pub export: String,
    pub change_list: String,
    #[serde(flatten)]
    pub outcome: PlanOutcome<'a>,
}

impl<'a> PlanReport<'a> {
    pub fn new(export: String, change_list: String, outcome: PlanOutcome<'a>) -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            export,
            change_list,
            outcome,
        }
    }
}

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{n} {}", if n == 1 { one } else { many })
}

fn severity_tag(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Error => "error".red().bold(),
        Severity::Warning => "warning".yellow().bold(),
    }
}

fn write_diagnostic(out: &mut String, indent: &str, diagnostic: &Diagnostic) {
    let _ = writeln!(
        out,
        "{indent}{} [{}] {}",
        severity_tag(diagnostic.severity()),
        diagnostic.code(),
        diagnostic
    );
}

fn describe_request(request: &ChangeRequest) -> String {
    match &request.target {
        Some(target) => format!("{} {target}", request.operation),
        None => match request.created_id() {
            Some(created) => format!("{} {created}", request.operation),
            None => request.operation.to_string(),
        },
    }
}

pub fn render_index_text(report: &IndexReport<'_>) -> String {
    let stats = report.stats;
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", "Indexed".green().bold(), report.export);
    let _ = writeln!(
        out,
        "  {} {} ({}, {}, {} skipped)",
        "→".cyan(),
        plural(stats.entities, "entity", "entities"),
        plural(stats.duplicates, "duplicate", "duplicates"),
        plural(stats.parse_failures, "parse failure", "parse failures"),
        stats.skipped
    );
    let _ = writeln!(
        out,
        "  {} {} ({} external, {} dangling)",
        "→".cyan(),
        plural(stats.references, "reference", "references"),
        stats.external,
        stats.dangling
    );
    let _ = writeln!(
        out,
        "  {} {}, {}",
        "→".cyan(),
        plural(report.summary.error_count, "error", "errors"),
        plural(report.summary.warning_count, "warning", "warnings")
    );
    for diagnostic in report.diagnostics {
        write_diagnostic(&mut out, "    ", diagnostic);
    }
    if !report.skipped.is_empty() {
        let _ = writeln!(out, "{}", "Skipped members:".yellow().bold());
        for skipped in report.skipped {
            let _ = writeln!(out, "  {}: {}", skipped.path, skipped.message);
        }
    }
    out
}

pub fn render_refs_text(report: &RefsReport<'_>) -> String {
    let mut out = String::new();
    match report.record {
        Some(record) => {
            let _ = writeln!(
                out,
                "{} {} ({}, {:?})",
                report.id.to_string().bold(),
                record
                    .source_path
                    .as_deref()
                    .unwrap_or("no document"),
                record.kind,
                report.resolution
            );
        }
        None => {
            let _ = writeln!(out, "{} ({:?})", report.id.to_string().bold(), report.resolution);
        }
    }

    let _ = writeln!(out, "  {}", "outgoing:".cyan());
    if report.outgoing.is_empty() {
        let _ = writeln!(out, "    (none)");
    }
    for reference in report.outgoing {
        let _ = writeln!(
            out,
            "    → {} via {} [{:?}]",
            reference.target, reference.label, reference.scope
        );
    }

    let _ = writeln!(out, "  {}", "incoming:".cyan());
    if report.incoming.is_empty() {
        let _ = writeln!(out, "    (none)");
    }
    for reference in report.incoming {
        let _ = writeln!(
            out,
            "    ← {} via {} ({})",
            reference.source_id, reference.label, reference.source_path
        );
    }
    out
}

fn write_rejected(out: &mut String, rejected: &[RejectedChange]) {
    if rejected.is_empty() {
        return;
    }
    let _ = writeln!(out, "{}", "Rejected requests:".red().bold());
    for change in rejected {
        let _ = writeln!(out, "  #{} {}", change.index, describe_request(&change.request));
        for diagnostic in &change.diagnostics {
            write_diagnostic(out, "    ", diagnostic);
        }
    }
}

pub fn render_plan_text(report: &PlanReport<'_>) -> String {
    let mut out = String::new();
    match &report.outcome {
        PlanOutcome::Planned { plan } => {
            let total = plan.steps.len() + plan.rejected.len();
            let _ = writeln!(
                out,
                "{} {} of {}",
                "Planned".green().bold(),
                plan.steps.len(),
                plural(total, "change", "changes")
            );
            for step in &plan.steps {
                let _ = writeln!(
                    out,
                    "  {:>3}. #{} {} [{}]",
                    step.step + 1,
                    step.index,
                    describe_request(&step.request),
                    step.class
                );
                if !step.after.is_empty() {
                    let after: Vec<String> = step.after.iter().map(|i| format!("#{i}")).collect();
                    let _ = writeln!(out, "       after {}", after.join(", "));
                }
            }
            write_rejected(&mut out, &plan.rejected);
        }
        PlanOutcome::Rejected { rejection } => {
            let _ = writeln!(out, "{}", "Change plan rejected".red().bold());
            for diagnostic in rejection.diagnostics.iter().filter(|d| {
                matches!(d, Diagnostic::CircularChangeDependency { .. })
            }) {
                write_diagnostic(&mut out, "  ", diagnostic);
            }
            write_rejected(&mut out, &rejection.rejected);
        }
    }
    out
}
