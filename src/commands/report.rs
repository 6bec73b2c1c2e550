use std::collections::BTreeMap;
use std::io::{self, Write};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::cli::ReportArgs;
use crate::model::{ChangeEvent, ChangeReport};
use crate::sla;
use crate::store::{MonitorPaths, MonitorStore};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportResponse<'a> {
    report: &'a ChangeReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending: Option<Vec<&'a ChangeEvent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    overdue: Option<Vec<&'a ChangeEvent>>,
}

pub fn run(args: ReportArgs) -> Result<()> {
    let store = MonitorStore::load(MonitorPaths::in_dir(&args.monitoring_dir()))?;
    let now = Utc::now();
    let report = sla::build_report(store.change_log(), now);

    info!(events = store.change_log().len(), "report requested");

    let response = ReportResponse {
        report: &report,
        pending: args.pending.then(|| sla::pending(store.change_log())),
        overdue: args.overdue.then(|| sla::overdue(store.change_log(), now)),
    };

    if args.json {
        write_json_response(&response)
    } else {
        write_text_response(&response, now)
    }
}

fn write_json_response(response: &ReportResponse<'_>) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, response)
        .context("failed to serialize report json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_response(response: &ReportResponse<'_>, now: DateTime<Utc>) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    let report = response.report;

    writeln!(output, "Generated: {}", report.generated_at.to_rfc3339())?;
    writeln!(
        output,
        "Changes: total={} pending={} overdue={} resolved={}",
        report.summary.total_changes,
        report.summary.pending_changes,
        report.summary.overdue_changes,
        report.summary.resolved_changes,
    )?;
    writeln!(output, "By severity: {}", format_severity_breakdown(&report.severity_breakdown))?;
    writeln!(output, "By status: {}", format_breakdown(&report.status_breakdown))?;
    writeln!(output, "By source: {}", format_breakdown(&report.source_breakdown))?;

    if let Some(pending) = &response.pending {
        writeln!(output, "Pending: {}", pending.len())?;
        for event in pending {
            writeln!(output, "{}", format_event(event, now))?;
        }
    }
    if let Some(overdue) = &response.overdue {
        writeln!(output, "Overdue: {}", overdue.len())?;
        for event in overdue {
            writeln!(output, "{}", format_event(event, now))?;
        }
    }

    output.flush()?;
    Ok(())
}

fn format_breakdown(counts: &BTreeMap<String, usize>) -> String {
    if counts.is_empty() {
        return "(none)".to_string();
    }
    counts
        .iter()
        .map(|(key, count)| format!("{key}={count}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_severity_breakdown(counts: &BTreeMap<String, usize>) -> String {
    counts
        .iter()
        .map(|(severity, count)| {
            format!("{severity}={count} (sla {}h)", sla::sla_hours_for_label(severity))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_event(event: &ChangeEvent, now: DateTime<Utc>) -> String {
    let property = event
        .property
        .map(|property| format!(".{}", property.as_str()))
        .unwrap_or_default();
    let deadline = if sla::is_overdue(event, now) {
        format!("overdue by {}h", (now - event.eta).num_hours())
    } else {
        format!("eta {}", event.eta.to_rfc3339())
    };

    format!(
        "\t{}\t{}\t{}\t{}{}\t{}",
        event.id,
        event.severity,
        event.change_type.as_str(),
        event.attribute,
        property,
        deadline
    )
}
