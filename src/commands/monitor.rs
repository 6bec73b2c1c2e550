use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use tracing::{info, warn};

use crate::cli::MonitorArgs;
use crate::detect::detect_changes;
use crate::model::{ChangeEvent, ChangeReport, SchemaDocument, Severity};
use crate::sla;
use crate::store::{MonitorPaths, MonitorStore};
use crate::util::read_json_optional;

pub fn run(args: MonitorArgs) -> Result<()> {
    let schemas_dir = args.schemas_dir();
    let paths = MonitorPaths::in_dir(&args.monitoring_dir());
    let reminder_window = TimeDelta::hours(i64::from(args.sla_reminder_hours));

    info!(schemas_dir = %schemas_dir.display(), "monitor started");
    let report = monitor_schemas(&schemas_dir, paths, Utc::now(), reminder_window)?;
    info!(
        total = report.summary.total_changes,
        pending = report.summary.pending_changes,
        "monitor completed"
    );
    Ok(())
}

/// One monitoring pass: detect against stored snapshots, persist, and report.
pub fn monitor_schemas(
    schemas_dir: &Path,
    paths: MonitorPaths,
    now: DateTime<Utc>,
    reminder_window: TimeDelta,
) -> Result<ChangeReport> {
    let documents = load_schema_documents(schemas_dir)?;
    let mut store = MonitorStore::load(paths)?;

    let mut detected = Vec::new();
    for (source, document) in documents {
        if let Some(error) = document.error.as_deref() {
            warn!(source = %source, error = %error, "extraction failed; keeping prior snapshot");
            continue;
        }

        let detection = detect_changes(&source, &document, store.prior(&source), now)?;
        if !detection.changed {
            info!(source = %source, "schema unchanged");
            continue;
        }

        detected.extend(detection.events.iter().cloned());
        store.record(&source, document, detection, now);
    }

    alert_critical(&detected);
    store.save()?;
    info!(
        tracked_sources = store.history().len(),
        new_events = detected.len(),
        "monitoring store saved"
    );

    let report = sla::build_report(store.change_log(), now);
    store.write_report(&report)?;
    info!(path = %store.paths().report.display(), "wrote change report");

    log_daily_summary(&report);
    remind_due_soon(store.change_log(), now, reminder_window);

    Ok(report)
}

/// Every readable `<source>_schema.json` in `schemas_dir`, sorted by source tag.
pub fn load_schema_documents(schemas_dir: &Path) -> Result<Vec<(String, SchemaDocument)>> {
    let pattern = Regex::new(r"^(.+)_schema\.json$").context("failed to compile schema regex")?;

    let entries = fs::read_dir(schemas_dir)
        .with_context(|| format!("failed to read {}", schemas_dir.display()))?;

    let mut found: Vec<(String, PathBuf)> = Vec::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", schemas_dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let stem = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| pattern.captures(name))
            .and_then(|captures| captures.get(1))
            .map(|stem| stem.as_str().to_string());
        if let Some(stem) = stem {
            found.push((stem, path));
        }
    }
    found.sort();

    let mut documents = Vec::with_capacity(found.len());
    for (stem, path) in found {
        // An unreadable schema skips that source only; its prior snapshot stays.
        let document = match read_json_optional::<SchemaDocument>(&path) {
            Ok(Some(document)) => document,
            Ok(None) => continue,
            Err(err) => {
                warn!(
                    source = %stem,
                    path = %path.display(),
                    error = %format!("{err:#}"),
                    "skipping unreadable schema document"
                );
                continue;
            }
        };
        let source = if document.source.is_empty() {
            stem
        } else {
            document.source.clone()
        };
        documents.push((source, document));
    }

    Ok(documents)
}

fn alert_critical(events: &[ChangeEvent]) {
    for event in events
        .iter()
        .filter(|event| event.severity == Severity::Critical)
    {
        warn!(
            id = %event.id,
            source = %event.source,
            change = event.change_type.as_str(),
            attribute = %event.attribute,
            eta = %event.eta,
            "critical schema change"
        );
    }
}

fn log_daily_summary(report: &ChangeReport) {
    let breakdown = &report.severity_breakdown;
    info!(
        total = report.summary.total_changes,
        pending = report.summary.pending_changes,
        overdue = report.summary.overdue_changes,
        resolved = report.summary.resolved_changes,
        critical = breakdown.get("critical").copied().unwrap_or(0),
        major = breakdown.get("major").copied().unwrap_or(0),
        minor = breakdown.get("minor").copied().unwrap_or(0),
        "daily change summary"
    );
}

fn remind_due_soon(events: &[ChangeEvent], now: DateTime<Utc>, window: TimeDelta) {
    for event in sla::due_soon(events, now, window) {
        info!(
            id = %event.id,
            severity = %event.severity,
            hours_left = (event.eta - now).num_hours(),
            "sla deadline approaching"
        );
    }
    for event in sla::overdue(events, now) {
        warn!(id = %event.id, severity = %event.severity, eta = %event.eta, "sla overdue");
    }
}
