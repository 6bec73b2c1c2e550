use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::model::{ChangeEvent, ChangeReport, ChangeStatus, ReportSummary, Severity};

pub const DEFAULT_SLA_HOURS: u32 = 168;

pub fn sla_hours(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 24,
        Severity::Major => 72,
        Severity::Minor => DEFAULT_SLA_HOURS,
    }
}

pub fn sla_hours_for_label(label: &str) -> u32 {
    Severity::parse(label)
        .map(sla_hours)
        .unwrap_or(DEFAULT_SLA_HOURS)
}

pub fn eta(detected_at: DateTime<Utc>, severity: Severity) -> DateTime<Utc> {
    detected_at + TimeDelta::hours(i64::from(sla_hours(severity)))
}

pub fn is_overdue(event: &ChangeEvent, now: DateTime<Utc>) -> bool {
    event.status == ChangeStatus::New && now > event.eta
}

pub fn pending(events: &[ChangeEvent]) -> Vec<&ChangeEvent> {
    events
        .iter()
        .filter(|event| event.status == ChangeStatus::New)
        .collect()
}

pub fn overdue(events: &[ChangeEvent], now: DateTime<Utc>) -> Vec<&ChangeEvent> {
    events
        .iter()
        .filter(|event| is_overdue(event, now))
        .collect()
}

/// Pending events whose deadline falls inside `(now, now + window]`.
pub fn due_soon(events: &[ChangeEvent], now: DateTime<Utc>, window: TimeDelta) -> Vec<&ChangeEvent> {
    events
        .iter()
        .filter(|event| event.status == ChangeStatus::New)
        .filter(|event| event.eta > now && event.eta - now <= window)
        .collect()
}

pub fn build_report(events: &[ChangeEvent], now: DateTime<Utc>) -> ChangeReport {
    let total_changes = events.len();
    let pending_changes = pending(events).len();
    let overdue_changes = overdue(events, now).len();

    let mut severity_breakdown: BTreeMap<String, usize> = Severity::ALL
        .iter()
        .map(|severity| (severity.as_str().to_string(), 0))
        .collect();
    let mut status_breakdown: BTreeMap<String, usize> = ChangeStatus::ALL
        .iter()
        .map(|status| (status.as_str().to_string(), 0))
        .collect();
    let mut source_breakdown = BTreeMap::<String, usize>::new();

    for event in events {
        *severity_breakdown
            .entry(event.severity.as_str().to_string())
            .or_default() += 1;
        *status_breakdown
            .entry(event.status.as_str().to_string())
            .or_default() += 1;
        *source_breakdown.entry(event.source.clone()).or_default() += 1;
    }

    ChangeReport {
        summary: ReportSummary {
            total_changes,
            pending_changes,
            overdue_changes,
            // Acknowledged events count as resolved here.
            resolved_changes: total_changes - pending_changes,
        },
        severity_breakdown,
        status_breakdown,
        source_breakdown,
        generated_at: now,
    }
}
