use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::detect::Detection;
use crate::error::ReconcileError;
use crate::model::{ChangeEvent, ChangeReport, SchemaDocument, SchemaSnapshot};
use crate::util::{read_json_optional, write_json_pretty};

pub const HISTORY_FILE: &str = "schema_history.json";
pub const CHANGE_LOG_FILE: &str = "change_log.json";
pub const REPORT_FILE: &str = "change_report.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorPaths {
    pub history: PathBuf,
    pub change_log: PathBuf,
    pub report: PathBuf,
}

impl MonitorPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            history: dir.join(HISTORY_FILE),
            change_log: dir.join(CHANGE_LOG_FILE),
            report: dir.join(REPORT_FILE),
        }
    }
}

/// Snapshot history and the append-only change log, held in memory between a
/// load and the next save.
#[derive(Debug)]
pub struct MonitorStore {
    paths: MonitorPaths,
    history: BTreeMap<String, SchemaSnapshot>,
    change_log: Vec<ChangeEvent>,
}

impl MonitorStore {
    /// Missing files start empty; unparseable files are an error.
    pub fn load(paths: MonitorPaths) -> Result<Self> {
        let history = read_json_optional(&paths.history)?.unwrap_or_default();
        let change_log: Vec<ChangeEvent> =
            read_json_optional(&paths.change_log)?.unwrap_or_default();

        debug!(
            history = %paths.history.display(),
            events = change_log.len(),
            "loaded monitoring store"
        );

        Ok(Self {
            paths,
            history,
            change_log,
        })
    }

    pub fn paths(&self) -> &MonitorPaths {
        &self.paths
    }

    pub fn history(&self) -> &BTreeMap<String, SchemaSnapshot> {
        &self.history
    }

    pub fn change_log(&self) -> &[ChangeEvent] {
        &self.change_log
    }

    pub fn prior(&self, source: &str) -> Option<&SchemaSnapshot> {
        self.history.get(source)
    }

    /// Stores the new snapshot when the content changed and appends its events.
    pub fn record(
        &mut self,
        source: &str,
        schema: SchemaDocument,
        detection: Detection,
        now: DateTime<Utc>,
    ) {
        if !detection.changed {
            return;
        }

        let snapshot = detection.snapshot(schema, now);
        self.history.insert(source.to_string(), snapshot);
        self.change_log.extend(detection.events);
    }

    pub fn update_status(
        &mut self,
        id: &str,
        target: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<&ChangeEvent, ReconcileError> {
        let event = self
            .change_log
            .iter_mut()
            .find(|event| event.id == id)
            .ok_or_else(|| ReconcileError::ChangeNotFound(id.to_string()))?;

        event.transition(target, now, notes)?;
        info!(id = %event.id, status = %event.status, "change status updated");
        Ok(event)
    }

    /// Events go to disk before the snapshots that would suppress them on a rerun.
    pub fn save(&self) -> Result<()> {
        self.save_change_log()?;
        write_json_pretty(&self.paths.history, &self.history)
    }

    pub fn save_change_log(&self) -> Result<()> {
        write_json_pretty(&self.paths.change_log, &self.change_log)
    }

    pub fn write_report(&self, report: &ChangeReport) -> Result<()> {
        write_json_pretty(&self.paths.report, report)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{TimeDelta, TimeZone};
    use serde_json::json;

    use super::*;
    use crate::detect::detect_changes;
    use crate::model::ChangeStatus;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap()
    }

    fn schema(attributes: serde_json::Value) -> SchemaDocument {
        SchemaDocument {
            attributes: serde_json::from_value(attributes).expect("attributes"),
            extracted_at: "2026-07-01T11:59:00Z".to_string(),
            source: "shopify_admin_api".to_string(),
            version: "2024-01".to_string(),
            error: None,
        }
    }

    #[test]
    fn record_and_save_round_trip_through_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = MonitorPaths::in_dir(&temp.path().join("monitoring"));

        let mut store = MonitorStore::load(paths.clone()).expect("empty load");
        assert!(store.history().is_empty());
        assert!(store.change_log().is_empty());

        let first = schema(json!([{"name": "title", "required": true}]));
        let detection = detect_changes("shopify_admin_api", &first, None, t0()).expect("detect");
        store.record("shopify_admin_api", first.clone(), detection, t0());
        store.save().expect("save");

        let reloaded = MonitorStore::load(paths).expect("reload");
        let snapshot = reloaded.prior("shopify_admin_api").expect("snapshot stored");
        assert_eq!(snapshot.schema, first);
        assert_eq!(snapshot.last_updated, t0());
        assert_eq!(reloaded.change_log().len(), 1);
    }

    #[test]
    fn unchanged_detection_keeps_the_original_snapshot() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut store = MonitorStore::load(MonitorPaths::in_dir(temp.path())).expect("load");

        let first = schema(json!([{"name": "title"}]));
        let detection = detect_changes("shopify_admin_api", &first, None, t0()).expect("detect");
        store.record("shopify_admin_api", first.clone(), detection, t0());

        let later = t0() + TimeDelta::hours(6);
        let again = detect_changes(
            "shopify_admin_api",
            &first,
            store.prior("shopify_admin_api"),
            later,
        )
        .expect("detect again");
        store.record("shopify_admin_api", first, again, later);

        assert_eq!(
            store.prior("shopify_admin_api").map(|s| s.last_updated),
            Some(t0())
        );
        assert_eq!(store.change_log().len(), 1);
    }

    #[test]
    fn update_status_reports_missing_ids_and_bad_transitions() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut store = MonitorStore::load(MonitorPaths::in_dir(temp.path())).expect("load");
        let first = schema(json!([{"name": "title", "required": true}]));
        let detection = detect_changes("shopify_admin_api", &first, None, t0()).expect("detect");
        let id = detection.events[0].id.clone();
        store.record("shopify_admin_api", first, detection, t0());

        let missing = store
            .update_status("nope", "resolved", None, t0())
            .expect_err("unknown id");
        assert!(matches!(missing, ReconcileError::ChangeNotFound(_)));

        let event = store
            .update_status(&id, "acknowledged", Some("looking"), t0())
            .expect("new -> acknowledged");
        assert_eq!(event.status, ChangeStatus::Acknowledged);
        assert_eq!(event.notes.as_deref(), Some("looking"));

        let rejected = store
            .update_status(&id, "new", None, t0())
            .expect_err("acknowledged -> new");
        assert!(matches!(
            rejected,
            ReconcileError::UnknownStatusTransition { .. }
        ));
        assert_eq!(store.change_log()[0].status, ChangeStatus::Acknowledged);
    }

    #[test]
    fn failed_change_log_write_leaves_history_untouched() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = MonitorPaths::in_dir(temp.path());
        let mut store = MonitorStore::load(paths.clone()).expect("load");

        let first = schema(json!([{"name": "title", "required": true}]));
        let detection = detect_changes("shopify_admin_api", &first, None, t0()).expect("detect");
        store.record("shopify_admin_api", first.clone(), detection, t0());

        fs::create_dir(&paths.change_log).expect("block change log path");
        store.save().expect_err("change log write fails");
        assert!(!paths.history.exists());
        fs::remove_dir(&paths.change_log).expect("unblock");

        // The next run still sees no snapshot, so the events are detected again.
        let reloaded = MonitorStore::load(paths).expect("reload");
        assert!(reloaded.prior("shopify_admin_api").is_none());
        let again = detect_changes(
            "shopify_admin_api",
            &first,
            reloaded.prior("shopify_admin_api"),
            t0(),
        )
        .expect("detect again");
        assert_eq!(again.events.len(), 1);
    }

    #[test]
    fn corrupt_history_is_not_replaced_with_an_empty_store() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = MonitorPaths::in_dir(temp.path());
        fs::write(&paths.history, b"{\"shopify_admin_api\": [").expect("write corrupt");

        let err = MonitorStore::load(paths.clone()).expect_err("corrupt store");
        assert!(matches!(
            err.downcast_ref::<ReconcileError>(),
            Some(ReconcileError::SerializationFailure { .. })
        ));
        assert_eq!(
            fs::read(&paths.history).expect("still on disk"),
            b"{\"shopify_admin_api\": ["
        );
    }
}
