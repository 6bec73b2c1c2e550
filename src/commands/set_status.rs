use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use crate::cli::SetStatusArgs;
use crate::store::{MonitorPaths, MonitorStore};

pub fn run(args: SetStatusArgs) -> Result<()> {
    let mut store = MonitorStore::load(MonitorPaths::in_dir(&args.monitoring_dir()))?;

    let event = store
        .update_status(&args.id, &args.status, args.notes.as_deref(), Utc::now())
        .with_context(|| format!("failed to update change {}", args.id))?;
    info!(
        id = %event.id,
        source = %event.source,
        status = %event.status,
        "status transition applied"
    );

    store.save_change_log()?;
    info!(path = %store.paths().change_log.display(), "wrote change log");
    Ok(())
}
