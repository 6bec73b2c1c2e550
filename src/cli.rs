use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "schemaops",
    version,
    about = "Marketplace attribute schema reconciliation and change monitoring"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Extract(ExtractArgs),
    Monitor(MonitorArgs),
    Report(ReportArgs),
    SetStatus(SetStatusArgs),
    Diff(DiffArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(long, default_value = ".cache/schemaops")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub raw_dir: Option<PathBuf>,

    #[arg(long)]
    pub schemas_dir: Option<PathBuf>,

    #[arg(long)]
    pub mapping_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct MonitorArgs {
    #[arg(long, default_value = ".cache/schemaops")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub schemas_dir: Option<PathBuf>,

    #[arg(long)]
    pub monitoring_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 24)]
    pub sla_reminder_hours: u32,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[arg(long, default_value = ".cache/schemaops")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub monitoring_dir: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[arg(long, default_value_t = false)]
    pub pending: bool,

    #[arg(long, default_value_t = false)]
    pub overdue: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SetStatusArgs {
    #[arg(long, default_value = ".cache/schemaops")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub monitoring_dir: Option<PathBuf>,

    #[arg(long)]
    pub id: String,

    #[arg(long)]
    pub status: String,

    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DiffArgs {
    #[arg(long)]
    pub old: PathBuf,

    #[arg(long)]
    pub new: PathBuf,

    /// Source tag used in event ids; defaults to the new document's `source`.
    #[arg(long)]
    pub source: Option<String>,

    /// Treat both files as raw source documents and normalize them first.
    #[arg(long, default_value_t = false)]
    pub raw: bool,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl ExtractArgs {
    pub fn raw_dir(&self) -> PathBuf {
        self.raw_dir
            .clone()
            .unwrap_or_else(|| self.cache_root.join("raw"))
    }

    pub fn schemas_dir(&self) -> PathBuf {
        self.schemas_dir
            .clone()
            .unwrap_or_else(|| self.cache_root.join("schemas"))
    }
}

impl MonitorArgs {
    pub fn schemas_dir(&self) -> PathBuf {
        self.schemas_dir
            .clone()
            .unwrap_or_else(|| self.cache_root.join("schemas"))
    }

    pub fn monitoring_dir(&self) -> PathBuf {
        monitoring_dir(&self.cache_root, self.monitoring_dir.as_ref())
    }
}

impl ReportArgs {
    pub fn monitoring_dir(&self) -> PathBuf {
        monitoring_dir(&self.cache_root, self.monitoring_dir.as_ref())
    }
}

impl SetStatusArgs {
    pub fn monitoring_dir(&self) -> PathBuf {
        monitoring_dir(&self.cache_root, self.monitoring_dir.as_ref())
    }
}

fn monitoring_dir(cache_root: &std::path::Path, explicit: Option<&PathBuf>) -> PathBuf {
    explicit
        .cloned()
        .unwrap_or_else(|| cache_root.join("monitoring"))
}
