use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

use crate::error::ReconcileError;

/// Anything that can hand over one raw schema document.
pub trait SchemaSource {
    fn fetch_document(&self) -> Result<Value, ReconcileError>;
}

impl<F> SchemaSource for F
where
    F: Fn() -> Result<Value, ReconcileError>,
{
    fn fetch_document(&self) -> Result<Value, ReconcileError> {
        self()
    }
}

/// A raw document already saved to disk by an upstream fetcher.
#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    path: PathBuf,
}

impl FileSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

impl SchemaSource for FileSource {
    fn fetch_document(&self) -> Result<Value, ReconcileError> {
        let unavailable = |reason: String| ReconcileError::SourceUnavailable {
            name: self.name.clone(),
            reason,
        };

        let raw = fs::read(&self.path)
            .map_err(|err| unavailable(format!("{}: {err}", self.path.display())))?;
        serde_json::from_slice(&raw)
            .map_err(|err| unavailable(format!("{} is not JSON: {err}", self.path.display())))
    }
}

pub struct RegisteredSource {
    pub tag: String,
    pub adapter: Box<dyn SchemaSource>,
}

impl RegisteredSource {
    pub fn new(tag: impl Into<String>, adapter: impl SchemaSource + 'static) -> Self {
        Self {
            tag: tag.into(),
            adapter: Box::new(adapter),
        }
    }
}

/// One `FileSource` per `*.json` file in `raw_dir`, tagged by file stem and
/// sorted by tag.
pub fn discover_file_sources(raw_dir: &Path) -> Result<Vec<RegisteredSource>> {
    let entries =
        fs::read_dir(raw_dir).with_context(|| format!("failed to read {}", raw_dir.display()))?;

    let mut found = Vec::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", raw_dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty() && !stem.starts_with('.'))
            .map(ToOwned::to_owned);

        if let (true, Some(tag)) = (is_json, stem) {
            found.push((tag, path));
        }
    }

    found.sort();
    Ok(found
        .into_iter()
        .map(|(tag, path)| {
            let adapter = FileSource::new(tag.clone(), path);
            RegisteredSource::new(tag, adapter)
        })
        .collect())
}
