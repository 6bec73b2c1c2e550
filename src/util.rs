use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use crate::error::ReconcileError;

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn sha256_hex(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    format!("{:x}", hasher.finalize())
}

/// Reads a JSON artifact, returning `None` when the file does not exist.
pub fn read_json_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let value = serde_json::from_slice(&raw)
        .map_err(|err| ReconcileError::serialization(path, err))
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Writes pretty JSON through a sibling temp file and renames it into place.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ensure_directory(parent)?;

    let mut data = serde_json::to_vec_pretty(value)
        .map_err(|err| ReconcileError::serialization(path, err))
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;
    data.push(b'\n');

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("invalid json target filename: {}", path.display()))?;
    let tmp_path = parent.join(format!(".{file_name}.tmp"));

    let written = write_and_sync(&tmp_path, &data).and_then(|()| {
        fs::rename(&tmp_path, path).map_err(|err| ReconcileError::serialization(path, err))
    });
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(err).with_context(|| format!("failed to write json file: {}", path.display()));
    }

    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}

fn write_and_sync(path: &Path, data: &[u8]) -> Result<(), ReconcileError> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|err| ReconcileError::serialization(path, err))?;
    file.write_all(data)
        .and_then(|()| file.sync_all())
        .map_err(|err| ReconcileError::serialization(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_json_pretty_replaces_existing_file_without_leaving_temp() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("artifact.json");

        write_json_pretty(&path, &json!({"version": 1})).expect("first write");
        write_json_pretty(&path, &json!({"version": 2})).expect("second write");

        let loaded: serde_json::Value = read_json_optional(&path)
            .expect("read")
            .expect("artifact present");
        assert_eq!(loaded["version"], 2);
        assert!(!path.with_file_name(".artifact.json.tmp").exists());
    }

    #[test]
    fn read_json_optional_reports_missing_and_corrupt_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("missing.json");
        let loaded: Option<serde_json::Value> = read_json_optional(&missing).expect("missing ok");
        assert!(loaded.is_none());

        let corrupt = temp.path().join("corrupt.json");
        fs::write(&corrupt, b"{not json").expect("write corrupt");
        let err = read_json_optional::<serde_json::Value>(&corrupt).expect_err("corrupt fails");
        assert!(err.downcast_ref::<ReconcileError>().is_some());
    }

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
