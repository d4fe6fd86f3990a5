//! JSON file helpers shared by the file-backed stores

use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::StoreResult;

/// Write `value` as pretty JSON, replacing `path` atomically.
///
/// The document is written to a sibling temp file, flushed, and renamed over
/// the target so readers never observe a half-written file.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_vec_pretty(value)?;
    let tmp = temp_path(path);

    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }

    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a file if it exists. `Ok(None)` means there is no file yet.
pub fn read_if_exists(path: &Path) -> StoreResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
