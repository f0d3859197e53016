//! JSON report files.
//!
//! Reports live at fixed paths and are overwritten on every write. Writes go
//! through a sibling temporary file and a rename so a reader never observes a
//! half-written report.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::ReportError;

/// Writes `value` as pretty-printed UTF-8 JSON to `path`, replacing any
/// previous content. Parent directories are created as needed.
pub fn write_pretty<T: Serialize>(path: &Path, value: &T) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| ReportError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let json = serde_json::to_string_pretty(value)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    fs::write(tmp_path, json).map_err(|source| ReportError::Io {
        path: tmp_path.to_path_buf(),
        source,
    })?;
    fs::rename(tmp_path, path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    debug!("Wrote report to {}", path.display());
    Ok(())
}

/// Reads a JSON report from `path`.
///
/// # Errors
///
/// Returns `ReportError::NotFound` if the file does not exist and
/// `ReportError::Json` if it cannot be parsed.
pub fn read<T: DeserializeOwned>(path: &Path) -> Result<T, ReportError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ReportError::NotFound(path.to_path_buf()))
        }
        Err(source) => {
            return Err(ReportError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    Ok(serde_json::from_str(&content)?)
}
