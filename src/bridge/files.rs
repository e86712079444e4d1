//! Plain file access for the UI

use crate::error::{BridgeError, Result};
use serde::Serialize;
use std::path::Path;

/// One directory entry as reported to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

pub fn save_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .map_err(|e| BridgeError::Io(e).with_context(format!("saving {}", path.display())))
}

pub fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| BridgeError::Io(e).with_context(format!("reading {}", path.display())))
}

/// Entries of `path`, sorted by name
pub fn list_directory(path: &Path) -> Result<Vec<DirEntry>> {
    let listing = std::fs::read_dir(path)
        .map_err(|e| BridgeError::Io(e).with_context(format!("listing {}", path.display())))?;

    let mut entries = Vec::new();
    for entry in listing {
        let entry = entry?;
        entries.push(DirEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: entry.file_type().map(|t| t.is_dir()).unwrap_or(false),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}
