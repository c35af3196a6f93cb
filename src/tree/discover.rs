use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{HaloError, Result};

/// `tree_*.dat` files directly inside `dir`, sorted by name.
pub fn tree_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let discovery_err = |reason: String| HaloError::TreeDiscovery {
        dir: dir.to_path_buf(),
        reason,
    };
    let entries = fs::read_dir(dir).map_err(|e| discovery_err(e.to_string()))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| discovery_err(e.to_string()))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("tree_")
            && name.ends_with(".dat")
            && entry.file_type().map(|t| !t.is_dir()).unwrap_or(false)
        {
            names.push(entry.path());
        }
    }
    if names.is_empty() {
        return Err(discovery_err("no files named tree_*.dat".to_string()));
    }
    names.sort();
    Ok(names)
}
