//! Atomic write primitives
//!
//! Uses temp→rename pattern to ensure readers never see a partial file or a
//! missing pointer.

use crate::errors::{io_error, Result};
use std::fs;
use std::path::Path;

/// Atomically write bytes to a file
///
/// Uses temp file + rename to ensure atomic write
pub fn atomic_write(target_path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = target_path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error("create_marker_dir", e))?;
    }

    let temp_path = temp_sibling(target_path);
    fs::write(&temp_path, content).map_err(|e| io_error("write_marker_temp", e))?;
    fs::rename(&temp_path, target_path).map_err(|e| io_error("rename_marker_temp", e))?;

    Ok(())
}

/// Atomically point the symlink `link` at `target`
///
/// The new link is created under a temporary name and renamed over `link`,
/// so `link` always resolves to either the old or the new target.
pub fn atomic_symlink(target: &Path, link: &Path) -> Result<()> {
    let temp_path = temp_sibling(link);
    match fs::remove_file(&temp_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_error("remove_stale_link_temp", e)),
    }
    std::os::unix::fs::symlink(target, &temp_path)
        .map_err(|e| io_error("create_link_temp", e))?;
    fs::rename(&temp_path, link).map_err(|e| io_error("rename_link_temp", e))?;
    Ok(())
}

fn temp_sibling(path: &Path) -> std::path::PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}
