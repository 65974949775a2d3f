//! Retention sweep: keep only the newest rotated files of a stream

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Rotated files of one stream, newest first
pub fn list_rotated_files(
    dir: &Path,
    prefix: &str,
    suffix: &str,
) -> io::Result<Vec<(PathBuf, SystemTime)>> {
    let mut files: Vec<(PathBuf, SystemTime)> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            name.starts_with(prefix) && name.ends_with(suffix)
        })
        .filter_map(|entry| {
            entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok().map(|time| (entry.path(), time)))
        })
        .collect();

    // Sort by modification time (newest first)
    files.sort_by(|a, b| b.1.cmp(&a.1));
    Ok(files)
}

/// Delete all but the `keep` most recently modified files matching
/// `prefix`/`suffix` in `dir`. `protect` is never deleted.
///
/// Failures are reported and never propagated: a listing failure skips the
/// whole sweep, a deletion failure skips that file. Returns the number of
/// files removed.
pub fn sweep(dir: &Path, prefix: &str, suffix: &str, keep: usize, protect: Option<&Path>) -> usize {
    if keep == 0 {
        return 0;
    }

    let files = match list_rotated_files(dir, prefix, suffix) {
        Ok(files) => files,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "retention sweep skipped, cannot list log directory");
            return 0;
        }
    };

    let mut removed = 0;
    for (path, _) in files.into_iter().skip(keep) {
        if protect.is_some_and(|p| p == path) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed old log file");
                removed += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove old log file");
            }
        }
    }
    removed
}
