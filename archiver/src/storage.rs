use chrono::NaiveDateTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::target::FetchTarget;

/// Sortable, second-resolution run stamp used in archive file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub const FILE_MODE: u32 = 0o644;
pub const DIR_MODE: u32 = 0o755;

pub fn format_timestamp(at: &NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// `root/<name>/<canonical_relative_path>`
pub fn canonical_path(root: &Path, target: &FetchTarget) -> PathBuf {
    root.join(&target.name).join(&target.canonical_relative_path)
}

/// Inserts the stamp before the extension: `panel.png` -> `panel_20250115_060000.png`.
/// Names without an extension get the stamp appended.
pub fn archive_file_name(file_name: &str, timestamp: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}_{}.{}", stem, timestamp, ext),
        _ => format!("{}_{}", file_name, timestamp),
    }
}

/// Sibling of the canonical file carrying the run stamp.
pub fn archive_path(canonical: &Path, timestamp: &str) -> PathBuf {
    let file_name = canonical
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    canonical.with_file_name(archive_file_name(&file_name, timestamp))
}

/// Creates the target directory (and any parents) and makes it traversable.
/// Succeeds when the directory already exists.
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    set_mode(dir, DIR_MODE)
}

/// Creates `dir` below `base` and makes every level from `base` down to `dir`
/// traversable, so nested canonical paths do not inherit the process umask.
pub fn ensure_dir_under(base: &Path, dir: &Path) -> io::Result<()> {
    ensure_dir(base)?;
    fs::create_dir_all(dir)?;
    for level in dir.ancestors().take_while(|level| *level != base) {
        set_mode(level, DIR_MODE)?;
    }
    Ok(())
}

/// Writes `body` to `path`, replacing any existing file, then sets read permissions.
pub fn write_file(path: &Path, body: &[u8]) -> io::Result<()> {
    fs::write(path, body)?;
    set_mode(path, FILE_MODE)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
