//! Cross-platform filesystem helpers
//!
//! - `normalize_path`: strips the Windows `\\?\` prefix from canonicalized paths
//! - `atomic_replace`: temp-file + rename replacement (Windows needs an explicit delete)
//! - `modtime_ms` / `creationtime_ms`: stat times as epoch milliseconds
//! - `node_stat`: build a [`NodeStat`](crate::descriptor::NodeStat) for a path

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::descriptor::NodeStat;
use crate::error::{Result, WorkspaceError};

/// Normalize Windows paths by removing the `\\?\` prefix if present.
///
/// `Path::canonicalize()` on Windows returns extended-length paths that
/// break string comparison and shard hashing. No-op on Unix.
pub fn normalize_path(path: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        let s = path.to_string_lossy();
        if let Some(stripped) = s.strip_prefix(r"\\?\UNC\") {
            return PathBuf::from(format!(r"\\{}", stripped));
        }
        if let Some(stripped) = s.strip_prefix(r"\\?\") {
            return PathBuf::from(stripped);
        }
    }
    path.to_path_buf()
}

/// Write `contents` to `dst` through a sibling temp file and a rename.
///
/// Readers never observe a half-written file; on Windows the existing
/// target is deleted first because rename will not replace it.
pub fn atomic_replace(dst: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp = dst.with_extension("tmp~");
    fs::write(&tmp, contents)?;
    #[cfg(windows)]
    {
        if dst.exists() {
            fs::remove_file(dst)?;
        }
    }
    fs::rename(&tmp, dst)
}

fn system_time_ms(t: SystemTime) -> i64 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Modification time of `path` as epoch milliseconds
pub fn modtime_ms(path: &Path) -> Result<i64> {
    let meta = fs::metadata(path).map_err(|e| WorkspaceError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(meta.modified().map(system_time_ms).unwrap_or(0))
}

/// Creation time of `path` as epoch milliseconds
///
/// Filesystems without birth-time support fall back to the modification time.
pub fn creationtime_ms(path: &Path) -> Result<i64> {
    let meta = fs::metadata(path).map_err(|e| WorkspaceError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    let created = meta
        .created()
        .or_else(|_| meta.modified())
        .map(system_time_ms)
        .unwrap_or(0);
    Ok(created)
}

/// Build the shared stat fields for `path`
pub fn node_stat(path: &Path) -> Result<NodeStat> {
    let meta = fs::metadata(path).map_err(|e| WorkspaceError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    let modtime = meta.modified().map(system_time_ms).unwrap_or(0);
    let creationtime = meta
        .created()
        .or_else(|_| meta.modified())
        .map(system_time_ms)
        .unwrap_or(modtime);

    let mut stat = NodeStat::default();
    stat.relocate(path);
    stat.size = meta.len();
    stat.modtime = modtime;
    stat.creationtime = creationtime;
    Ok(stat)
}
