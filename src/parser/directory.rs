//! Directory parser and settings sidecar handling
//!
//! The parser reads one directory level; recursing into child directories
//! is the orchestrator's job, one level at a time per child. Settings live
//! in a per-directory JSON sidecar that only exists while the settings
//! differ from the defaults.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::descriptor::{DirSettings, Directory};
use crate::error::{Result, WorkspaceError};
use crate::fs_utils::{self, atomic_replace};
use crate::util::merge_within_template;

/// Reserved sidecar file name; the watcher collapses events on this file
/// into a `Change` for its directory
pub const SETTINGS_FILE: &str = ".quill-directory.json";

/// Entries never mirrored as children
fn is_hidden_entry(name: &str) -> bool {
    name.starts_with('.')
}

/// Read one directory level.
///
/// Returns the descriptor (children empty, settings loaded, git flag set)
/// and the child paths for the orchestrator to recurse into. Entries are
/// returned in on-disk order; sorting happens after the children load.
pub fn parse(path: &Path) -> Result<(Directory, Vec<PathBuf>)> {
    let stat = fs_utils::node_stat(path)?;

    let mut children = Vec::new();
    let mut is_git_repository = false;
    let entries = fs::read_dir(path).map_err(|e| WorkspaceError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name == ".git" {
            is_git_repository = true;
            continue;
        }
        if is_hidden_entry(&name) {
            continue;
        }
        children.push(entry.path());
    }

    let dir = Directory {
        stat,
        children: Vec::new(),
        is_git_repository,
        settings: load_settings(path),
        not_found: false,
    };
    Ok((dir, children))
}

/// Load the settings sidecar, falling back to defaults.
///
/// The raw JSON is merged against the default template so partial or
/// over-full sidecars degrade instead of failing; malformed JSON is
/// discarded with a warning — settings never block a directory load.
pub fn load_settings(dir: &Path) -> DirSettings {
    let sidecar = dir.join(SETTINGS_FILE);
    let raw = match fs::read_to_string(&sidecar) {
        Ok(raw) => raw,
        Err(_) => return DirSettings::default(),
    };

    let parsed: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!("discarding malformed settings {}: {e}", sidecar.display());
            return DirSettings::default();
        }
    };

    let template =
        serde_json::to_value(DirSettings::default()).expect("default settings serialize");
    let merged = merge_within_template(&parsed, &template);
    match serde_json::from_value(merged) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("settings shape mismatch in {}: {e}", sidecar.display());
            DirSettings::default()
        }
    }
}

/// Persist directory settings, or delete the sidecar when they match the
/// defaults (default settings are never written to disk).
pub fn persist_settings(dir: &Path, settings: &DirSettings) -> Result<()> {
    let sidecar = dir.join(SETTINGS_FILE);
    if *settings == DirSettings::default() {
        match fs::remove_file(&sidecar) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(WorkspaceError::Write {
                    path: sidecar.display().to_string(),
                    source: e,
                })
            }
        }
        return Ok(());
    }

    let json = serde_json::to_vec_pretty(settings).expect("settings serialize");
    atomic_replace(&sidecar, &json).map_err(|e| WorkspaceError::Write {
        path: sidecar.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ProjectSettings, SortDirection, SortKey, SortMode};
    use tempfile::TempDir;

    #[test]
    fn test_parse_lists_children_and_skips_hidden() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "a").unwrap();
        fs::write(dir.path().join(".hidden"), "x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let (descriptor, children) = parse(dir.path()).unwrap();
        assert!(!descriptor.is_git_repository);
        assert!(descriptor.children.is_empty());

        let names: Vec<_> = children
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.contains(&"a.md".to_string()));
        assert!(names.contains(&"sub".to_string()));
        assert!(!names.iter().any(|n| n.starts_with('.')));
    }

    #[test]
    fn test_parse_detects_git_repository() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();

        let (descriptor, children) = parse(dir.path()).unwrap();
        assert!(descriptor.is_git_repository);
        assert!(children.is_empty());
    }

    #[test]
    fn test_settings_round_trip() {
        let dir = TempDir::new().unwrap();
        let settings = DirSettings {
            sorting: SortMode {
                key: SortKey::Time,
                direction: SortDirection::Descending,
            },
            project: Some(ProjectSettings::with_title("My Project")),
            icon: Some("book".to_string()),
        };

        persist_settings(dir.path(), &settings).unwrap();
        assert!(dir.path().join(SETTINGS_FILE).exists());
        assert_eq!(load_settings(dir.path()), settings);
    }

    #[test]
    fn test_default_settings_delete_sidecar() {
        let dir = TempDir::new().unwrap();
        let custom = DirSettings {
            icon: Some("star".to_string()),
            ..DirSettings::default()
        };
        persist_settings(dir.path(), &custom).unwrap();
        assert!(dir.path().join(SETTINGS_FILE).exists());

        persist_settings(dir.path(), &DirSettings::default()).unwrap();
        assert!(!dir.path().join(SETTINGS_FILE).exists());
    }

    #[test]
    fn test_malformed_sidecar_is_discarded() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SETTINGS_FILE), "{ nope").unwrap();
        assert_eq!(load_settings(dir.path()), DirSettings::default());
    }

    #[test]
    fn test_partial_sidecar_merges_against_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"icon": "leaf", "unknown_key": 5}"#,
        )
        .unwrap();

        let settings = load_settings(dir.path());
        assert_eq!(settings.icon.as_deref(), Some("leaf"));
        assert_eq!(settings.sorting, SortMode::default());
    }
}
