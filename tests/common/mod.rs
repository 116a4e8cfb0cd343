//! Shared test infrastructure
//!
//! Tests build temporary workspace structures with tempfile instead of
//! committing fixture trees to the repository.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use quillfs::{Mirror, StaticConfig, WorkspaceConfig};

/// Builder for temporary workspace structures
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    /// Create a new empty workspace
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    /// Workspace root path
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Add a file with the given relative path and content
    pub fn file(self, rel: &str, content: &str) -> Self {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dirs");
        }
        fs::write(&path, content).expect("failed to write fixture file");
        self
    }

    /// Add an empty directory with the given relative path
    pub fn dir(self, rel: &str) -> Self {
        fs::create_dir_all(self.dir.path().join(rel)).expect("failed to create dir");
        self
    }

    /// Absolute path of a relative entry
    pub fn join(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }
}

/// A mirror wired to a fresh cache directory and hard-delete fallback
/// (sandboxed CI has no trash daemon)
pub fn mirror_with_cache(cache: &TempDir) -> Mirror {
    let config = Arc::new(StaticConfig(WorkspaceConfig {
        delete_on_trash_failure: true,
        ..WorkspaceConfig::default()
    }));
    Mirror::new(config, cache.path())
}

/// Fresh temp dir for a cache
pub fn cache_dir() -> TempDir {
    TempDir::new().expect("failed to create cache dir")
}
