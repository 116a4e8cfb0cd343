//! Configuration snapshot consumed by the mirror and parsers
//!
//! The mirror never reads ambient global state: it is constructed with a
//! [`ConfigProvider`] handle and pulls a fresh [`WorkspaceConfig`] snapshot
//! at the start of every operation, so configuration edits take effect
//! without a reload.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkspaceError};

/// How a markdown file is titled for display and name-sorting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayName {
    /// Raw file name
    Filename,
    /// First level-1 heading, falling back to the file name
    Heading,
    /// Frontmatter `title`, falling back to the file name
    Title,
}

/// String collation used by name sorting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collation {
    /// Numeric-aware, case-insensitive ("file2" before "file10")
    Natural,
    /// Plain case-insensitive lexicographic
    Ascii,
}

/// Configuration values the mirror re-reads per operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Regex for Zettelkasten-style identifiers (first match wins)
    pub id_pattern: String,

    /// Opening delimiter of internal links
    pub link_start: String,

    /// Closing delimiter of internal links
    pub link_end: String,

    /// Whether directories sort before files
    pub sort_folders_first: bool,

    /// Collation used for name comparisons
    pub collation: Collation,

    /// Display-name policy for markdown files
    pub display_name: DisplayName,

    /// Time sorting compares creation time instead of modification time
    pub sort_by_creation_time: bool,

    /// Use the polling watcher instead of native events
    pub watcher_polling: bool,

    /// Poll interval / stability threshold in milliseconds (polling mode)
    pub watcher_stability_ms: u64,

    /// Hard-delete when moving to the system trash fails
    pub delete_on_trash_failure: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            id_pattern: r"\d{14}".to_string(),
            link_start: "[[".to_string(),
            link_end: "]]".to_string(),
            sort_folders_first: true,
            collation: Collation::Natural,
            display_name: DisplayName::Filename,
            sort_by_creation_time: false,
            watcher_polling: false,
            watcher_stability_ms: 1000,
            delete_on_trash_failure: false,
        }
    }
}

impl WorkspaceConfig {
    /// Compile the configured identifier pattern
    pub fn id_regex(&self) -> Result<Regex> {
        Regex::new(&self.id_pattern).map_err(|_| WorkspaceError::BadIdPattern {
            pattern: self.id_pattern.clone(),
        })
    }
}

/// Source of configuration snapshots
///
/// Implemented by the embedding application; [`StaticConfig`] serves tests
/// and the CLI, which have no live settings store.
pub trait ConfigProvider: Send + Sync {
    /// Current configuration values
    fn snapshot(&self) -> WorkspaceConfig;
}

/// Fixed configuration, handed out unchanged on every read
pub struct StaticConfig(pub WorkspaceConfig);

impl ConfigProvider for StaticConfig {
    fn snapshot(&self) -> WorkspaceConfig {
        self.0.clone()
    }
}

/// Convenience constructor for a default static provider
pub fn default_provider() -> Arc<dyn ConfigProvider> {
    Arc::new(StaticConfig(WorkspaceConfig::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_id_pattern_compiles() {
        let config = WorkspaceConfig::default();
        let re = config.id_regex().unwrap();
        assert!(re.is_match("20240101123050"));
        assert!(!re.is_match("not-an-id"));
    }

    #[test]
    fn test_bad_id_pattern_is_reported() {
        let config = WorkspaceConfig {
            id_pattern: "([unclosed".to_string(),
            ..WorkspaceConfig::default()
        };
        assert!(matches!(
            config.id_regex(),
            Err(WorkspaceError::BadIdPattern { .. })
        ));
    }

    #[test]
    fn test_static_provider_returns_snapshot() {
        let provider = StaticConfig(WorkspaceConfig {
            sort_folders_first: false,
            ..WorkspaceConfig::default()
        });
        assert!(!provider.snapshot().sort_folders_first);
    }
}
