//! quillfs: workspace filesystem mirror with metadata extraction and search
//!
//! This library builds and maintains an in-memory mirror of user-selected
//! directories and files, keeps it consistent with the real filesystem via
//! change notifications, persists a sharded disk cache so unchanged files
//! are never re-parsed, extracts semantic metadata (tags, links,
//! identifiers, word counts, frontmatter) from text files, and answers
//! structured full-text search queries against the mirror.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use quillfs::{config, Mirror, MetadataCache};
//!
//! let mut mirror = Mirror::new(config::default_provider(), MetadataCache::default_dir());
//! mirror.load_path(Path::new("/home/user/notes"))?;
//! mirror.enable_watching()?;
//!
//! let stats = mirror.statistics();
//! println!("{} markdown files mirrored", stats.markdown_files);
//! # Ok::<(), quillfs::WorkspaceError>(())
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod fs_utils;
pub mod history;
pub mod mirror;
pub mod parser;
pub mod search;
pub mod sorter;
pub mod stats;
pub mod util;
pub mod watcher;

// Re-export commonly used types
pub use cache::{CacheStats, MetadataCache};
pub use config::{ConfigProvider, StaticConfig, WorkspaceConfig};
pub use descriptor::{
    CodeFile, Descriptor, DirSettings, Directory, Frontmatter, MdFile, NodeStat, OtherFile,
    ProjectSettings, SortDirection, SortKey, SortMode,
};
pub use error::{Result, WorkspaceError};
pub use history::{ChangeKind, HistoryEvent};
pub use mirror::Mirror;
pub use search::{LineMatch, SearchTerm, Span, TermOperator};
pub use stats::WorkspaceStats;
pub use watcher::{ChangeWatcher, WatchEvent, WatchEventKind};
