//! The mirror orchestrator
//!
//! Owns the descriptor tree, the metadata cache, the change history, and
//! the watcher. All mutations are serialized: a busy flag guards the tree
//! while a local operation runs, and watcher events buffered in the
//! meantime are drained strictly afterwards, one at a time, preserving a
//! single global ordering of tree mutations.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, MetadataCache};
use crate::config::{ConfigProvider, WorkspaceConfig};
use crate::descriptor::{Descriptor, DirSettings, Directory, ProjectSettings, SortMode};
use crate::error::{Result, WorkspaceError};
use crate::history::{ChangeKind, ChangeLog, HistoryEvent};
use crate::parser::{self, directory, markdown};
use crate::search::{LineMatch, SearchTerm};
use crate::sorter::sort_children;
use crate::stats::{self, WorkspaceStats};
use crate::util::merge_within_template;
use crate::watcher::{ChangeWatcher, WatchEvent, WatchEventKind};

/// In-memory mirror of the loaded roots
pub struct Mirror {
    config: Arc<dyn ConfigProvider>,
    cache: MetadataCache,
    roots: Vec<Descriptor>,
    open_directory: Option<PathBuf>,
    history: ChangeLog,
    watcher: Option<ChangeWatcher>,
    events_rx: Option<Receiver<WatchEvent>>,
    /// Remote events buffered while a mutation is in flight (FIFO)
    pending: VecDeque<WatchEvent>,
    /// A logical mutation is being applied
    busy: bool,
}

impl Mirror {
    /// Create a mirror with its cache at `cache_dir`. Watching starts
    /// disabled; call [`enable_watching`](Self::enable_watching).
    pub fn new(config: Arc<dyn ConfigProvider>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            cache: MetadataCache::new(cache_dir),
            roots: Vec::new(),
            open_directory: None,
            history: ChangeLog::new(),
            watcher: None,
            events_rx: None,
            pending: VecDeque::new(),
            busy: false,
        }
    }

    /// Attach the filesystem watcher and watch every loaded root
    pub fn enable_watching(&mut self) -> Result<()> {
        if self.watcher.is_some() {
            return Ok(());
        }
        let (tx, rx): (Sender<WatchEvent>, Receiver<WatchEvent>) = std::sync::mpsc::channel();
        let mut watcher = ChangeWatcher::spawn(&self.config.snapshot(), tx)?;
        for root in &self.roots {
            let path = root.path().to_path_buf();
            if path.exists() {
                watcher.watch_root(&path)?;
            }
        }
        self.watcher = Some(watcher);
        self.events_rx = Some(rx);
        Ok(())
    }

    // ========================================================================
    // Loading and unloading roots
    // ========================================================================

    /// Load a root path: a directory workspace (recursively) or a single
    /// file. A path that does not resolve becomes a "not found"
    /// placeholder replaced on a later rescan.
    pub fn load_path(&mut self, path: &Path) -> Result<()> {
        let path = crate::fs_utils::normalize_path(path);
        let path = if path.is_absolute() {
            path
        } else {
            std::env::current_dir().map(|d| d.join(&path)).unwrap_or(path)
        };
        if self.roots.iter().any(|r| r.path() == path) {
            debug!("root {} already loaded", path.display());
            return Ok(());
        }
        if self.find_any(&path).is_some() {
            debug!(
                "{} already mirrored inside a loaded workspace",
                path.display()
            );
            return Ok(());
        }

        let config = self.config.snapshot();
        self.busy = true;
        let loaded = self.load_root_descriptor(&path, &config);
        let descriptor = match loaded {
            Ok(descriptor) => descriptor,
            Err(e) => {
                self.busy = false;
                return Err(e);
            }
        };

        let not_found = matches!(&descriptor, Descriptor::Directory(d) if d.not_found);
        self.roots.push(descriptor);
        self.consolidate_roots();
        self.history.record(ChangeKind::Add, &path);

        if !not_found {
            if let Some(watcher) = &mut self.watcher {
                if let Err(e) = watcher.watch_root(&path) {
                    warn!("could not watch {}: {e}", path.display());
                }
            }
        }
        info!("loaded root {}", path.display());
        self.busy = false;
        self.process_events();
        Ok(())
    }

    /// Unload a root and everything below it
    pub fn unload_path(&mut self, path: &Path) -> Result<()> {
        let pos = self
            .roots
            .iter()
            .position(|r| r.path() == path)
            .ok_or_else(|| WorkspaceError::NotLoaded {
                path: path.display().to_string(),
            })?;

        self.busy = true;
        let removed = self.roots.remove(pos);
        if let Some(watcher) = &mut self.watcher {
            let _ = watcher.unwatch_root(path);
        }
        self.fix_open_directory_after_removal(removed.path());
        self.history.record(ChangeKind::Remove, path);
        self.busy = false;
        self.process_events();
        Ok(())
    }

    fn load_root_descriptor(&mut self, path: &Path, config: &WorkspaceConfig) -> Result<Descriptor> {
        if !path.exists() {
            info!("root {} not found, keeping placeholder", path.display());
            return Ok(Descriptor::Directory(Directory::missing_root(path)));
        }
        if path.is_dir() {
            self.load_directory_tree(path, config)
        } else {
            parser::parse_file(path, Some(&mut self.cache), config)
        }
    }

    /// Recursively load a directory, one level at a time per child
    fn load_directory_tree(&mut self, path: &Path, config: &WorkspaceConfig) -> Result<Descriptor> {
        let (mut dir, child_paths) = directory::parse(path)?;
        for child_path in child_paths {
            let child = if child_path.is_dir() {
                self.load_directory_tree(&child_path, config)
            } else {
                parser::parse_file(&child_path, Some(&mut self.cache), config)
            };
            match child {
                Ok(descriptor) => dir.children.push(descriptor),
                // A child vanishing mid-scan is not fatal to the directory
                Err(e) => warn!("skipping {}: {e}", child_path.display()),
            }
        }
        sort_children(&mut dir.children, dir.settings.sorting, config);
        Ok(Descriptor::Directory(dir))
    }

    /// A root file already contained in a loaded directory workspace must
    /// not exist twice; fold it into the workspace.
    fn consolidate_roots(&mut self) {
        let dir_roots: Vec<PathBuf> = self
            .roots
            .iter()
            .filter(|r| r.is_directory())
            .map(|r| r.path().to_path_buf())
            .collect();

        let mut folded: Vec<PathBuf> = Vec::new();
        self.roots.retain(|root| {
            let duplicated = root.is_file()
                && dir_roots
                    .iter()
                    .any(|dir| root.path() != dir && root.path().starts_with(dir));
            if duplicated {
                folded.push(root.path().to_path_buf());
            }
            !duplicated
        });

        for path in folded {
            debug!("root file {} folded into a workspace", path.display());
            if let Some(watcher) = &mut self.watcher {
                let _ = watcher.unwatch_root(&path);
            }
        }
    }

    /// Retry every "not found" placeholder root; a resolvable path is
    /// replaced by the real descriptor.
    pub fn rescan_missing_roots(&mut self) -> Result<()> {
        let missing: Vec<PathBuf> = self
            .roots
            .iter()
            .filter_map(|r| r.as_directory())
            .filter(|d| d.not_found && d.stat.path.exists())
            .map(|d| d.stat.path.clone())
            .collect();

        let config = self.config.snapshot();
        for path in missing {
            self.busy = true;
            let loaded = self.load_root_descriptor(&path, &config);
            match loaded {
                Ok(descriptor) => {
                    if let Some(slot) = self.roots.iter_mut().find(|r| r.path() == path) {
                        *slot = descriptor;
                        self.history.record(ChangeKind::Change, &path);
                        if let Some(watcher) = &mut self.watcher {
                            let _ = watcher.watch_root(&path);
                        }
                        info!("placeholder root {} is now available", path.display());
                    }
                }
                Err(e) => warn!("rescan of {} failed: {e}", path.display()),
            }
            self.busy = false;
        }
        self.process_events();
        Ok(())
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Find any descriptor by absolute path
    pub fn find_any(&self, path: &Path) -> Option<&Descriptor> {
        self.roots.iter().find_map(|r| r.find(path))
    }

    /// Find a file descriptor (markdown, code, or attachment) by path
    pub fn find_file(&self, path: &Path) -> Option<&Descriptor> {
        self.find_any(path).filter(|d| d.is_file())
    }

    /// Find a directory descriptor by path
    pub fn find_directory(&self, path: &Path) -> Option<&Descriptor> {
        self.find_any(path).filter(|d| d.is_directory())
    }

    /// Find a markdown file by identifier or (extension-less) file name
    pub fn find_exact(&self, query: &str) -> Option<&Descriptor> {
        let mut found: Option<&Descriptor> = None;
        for root in &self.roots {
            root.walk(&mut |node| {
                if found.is_some() {
                    return;
                }
                if let Some(md) = node.as_markdown() {
                    let stem = md.stat.name.rsplit_once('.').map(|(s, _)| s);
                    if md.id.as_deref() == Some(query)
                        || md.stat.name == query
                        || stem == Some(query)
                    {
                        found = Some(node);
                    }
                }
            });
            if found.is_some() {
                break;
            }
        }
        found
    }

    /// Every file descriptor in load order
    pub fn all_files(&self) -> Vec<&Descriptor> {
        let mut files = Vec::new();
        for root in &self.roots {
            root.walk(&mut |node| {
                if node.is_file() {
                    files.push(node);
                }
            });
        }
        files
    }

    /// Every tag with the paths of its owning files
    pub fn all_tags(&self) -> AHashMap<String, Vec<PathBuf>> {
        let mut tags: AHashMap<String, Vec<PathBuf>> = AHashMap::new();
        for root in &self.roots {
            root.walk(&mut |node| {
                if let Some(md) = node.as_markdown() {
                    for tag in &md.tags {
                        tags.entry(tag.clone())
                            .or_default()
                            .push(md.stat.path.clone());
                    }
                }
            });
        }
        tags
    }

    /// Loaded roots, in load order
    pub fn roots(&self) -> &[Descriptor] {
        &self.roots
    }

    /// The currently open directory (a non-owning path into the tree)
    pub fn open_directory(&self) -> Option<&Path> {
        self.open_directory.as_deref()
    }

    /// Point the open-directory reference at a loaded directory
    pub fn set_open_directory(&mut self, path: Option<&Path>) -> Result<()> {
        match path {
            None => {
                self.open_directory = None;
                Ok(())
            }
            Some(path) => {
                if self.find_directory(path).is_none() {
                    return Err(WorkspaceError::NotLoaded {
                        path: path.display().to_string(),
                    });
                }
                self.open_directory = Some(path.to_path_buf());
                Ok(())
            }
        }
    }

    // ========================================================================
    // File operations
    // ========================================================================

    /// Create a file inside a loaded directory and mirror it
    pub fn create_file(&mut self, dir_path: &Path, name: &str, content: &str) -> Result<PathBuf> {
        let config = self.config.snapshot();
        validate_name(name)?;
        self.ensure_directory(dir_path)?;

        let target = dir_path.join(name);
        if target.exists() {
            return Err(WorkspaceError::AlreadyExists {
                path: target.display().to_string(),
            });
        }

        self.busy = true;
        let outcome = (|| -> Result<()> {
            fs::write(&target, content).map_err(|e| WorkspaceError::Write {
                path: target.display().to_string(),
                source: e,
            })?;
            let descriptor = parser::parse_file(&target, Some(&mut self.cache), &config)?;
            self.attach_child(descriptor, &config)?;
            self.history.record(ChangeKind::Add, &target);
            Ok(())
        })();
        self.busy = false;
        self.process_events();
        outcome.map(|()| target)
    }

    /// Overwrite a mirrored file's content and re-derive its metadata
    pub fn save_file(&mut self, path: &Path, content: &str) -> Result<()> {
        let config = self.config.snapshot();
        self.busy = true;
        let outcome = (|| -> Result<()> {
            let node = self
                .roots
                .iter_mut()
                .find_map(|r| r.find_mut(path))
                .ok_or_else(|| WorkspaceError::NotLoaded {
                    path: path.display().to_string(),
                })?;
            match node {
                Descriptor::Markdown(md) => {
                    markdown::save(md, content, Some(&mut self.cache), &config)?
                }
                Descriptor::Code(code) => {
                    parser::code::save(code, content, Some(&mut self.cache))?
                }
                _ => {
                    return Err(WorkspaceError::WrongType {
                        path: path.display().to_string(),
                        message: "only markdown and code files can be saved".to_string(),
                    })
                }
            }
            self.resort_parent_of(path, &config);
            self.history.record(ChangeKind::Change, path);
            Ok(())
        })();
        self.busy = false;
        self.process_events();
        outcome
    }

    /// Rename a mirrored file in place; all derived metadata is recomputed
    pub fn rename_file(&mut self, path: &Path, new_name: &str) -> Result<PathBuf> {
        let config = self.config.snapshot();
        validate_name(new_name)?;

        let node = self.find_file(path).ok_or_else(|| WorkspaceError::NotLoaded {
            path: path.display().to_string(),
        })?;
        let new_path = node.dir().join(new_name);
        if new_path.exists() {
            return Err(WorkspaceError::AlreadyExists {
                path: new_path.display().to_string(),
            });
        }

        self.busy = true;
        let outcome = (|| -> Result<()> {
            fs::rename(path, &new_path).map_err(|e| WorkspaceError::Write {
                path: new_path.display().to_string(),
                source: e,
            })?;
            self.cache.delete(&path.to_string_lossy());
            self.detach(path);
            let descriptor = parser::parse_file(&new_path, Some(&mut self.cache), &config)?;
            self.attach_child(descriptor, &config)?;
            self.history.record(ChangeKind::Remove, path);
            self.history.record(ChangeKind::Add, &new_path);
            Ok(())
        })();
        self.busy = false;
        self.process_events();
        outcome.map(|()| new_path)
    }

    /// Remove a mirrored file: system trash first, then the configured
    /// fallback policy
    pub fn remove_file(&mut self, path: &Path) -> Result<()> {
        let config = self.config.snapshot();
        if self.find_file(path).is_none() {
            return Err(WorkspaceError::NotLoaded {
                path: path.display().to_string(),
            });
        }

        self.busy = true;
        let outcome = (|| -> Result<()> {
            delete_node(path, false, config.delete_on_trash_failure)?;
            self.detach(path);
            self.cache.delete(&path.to_string_lossy());
            self.history.record(ChangeKind::Remove, path);
            Ok(())
        })();
        self.busy = false;
        self.process_events();
        outcome
    }

    /// Move a file or directory into another loaded directory
    pub fn move_item(&mut self, src: &Path, dest_dir: &Path) -> Result<PathBuf> {
        let config = self.config.snapshot();
        if self.find_any(src).is_none() {
            return Err(WorkspaceError::NotLoaded {
                path: src.display().to_string(),
            });
        }
        self.ensure_directory(dest_dir)?;

        let name = src
            .file_name()
            .ok_or_else(|| WorkspaceError::InvalidName {
                name: src.display().to_string(),
            })?;
        let target = dest_dir.join(name);
        if target.exists() {
            return Err(WorkspaceError::AlreadyExists {
                path: target.display().to_string(),
            });
        }

        self.busy = true;
        let outcome = (|| -> Result<()> {
            fs::rename(src, &target).map_err(|e| WorkspaceError::Write {
                path: target.display().to_string(),
                source: e,
            })?;
            if let Some(old) = self.detach(src) {
                self.purge_cached_subtree(&old);
            }
            let descriptor = if target.is_dir() {
                self.load_directory_tree(&target, &config)?
            } else {
                parser::parse_file(&target, Some(&mut self.cache), &config)?
            };
            self.attach_child(descriptor, &config)?;
            self.relocate_open_directory(src, &target);
            self.history.record(ChangeKind::Remove, src);
            self.history.record(ChangeKind::Add, &target);
            Ok(())
        })();
        self.busy = false;
        self.process_events();
        outcome.map(|()| target)
    }

    // ========================================================================
    // Directory operations
    // ========================================================================

    /// Create a directory inside a loaded directory and mirror it
    pub fn create_directory(&mut self, parent: &Path, name: &str) -> Result<PathBuf> {
        let config = self.config.snapshot();
        validate_name(name)?;
        self.ensure_directory(parent)?;

        let target = parent.join(name);
        if target.exists() {
            return Err(WorkspaceError::AlreadyExists {
                path: target.display().to_string(),
            });
        }

        self.busy = true;
        let outcome = (|| -> Result<()> {
            fs::create_dir(&target).map_err(|e| WorkspaceError::Write {
                path: target.display().to_string(),
                source: e,
            })?;
            let descriptor = self.load_directory_tree(&target, &config)?;
            self.attach_child(descriptor, &config)?;
            self.history.record(ChangeKind::Add, &target);
            Ok(())
        })();
        self.busy = false;
        self.process_events();
        outcome.map(|()| target)
    }

    /// Rename a mirrored directory; the whole subtree is re-derived at the
    /// new location
    pub fn rename_directory(&mut self, path: &Path, new_name: &str) -> Result<PathBuf> {
        let config = self.config.snapshot();
        validate_name(new_name)?;

        let node = self
            .find_directory(path)
            .ok_or_else(|| WorkspaceError::NotLoaded {
                path: path.display().to_string(),
            })?;
        let is_root = self.roots.iter().any(|r| r.path() == path);
        let new_path = node.dir().join(new_name);
        if new_path.exists() {
            return Err(WorkspaceError::AlreadyExists {
                path: new_path.display().to_string(),
            });
        }

        self.busy = true;
        let outcome = (|| -> Result<()> {
            fs::rename(path, &new_path).map_err(|e| WorkspaceError::Write {
                path: new_path.display().to_string(),
                source: e,
            })?;
            if let Some(watcher) = &mut self.watcher {
                if is_root {
                    let _ = watcher.unwatch_root(path);
                }
            }
            if let Some(old) = self.detach(path) {
                self.purge_cached_subtree(&old);
            }
            let descriptor = self.load_directory_tree(&new_path, &config)?;
            if is_root {
                self.roots.push(descriptor);
                if let Some(watcher) = &mut self.watcher {
                    let _ = watcher.watch_root(&new_path);
                }
            } else {
                self.attach_child(descriptor, &config)?;
            }
            self.relocate_open_directory(path, &new_path);
            self.history.record(ChangeKind::Remove, path);
            self.history.record(ChangeKind::Add, &new_path);
            Ok(())
        })();
        self.busy = false;
        self.process_events();
        outcome.map(|()| new_path)
    }

    /// Remove a mirrored directory and its subtree
    pub fn remove_directory(&mut self, path: &Path) -> Result<()> {
        let config = self.config.snapshot();
        if self.find_directory(path).is_none() {
            return Err(WorkspaceError::NotLoaded {
                path: path.display().to_string(),
            });
        }

        self.busy = true;
        let outcome = (|| -> Result<()> {
            delete_node(path, true, config.delete_on_trash_failure)?;
            if let Some(watcher) = &mut self.watcher {
                let _ = watcher.unwatch_root(path);
            }
            if let Some(old) = self.detach(path) {
                self.purge_cached_subtree(&old);
            }
            self.fix_open_directory_after_removal(path);
            self.history.record(ChangeKind::Remove, path);
            Ok(())
        })();
        self.busy = false;
        self.process_events();
        outcome
    }

    // ========================================================================
    // Directory settings and projects
    // ========================================================================

    /// Change a directory's sort mode and re-order its children
    pub fn set_directory_sorting(&mut self, path: &Path, sorting: SortMode) -> Result<()> {
        self.update_settings(path, |settings| settings.sorting = sorting)
    }

    /// Change a directory's icon
    pub fn set_directory_icon(&mut self, path: &Path, icon: Option<String>) -> Result<()> {
        self.update_settings(path, |settings| settings.icon = icon)
    }

    /// Replace a directory's settings wholesale
    pub fn set_directory_settings(&mut self, path: &Path, settings: DirSettings) -> Result<()> {
        self.update_settings(path, |current| *current = settings)
    }

    /// Attach a fresh project to a directory (no-op title uses the
    /// directory name)
    pub fn create_project(&mut self, path: &Path, title: Option<String>) -> Result<()> {
        let fallback = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.update_settings(path, move |settings| {
            settings.project = Some(ProjectSettings::with_title(title.unwrap_or(fallback)));
        })
    }

    /// Apply a partial update to a directory's project.
    ///
    /// Only keys present in the current project shape are applied; nested
    /// objects merge recursively.
    pub fn update_project(&mut self, path: &Path, patch: serde_json::Value) -> Result<()> {
        let current = self
            .find_directory(path)
            .and_then(|d| d.as_directory())
            .and_then(|d| d.settings.project.clone())
            .ok_or_else(|| WorkspaceError::WrongType {
                path: path.display().to_string(),
                message: "directory has no project".to_string(),
            })?;

        let template = serde_json::to_value(&current).expect("project serializes");
        let merged = merge_within_template(&patch, &template);
        let updated: ProjectSettings =
            serde_json::from_value(merged).unwrap_or(current);
        self.update_settings(path, move |settings| settings.project = Some(updated))
    }

    /// Detach a directory's project
    pub fn remove_project(&mut self, path: &Path) -> Result<()> {
        self.update_settings(path, |settings| settings.project = None)
    }

    fn update_settings(
        &mut self,
        path: &Path,
        apply: impl FnOnce(&mut DirSettings),
    ) -> Result<()> {
        let config = self.config.snapshot();
        self.busy = true;
        let outcome = (|| -> Result<()> {
            let node = self
                .roots
                .iter_mut()
                .find_map(|r| r.find_mut(path))
                .and_then(|n| n.as_directory_mut())
                .ok_or_else(|| WorkspaceError::NotLoaded {
                    path: path.display().to_string(),
                })?;
            apply(&mut node.settings);
            let settings = node.settings.clone();
            let sorting = settings.sorting;
            sort_children(&mut node.children, sorting, &config);
            directory::persist_settings(path, &settings)?;
            self.history.record(ChangeKind::Change, path);
            Ok(())
        })();
        self.busy = false;
        self.process_events();
        outcome
    }

    // ========================================================================
    // Search and statistics
    // ========================================================================

    /// Run a query against one mirrored file
    pub fn search_file(&self, path: &Path, terms: &[SearchTerm]) -> Result<Vec<LineMatch>> {
        let descriptor = self.find_file(path).ok_or_else(|| WorkspaceError::NotLoaded {
            path: path.display().to_string(),
        })?;
        let content = match descriptor {
            Descriptor::Markdown(_) | Descriptor::Code(_) => {
                fs::read_to_string(path).map_err(|e| WorkspaceError::Read {
                    path: path.display().to_string(),
                    source: e,
                })?
            }
            // Attachments match on the file name only
            _ => String::new(),
        };
        Ok(crate::search::search_file(descriptor, &content, terms))
    }

    /// Run a query over every mirrored file, skipping non-matches
    pub fn search_workspace(&self, terms: &[SearchTerm]) -> Vec<(PathBuf, Vec<LineMatch>)> {
        let mut hits = Vec::new();
        for file in self.all_files() {
            let path = file.path().to_path_buf();
            match self.search_file(&path, terms) {
                Ok(results) if !results.is_empty() => hits.push((path, results)),
                Ok(_) => {}
                Err(e) => debug!("search skipped {}: {e}", path.display()),
            }
        }
        hits
    }

    /// Aggregate statistics over everything loaded
    pub fn statistics(&self) -> WorkspaceStats {
        stats::collect(&self.roots)
    }

    /// History events strictly after `timestamp_ms`
    pub fn history_since(&self, timestamp_ms: i64) -> Vec<HistoryEvent> {
        self.history.since(timestamp_ms)
    }

    /// Timestamp of the newest history entry
    pub fn last_change(&self) -> i64 {
        self.history.last_timestamp()
    }

    /// Cache counters for diagnostics
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Flush the metadata cache to disk
    pub fn persist_cache(&mut self) {
        self.cache.persist();
    }

    /// Drop every cached descriptor
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    // ========================================================================
    // Remote (watcher) events
    // ========================================================================

    /// Drain buffered watcher events, applying them one at a time.
    ///
    /// Returns the number of events applied. Skipped entirely while a
    /// local mutation holds the busy flag; the caller (every mutating
    /// operation) retries immediately afterwards.
    pub fn process_events(&mut self) -> usize {
        self.pump();
        if self.busy {
            return 0;
        }
        let mut applied = 0;
        while let Some(event) = self.pending.pop_front() {
            self.busy = true;
            self.apply_remote_event(event);
            self.busy = false;
            self.pump();
            applied += 1;
        }
        applied
    }

    /// Block up to `timeout` for at least one watcher event, then drain
    pub fn wait_and_process(&mut self, timeout: Duration) -> usize {
        if let Some(rx) = &self.events_rx {
            if let Ok(event) = rx.recv_timeout(timeout) {
                self.pending.push_back(event);
            }
        }
        self.process_events()
    }

    /// Move channel arrivals into the FIFO buffer without applying them
    fn pump(&mut self) {
        if let Some(rx) = &self.events_rx {
            while let Ok(event) = rx.try_recv() {
                self.pending.push_back(event);
            }
        }
    }

    fn apply_remote_event(&mut self, event: WatchEvent) {
        let config = self.config.snapshot();
        let path = event.path.clone();

        match event.kind {
            WatchEventKind::Add | WatchEventKind::AddDir | WatchEventKind::Change => {
                if !path.exists() {
                    // Raced against a removal that will arrive separately
                    warn!("discarding stale event for {}", path.display());
                    return;
                }
                if self.find_any(&path).is_some() {
                    self.apply_remote_change(&path, &config);
                } else {
                    self.apply_remote_add(&path, &config);
                }
            }
            WatchEventKind::Unlink | WatchEventKind::UnlinkDir => {
                self.apply_remote_remove(&path);
            }
        }
    }

    fn apply_remote_add(&mut self, path: &Path, config: &WorkspaceConfig) {
        let parent = match path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => return,
        };
        if self.find_directory(&parent).is_none() {
            debug!("event outside the tree: {}", path.display());
            return;
        }
        let descriptor = if path.is_dir() {
            self.load_directory_tree(path, config)
        } else {
            parser::parse_file(path, Some(&mut self.cache), config)
        };
        match descriptor {
            Ok(descriptor) => {
                if self.attach_child(descriptor, config).is_ok() {
                    self.history.record(ChangeKind::Add, path);
                }
            }
            Err(e) => warn!("discarding unreadable addition {}: {e}", path.display()),
        }
    }

    fn apply_remote_change(&mut self, path: &Path, config: &WorkspaceConfig) {
        let is_dir = self
            .find_any(path)
            .map(|d| d.is_directory())
            .unwrap_or(false);

        if is_dir {
            // Collapsed .git or sidecar signal: refresh settings and flag
            let settings = directory::load_settings(path);
            let git = path.join(".git").exists();
            if let Some(node) = self
                .roots
                .iter_mut()
                .find_map(|r| r.find_mut(path))
                .and_then(|n| n.as_directory_mut())
            {
                node.settings = settings;
                node.is_git_repository = git;
                let sorting = node.settings.sorting;
                sort_children(&mut node.children, sorting, config);
            }
            self.history.record(ChangeKind::Change, path);
            return;
        }

        match parser::parse_file(path, Some(&mut self.cache), config) {
            Ok(descriptor) => {
                if let Some(node) = self.roots.iter_mut().find_map(|r| r.find_mut(path)) {
                    *node = descriptor;
                }
                self.resort_parent_of(path, config);
                self.history.record(ChangeKind::Change, path);
            }
            Err(e) => warn!("discarding unreadable change {}: {e}", path.display()),
        }
    }

    fn apply_remote_remove(&mut self, path: &Path) {
        if self.find_any(path).is_none() {
            debug!("removal for unknown path {}", path.display());
            return;
        }
        let is_root = self.roots.iter().any(|r| r.path() == path);
        if is_root {
            // A vanished root becomes a placeholder awaiting rescan
            if let Some(slot) = self.roots.iter_mut().find(|r| r.path() == path) {
                *slot = Descriptor::Directory(Directory::missing_root(path));
            }
            self.fix_open_directory_after_removal(path);
            self.history.record(ChangeKind::Change, path);
            return;
        }
        if let Some(old) = self.detach(path) {
            self.purge_cached_subtree(&old);
        }
        self.fix_open_directory_after_removal(path);
        self.history.record(ChangeKind::Remove, path);
    }

    // ========================================================================
    // Tree plumbing
    // ========================================================================

    fn ensure_directory(&self, path: &Path) -> Result<()> {
        self.find_directory(path)
            .map(|_| ())
            .ok_or_else(|| WorkspaceError::NotLoaded {
                path: path.display().to_string(),
            })
    }

    /// Remove the descriptor at `path` from its parent (or the root list)
    fn detach(&mut self, path: &Path) -> Option<Descriptor> {
        if let Some(pos) = self.roots.iter().position(|r| r.path() == path) {
            return Some(self.roots.remove(pos));
        }
        let parent = path.parent()?.to_path_buf();
        let dir = self
            .roots
            .iter_mut()
            .find_map(|r| r.find_mut(&parent))
            .and_then(|n| n.as_directory_mut())?;
        let pos = dir.children.iter().position(|c| c.path() == path)?;
        Some(dir.children.remove(pos))
    }

    /// Insert a descriptor into its parent's children and restore order
    fn attach_child(&mut self, descriptor: Descriptor, config: &WorkspaceConfig) -> Result<()> {
        let parent = descriptor.dir().to_path_buf();
        let dir = self
            .roots
            .iter_mut()
            .find_map(|r| r.find_mut(&parent))
            .and_then(|n| n.as_directory_mut())
            .ok_or_else(|| WorkspaceError::NotLoaded {
                path: parent.display().to_string(),
            })?;
        // One descriptor per absolute path, always
        dir.children.retain(|c| c.path() != descriptor.path());
        let sorting = dir.settings.sorting;
        dir.children.push(descriptor);
        sort_children(&mut dir.children, sorting, config);
        Ok(())
    }

    fn resort_parent_of(&mut self, path: &Path, config: &WorkspaceConfig) {
        let parent = match path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => return,
        };
        if let Some(dir) = self
            .roots
            .iter_mut()
            .find_map(|r| r.find_mut(&parent))
            .and_then(|n| n.as_directory_mut())
        {
            let sorting = dir.settings.sorting;
            sort_children(&mut dir.children, sorting, config);
        }
    }

    /// Drop every cache entry under a detached subtree
    fn purge_cached_subtree(&mut self, detached: &Descriptor) {
        let mut keys = Vec::new();
        detached.walk(&mut |node| keys.push(node.path().to_string_lossy().to_string()));
        for key in keys {
            self.cache.delete(&key);
        }
    }

    /// Rewrite the open-directory reference after a rename or move
    fn relocate_open_directory(&mut self, old: &Path, new: &Path) {
        if let Some(open) = &self.open_directory {
            if let Ok(rest) = open.strip_prefix(old) {
                self.open_directory = Some(new.join(rest));
            }
        }
    }

    /// Repoint the open-directory reference at the nearest surviving
    /// ancestor after a removal
    fn fix_open_directory_after_removal(&mut self, removed: &Path) {
        let affected = self
            .open_directory
            .as_ref()
            .map(|open| open.starts_with(removed))
            .unwrap_or(false);
        if !affected {
            return;
        }
        let mut candidate = removed.parent();
        while let Some(path) = candidate {
            if self.find_directory(path).is_some() {
                self.open_directory = Some(path.to_path_buf());
                return;
            }
            candidate = path.parent();
        }
        self.open_directory = None;
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(std::path::is_separator) {
        return Err(WorkspaceError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Trash-first deletion with the configured fallback policy
fn delete_node(path: &Path, is_dir: bool, hard_delete_fallback: bool) -> Result<()> {
    match trash::delete(path) {
        Ok(()) => Ok(()),
        Err(e) if hard_delete_fallback => {
            warn!("trash failed for {}, deleting permanently: {e}", path.display());
            let result = if is_dir {
                fs::remove_dir_all(path)
            } else {
                fs::remove_file(path)
            };
            result.map_err(|e| WorkspaceError::Write {
                path: path.display().to_string(),
                source: e,
            })
        }
        Err(e) => Err(WorkspaceError::Trash {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StaticConfig, WorkspaceConfig};
    use tempfile::TempDir;

    fn test_mirror(cache: &TempDir) -> Mirror {
        let config = Arc::new(StaticConfig(WorkspaceConfig {
            // Hard-delete in tests: no trash daemon in CI sandboxes
            delete_on_trash_failure: true,
            ..WorkspaceConfig::default()
        }));
        Mirror::new(config, cache.path())
    }

    fn fixture_workspace() -> TempDir {
        let ws = TempDir::new().unwrap();
        fs::write(ws.path().join("alpha.md"), "# Alpha\n\nSome #shared text\n").unwrap();
        fs::write(ws.path().join("beta.md"), "content with #shared and #beta\n").unwrap();
        fs::create_dir(ws.path().join("sub")).unwrap();
        fs::write(ws.path().join("sub/gamma.md"), "# Gamma\n").unwrap();
        fs::write(ws.path().join("attachment.png"), [0u8; 4]).unwrap();
        ws
    }

    #[test]
    fn test_load_builds_tree() {
        let cache = TempDir::new().unwrap();
        let ws = fixture_workspace();
        let mut mirror = test_mirror(&cache);

        mirror.load_path(ws.path()).unwrap();
        let root = mirror.find_directory(ws.path()).unwrap();
        assert_eq!(root.children().len(), 4);
        assert!(mirror.find_file(&ws.path().join("sub/gamma.md")).is_some());
        assert_eq!(mirror.statistics().markdown_files, 3);
    }

    #[test]
    fn test_tree_uniqueness_after_operations() {
        let cache = TempDir::new().unwrap();
        let ws = fixture_workspace();
        let mut mirror = test_mirror(&cache);
        mirror.load_path(ws.path()).unwrap();

        mirror
            .create_file(ws.path(), "delta.md", "# Delta\n")
            .unwrap();
        mirror
            .rename_file(&ws.path().join("delta.md"), "delta2.md")
            .unwrap();
        mirror
            .move_item(&ws.path().join("delta2.md"), &ws.path().join("sub"))
            .unwrap();

        let mut seen = std::collections::HashSet::new();
        for root in mirror.roots() {
            root.walk(&mut |node| {
                assert!(
                    seen.insert(node.path().to_path_buf()),
                    "duplicate path {}",
                    node.path().display()
                );
                for child in node.children() {
                    assert_eq!(child.dir(), node.path());
                }
            });
        }
    }

    #[test]
    fn test_consolidation_folds_root_file_into_workspace() {
        let cache = TempDir::new().unwrap();
        let ws = fixture_workspace();
        let mut mirror = test_mirror(&cache);

        let standalone = ws.path().join("alpha.md");
        mirror.load_path(&standalone).unwrap();
        assert_eq!(mirror.roots().len(), 1);

        mirror.load_path(ws.path()).unwrap();
        // The standalone root was folded into the workspace
        assert_eq!(mirror.roots().len(), 1);
        assert!(mirror.roots()[0].is_directory());
        assert!(mirror.find_file(&standalone).is_some());
    }

    #[test]
    fn test_missing_root_placeholder_and_rescan() {
        let cache = TempDir::new().unwrap();
        let parent = TempDir::new().unwrap();
        let target = parent.path().join("not-yet");
        let mut mirror = test_mirror(&cache);

        mirror.load_path(&target).unwrap();
        let root = mirror.roots()[0].as_directory().unwrap();
        assert!(root.not_found);

        fs::create_dir(&target).unwrap();
        fs::write(target.join("a.md"), "# A\n").unwrap();
        mirror.rescan_missing_roots().unwrap();

        let root = mirror.roots()[0].as_directory().unwrap();
        assert!(!root.not_found);
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn test_create_and_remove_file() {
        let cache = TempDir::new().unwrap();
        let ws = fixture_workspace();
        let mut mirror = test_mirror(&cache);
        mirror.load_path(ws.path()).unwrap();

        let created = mirror
            .create_file(ws.path(), "note.md", "# Note\n#fresh\n")
            .unwrap();
        assert!(created.exists());
        assert!(mirror.find_file(&created).is_some());
        assert!(mirror.all_tags().contains_key("fresh"));

        mirror.remove_file(&created).unwrap();
        assert!(!created.exists());
        assert!(mirror.find_file(&created).is_none());
    }

    #[test]
    fn test_save_rederives_tags() {
        let cache = TempDir::new().unwrap();
        let ws = fixture_workspace();
        let mut mirror = test_mirror(&cache);
        mirror.load_path(ws.path()).unwrap();

        let path = ws.path().join("alpha.md");
        mirror.save_file(&path, "now with #changed only\n").unwrap();
        let md = mirror.find_file(&path).unwrap().as_markdown().unwrap();
        assert_eq!(md.tags, vec!["changed"]);
    }

    #[test]
    fn test_find_exact_by_id_and_name() {
        let cache = TempDir::new().unwrap();
        let ws = TempDir::new().unwrap();
        fs::write(
            ws.path().join("20240101120000.md"),
            "id note\n",
        )
        .unwrap();
        fs::write(ws.path().join("named.md"), "named note\n").unwrap();

        let mut mirror = test_mirror(&cache);
        mirror.load_path(ws.path()).unwrap();

        assert!(mirror.find_exact("20240101120000").is_some());
        assert!(mirror.find_exact("named").is_some());
        assert!(mirror.find_exact("named.md").is_some());
        assert!(mirror.find_exact("absent").is_none());
    }

    #[test]
    fn test_history_records_mutations_in_order() {
        let cache = TempDir::new().unwrap();
        let ws = fixture_workspace();
        let mut mirror = test_mirror(&cache);
        mirror.load_path(ws.path()).unwrap();

        let before = mirror.last_change();
        mirror.create_file(ws.path(), "h1.md", "x\n").unwrap();
        mirror.create_file(ws.path(), "h2.md", "x\n").unwrap();

        let events = mirror.history_since(before);
        assert_eq!(events.len(), 2);
        assert!(events[0].timestamp_ms < events[1].timestamp_ms);
        assert_eq!(events[0].kind, ChangeKind::Add);
    }

    #[test]
    fn test_open_directory_fixups() {
        let cache = TempDir::new().unwrap();
        let ws = fixture_workspace();
        let mut mirror = test_mirror(&cache);
        mirror.load_path(ws.path()).unwrap();

        let sub = ws.path().join("sub");
        mirror.set_open_directory(Some(&sub)).unwrap();

        let renamed = mirror.rename_directory(&sub, "renamed").unwrap();
        assert_eq!(mirror.open_directory(), Some(renamed.as_path()));

        mirror.remove_directory(&renamed).unwrap();
        assert_eq!(mirror.open_directory(), Some(ws.path()));
    }

    #[test]
    fn test_directory_settings_resort_children() {
        let cache = TempDir::new().unwrap();
        let ws = TempDir::new().unwrap();
        fs::write(ws.path().join("a.md"), "old\n").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(ws.path().join("b.md"), "new\n").unwrap();

        let mut mirror = test_mirror(&cache);
        mirror.load_path(ws.path()).unwrap();

        let mode = SortMode {
            key: crate::descriptor::SortKey::Time,
            direction: crate::descriptor::SortDirection::Descending,
        };
        mirror.set_directory_sorting(ws.path(), mode).unwrap();

        let root = mirror.find_directory(ws.path()).unwrap();
        assert_eq!(root.children()[0].name(), "b.md");
        assert!(ws.path().join(directory::SETTINGS_FILE).exists());
    }

    #[test]
    fn test_project_lifecycle() {
        let cache = TempDir::new().unwrap();
        let ws = fixture_workspace();
        let mut mirror = test_mirror(&cache);
        mirror.load_path(ws.path()).unwrap();

        mirror.create_project(ws.path(), None).unwrap();
        let dir = mirror.find_directory(ws.path()).unwrap().as_directory().unwrap();
        assert!(dir.settings.project.is_some());

        mirror
            .update_project(ws.path(), serde_json::json!({"title": "Renamed", "junk": 1}))
            .unwrap();
        let dir = mirror.find_directory(ws.path()).unwrap().as_directory().unwrap();
        assert_eq!(dir.settings.project.as_ref().unwrap().title, "Renamed");

        mirror.remove_project(ws.path()).unwrap();
        let dir = mirror.find_directory(ws.path()).unwrap().as_directory().unwrap();
        assert!(dir.settings.project.is_none());
    }

    #[test]
    fn test_search_workspace_exclusion_law() {
        let cache = TempDir::new().unwrap();
        let ws = fixture_workspace();
        let mut mirror = test_mirror(&cache);
        mirror.load_path(ws.path()).unwrap();

        let terms = vec![
            SearchTerm::new(crate::search::TermOperator::Or, &["text", "content", "gamma"]),
            SearchTerm::new(crate::search::TermOperator::Not, &["beta"]),
        ];
        let hits = mirror.search_workspace(&terms);
        assert!(!hits.is_empty());
        for (path, _) in &hits {
            let content = fs::read_to_string(path).unwrap();
            assert!(!content.to_lowercase().contains("beta"));
            assert!(!path.to_string_lossy().to_lowercase().contains("beta"));
        }
    }

    #[test]
    fn test_unload_root() {
        let cache = TempDir::new().unwrap();
        let ws = fixture_workspace();
        let mut mirror = test_mirror(&cache);
        mirror.load_path(ws.path()).unwrap();
        assert_eq!(mirror.roots().len(), 1);

        mirror.unload_path(ws.path()).unwrap();
        assert!(mirror.roots().is_empty());
        assert!(mirror.find_any(ws.path()).is_none());
    }

    #[test]
    fn test_remote_events_buffered_fifo() {
        let cache = TempDir::new().unwrap();
        let ws = fixture_workspace();
        let mut mirror = test_mirror(&cache);
        mirror.load_path(ws.path()).unwrap();

        // Simulate watcher arrivals without a live watcher thread
        let extra = ws.path().join("remote.md");
        fs::write(&extra, "# Remote\n").unwrap();
        mirror.pending.push_back(WatchEvent {
            kind: WatchEventKind::Add,
            path: extra.clone(),
        });
        mirror.pending.push_back(WatchEvent {
            kind: WatchEventKind::Change,
            path: extra.clone(),
        });

        let applied = mirror.process_events();
        assert_eq!(applied, 2);
        assert!(mirror.find_file(&extra).is_some());
    }

    #[test]
    fn test_remote_remove_of_root_becomes_placeholder() {
        let cache = TempDir::new().unwrap();
        let ws = fixture_workspace();
        let mut mirror = test_mirror(&cache);
        mirror.load_path(ws.path()).unwrap();

        mirror.pending.push_back(WatchEvent {
            kind: WatchEventKind::UnlinkDir,
            path: ws.path().to_path_buf(),
        });
        mirror.process_events();

        let root = mirror.roots()[0].as_directory().unwrap();
        assert!(root.not_found);
    }

    #[test]
    fn test_stale_remote_event_discarded() {
        let cache = TempDir::new().unwrap();
        let ws = fixture_workspace();
        let mut mirror = test_mirror(&cache);
        mirror.load_path(ws.path()).unwrap();

        let before = mirror.last_change();
        mirror.pending.push_back(WatchEvent {
            kind: WatchEventKind::Add,
            path: ws.path().join("never-existed.md"),
        });
        mirror.process_events();

        assert!(mirror.history_since(before).is_empty());
        assert!(mirror.find_file(&ws.path().join("never-existed.md")).is_none());
    }
}
