//! Filesystem change watcher
//!
//! Wraps a native recursive `notify` watch (or a polling watch for
//! filesystems with unreliable events) and forwards normalized events over
//! a channel. Noise is filtered here: dot-entries are ignored, except that
//! activity inside `.git` collapses to a single `Change` for the repository
//! directory (a commit or checkout is a meaningful change even though the
//! internals are noisy), and the settings sidecar collapses to a `Change`
//! for its directory.

use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::Duration;

use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error};

use crate::config::WorkspaceConfig;
use crate::error::{Result, WorkspaceError};
use crate::parser::directory::SETTINGS_FILE;

/// Normalized event kinds reported to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Add,
    AddDir,
    Change,
    /// Removal; the orchestrator resolves whether a file or directory
    /// lived at the path when the native event does not say
    Unlink,
    UnlinkDir,
}

/// One normalized watcher event
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

/// How the ignore filter disposes of an event path
#[derive(Debug, PartialEq)]
enum Disposition {
    /// Forward as-is
    Keep,
    /// Replace with a `Change` on the given directory
    Collapse(PathBuf),
    /// Drop entirely
    Ignore,
}

/// Watches loaded roots and forwards normalized events
pub struct ChangeWatcher {
    inner: Box<dyn Watcher + Send>,
    roots: Vec<PathBuf>,
}

impl ChangeWatcher {
    /// Start a watcher; events flow into `tx` from a notify-owned thread
    pub fn spawn(config: &WorkspaceConfig, tx: Sender<WatchEvent>) -> Result<Self> {
        let handler = move |result: notify::Result<Event>| match result {
            Ok(event) => {
                for normalized in normalize_event(&event) {
                    debug!("watch event {:?} {}", normalized.kind, normalized.path.display());
                    let _ = tx.send(normalized);
                }
            }
            Err(e) => error!("watcher error: {e}"),
        };

        let inner: Box<dyn Watcher + Send> = if config.watcher_polling {
            let poll_config = notify::Config::default()
                .with_poll_interval(Duration::from_millis(config.watcher_stability_ms));
            Box::new(PollWatcher::new(handler, poll_config).map_err(notify_io)?)
        } else {
            Box::new(
                RecommendedWatcher::new(handler, notify::Config::default()).map_err(notify_io)?,
            )
        };

        Ok(Self {
            inner,
            roots: Vec::new(),
        })
    }

    /// Begin watching a root: recursive for directories, the single node
    /// for file roots
    pub fn watch_root(&mut self, path: &Path) -> Result<()> {
        if self.roots.iter().any(|r| r == path) {
            return Ok(());
        }
        let mode = if path.is_dir() {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        self.inner.watch(path, mode).map_err(notify_io)?;
        self.roots.push(path.to_path_buf());
        Ok(())
    }

    /// Stop watching a root
    pub fn unwatch_root(&mut self, path: &Path) -> Result<()> {
        if let Some(pos) = self.roots.iter().position(|r| r == path) {
            self.roots.remove(pos);
            self.inner.unwatch(path).map_err(notify_io)?;
        }
        Ok(())
    }

    /// Currently watched roots
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

fn notify_io(e: notify::Error) -> WorkspaceError {
    WorkspaceError::Io(std::io::Error::other(e.to_string()))
}

/// Turn one native event into zero or more normalized events
fn normalize_event(event: &Event) -> Vec<WatchEvent> {
    if matches!(event.kind, EventKind::Access(_)) {
        return Vec::new();
    }

    let mut out = Vec::new();
    for path in &event.paths {
        match classify_path(path) {
            Disposition::Ignore => continue,
            Disposition::Collapse(dir) => {
                let collapsed = WatchEvent {
                    kind: WatchEventKind::Change,
                    path: dir,
                };
                if !out.contains(&collapsed) {
                    out.push(collapsed);
                }
            }
            Disposition::Keep => {
                if let Some(kind) = normalize_kind(&event.kind, path) {
                    out.push(WatchEvent {
                        kind,
                        path: path.clone(),
                    });
                }
            }
        }
    }
    out
}

/// Map a native event kind onto the normalized set.
///
/// Rename halves and untyped creations fall back to an existence check.
fn normalize_kind(kind: &EventKind, path: &Path) -> Option<WatchEventKind> {
    match kind {
        EventKind::Create(CreateKind::Folder) => Some(WatchEventKind::AddDir),
        EventKind::Create(CreateKind::File) => Some(WatchEventKind::Add),
        EventKind::Create(_) => Some(add_kind_by_stat(path)),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(WatchEventKind::Unlink),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(add_kind_by_stat(path)),
        EventKind::Modify(ModifyKind::Name(_)) => {
            if path.exists() {
                Some(add_kind_by_stat(path))
            } else {
                Some(WatchEventKind::Unlink)
            }
        }
        EventKind::Modify(_) => Some(WatchEventKind::Change),
        EventKind::Remove(RemoveKind::Folder) => Some(WatchEventKind::UnlinkDir),
        EventKind::Remove(_) => Some(WatchEventKind::Unlink),
        EventKind::Any | EventKind::Other => {
            if path.exists() {
                Some(WatchEventKind::Change)
            } else {
                Some(WatchEventKind::Unlink)
            }
        }
        EventKind::Access(_) => None,
    }
}

fn add_kind_by_stat(path: &Path) -> WatchEventKind {
    if path.is_dir() {
        WatchEventKind::AddDir
    } else {
        WatchEventKind::Add
    }
}

/// Apply the ignore policy to one event path
fn classify_path(path: &Path) -> Disposition {
    let mut prefix = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                if name == ".git" {
                    // Repository internals collapse onto the repo directory
                    return Disposition::Collapse(prefix);
                }
                if name == SETTINGS_FILE {
                    return Disposition::Collapse(prefix);
                }
                if name.starts_with('.') {
                    return Disposition::Ignore;
                }
                prefix.push(name.as_ref());
            }
            other => prefix.push(other.as_os_str()),
        }
    }
    Disposition::Keep
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_plain_paths_kept() {
        assert_eq!(classify_path(Path::new("/ws/notes/a.md")), Disposition::Keep);
    }

    #[test]
    fn test_classify_dotfiles_ignored() {
        assert_eq!(
            classify_path(Path::new("/ws/.DS_Store")),
            Disposition::Ignore
        );
        assert_eq!(
            classify_path(Path::new("/ws/.obsidian/cache")),
            Disposition::Ignore
        );
    }

    #[test]
    fn test_classify_git_collapses_to_repo_dir() {
        assert_eq!(
            classify_path(Path::new("/ws/repo/.git/refs/heads/main")),
            Disposition::Collapse(PathBuf::from("/ws/repo"))
        );
    }

    #[test]
    fn test_classify_sidecar_collapses_to_directory() {
        let sidecar = Path::new("/ws/notes").join(SETTINGS_FILE);
        assert_eq!(
            classify_path(&sidecar),
            Disposition::Collapse(PathBuf::from("/ws/notes"))
        );
    }

    #[test]
    fn test_normalize_event_dedups_collapsed_changes() {
        let event = Event {
            kind: EventKind::Modify(ModifyKind::Any),
            paths: vec![
                PathBuf::from("/ws/repo/.git/index"),
                PathBuf::from("/ws/repo/.git/HEAD"),
            ],
            attrs: Default::default(),
        };
        let normalized = normalize_event(&event);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].kind, WatchEventKind::Change);
        assert_eq!(normalized[0].path, PathBuf::from("/ws/repo"));
    }

    #[test]
    fn test_access_events_dropped() {
        let event = Event {
            kind: EventKind::Access(notify::event::AccessKind::Read),
            paths: vec![PathBuf::from("/ws/a.md")],
            attrs: Default::default(),
        };
        assert!(normalize_event(&event).is_empty());
    }

    #[test]
    fn test_remove_kinds() {
        assert_eq!(
            normalize_kind(
                &EventKind::Remove(RemoveKind::Folder),
                Path::new("/ws/gone")
            ),
            Some(WatchEventKind::UnlinkDir)
        );
        assert_eq!(
            normalize_kind(&EventKind::Remove(RemoveKind::Any), Path::new("/ws/gone")),
            Some(WatchEventKind::Unlink)
        );
    }

    #[test]
    fn test_watcher_spawn_and_roots() {
        let dir = tempfile::TempDir::new().unwrap();
        let (tx, _rx) = std::sync::mpsc::channel();
        let config = WorkspaceConfig::default();

        let mut watcher = ChangeWatcher::spawn(&config, tx).unwrap();
        watcher.watch_root(dir.path()).unwrap();
        assert_eq!(watcher.roots().len(), 1);

        // Watching the same root twice is a no-op
        watcher.watch_root(dir.path()).unwrap();
        assert_eq!(watcher.roots().len(), 1);

        watcher.unwatch_root(dir.path()).unwrap();
        assert!(watcher.roots().is_empty());
    }
}
