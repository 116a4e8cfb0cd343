//! Append-only filetree change log
//!
//! Consumers resynchronize by pulling everything after a timestamp they
//! already hold, so timestamps must be strictly monotonic: two events
//! landing on the same millisecond have the later one bumped forward.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// What happened to a tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Change,
    Remove,
}

/// One recorded tree mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub timestamp_ms: i64,
}

/// Monotonic, append-only event log
#[derive(Debug, Default)]
pub struct ChangeLog {
    events: Vec<HistoryEvent>,
    last_timestamp: i64,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event now, bumping the clock if it would collide
    pub fn record(&mut self, kind: ChangeKind, path: &Path) -> i64 {
        let mut timestamp = chrono::Utc::now().timestamp_millis();
        if timestamp <= self.last_timestamp {
            timestamp = self.last_timestamp + 1;
        }
        self.last_timestamp = timestamp;
        self.events.push(HistoryEvent {
            kind,
            path: path.to_path_buf(),
            timestamp_ms: timestamp,
        });
        timestamp
    }

    /// Every event strictly after `timestamp_ms`
    pub fn since(&self, timestamp_ms: i64) -> Vec<HistoryEvent> {
        // Events are appended in timestamp order; find the cut point
        let start = self
            .events
            .partition_point(|e| e.timestamp_ms <= timestamp_ms);
        self.events[start..].to_vec()
    }

    /// Timestamp of the newest event, or 0 when empty
    pub fn last_timestamp(&self) -> i64 {
        self.last_timestamp
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_strictly_increase() {
        let mut log = ChangeLog::new();
        let mut previous = 0;
        for i in 0..50 {
            let path = PathBuf::from(format!("/ws/{i}.md"));
            let t = log.record(ChangeKind::Add, &path);
            assert!(t > previous, "timestamp {t} not after {previous}");
            previous = t;
        }
    }

    #[test]
    fn test_since_excludes_boundary() {
        let mut log = ChangeLog::new();
        let t1 = log.record(ChangeKind::Add, Path::new("/ws/a.md"));
        let t2 = log.record(ChangeKind::Change, Path::new("/ws/a.md"));

        let after_first = log.since(t1);
        assert_eq!(after_first.len(), 1);
        assert_eq!(after_first[0].timestamp_ms, t2);

        assert!(log.since(t2).is_empty());
        assert_eq!(log.since(0).len(), 2);
    }

    #[test]
    fn test_record_kinds_and_paths() {
        let mut log = ChangeLog::new();
        log.record(ChangeKind::Remove, Path::new("/ws/gone.md"));
        let events = log.since(0);
        assert_eq!(events[0].kind, ChangeKind::Remove);
        assert_eq!(events[0].path, PathBuf::from("/ws/gone.md"));
    }
}
