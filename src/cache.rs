//! Sharded disk cache for parsed descriptors
//!
//! Maps an absolute path to the last-parsed descriptor for that path so
//! unchanged files skip re-parsing at boot. Keys hash into at most 256
//! shard files; shards load lazily on first access and stay in memory.
//! `persist()` garbage-collects entries that were neither read nor written
//! since the last persist, then writes every loaded shard back atomically.
//!
//! Corruption is never fatal: a shard file that fails to parse is logged
//! and rebuilt from scratch.

use std::fs;
use std::path::PathBuf;

use ahash::{AHashMap, AHashSet};
use tracing::{debug, warn};

use crate::descriptor::Descriptor;
use crate::fs_utils::atomic_replace;

// FNV-1a constants for the 64-bit shard hash
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Compute a stable FNV-1a hash
fn fnv1a_hash(data: &str) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in data.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Shard name for a cache key: first two hex characters of the key hash
fn shard_id(key: &str) -> String {
    format!("{:016x}", fnv1a_hash(key))[..2].to_string()
}

/// Hit/miss counters, surfaced through the CLI `cache` subcommand
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub shards_loaded: usize,
    pub entries: usize,
}

/// Disk-backed, sharded path → descriptor store
pub struct MetadataCache {
    /// Directory holding the shard files
    dir: PathBuf,

    /// Loaded shards: shard id → (key → descriptor)
    shards: AHashMap<String, AHashMap<String, Descriptor>>,

    /// Keys read or written since the last persist
    accessed: AHashSet<String>,

    hits: u64,
    misses: u64,
}

impl MetadataCache {
    /// Create a cache rooted at `dir` (created on first persist)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            shards: AHashMap::new(),
            accessed: AHashSet::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Platform cache directory for a mirror without an explicit location
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("quillfs")
    }

    /// Fetch the cached descriptor for `key`, marking it as accessed
    pub fn get(&mut self, key: &str) -> Option<Descriptor> {
        let shard = self.load_shard(&shard_id(key));
        match shard.get(key).cloned() {
            Some(value) => {
                self.accessed.insert(key.to_string());
                self.hits += 1;
                Some(value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store a descriptor under `key`, marking it as accessed
    pub fn set(&mut self, key: &str, value: Descriptor) {
        let id = shard_id(key);
        self.load_shard(&id);
        self.shards
            .get_mut(&id)
            .expect("shard was just loaded")
            .insert(key.to_string(), value);
        self.accessed.insert(key.to_string());
    }

    /// Membership test; does not count as an access
    pub fn has(&mut self, key: &str) -> bool {
        self.load_shard(&shard_id(key)).contains_key(key)
    }

    /// Drop the entry for `key`, if any
    pub fn delete(&mut self, key: &str) {
        let id = shard_id(key);
        self.load_shard(&id);
        if let Some(shard) = self.shards.get_mut(&id) {
            shard.remove(key);
        }
        self.accessed.remove(key);
    }

    /// Write every loaded shard back to disk.
    ///
    /// Entries not accessed since the last persist are dropped first, so
    /// stale paths (deleted or unloaded files) age out of the cache.
    /// Write failures are logged and swallowed; a lost shard only costs a
    /// re-parse on the next boot.
    pub fn persist(&mut self) {
        if self.shards.is_empty() {
            return;
        }
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!("cache directory {} not writable: {e}", self.dir.display());
            return;
        }

        for (id, shard) in &mut self.shards {
            shard.retain(|key, _| self.accessed.contains(key));

            let pairs: Vec<(&String, &Descriptor)> = shard.iter().collect();
            let json = match serde_json::to_vec(&pairs) {
                Ok(json) => json,
                Err(e) => {
                    warn!("cache shard {id} not serializable: {e}");
                    continue;
                }
            };
            let path = self.dir.join(format!("{id}.json"));
            if let Err(e) = atomic_replace(&path, &json) {
                warn!("failed to persist cache shard {}: {e}", path.display());
            }
        }

        debug!(
            "persisted {} cache shard(s), {} live entries",
            self.shards.len(),
            self.accessed.len()
        );
        self.accessed.clear();
    }

    /// Remove every shard file and reset in-memory state
    pub fn clear(&mut self) {
        self.shards.clear();
        self.accessed.clear();
        self.hits = 0;
        self.misses = 0;

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Err(e) = fs::remove_file(&path) {
                    warn!("failed to remove cache shard {}: {e}", path.display());
                }
            }
        }
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            shards_loaded: self.shards.len(),
            entries: self.shards.values().map(|s| s.len()).sum(),
        }
    }

    /// Load a shard from disk on first access; corrupt shards become empty
    fn load_shard(&mut self, id: &str) -> &AHashMap<String, Descriptor> {
        if !self.shards.contains_key(id) {
            let path = self.dir.join(format!("{id}.json"));
            let entries = match fs::read(&path) {
                Ok(bytes) => match serde_json::from_slice::<Vec<(String, Descriptor)>>(&bytes) {
                    Ok(pairs) => pairs.into_iter().collect(),
                    Err(e) => {
                        warn!("corrupt cache shard {}, rebuilding: {e}", path.display());
                        AHashMap::new()
                    }
                },
                // Absent shard file is simply an empty shard
                Err(_) => AHashMap::new(),
            };
            self.shards.insert(id.to_string(), entries);
        }
        &self.shards[id]
    }
}
