//! Time-limited caches for chat answers.
//!
//! [`ResponseCache`] maps a normalized question to the answer generated for
//! it. Entries expire after a fixed time-to-live measured against the
//! injected [`Clock`](crate::clock::Clock). When a snapshot path is
//! configured, the whole map is written as JSON after every insert and read
//! back (minus expired entries) at startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A value stamped with the time it was cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T, now: DateTime<Utc>) -> Self {
        Self {
            data,
            cached_at: now,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.cached_at
    }

    /// Fresh while strictly younger than `ttl`. A timestamp in the future
    /// (clock skew) counts as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) < ttl
    }
}

/// Normalize a question into a cache key.
pub fn cache_key(question: &str) -> String {
    question.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub fresh: usize,
}

pub struct ResponseCache {
    ttl: Duration,
    path: Option<PathBuf>,
    entries: RwLock<HashMap<String, CachedData<String>>>,
    /// Held while the snapshot file is written, so writers never interleave.
    persist: Mutex<()>,
}

impl ResponseCache {
    /// A cache that lives only in memory.
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            ttl,
            path: None,
            entries: RwLock::new(HashMap::new()),
            persist: Mutex::new(()),
        }
    }

    /// Open a cache backed by a JSON snapshot.
    ///
    /// A missing or unreadable snapshot yields an empty cache; the problem
    /// is logged and the file is overwritten on the next insert.
    pub fn open(path: impl Into<PathBuf>, ttl: Duration, now: DateTime<Utc>) -> Self {
        let path = path.into();
        let entries = match read_snapshot(&path) {
            Ok(mut entries) => {
                entries.retain(|_, entry| entry.is_fresh(now, ttl));
                debug!(path = %path.display(), entries = entries.len(), "loaded response cache");
                entries
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not load response cache");
                HashMap::new()
            }
        };

        Self {
            ttl,
            path: Some(path),
            entries: RwLock::new(entries),
            persist: Mutex::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached answer for `question`, if one is still fresh.
    pub fn get(&self, question: &str, now: DateTime<Utc>) -> Option<String> {
        let key = cache_key(question);
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&key)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| entry.data.clone())
    }

    /// Store an answer and persist the snapshot.
    pub fn insert(&self, question: &str, response: &str, now: DateTime<Utc>) {
        let key = cache_key(question);
        {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            entries.retain(|_, entry| entry.is_fresh(now, self.ttl));
            entries.insert(key, CachedData::new(response.to_string(), now));
        }

        let Some(path) = self.path.as_ref() else {
            return;
        };
        // The map is cloned under the persist lock, so the last writer
        // always saves a state that includes every earlier insert.
        let _persist = self.persist.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Err(e) = write_snapshot(path, &snapshot) {
            warn!(path = %path.display(), error = %e, "could not save response cache");
        }
    }

    /// Drop every entry, including the snapshot on disk.
    pub fn clear(&self) -> Result<()> {
        let _persist = self.persist.lock().unwrap_or_else(|e| e.into_inner());
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        if let Some(ref path) = self.path {
            if path.exists() {
                std::fs::remove_file(path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        Ok(())
    }

    pub fn stats(&self, now: DateTime<Utc>) -> CacheStats {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            entries: entries.len(),
            fresh: entries
                .values()
                .filter(|entry| entry.is_fresh(now, self.ttl))
                .count(),
        }
    }
}

fn read_snapshot(path: &Path) -> Result<HashMap<String, CachedData<String>>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read cache file: {}", path.display()))?;
    let entries = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse cache file: {}", path.display()))?;
    Ok(entries)
}

/// Write to a sibling temp file, then rename it over the snapshot.
fn write_snapshot(path: &Path, entries: &HashMap<String, CachedData<String>>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(entries)?;
    let tmp = temp_path(path);
    std::fs::write(&tmp, contents)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
