//! Disk-backed key/value cache for query payloads.
//!
//! One JSON file per key, each wrapping the payload in an envelope with a
//! `cached_at` epoch-millisecond timestamp. Every operation is synchronous
//! and never surfaces an error to the caller: a failed write gets one
//! cleanup-and-retry, a missing or corrupt entry is a cache miss.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::now_ms;

/// A payload read back from the cache, with its write timestamp.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub payload: T,
    /// Epoch milliseconds when the entry was written.
    pub cached_at: u64,
}

impl<T> CacheEntry<T> {
    pub fn age(&self) -> Duration {
        Duration::from_millis(now_ms().saturating_sub(self.cached_at))
    }

    /// Whether the entry is older than `threshold`. Stale entries are still
    /// served for instant display; the flag is informational.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.age() > threshold
    }
}

/// On-disk envelope around a cached payload.
#[derive(Serialize, Deserialize)]
struct DiskEntry {
    cached_at: u64,
    payload: serde_json::Value,
}

/// The local cache store: a directory of JSON envelopes plus the eviction
/// horizon. The runtime owns exactly one.
pub struct CacheStore {
    dir: PathBuf,
    max_age: Duration,
}

impl CacheStore {
    /// Open (and create, best-effort) the cache directory.
    pub fn open<P: AsRef<Path>>(dir: P, max_age: Duration) -> Self {
        let dir = dir.as_ref().to_path_buf();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!("cache: failed to create {:?}: {}", dir, e);
        }
        Self { dir, max_age }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        // Keys are namespaced strings; keep them filesystem-safe.
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }

    /// Read an entry. Any failure (missing file, corrupt JSON, wrong shape)
    /// is a cache miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let bytes = std::fs::read(self.entry_path(key)).ok()?;
        let disk: DiskEntry = serde_json::from_slice(&bytes).ok()?;
        let payload: T = serde_json::from_value(disk.payload).ok()?;
        Some(CacheEntry {
            payload,
            cached_at: disk.cached_at,
        })
    }

    /// Replace the entry for `key` wholesale with a fresh `cached_at`.
    ///
    /// On write failure, runs one cleanup pass over the cache and retries
    /// once; a still-failing write is dropped with a warning.
    pub fn put<T: Serialize>(&self, key: &str, payload: &T) {
        let value = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("cache: unserializable payload for {}: {}", key, e);
                return;
            }
        };
        let disk = DiskEntry {
            cached_at: now_ms(),
            payload: value,
        };
        let bytes = match serde_json::to_vec(&disk) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("cache: failed to encode entry for {}: {}", key, e);
                return;
            }
        };

        if self.write_entry(key, &bytes).is_ok() {
            return;
        }
        self.evict_stale();
        if let Err(e) = self.write_entry(key, &bytes) {
            tracing::warn!("cache: dropping write for {}: {}", key, e);
        }
    }

    /// Write-to-temp-then-rename so a crash mid-write never leaves a corrupt
    /// entry behind.
    fn write_entry(&self, key: &str, bytes: &[u8]) -> std::io::Result<()> {
        let path = self.entry_path(key);
        let temp = path.with_extension("json.tmp");
        std::fs::write(&temp, bytes)?;
        std::fs::rename(&temp, &path)
    }

    /// Write an entry with a forged timestamp, for staleness tests.
    #[cfg(test)]
    pub(crate) fn put_at<T: Serialize>(&self, key: &str, payload: &T, cached_at: u64) {
        let disk = DiskEntry {
            cached_at,
            payload: serde_json::to_value(payload).unwrap(),
        };
        self.write_entry(key, &serde_json::to_vec(&disk).unwrap())
            .unwrap();
    }

    /// Drop every entry older than the eviction horizon. Corrupt entries are
    /// dropped too.
    pub fn evict_stale(&self) {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let expired = match std::fs::read(&path)
                .ok()
                .and_then(|bytes| serde_json::from_slice::<DiskEntry>(&bytes).ok())
            {
                Some(disk) => {
                    Duration::from_millis(now_ms().saturating_sub(disk.cached_at)) > self.max_age
                }
                None => true,
            };
            if expired {
                let _ = std::fs::remove_file(&path);
            }
        }
    }
}
