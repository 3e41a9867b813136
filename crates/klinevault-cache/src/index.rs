//! Persisted metadata index
//!
//! A small on-disk map from cache key to entry metadata. The checksum of a
//! day file lives here, not inside the file. Every mutation rewrites the
//! whole index through a temp file and an atomic rename; the map is small
//! enough that this stays cheap and keeps recovery trivial.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::store::CacheError;

/// Metadata for one complete, validated day file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    /// Day-file path relative to the cache root
    pub rel_path: String,

    /// SHA-256 of the file contents, lowercase hex
    pub sha256: String,

    /// Number of candles in the file
    pub row_count: usize,

    /// First candle open time in the file (epoch ms)
    pub first_open_ms: i64,

    /// Last candle open time in the file (epoch ms)
    pub last_open_ms: i64,

    /// When the entry was written (epoch ms)
    pub written_at_ms: i64,
}

/// In-memory image of the index file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MetaIndex {
    entries: BTreeMap<String, CacheEntry>,
}

impl MetaIndex {
    /// Load the index from disk; a missing file is an empty index.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Rewrite the index atomically (temp file + rename).
    pub fn persist(&self, path: &Path) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
