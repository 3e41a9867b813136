//! Cache store: lookup, read, write, invalidate
//!
//! Side effects are confined to one directory tree under the cache root.
//! The metadata index mutex covers index reads and rewrites only; file
//! writes for different keys proceed independently, and same-key races are
//! settled by the atomic rename (last writer wins - both writers fetched the
//! same immutable historical day).

use chrono::Utc;
use klinevault_core::{Candle, CandleColumn, CandleSource, Interval};
use parking_lot::Mutex;
use polars::prelude::*;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::format::{self, SchemaError};
use crate::index::{CacheEntry, MetaIndex};
use crate::key::CacheKey;

/// Cache store failures. Integrity problems discovered during `lookup` are
/// not surfaced here - they invalidate the entry and read as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index serialization error: {0}")]
    Index(#[from] serde_json::Error),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("interval {interval} is not cacheable at day granularity")]
    NotCacheable { interval: Interval },

    #[error("refusing to cache incomplete day for {key}: expected {expected} rows, got {actual}")]
    IncompleteDay {
        key: String,
        expected: u32,
        actual: usize,
    },

    #[error("refusing to cache misaligned day for {key}: {message}")]
    MisalignedDay { key: String, message: String },
}

/// Unique-enough suffix for temp files: same-key concurrent writers must not
/// collide on the temp path.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// The unified day-file cache.
pub struct CacheStore {
    root: PathBuf,
    index_path: PathBuf,
    index: Mutex<MetaIndex>,
    integrity_faults: AtomicU64,
}

impl CacheStore {
    /// Open (or create) a cache rooted at `root` and load its index.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let index_path = root.join("index.json");
        let index = MetaIndex::load(&index_path)?;
        debug!(
            event_type = "cache_open",
            root = %root.display(),
            entries = index.len(),
            "Opened cache store"
        );
        Ok(Self {
            root,
            index_path,
            index: Mutex::new(index),
            integrity_faults: AtomicU64::new(0),
        })
    }

    /// Look up a key and verify the referenced file before trusting it.
    ///
    /// Any discrepancy (missing file, checksum mismatch) deletes the stale
    /// entry, bumps the integrity-fault counter and reads as a miss.
    pub fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.index.lock().get(&key.index_key()).cloned()?;
        let path = self.root.join(&entry.rel_path);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    event_type = "cache_file_missing",
                    key = %key,
                    path = %path.display(),
                    error = %e,
                    "Indexed day file unreadable, invalidating"
                );
                self.record_fault(key);
                return None;
            }
        };

        let actual = sha256_hex(&bytes);
        if actual != entry.sha256 {
            warn!(
                event_type = "cache_checksum_mismatch",
                key = %key,
                expected_hash = %entry.sha256,
                actual_hash = %actual,
                "Day file checksum mismatch, invalidating"
            );
            self.record_fault(key);
            return None;
        }

        debug!(event_type = "cache_hit", key = %key, rows = entry.row_count, "Cache hit");
        Some(entry)
    }

    /// Read a verified entry, memory-mapped, materializing only the requested
    /// columns plus the timestamp key. Returns candles sorted ascending.
    ///
    /// A schema violation invalidates the entry before the error propagates.
    pub fn read(
        &self,
        key: &CacheKey,
        entry: &CacheEntry,
        columns: Option<&[CandleColumn]>,
    ) -> Result<Vec<Candle>, CacheError> {
        let path = self.root.join(&entry.rel_path);
        let file = fs::File::open(&path)?;
        let df = IpcReader::new(file)
            .with_columns(Some(format::projection(columns)))
            .memory_mapped(Some(path.clone()))
            .finish()?;

        let mut candles = match format::dataframe_to_candles(&df, CandleSource::Cache) {
            Ok(candles) => candles,
            Err(e) => {
                warn!(
                    event_type = "cache_schema_violation",
                    key = %key,
                    error = %e,
                    "Day file failed schema validation, invalidating"
                );
                self.record_fault(key);
                return Err(e.into());
            }
        };
        candles.sort_by_key(|c| c.open_time);
        Ok(candles)
    }

    /// Persist one complete calendar day of candles.
    ///
    /// Rejects anything that is not a gap-free, aligned, full day. The write
    /// sequence - temp file, checksum, atomic rename, index update - means a
    /// concurrent reader never observes a half-written file.
    pub fn write(&self, key: &CacheKey, candles: &[Candle]) -> Result<CacheEntry, CacheError> {
        self.validate_complete_day(key, candles)?;

        let df = format::candles_to_dataframe(candles)?;
        let mut buffer = Cursor::new(Vec::new());
        IpcWriter::new(&mut buffer).finish(&mut df.clone())?;
        let bytes = buffer.into_inner();
        let sha256 = sha256_hex(&bytes);

        let rel_path = key.rel_path();
        let path = self.root.join(&rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension(format!(
            "ipc.tmp.{}.{}",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, &bytes)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        let entry = CacheEntry {
            rel_path: rel_path.to_string_lossy().into_owned(),
            sha256,
            row_count: candles.len(),
            first_open_ms: candles[0].open_time,
            last_open_ms: candles[candles.len() - 1].open_time,
            written_at_ms: Utc::now().timestamp_millis(),
        };

        {
            let mut index = self.index.lock();
            index.insert(key.index_key(), entry.clone());
            index.persist(&self.index_path)?;
        }

        info!(
            event_type = "cache_write",
            key = %key,
            rows = entry.row_count,
            hash = %entry.sha256,
            "Cached complete day"
        );
        Ok(entry)
    }

    /// Remove both the day file and its index entry.
    pub fn invalidate(&self, key: &CacheKey) {
        let removed = {
            let mut index = self.index.lock();
            let removed = index.remove(&key.index_key());
            if removed.is_some() {
                if let Err(e) = index.persist(&self.index_path) {
                    warn!(
                        event_type = "cache_index_persist_failed",
                        key = %key,
                        error = %e,
                        "Failed to persist index after invalidation"
                    );
                }
            }
            removed
        };
        if let Some(entry) = removed {
            let _ = fs::remove_file(self.root.join(&entry.rel_path));
            info!(event_type = "cache_invalidate", key = %key, "Invalidated cache entry");
        }
    }

    /// Number of integrity faults observed since the store was opened.
    pub fn integrity_faults(&self) -> u64 {
        self.integrity_faults.load(Ordering::Relaxed)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_fault(&self, key: &CacheKey) {
        self.integrity_faults.fetch_add(1, Ordering::Relaxed);
        self.invalidate(key);
    }

    fn validate_complete_day(&self, key: &CacheKey, candles: &[Candle]) -> Result<(), CacheError> {
        let Some(expected) = key.interval.candles_per_day() else {
            return Err(CacheError::NotCacheable {
                interval: key.interval,
            });
        };
        if candles.len() != expected as usize {
            return Err(CacheError::IncompleteDay {
                key: key.index_key(),
                expected,
                actual: candles.len(),
            });
        }

        let width = key.interval.duration_ms();
        let day_start = klinevault_core::utc_day_start_ms(key.date);
        if candles[0].open_time != day_start {
            return Err(CacheError::MisalignedDay {
                key: key.index_key(),
                message: format!(
                    "first open_time {} does not start the day ({})",
                    candles[0].open_time, day_start
                ),
            });
        }
        for pair in candles.windows(2) {
            if pair[1].open_time - pair[0].open_time != width {
                return Err(CacheError::MisalignedDay {
                    key: key.index_key(),
                    message: format!(
                        "gap between {} and {}",
                        pair[0].open_time, pair[1].open_time
                    ),
                });
            }
        }
        for candle in candles {
            format::validate_candle(candle)?;
        }
        Ok(())
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
