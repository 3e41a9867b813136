//! Day-file candle cache
//!
//! Persists one UTC calendar day of candles per
//! (provider, market, chart, symbol, interval, date) as a columnar Arrow IPC
//! file, with SHA-256 content checksums held in a small JSON metadata index.
//!
//! Guarantees:
//! - a day file is either absent, complete and verified, or invalidated -
//!   there is no partial-day state a reader can observe
//! - writes go through a temp path and an atomic rename; a concurrent reader
//!   never sees a half-written file
//! - every lookup re-verifies the file checksum against the index before the
//!   entry is trusted; a mismatch deletes the entry and reads as a miss
//! - reads are memory-mapped and deserialize only the requested columns plus
//!   the timestamp key

pub mod format;
pub mod index;
pub mod key;
pub mod store;

pub use format::{candles_to_dataframe, dataframe_to_candles, SchemaError, CANDLE_COLUMNS};
pub use index::{CacheEntry, MetaIndex};
pub use key::CacheKey;
pub use store::{CacheError, CacheStore};
