//! # Shard Merge
//!
//! Merges many small sorted shard files (row key → row cells) scattered
//! across a directory tree into one consolidated, sorted shard.
//!
//! ## Core idea
//! Every input shard is already sorted, so the merge never sorts: it keeps
//! one head record per shard in a min-heap and repeatedly emits the
//! smallest key. Rows present in several shards are coalesced by
//! concatenating their cells in shard discovery order. Memory stays at
//! one record per input, however large the shards are.

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fs;
pub mod iterator;
pub mod shard;
pub mod types;

// Public re-exports for the top-level API
pub use config::MergeOptions;
pub use coordinator::{Coordinator, MergeSummary};
pub use error::{Error, Result};
pub use iterator::{MergeIterator, RecordSource};
pub use shard::{ShardMeta, ShardReader, ShardWriter};
pub use types::{Cell, CellType, Key, Record};
