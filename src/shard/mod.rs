//! Shard files: one immutable, key-sorted run of records.
//!
//! ```text
//! ┌────────────┬──────────────────────────────┬────────────┐
//! │ Header 12B │ framed records (see codec)   │ Footer 32B │
//! └────────────┴──────────────────────────────┴────────────┘
//! ```
//!
//! Writers stream records and seal the file with a footer; readers stream
//! them back one at a time and cross-check the footer counts at the end.

pub mod format;
pub mod reader;
pub mod writer;

pub use format::ShardMeta;
pub use reader::ShardReader;
pub use writer::ShardWriter;
