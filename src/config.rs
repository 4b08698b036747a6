use std::thread;

use crate::shard::reader::DEFAULT_READ_BUFFER;
use crate::shard::writer::DEFAULT_WRITE_BUFFER;

/// Name of the merged shard inside the output directory.
pub const DEFAULT_OUTPUT_FILE: &str = "part-r-00000";

/// Empty marker written next to a completed output.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Tunables for a merge run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    /// Upper bound on read-ahead worker threads. The pool gets
    /// `min(shards, read_concurrency)`; 0 or 1 reads inline on the merge thread.
    pub read_concurrency: usize,
    /// Buffer per open shard reader.
    pub read_buffer_size: usize,
    /// Buffer in front of the output file.
    pub write_buffer_size: usize,
    /// fsync the output file and its directory before reporting success.
    pub sync: bool,
    /// File name of the merged shard inside the output directory.
    pub output_file_name: String,
    /// Write `_SUCCESS` after the merged shard is in place.
    pub write_success_marker: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        MergeOptions {
            read_concurrency: thread::available_parallelism().map_or(1, |n| n.get()),
            read_buffer_size: DEFAULT_READ_BUFFER,
            write_buffer_size: DEFAULT_WRITE_BUFFER,
            sync: true,
            output_file_name: DEFAULT_OUTPUT_FILE.to_string(),
            write_success_marker: true,
        }
    }
}

impl MergeOptions {
    /// Worker threads to use for `shards` inputs; 0 means read inline.
    pub fn read_workers(&self, shards: usize) -> usize {
        if self.read_concurrency <= 1 || shards <= 1 {
            0
        } else {
            shards.min(self.read_concurrency)
        }
    }
}
