pub mod merge;
pub mod pool;

use std::collections::VecDeque;

use crate::error::Result;
use crate::types::Record;

pub use merge::MergeIterator;
pub use pool::{PooledSource, ReadPool};

/// The central pull abstraction for the merge engine.
///
/// Every sorted record stream (a shard on disk, a pooled read-ahead
/// wrapper, an in-memory run) implements this trait, so `MergeIterator`
/// can take `Vec<S>` of any of them.
///
/// Contract: records come out with non-decreasing keys, and once `None`
/// has been returned every later call returns `None` too.
pub trait RecordSource {
    /// Next record in key order, or `None` when exhausted.
    fn next_record(&mut self) -> Result<Option<Record>>;

    /// Human-readable label for logs.
    fn name(&self) -> String {
        String::from("<source>")
    }
}

impl<S: RecordSource + ?Sized> RecordSource for Box<S> {
    fn next_record(&mut self) -> Result<Option<Record>> {
        (**self).next_record()
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

/// An already-sorted in-memory run.
#[derive(Debug, Default, Clone)]
pub struct VecSource {
    records: VecDeque<Record>,
}

impl VecSource {
    pub fn new(records: Vec<Record>) -> Self {
        VecSource {
            records: records.into(),
        }
    }
}

impl RecordSource for VecSource {
    fn next_record(&mut self) -> Result<Option<Record>> {
        Ok(self.records.pop_front())
    }

    fn name(&self) -> String {
        String::from("<memory>")
    }
}
