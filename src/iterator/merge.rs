use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::trace;

use crate::error::{Error, Result};
use crate::iterator::RecordSource;
use crate::types::{Cell, Key, Record};

/// The head record of one source, waiting in the heap.
struct HeapEntry {
    record: Record,
    /// Index into `MergeIterator::sources`.
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.record.key == other.record.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: reverse both so the smallest key pops
        // first and, among equal keys, the lowest source index.
        other
            .record
            .key
            .cmp(&self.record.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Merges N sorted sources into one strictly ascending stream.
///
/// Records sharing a key, whether across sources or repeated inside one
/// source, are coalesced into a single record. Cells are concatenated by
/// ascending source index, and in read order within a source. Nothing is
/// dropped or overwritten.
///
/// At most one head record per open source is resident, so memory is
/// O(N) records regardless of shard sizes.
pub struct MergeIterator<S> {
    sources: Vec<S>,
    heap: BinaryHeap<HeapEntry>,
    records_in: u64,
}

impl<S: RecordSource> MergeIterator<S> {
    /// Prime the heap with the first record of every source.
    /// Sources are ordered by tie-break priority: index 0 contributes first.
    pub fn new(mut sources: Vec<S>) -> Result<Self> {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        let mut records_in = 0;
        for (source, src) in sources.iter_mut().enumerate() {
            if let Some(record) = src.next_record()? {
                records_in += 1;
                heap.push(HeapEntry { record, source });
            }
        }
        Ok(MergeIterator {
            sources,
            heap,
            records_in,
        })
    }

    /// Next merged record, or `None` once every source is exhausted.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        let Some(first) = self.heap.pop() else {
            return Ok(None);
        };

        let Record { key, mut cells } = first.record;
        self.drain_source(first.source, &key, &mut cells)?;

        // Remaining ties pop in ascending source order. Each drained source's
        // new head has a larger key, so it can't rejoin this loop.
        while self.heap.peek().is_some_and(|top| top.record.key == key) {
            let Some(tie) = self.heap.pop() else { break };
            cells.extend(tie.record.cells);
            self.drain_source(tie.source, &key, &mut cells)?;
        }

        trace!(key = ?String::from_utf8_lossy(&key), cells = cells.len(), "merged");
        Ok(Some(Record { key, cells }))
    }

    /// Advance `source` past every record equal to `key`, appending their
    /// cells, and push its next head (if any) back onto the heap.
    fn drain_source(&mut self, source: usize, key: &Key, cells: &mut Vec<Cell>) -> Result<()> {
        loop {
            let Some(record) = self.sources[source].next_record()? else {
                trace!(source, "source exhausted");
                return Ok(());
            };
            self.records_in += 1;

            match record.key.cmp(key) {
                Ordering::Equal => cells.extend(record.cells),
                Ordering::Greater => {
                    self.heap.push(HeapEntry { record, source });
                    return Ok(());
                }
                Ordering::Less => {
                    return Err(Error::corrupt(format!(
                        "source {} went backwards: {:?} after {:?}",
                        self.sources[source].name(),
                        String::from_utf8_lossy(&record.key),
                        String::from_utf8_lossy(key)
                    )));
                }
            }
        }
    }

    /// Sources that still hold a head record.
    pub fn sources_remaining(&self) -> usize {
        self.heap.len()
    }

    /// Input records consumed so far.
    pub fn records_in(&self) -> u64 {
        self.records_in
    }
}

impl<S: RecordSource> RecordSource for MergeIterator<S> {
    fn next_record(&mut self) -> Result<Option<Record>> {
        MergeIterator::next_record(self)
    }

    fn name(&self) -> String {
        format!("merge of {} sources", self.sources.len())
    }
}
