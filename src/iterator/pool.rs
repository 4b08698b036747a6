use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::iterator::RecordSource;
use crate::types::Record;

/// One read request: the worker takes ownership of `source`, pulls a
/// single record, and hands both back on `reply`.
struct Job<S> {
    source: S,
    reply: Sender<Advanced<S>>,
}

struct Advanced<S> {
    source: S,
    result: Result<Option<Record>>,
}

struct PoolInner<S> {
    /// `None` only while shutting down.
    jobs: Option<Sender<Job<S>>>,
    workers: Vec<JoinHandle<()>>,
}

impl<S> Drop for PoolInner<S> {
    fn drop(&mut self) {
        // Closing the queue ends every worker's receive loop.
        self.jobs.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("shard read worker panicked");
            }
        }
    }
}

/// Bounded pool of threads that read ahead on behalf of the merge loop.
///
/// Sources are *moved* to a worker for each read and moved back with the
/// result, so a source is owned by exactly one thread at any moment and
/// needs no lock. Ordering decisions stay on the merge thread; the pool
/// only overlaps I/O.
///
/// The workers shut down once the pool handle and every `PooledSource`
/// attached to it have been dropped.
pub struct ReadPool<S> {
    inner: Arc<PoolInner<S>>,
}

impl<S: RecordSource + Send + 'static> ReadPool<S> {
    /// Start `workers` reader threads (at least one).
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let (tx, rx) = unbounded::<Job<S>>();

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("shard-read-{id}"))
                .spawn(move || worker_loop(id, rx))?;
            handles.push(handle);
        }
        debug!(workers, "read pool started");

        Ok(ReadPool {
            inner: Arc::new(PoolInner {
                jobs: Some(tx),
                workers: handles,
            }),
        })
    }

    /// Wrap `sources` in a pool of `min(sources.len(), max_workers)` threads.
    /// Output order of the returned sources matches the input order.
    pub fn spawn_for(sources: Vec<S>, max_workers: usize) -> Result<Vec<PooledSource<S>>> {
        let pool = Self::new(sources.len().min(max_workers))?;
        sources.into_iter().map(|s| pool.attach(s)).collect()
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.inner.workers.len()
    }

    /// Hand `source` to the pool and start reading its first record.
    pub fn attach(&self, source: S) -> Result<PooledSource<S>> {
        let name = source.name();
        let reply = submit(&*self.inner, source)?;
        Ok(PooledSource {
            name,
            pool: Arc::clone(&self.inner),
            reply,
            done: false,
        })
    }
}

/// Queue one read of `source`. The worker holds the only sender of the
/// returned channel, so a worker that dies mid-read disconnects it.
fn submit<S>(pool: &PoolInner<S>, source: S) -> Result<Receiver<Advanced<S>>> {
    let jobs = pool.jobs.as_ref().ok_or_else(pool_gone)?;
    // At most one read per source is ever in flight, so one slot suffices.
    let (reply, rx) = bounded(1);
    jobs.send(Job { source, reply }).map_err(|_| pool_gone())?;
    Ok(rx)
}

fn worker_loop<S: RecordSource>(id: usize, jobs: Receiver<Job<S>>) {
    for Job { mut source, reply } in jobs.iter() {
        let result = source.next_record();
        // The consumer may have gone away mid-merge; the source is dropped then.
        let _ = reply.send(Advanced { source, result });
    }
    debug!(worker = id, "read worker exiting");
}

/// A source whose next record is always being fetched in the background.
pub struct PooledSource<S> {
    name: String,
    pool: Arc<PoolInner<S>>,
    /// Answer to the read currently in flight.
    reply: Receiver<Advanced<S>>,
    done: bool,
}

fn pool_gone() -> Error {
    Error::Io(io::Error::other("shard read pool shut down"))
}

impl<S: RecordSource> RecordSource for PooledSource<S> {
    fn next_record(&mut self) -> Result<Option<Record>> {
        if self.done {
            return Ok(None);
        }

        let Advanced { source, result } = self.reply.recv().map_err(|_| {
            self.done = true;
            Error::Io(io::Error::other(format!(
                "read worker for {} disconnected",
                self.name
            )))
        })?;

        match result {
            Ok(Some(record)) => {
                // Read ahead while the merge loop works on this record.
                self.reply = submit(&*self.pool, source)?;
                Ok(Some(record))
            }
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::{MergeIterator, VecSource};
    use crate::types::Cell;

    fn rec(key: &str, tag: &str) -> Record {
        Record::new(key.as_bytes().to_vec(), vec![Cell::put("cf", tag, 1, tag)])
    }

    fn drain<S: RecordSource>(src: &mut S) -> Vec<Record> {
        let mut out = Vec::new();
        while let Some(r) = src.next_record().unwrap() {
            out.push(r);
        }
        out
    }

    #[test]
    fn pooled_source_yields_same_records() {
        let records: Vec<Record> = (0..50).map(|i| rec(&format!("k{i:03}"), "v")).collect();
        let pool = ReadPool::new(2).unwrap();
        let mut pooled = pool.attach(VecSource::new(records.clone())).unwrap();

        assert_eq!(drain(&mut pooled), records);
        assert!(pooled.next_record().unwrap().is_none());
    }

    #[test]
    fn pool_size_is_capped_by_source_count() {
        let pool = ReadPool::<VecSource>::new(0).unwrap();
        assert_eq!(pool.workers(), 1);

        let sources = vec![VecSource::default(), VecSource::default()];
        let pooled = ReadPool::spawn_for(sources, 8).unwrap();
        assert_eq!(pooled.len(), 2);
        assert_eq!(pooled[0].pool.workers.len(), 2);
    }

    #[test]
    fn merge_over_pool_matches_inline_merge() {
        let make = || {
            (0..6)
                .map(|s| {
                    VecSource::new(
                        (0..40)
                            .filter(|k| k % (s + 1) == 0)
                            .map(|k| rec(&format!("k{k:03}"), &format!("s{s}")))
                            .collect(),
                    )
                })
                .collect::<Vec<_>>()
        };

        let mut inline = MergeIterator::new(make()).unwrap();
        let expected = drain(&mut inline);

        for workers in [1, 2, 6] {
            let pooled = ReadPool::spawn_for(make(), workers).unwrap();
            let mut merged = MergeIterator::new(pooled).unwrap();
            assert_eq!(drain(&mut merged), expected, "workers = {workers}");
        }
    }

    struct FailAfter {
        left: usize,
    }

    impl RecordSource for FailAfter {
        fn next_record(&mut self) -> Result<Option<Record>> {
            if self.left == 0 {
                return Err(Error::corrupt("bad frame"));
            }
            self.left -= 1;
            Ok(Some(rec(&format!("k{}", 10 - self.left), "v")))
        }
    }

    #[test]
    fn worker_error_reaches_consumer() {
        let pool = ReadPool::new(1).unwrap();
        let mut pooled = pool.attach(FailAfter { left: 2 }).unwrap();

        assert!(pooled.next_record().unwrap().is_some());
        assert!(pooled.next_record().unwrap().is_some());
        assert!(matches!(
            pooled.next_record(),
            Err(Error::CorruptShard { .. })
        ));
        assert!(pooled.next_record().unwrap().is_none());
    }

    struct Panicking;

    impl RecordSource for Panicking {
        fn next_record(&mut self) -> Result<Option<Record>> {
            panic!("reader blew up");
        }
    }

    #[test]
    fn worker_panic_is_an_error_not_a_hang() {
        let (tx, rx) = bounded(1);
        thread::spawn(move || {
            let pool = ReadPool::new(1).unwrap();
            let mut pooled = pool.attach(Panicking).unwrap();
            let first = pooled.next_record();
            let second = pooled.next_record();
            let _ = tx.send((first, second));
        });

        let (first, second) = rx
            .recv_timeout(std::time::Duration::from_secs(10))
            .expect("consumer blocked after worker panic");
        assert!(matches!(first, Err(Error::Io(_))));
        assert!(second.unwrap().is_none());
    }
}
