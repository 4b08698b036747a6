use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::{MergeOptions, SUCCESS_MARKER};
use crate::error::{Error, Result};
use crate::fs::{LocalFs, ShardFs};
use crate::iterator::{MergeIterator, ReadPool, RecordSource};
use crate::shard::{ShardMeta, ShardReader, ShardWriter};

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    /// Input shards discovered and merged.
    pub shards: usize,
    /// Read-ahead threads used; 0 when shards were read inline.
    pub read_workers: usize,
    /// Records consumed across all inputs.
    pub records_read: u64,
    /// Distinct keys written.
    pub records_written: u64,
    pub cells_written: u64,
    /// The merged shard.
    pub output: PathBuf,
}

/// Drives one merge run from an input tree to an output directory.
///
/// 1. Input root must exist
/// 2. Existing output is stale: delete it entirely
/// 3. Discover shards in path order, open one reader each
/// 4. Merge into `<output>/part-r-00000` via a temp file + rename
/// 5. Drop a `_SUCCESS` marker
///
/// Any failure after step 2 removes the output directory again, so a
/// failed run leaves nothing behind. No step is retried.
pub struct Coordinator<F = LocalFs> {
    fs: F,
    options: MergeOptions,
}

impl Coordinator<LocalFs> {
    /// Coordinator over the local disk.
    pub fn local(options: MergeOptions) -> Self {
        Coordinator::new(LocalFs, options)
    }
}

impl<F: ShardFs> Coordinator<F> {
    pub fn new(fs: F, options: MergeOptions) -> Self {
        Coordinator { fs, options }
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Merge every shard under `input` into a single shard in `output`.
    pub fn run(&self, input: &Path, output: &Path) -> Result<MergeSummary> {
        let started = Instant::now();
        if !self.fs.exists(input)? {
            return Err(Error::NotFound(input.to_path_buf()));
        }

        self.remove_stale_output(output)?;

        match self.merge_into(input, output) {
            Ok(summary) => {
                info!(
                    shards = summary.shards,
                    records_read = summary.records_read,
                    records_written = summary.records_written,
                    cells = summary.cells_written,
                    output = %summary.output.display(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "merge complete"
                );
                Ok(summary)
            }
            Err(e) => {
                warn!(error = %e, "merge failed, discarding output");
                self.discard_output(output);
                Err(e)
            }
        }
    }

    fn remove_stale_output(&self, output: &Path) -> Result<()> {
        info!(output = %output.display(), "checking for existing output");
        let exists = self
            .fs
            .exists(output)
            .map_err(|e| stale_output(output, e))?;
        if exists {
            info!(output = %output.display(), "deleting stale output");
            self.fs
                .delete(output, true)
                .map_err(|e| stale_output(output, e))?;
        }
        Ok(())
    }

    fn merge_into(&self, input: &Path, output: &Path) -> Result<MergeSummary> {
        let shards = self.fs.list_shards(input)?;
        info!(input = %input.display(), shards = shards.len(), "discovered shards");

        let readers = shards
            .iter()
            .map(|path| ShardReader::open_with_buffer(path, self.options.read_buffer_size))
            .collect::<Result<Vec<_>>>()?;

        fs::create_dir_all(output)?;
        let target = output.join(&self.options.output_file_name);

        let read_workers = self.options.read_workers(readers.len());
        let (meta, records_read) = if read_workers > 0 {
            debug!(read_workers, "reading shards through pool");
            let sources = ReadPool::spawn_for(readers, read_workers)?;
            self.write_merged(MergeIterator::new(sources)?, &target)?
        } else {
            self.write_merged(MergeIterator::new(readers)?, &target)?
        };

        if self.options.write_success_marker {
            File::create(output.join(SUCCESS_MARKER))?;
        }

        Ok(MergeSummary {
            shards: shards.len(),
            read_workers,
            records_read,
            records_written: meta.record_count,
            cells_written: meta.cell_count,
            output: meta.path,
        })
    }

    fn write_merged<S: RecordSource>(
        &self,
        mut merge: MergeIterator<S>,
        target: &Path,
    ) -> Result<(ShardMeta, u64)> {
        let mut writer = ShardWriter::create_with(
            target,
            self.options.write_buffer_size,
            self.options.sync,
        )?;
        while let Some(record) = merge.next_record()? {
            writer.write(&record)?;
        }
        let meta = writer.finish()?;
        Ok((meta, merge.records_in()))
    }

    fn discard_output(&self, output: &Path) {
        match self.fs.exists(output) {
            Ok(false) => {}
            Ok(true) => {
                if let Err(e) = self.fs.delete(output, true) {
                    warn!(output = %output.display(), error = %e, "could not remove partial output");
                }
            }
            Err(e) => {
                warn!(output = %output.display(), error = %e, "could not stat partial output");
            }
        }
    }
}

fn stale_output(path: &Path, err: Error) -> Error {
    let source = match err {
        Error::Io(e) => e,
        other => io::Error::other(other.to_string()),
    };
    Error::StaleOutput {
        path: path.to_path_buf(),
        source,
    }
}
