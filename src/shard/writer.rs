use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::codec;
use crate::error::{Error, Result};
use crate::shard::format::{Footer, Header, ShardMeta};
use crate::types::{Key, Record};

/// Default buffer in front of the output file.
pub const DEFAULT_WRITE_BUFFER: usize = 256 * 1024;

/// Writes one shard from a stream of records that are already sorted and
/// deduplicated by key.
///
/// Build process:
/// 1. `create` opens a hidden temporary sibling `.<name>.tmp`
/// 2. `write` appends framed records (strictly ascending keys)
/// 3. `finish` writes the footer, fsyncs, and renames onto the final path
///
/// Until `finish` returns, nothing exists under the final name. Dropping an
/// unfinished writer deletes the temporary file.
pub struct ShardWriter {
    final_path: PathBuf,
    tmp_path: PathBuf,
    /// `None` once the file has been handed off in `finish`.
    writer: Option<BufWriter<File>>,
    offset: u64,
    record_count: u64,
    cell_count: u64,
    min_key: Option<Key>,
    last_key: Option<Key>,
    sync: bool,
}

impl ShardWriter {
    /// Create a writer for `path` with default buffering and fsync on finish.
    pub fn create(path: &Path) -> Result<Self> {
        Self::create_with(path, DEFAULT_WRITE_BUFFER, true)
    }

    /// Create a writer for `path`.
    ///
    /// Fails with `OutputExists` if a file is already at `path`; callers
    /// are expected to clear stale output first.
    pub fn create_with(path: &Path, buffer_size: usize, sync: bool) -> Result<Self> {
        if path.exists() {
            return Err(Error::OutputExists(path.to_path_buf()));
        }
        let tmp_path = temp_path_for(path);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        debug!(tmp = %tmp_path.display(), "creating shard");

        // Built before the header write so Drop cleans up if that fails.
        let mut shard = ShardWriter {
            final_path: path.to_path_buf(),
            tmp_path,
            writer: Some(BufWriter::with_capacity(buffer_size.max(1), file)),
            offset: Header::SIZE as u64,
            record_count: 0,
            cell_count: 0,
            min_key: None,
            last_key: None,
            sync,
        };
        shard.writer_mut()?.write_all(&Header::current().encode())?;
        Ok(shard)
    }

    /// Append a record. Keys MUST be strictly ascending across calls.
    pub fn write(&mut self, record: &Record) -> Result<()> {
        if let Some(prev) = &self.last_key {
            if record.key <= *prev {
                return Err(Error::CorruptShard {
                    path: self.final_path.clone(),
                    reason: format!(
                        "writer got key {:?} after {:?}; input must be strictly ascending",
                        String::from_utf8_lossy(&record.key),
                        String::from_utf8_lossy(prev)
                    ),
                });
            }
        }

        let encoded = codec::encode(record)?;
        self.writer_mut()?.write_all(&encoded)?;
        self.offset += encoded.len() as u64;

        if self.min_key.is_none() {
            self.min_key = Some(record.key.clone());
        }
        self.last_key = Some(record.key.clone());
        self.record_count += 1;
        self.cell_count += record.cells.len() as u64;
        Ok(())
    }

    /// Records written so far.
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Seal the shard: footer, flush, fsync, rename into place.
    pub fn finish(mut self) -> Result<ShardMeta> {
        let footer = Footer {
            data_end: self.offset,
            record_count: self.record_count,
            cell_count: self.cell_count,
        };
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| io::Error::other("shard writer already finished"))?;

        // On any failure below, Drop removes the temp file.
        writer.write_all(&footer.encode())?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        if self.sync {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(&self.tmp_path, &self.final_path)?;
        if self.sync {
            sync_parent(&self.final_path)?;
        }

        let file_size = self.offset + Footer::SIZE as u64;
        debug!(
            shard = %self.final_path.display(),
            records = self.record_count,
            cells = self.cell_count,
            bytes = file_size,
            "finished shard"
        );

        Ok(ShardMeta {
            path: self.final_path.clone(),
            record_count: self.record_count,
            cell_count: self.cell_count,
            file_size,
            min_key: self.min_key.take().unwrap_or_default(),
            max_key: self.last_key.take().unwrap_or_default(),
        })
    }

    fn writer_mut(&mut self) -> Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| Error::Io(io::Error::other("shard writer already finished")))
    }
}

impl Drop for ShardWriter {
    fn drop(&mut self) {
        // A temp file left at this point belongs to an abandoned or failed write.
        if self.tmp_path.exists() {
            self.writer.take();
            if let Err(e) = fs::remove_file(&self.tmp_path) {
                warn!(tmp = %self.tmp_path.display(), error = %e, "failed to remove temp shard");
            }
        }
    }
}

/// `dir/part` → `dir/.part.tmp`. Hidden so shard discovery skips it.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Cell;
    use tempfile::tempdir;

    fn rec(key: &str) -> Record {
        Record::new(key.as_bytes().to_vec(), vec![Cell::put("cf", "q", 1, key)])
    }

    #[test]
    fn temp_name_is_hidden_sibling() {
        assert_eq!(
            temp_path_for(Path::new("out/part-r-00000")),
            PathBuf::from("out/.part-r-00000.tmp")
        );
    }

    #[test]
    fn finish_returns_correct_meta() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.shard");

        let mut writer = ShardWriter::create(&path).unwrap();
        writer.write(&rec("alpha")).unwrap();
        writer.write(&rec("omega")).unwrap();
        let meta = writer.finish().unwrap();

        assert_eq!(meta.record_count, 2);
        assert_eq!(meta.cell_count, 2);
        assert_eq!(meta.min_key, b"alpha");
        assert_eq!(meta.max_key, b"omega");
        assert_eq!(meta.file_size, fs::metadata(&path).unwrap().len());
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn nothing_at_final_path_until_finish() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.shard");

        let mut writer = ShardWriter::create(&path).unwrap();
        writer.write(&rec("a")).unwrap();
        assert!(!path.exists());
        assert!(temp_path_for(&path).exists());

        writer.finish().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn dropped_writer_removes_temp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.shard");

        let mut writer = ShardWriter::create(&path).unwrap();
        writer.write(&rec("a")).unwrap();
        drop(writer);

        assert!(!path.exists());
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn rejects_non_ascending_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.shard");

        let mut writer = ShardWriter::create(&path).unwrap();
        writer.write(&rec("b")).unwrap();
        assert!(matches!(
            writer.write(&rec("b")),
            Err(Error::CorruptShard { .. })
        ));
        assert!(matches!(
            writer.write(&rec("a")),
            Err(Error::CorruptShard { .. })
        ));
    }

    #[test]
    fn refuses_to_clobber() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.shard");
        fs::write(&path, b"old").unwrap();

        assert!(matches!(
            ShardWriter::create(&path),
            Err(Error::OutputExists(_))
        ));
        assert_eq!(fs::read(&path).unwrap(), b"old");
    }
}
