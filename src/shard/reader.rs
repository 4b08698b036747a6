use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::codec::{self, FRAME_HEADER_SIZE};
use crate::error::{Error, Result};
use crate::iterator::RecordSource;
use crate::shard::format::{Footer, Header, ShardMeta};
use crate::types::{Key, Record};

/// Default buffer for streaming a shard's record section.
pub const DEFAULT_READ_BUFFER: usize = 64 * 1024;

/// Forward-only cursor over one shard file.
///
/// On open:
/// 1. Read and check the header (magic + version)
/// 2. Read the footer (last 32 bytes) → where records end, how many to expect
/// 3. Seek back to the first record and stream from there
///
/// Only the record being decoded is held in memory. Keys must be
/// non-decreasing; a key smaller than its predecessor is corruption.
pub struct ShardReader {
    path: PathBuf,
    reader: BufReader<File>,
    footer: Footer,
    file_size: u64,
    /// Byte offset of the next frame.
    offset: u64,
    last_key: Option<Key>,
    records_read: u64,
    cells_read: u64,
    /// Set once the stream has ended, cleanly or not.
    done: bool,
}

impl ShardReader {
    /// Open a shard file with the default read buffer.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_buffer(path, DEFAULT_READ_BUFFER)
    }

    /// Open a shard file, streaming through a buffer of `buffer_size` bytes.
    pub fn open_with_buffer(path: &Path, buffer_size: usize) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;

        let file_size = file.metadata()?.len();
        let min_size = (Header::SIZE + Footer::SIZE) as u64;
        if file_size < min_size {
            return Err(Error::corrupt(format!(
                "file too short for header and footer ({file_size} bytes)"
            ))
            .in_shard(path));
        }

        let mut header_buf = [0u8; Header::SIZE];
        file.read_exact(&mut header_buf)?;
        Header::decode(&header_buf).map_err(|e| e.in_shard(path))?;

        file.seek(SeekFrom::Start(file_size - Footer::SIZE as u64))?;
        let mut footer_buf = [0u8; Footer::SIZE];
        file.read_exact(&mut footer_buf)?;
        let footer = Footer::decode(&footer_buf).map_err(|e| e.in_shard(path))?;

        if footer.data_end != file_size - Footer::SIZE as u64 {
            return Err(Error::corrupt(format!(
                "footer says records end at {}, file has {} bytes",
                footer.data_end, file_size
            ))
            .in_shard(path));
        }

        file.seek(SeekFrom::Start(Header::SIZE as u64))?;
        debug!(
            shard = %path.display(),
            records = footer.record_count,
            cells = footer.cell_count,
            "opened shard"
        );

        Ok(ShardReader {
            path: path.to_path_buf(),
            reader: BufReader::with_capacity(buffer_size.max(FRAME_HEADER_SIZE), file),
            footer,
            file_size,
            offset: Header::SIZE as u64,
            last_key: None,
            records_read: 0,
            cells_read: 0,
            done: false,
        })
    }

    /// Location this reader was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Counts promised by the footer. Keys are not stored in the footer.
    pub fn meta(&self) -> ShardMeta {
        ShardMeta {
            path: self.path.clone(),
            record_count: self.footer.record_count,
            cell_count: self.footer.cell_count,
            file_size: self.file_size,
            min_key: Vec::new(),
            max_key: Vec::new(),
        }
    }

    /// Records handed out so far.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Release the file handle.
    pub fn close(self) {}

    /// Read the next record, or `None` once the shard is exhausted.
    ///
    /// Calling again after exhaustion keeps returning `None`.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        if self.done {
            return Ok(None);
        }
        match self.read_one() {
            Ok(Some(record)) => Ok(Some(record)),
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                Err(e.in_shard(&self.path))
            }
        }
    }

    fn read_one(&mut self) -> Result<Option<Record>> {
        let remaining = self.footer.data_end - self.offset;
        if remaining == 0 {
            self.check_counts()?;
            return Ok(None);
        }
        if remaining < FRAME_HEADER_SIZE as u64 {
            return Err(Error::corrupt(format!(
                "{remaining} stray bytes before footer"
            )));
        }

        let mut header = [0u8; FRAME_HEADER_SIZE];
        self.reader.read_exact(&mut header)?;
        let (_, payload_len) = codec::decode_header(&header);
        if payload_len as u64 > remaining - FRAME_HEADER_SIZE as u64 {
            return Err(Error::corrupt(format!(
                "record at offset {} truncated",
                self.offset
            )));
        }

        let mut payload = vec![0u8; payload_len];
        self.reader.read_exact(&mut payload)?;
        let record = codec::decode_frame(&header, &payload)?;
        self.offset += (FRAME_HEADER_SIZE + payload_len) as u64;

        if let Some(prev) = &self.last_key {
            if record.key < *prev {
                return Err(Error::corrupt(format!(
                    "key {:?} follows larger key {:?}",
                    String::from_utf8_lossy(&record.key),
                    String::from_utf8_lossy(prev)
                )));
            }
        }
        self.last_key = Some(record.key.clone());
        self.records_read += 1;
        self.cells_read += record.cells.len() as u64;

        Ok(Some(record))
    }

    /// A record stream that stops short of (or overruns) the footer's
    /// promise has been truncated or spliced.
    fn check_counts(&self) -> Result<()> {
        if self.records_read != self.footer.record_count
            || self.cells_read != self.footer.cell_count
        {
            return Err(Error::corrupt(format!(
                "footer promises {} records / {} cells, found {} / {}",
                self.footer.record_count,
                self.footer.cell_count,
                self.records_read,
                self.cells_read
            )));
        }
        Ok(())
    }
}

impl RecordSource for ShardReader {
    fn next_record(&mut self) -> Result<Option<Record>> {
        ShardReader::next_record(self)
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

impl Iterator for ShardReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        ShardReader::next_record(self).transpose()
    }
}
