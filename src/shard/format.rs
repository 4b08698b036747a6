use std::path::PathBuf;

use crate::error::{Error, Result};

/// Magic number to identify shard files.
pub const SHARD_MAGIC: u64 = 0x5348_5244_4D52_4700; // "SHRDMRG\0"

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Fixed header at the start of every shard file.
///
/// ```text
/// ┌──────────────────────┬───────────────┐
/// │ Magic number (8B)    │ Version (4B)  │
/// └──────────────────────┴───────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
}

impl Header {
    pub const SIZE: usize = 8 + 4;

    pub fn current() -> Self {
        Header {
            version: FORMAT_VERSION,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&SHARD_MAGIC.to_le_bytes());
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::corrupt("header too short"));
        }
        let magic = u64::from_le_bytes(le8(&data[0..8]));
        if magic != SHARD_MAGIC {
            return Err(Error::corrupt(format!(
                "bad header magic: expected {SHARD_MAGIC:#x}, got {magic:#x}"
            )));
        }
        let version = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        if version != FORMAT_VERSION {
            return Err(Error::corrupt(format!("unsupported version {version}")));
        }
        Ok(Header { version })
    }
}

/// The footer sits at the end of the shard file.
/// It tells the reader where the record stream ends and what it must contain.
///
/// ```text
/// ┌──────────────────────────────────────┐
/// │ Data end offset (8B)                 │
/// │ Record count (8B)                    │
/// │ Cell count (8B)                      │
/// │ Magic number (8B)                    │
/// └──────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    pub data_end: u64,
    pub record_count: u64,
    pub cell_count: u64,
}

impl Footer {
    /// Size of the footer in bytes (fixed).
    pub const SIZE: usize = 8 * 4;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.data_end.to_le_bytes());
        buf[8..16].copy_from_slice(&self.record_count.to_le_bytes());
        buf[16..24].copy_from_slice(&self.cell_count.to_le_bytes());
        buf[24..32].copy_from_slice(&SHARD_MAGIC.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::corrupt("footer too short"));
        }
        let magic = u64::from_le_bytes(le8(&data[24..32]));
        if magic != SHARD_MAGIC {
            return Err(Error::corrupt(format!(
                "bad footer magic: expected {SHARD_MAGIC:#x}, got {magic:#x}"
            )));
        }
        Ok(Footer {
            data_end: u64::from_le_bytes(le8(&data[0..8])),
            record_count: u64::from_le_bytes(le8(&data[8..16])),
            cell_count: u64::from_le_bytes(le8(&data[16..24])),
        })
    }
}

fn le8(b: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&b[..8]);
    out
}

/// Summary of a finished (or opened) shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardMeta {
    pub path: PathBuf,
    pub record_count: u64,
    pub cell_count: u64,
    pub file_size: u64,
    /// Smallest key written. Empty when unknown or the shard is empty.
    pub min_key: Vec<u8>,
    /// Largest key written. Empty when unknown or the shard is empty.
    pub max_key: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_roundtrip() {
        let footer = Footer {
            data_end: 4096,
            record_count: 12,
            cell_count: 40,
        };
        let encoded = footer.encode();
        assert_eq!(encoded.len(), Footer::SIZE);
        assert_eq!(Footer::decode(&encoded).unwrap(), footer);
    }

    #[test]
    fn footer_bad_magic() {
        let mut encoded = Footer {
            data_end: 0,
            record_count: 0,
            cell_count: 0,
        }
        .encode();
        encoded[24] = 0xFF;
        assert!(Footer::decode(&encoded).is_err());
    }

    #[test]
    fn footer_too_short() {
        assert!(Footer::decode(&[0u8; 10]).is_err());
    }

    #[test]
    fn header_rejects_other_version() {
        let mut encoded = Header::current().encode();
        assert_eq!(Header::decode(&encoded).unwrap(), Header::current());
        encoded[8] = 9;
        let err = Header::decode(&encoded).unwrap_err();
        assert!(err.to_string().contains("unsupported version"), "{err}");
    }
}
