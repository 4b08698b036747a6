//! One framed record inside a shard's data section.
//!
//! On-disk format (little-endian):
//! ```text
//! ┌──────────┬──────────┬──────────────────────────────────────────────┐
//! │ CRC (4B) │ Len (4B) │ Payload (Len bytes)                          │
//! └──────────┴──────────┴──────────────────────────────────────────────┘
//! payload = [key_len(4B)][key][cell_count(4B)] cell*
//! cell    = [family_len(4B)][family][qualifier_len(4B)][qualifier]
//!           [timestamp(8B)][type(1B)][value_len(4B)][value]
//! ```
//!
//! CRC covers the length field and the payload. Any mismatch, short read or
//! leftover payload byte is corruption, never a best-effort value.

use std::io;

use crate::error::{Error, Result};
use crate::types::{Cell, CellType, Record};

pub const CRC_SIZE: usize = 4;
pub const LEN_SIZE: usize = 4;
pub const FRAME_HEADER_SIZE: usize = CRC_SIZE + LEN_SIZE;

const KEY_LEN_SIZE: usize = 4;
const CELL_COUNT_SIZE: usize = 4;
// family_len + qualifier_len + timestamp + type + value_len
const CELL_FIXED_SIZE: usize = 4 + 4 + 8 + 1 + 4;

/// Size of `record` when framed on disk.
pub fn encoded_size(record: &Record) -> usize {
    FRAME_HEADER_SIZE + payload_size(record)
}

fn payload_size(record: &Record) -> usize {
    let cells: usize = record
        .cells
        .iter()
        .map(|c| CELL_FIXED_SIZE + c.family.len() + c.qualifier.len() + c.value.len())
        .sum();
    KEY_LEN_SIZE + record.key.len() + CELL_COUNT_SIZE + cells
}

/// Serialize a record, CRC header included.
///
/// Every length on disk is a u32; a record whose payload, cell count or any
/// single field does not fit is rejected rather than truncated.
pub fn encode(record: &Record) -> Result<Vec<u8>> {
    let payload_len = payload_size(record);
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload_len);

    // CRC filled in last
    buf.extend_from_slice(&[0u8; CRC_SIZE]);
    buf.extend_from_slice(&len_u32(payload_len, "record payload")?.to_le_bytes());

    put_bytes(&mut buf, &record.key, "key")?;
    buf.extend_from_slice(&len_u32(record.cells.len(), "cell count")?.to_le_bytes());
    for cell in &record.cells {
        put_bytes(&mut buf, &cell.family, "family")?;
        put_bytes(&mut buf, &cell.qualifier, "qualifier")?;
        buf.extend_from_slice(&cell.timestamp.to_le_bytes());
        buf.push(cell.cell_type as u8);
        put_bytes(&mut buf, &cell.value, "value")?;
    }

    let crc = crc32fast::hash(&buf[CRC_SIZE..]);
    buf[0..CRC_SIZE].copy_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8], what: &str) -> Result<()> {
    buf.extend_from_slice(&len_u32(bytes.len(), what)?.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn len_u32(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{what} length {len} does not fit the 4 GiB frame limit"),
        ))
    })
}

/// Split a frame header into (stored crc, payload length).
pub fn decode_header(header: &[u8; FRAME_HEADER_SIZE]) -> (u32, usize) {
    let crc = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    (crc, len)
}

/// Verify the CRC of a frame whose header and payload were read separately,
/// then decode the payload.
pub fn decode_frame(header: &[u8; FRAME_HEADER_SIZE], payload: &[u8]) -> Result<Record> {
    let (stored_crc, payload_len) = decode_header(header);
    if payload.len() != payload_len {
        return Err(Error::corrupt("record truncated"));
    }

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&header[CRC_SIZE..]);
    hasher.update(payload);
    if hasher.finalize() != stored_crc {
        return Err(Error::corrupt("CRC mismatch"));
    }

    decode_payload(payload)
}

/// Deserialize one framed record from the front of `data`.
/// Returns the record and the number of bytes consumed.
pub fn decode(data: &[u8]) -> Result<(Record, usize)> {
    if data.len() < FRAME_HEADER_SIZE {
        return Err(Error::corrupt("record too short"));
    }
    let mut header = [0u8; FRAME_HEADER_SIZE];
    header.copy_from_slice(&data[..FRAME_HEADER_SIZE]);
    let (_, payload_len) = decode_header(&header);

    let total = FRAME_HEADER_SIZE + payload_len;
    if data.len() < total {
        return Err(Error::corrupt("record truncated"));
    }
    let record = decode_frame(&header, &data[FRAME_HEADER_SIZE..total])?;
    Ok((record, total))
}

fn decode_payload(payload: &[u8]) -> Result<Record> {
    let mut cur = Cursor { data: payload, pos: 0 };

    let key = cur.bytes("key")?;
    let cell_count = cur.u32("cell count")? as usize;

    // Every cell needs at least its fixed fields; reject absurd counts before allocating.
    if cell_count > cur.remaining() / CELL_FIXED_SIZE {
        return Err(Error::corrupt(format!(
            "cell count {cell_count} exceeds record payload"
        )));
    }

    let mut cells = Vec::with_capacity(cell_count);
    for _ in 0..cell_count {
        let family = cur.bytes("family")?;
        let qualifier = cur.bytes("qualifier")?;
        let timestamp = cur.u64("timestamp")?;
        let cell_type = CellType::from_u8(cur.u8("cell type")?)?;
        let value = cur.bytes("value")?;
        cells.push(Cell {
            family,
            qualifier,
            timestamp,
            cell_type,
            value,
        });
    }

    if cur.remaining() != 0 {
        return Err(Error::corrupt(format!(
            "{} trailing bytes after last cell",
            cur.remaining()
        )));
    }

    Ok(Record { key, cells })
}

/// Bounds-checked little-endian reader over a payload slice.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::corrupt(format!("{what} exceeds record payload")));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self, what: &str) -> Result<u64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8, what)?);
        Ok(u64::from_le_bytes(b))
    }

    fn bytes(&mut self, what: &str) -> Result<Vec<u8>> {
        let len = self.u32(what)? as usize;
        Ok(self.take(len, what)?.to_vec())
    }
}
