#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use shard_merge::codec;
use shard_merge::shard::format::{Footer, Header};
use shard_merge::{Cell, Record, ShardReader, ShardWriter};

/// Cell whose qualifier and value carry `tag`, so merged output shows provenance.
pub fn cell(tag: &str) -> Cell {
    Cell::put("cf", tag, 1, tag)
}

pub fn rec(key: &str, tags: &[&str]) -> Record {
    Record::new(key.as_bytes().to_vec(), tags.iter().map(|t| cell(t)).collect())
}

/// Write a well-formed shard through the real writer.
pub fn write_shard(path: &Path, records: &[Record]) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut writer = ShardWriter::create_with(path, 4096, false).unwrap();
    for r in records {
        writer.write(r).unwrap();
    }
    writer.finish().unwrap();
    path.to_path_buf()
}

/// Write shard bytes directly, skipping the writer's ordering check.
/// `record_count` overrides the footer's promised count when given.
pub fn write_raw_shard(path: &Path, records: &[Record], record_count: Option<u64>) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut data = Header::current().encode().to_vec();
    for r in records {
        data.extend_from_slice(&codec::encode(r).unwrap());
    }
    let footer = Footer {
        data_end: data.len() as u64,
        record_count: record_count.unwrap_or(records.len() as u64),
        cell_count: records.iter().map(|r| r.cells.len() as u64).sum(),
    };
    data.extend_from_slice(&footer.encode());
    fs::write(path, data).unwrap();
}

/// Read every record of a shard.
pub fn read_shard(path: &Path) -> Vec<Record> {
    ShardReader::open(path)
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
}
