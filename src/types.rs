use crate::error::{Error, Result};

/// Raw row key bytes. Ordered lexicographically by unsigned byte.
pub type Key = Vec<u8>;

/// Ordered cells that make up one row result.
pub type ValueAggregate = Vec<Cell>;

/// Kind of mutation a cell records.
///
/// Codes match HBase's `KeyValue.Type`, so exported row results keep
/// their delete markers intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellType {
    /// A normal put.
    Put = 4,
    /// Deletes one version of a column.
    Delete = 8,
    /// Deletes one version across a family.
    DeleteFamilyVersion = 10,
    /// Deletes all versions of a column.
    DeleteColumn = 12,
    /// Deletes all columns of a family.
    DeleteFamily = 14,
}

impl CellType {
    pub(crate) fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            4 => Ok(CellType::Put),
            8 => Ok(CellType::Delete),
            10 => Ok(CellType::DeleteFamilyVersion),
            12 => Ok(CellType::DeleteColumn),
            14 => Ok(CellType::DeleteFamily),
            _ => Err(Error::corrupt(format!("invalid cell type: {byte}"))),
        }
    }

    /// True for every delete marker.
    pub fn is_delete(self) -> bool {
        self != CellType::Put
    }
}

/// One column fragment of a row.
///
/// A cell is identified by (family, qualifier, timestamp); the merge never
/// deduplicates on that identity, it only concatenates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub family: Vec<u8>,
    pub qualifier: Vec<u8>,
    /// Higher = newer.
    pub timestamp: u64,
    pub cell_type: CellType,
    pub value: Vec<u8>,
}

impl Cell {
    /// Create a Put cell.
    pub fn put(
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: u64,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Cell {
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp,
            cell_type: CellType::Put,
            value: value.into(),
        }
    }

    /// Create a delete marker with an empty value.
    pub fn delete(
        cell_type: CellType,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: u64,
    ) -> Self {
        Cell {
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp,
            cell_type,
            value: Vec::new(),
        }
    }
}

/// A row key and its cells. The unit stored in a shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Key,
    pub cells: ValueAggregate,
}

impl Record {
    pub fn new(key: impl Into<Key>, cells: ValueAggregate) -> Self {
        Record {
            key: key.into(),
            cells,
        }
    }
}
