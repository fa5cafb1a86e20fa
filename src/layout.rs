//! Coordinate families.
//!
//! Tables live on the positive z side, files on the negative z side, and the
//! bootstrap free lists far out on the negative x side:
//!
//! - table chain head `(0, 1)`, table `t` metadata at `(0, t + 1)`
//! - row chain head of table `t` at `(1, t + 1)`, row `r` at `(r + 1, t + 1)`
//! - file chain head `(0, -1)`, file `i` metadata at `(0, -(i + 1))`, payload
//!   from `(1, -(i + 1))` spanning towards +x
//! - bootstrap lists at `(-100, -100)` (files), `(-100, -101)` (tables) and
//!   `(-100, -200 - t)` (rows of table `t`)

use std::fmt;

use crate::constants::{
    BOOTSTRAP_X, FILE_BOOTSTRAP_Z, FILE_PAYLOAD_X, HEAD_X, MARKER_X, ROW_BOOTSTRAP_Z_BASE,
    ROW_HEAD_X, TABLE_BOOTSTRAP_Z,
};
use crate::types::{ChunkAddr, ChunkType, Index, NONE};

/// One linked chain of records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainKind {
    /// Every table's metadata
    Tables,
    /// Rows of the table with the given index
    Rows(Index),
    /// Uploaded files' metadata
    Files,
}

impl ChainKind {
    /// Chunk holding the chain's head pointer
    pub fn head(self) -> ChunkAddr {
        match self {
            ChainKind::Tables => ChunkAddr::new(HEAD_X, 1),
            ChainKind::Rows(table) => ChunkAddr::new(ROW_HEAD_X, positive(table)),
            ChainKind::Files => ChunkAddr::new(HEAD_X, -1),
        }
    }

    /// Chunk holding the node with logical index `index`
    pub fn node(self, index: Index) -> ChunkAddr {
        match self {
            ChainKind::Tables => table_meta(index),
            ChainKind::Rows(table) => row(table, index),
            ChainKind::Files => file_meta(index),
        }
    }

    /// Category freed indices of this chain are recycled under
    pub fn chunk_type(self) -> ChunkType {
        match self {
            ChainKind::Tables => ChunkType::Table,
            ChainKind::Rows(_) => ChunkType::Row,
            ChainKind::Files => ChunkType::File,
        }
    }

    /// Owning table index, 0 unless this is a row chain
    pub fn parent(self) -> Index {
        match self {
            ChainKind::Rows(table) => table,
            _ => NONE,
        }
    }

    pub fn coordinate_space(self) -> String {
        coordinate_space(self.chunk_type(), self.parent())
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainKind::Tables => f.write_str("tables"),
            ChainKind::Rows(table) => write!(f, "rows of table {}", table),
            ChainKind::Files => f.write_str("files"),
        }
    }
}

#[inline]
fn positive(index: Index) -> i32 {
    index as i32 + 1
}

#[inline]
fn negative(index: Index) -> i32 {
    -(index as i32) - 1
}

/// Metadata chunk of table `table`
pub fn table_meta(table: Index) -> ChunkAddr {
    ChunkAddr::new(HEAD_X, positive(table))
}

/// Head pointer of table `table`'s row chain
pub fn row_head(table: Index) -> ChunkAddr {
    ChainKind::Rows(table).head()
}

/// Chunk of row `row` inside table `table`
pub fn row(table: Index, row: Index) -> ChunkAddr {
    ChunkAddr::new(positive(row), positive(table))
}

/// Metadata chunk of file `file`
pub fn file_meta(file: Index) -> ChunkAddr {
    ChunkAddr::new(HEAD_X, negative(file))
}

/// First payload chunk of file `file`
pub fn file_payload(file: Index) -> ChunkAddr {
    ChunkAddr::new(FILE_PAYLOAD_X, negative(file))
}

/// Bootstrap free list of one category
pub fn bootstrap_list(chunk_type: ChunkType, parent: Index) -> ChunkAddr {
    match chunk_type {
        ChunkType::File => ChunkAddr::new(BOOTSTRAP_X, FILE_BOOTSTRAP_Z),
        ChunkType::Table => ChunkAddr::new(BOOTSTRAP_X, TABLE_BOOTSTRAP_Z),
        ChunkType::Row => ChunkAddr::new(BOOTSTRAP_X, ROW_BOOTSTRAP_Z_BASE - parent as i32),
    }
}

/// Tag free-chunk descriptors are matched on
pub fn coordinate_space(chunk_type: ChunkType, parent: Index) -> String {
    match chunk_type {
        ChunkType::File => "file_negative_z".to_string(),
        ChunkType::Table => "table_positive_z".to_string(),
        ChunkType::Row => format!("row_table_{}", parent),
    }
}

/// Where the locator marker of table `table` stands
pub fn table_marker(table: Index) -> ChunkAddr {
    ChunkAddr::new(MARKER_X, positive(table))
}

/// Where the locator marker of file `file` stands
pub fn file_marker(file: Index) -> ChunkAddr {
    ChunkAddr::new(MARKER_X, negative(file))
}
