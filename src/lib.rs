//! Table, row and file storage on a symbol-only medium.
//!
//! Records are JSON text encoded two symbols per byte into fixed-size
//! chunks. Tables, the rows of each table and uploaded files each form a
//! doubly linked chain over logical indices, and freed indices are recycled
//! through the `freeChunks` system table.

mod chain;
mod chunk;
mod codec;
mod constants;
mod cursor;
mod database;
mod env;
mod error;
mod files;
mod freelist;
mod layout;
mod markers;
mod medium;
mod meta;
mod routes;
mod types;
mod writer;

pub use chain::{Chain, ChainReport};
pub use chunk::ChunkStore;
pub use codec::{decode, encode, is_data_cell, Symbol};
pub use constants::*;
pub use cursor::{Cursor, WalkLimits};
pub use database::Database;
pub use env::{DbOptions, Environment};
pub use error::{Error, Result};
pub use files::StoredFile;
pub use freelist::is_system_table;
pub use layout::ChainKind;
pub use markers::{Marker, MarkerBoard, MarkerKind, MemoryMarkers};
pub use medium::{MappedMedium, Medium, MemoryMedium};
pub use meta::{
    meets_condition, parse_protection, render_protection, ChainNode, FileMeta,
    FreeChunkDescriptor, Links, RowRecord, TableMeta,
};
pub use routes::{route_path, RouteRegistry};
pub use types::{ChunkAddr, ChunkType, Index, Response, Span, NONE};
pub use writer::Writer;

/// Chunk addresses of every coordinate family
pub mod addresses {
    pub use crate::layout::{
        bootstrap_list, coordinate_space, file_marker, file_meta, file_payload, row, row_head,
        table_marker, table_meta,
    };
}
