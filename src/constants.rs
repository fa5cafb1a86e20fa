use bitflags::bitflags;

// Environment flags
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EnvFlags: u32 {
        /// Skip flushing the medium after every mutation
        const NOSYNC = 0x01;
        /// Skip file-route registration when the database is opened
        const NOROUTES = 0x02;
    }
}

// Table protection flags
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProtectionFlags: u32 {
        const READ = 0x01;
        const INSERT = 0x02;
        const UPDATE = 0x04;
        const DELETE = 0x08;
        const DROP = 0x10;
    }
}

/// Keyword spelling of each protection flag, in canonical order
pub const PROTECTION_KEYWORDS: [(&str, ProtectionFlags); 5] = [
    ("read", ProtectionFlags::READ),
    ("insert", ProtectionFlags::INSERT),
    ("update", ProtectionFlags::UPDATE),
    ("delete", ProtectionFlags::DELETE),
    ("drop", ProtectionFlags::DROP),
];

// Chunk geometry
pub const CHUNK_WIDTH: usize = 16;
pub const CHUNK_DEPTH: usize = 16;
pub const CHUNK_HEIGHT: usize = 384;
/// Cells scanned per chunk before a read is treated as corrupt
pub const DEFAULT_CHUNK_CELLS: usize = CHUNK_WIDTH * CHUNK_DEPTH * CHUNK_HEIGHT;

// Limits
/// Step cap of integrity walks and route bootstrap
pub const DEFAULT_MAX_CHAIN_STEPS: usize = 1000;
/// Largest logical index accepted anywhere
pub const DEFAULT_MAX_INDEX: u32 = 100_000;
/// Chunks a spanning read or write may travel through
pub const DEFAULT_MAX_SPAN_CHUNKS: usize = 4096;
/// Chunk files a persistent medium keeps mapped at once
pub const DEFAULT_MAX_OPEN_CHUNKS: usize = 1024;
/// Extra chunks probed past a file payload when it is erased
pub const DEFAULT_PAYLOAD_PROBE: usize = 4;
/// Seconds a caller waits on the writer thread
pub const DEFAULT_HANDOFF_TIMEOUT_SECS: u64 = 30;
/// Prefix used when building file links
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

// System tables
/// Backing table of the free-chunk allocator
pub const FREE_CHUNKS_TABLE: &str = "freeChunks";
/// Upload bookkeeping table, excluded from row recycling
pub const FILES_TABLE: &str = "files";

// Layout anchors
/// Column holding every chain head pointer of its family
pub const HEAD_X: i32 = 0;
/// Column of the per-table row head pointers
pub const ROW_HEAD_X: i32 = 1;
/// First payload column of a file, spanning towards +x
pub const FILE_PAYLOAD_X: i32 = 1;
/// Column of the bootstrap free lists
pub const BOOTSTRAP_X: i32 = -100;
pub const FILE_BOOTSTRAP_Z: i32 = -100;
pub const TABLE_BOOTSTRAP_Z: i32 = -101;
pub const ROW_BOOTSTRAP_Z_BASE: i32 = -200;
/// Column where locator markers stand
pub const MARKER_X: i32 = -1;

/// Cell value of an empty cell
pub const EMPTY_CELL: u8 = 0;
