use std::path::Path;
use std::time::Duration;

use log::info;

use crate::chunk::ChunkStore;
use crate::constants::{
    EnvFlags, DEFAULT_BASE_URL, DEFAULT_CHUNK_CELLS, DEFAULT_HANDOFF_TIMEOUT_SECS,
    DEFAULT_MAX_CHAIN_STEPS, DEFAULT_MAX_INDEX, DEFAULT_MAX_OPEN_CHUNKS, DEFAULT_MAX_SPAN_CHUNKS,
    DEFAULT_PAYLOAD_PROBE,
};
use crate::cursor::WalkLimits;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::markers::MemoryMarkers;
use crate::medium::{MappedMedium, Medium, MemoryMedium};

/// Smallest chunk that still holds a table record
const MIN_CHUNK_CELLS: usize = 64;

/// Largest index whose coordinates stay clear of the i32 edge
const INDEX_CEILING: u32 = (i32::MAX as u32) - 1024;

/// Settings a database runs with once opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbOptions {
    /// Bounds for every chain traversal
    pub limits: WalkLimits,
    /// Extra chunks probed past a file payload when it is erased
    pub payload_probe: usize,
    /// How long a caller waits on the writer thread
    pub handoff_timeout: Duration,
    /// Prefix of file links
    pub base_url: String,
    pub flags: EnvFlags,
}

/// Database environment: configuration applied when opening a medium
#[derive(Debug, Clone)]
pub struct Environment {
    /// Environment flags
    flags: EnvFlags,
    /// Cells per chunk
    chunk_cells: usize,
    /// Nodes a chain walk may visit
    max_chain_steps: usize,
    /// Largest valid logical index
    max_index: u32,
    /// Chunks a spanning payload may cross
    max_span_chunks: usize,
    /// Chunk files kept mapped by a persistent medium
    max_open_chunks: usize,
    /// Chunks probed past a file payload on delete
    payload_probe: usize,
    /// Writer handoff bound
    handoff_timeout: Duration,
    /// Prefix for file links
    base_url: String,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl Environment {
    /// Create a new environment with default settings
    pub fn new() -> Self {
        Environment {
            flags: EnvFlags::empty(),
            chunk_cells: DEFAULT_CHUNK_CELLS,
            max_chain_steps: DEFAULT_MAX_CHAIN_STEPS,
            max_index: DEFAULT_MAX_INDEX,
            max_span_chunks: DEFAULT_MAX_SPAN_CHUNKS,
            max_open_chunks: DEFAULT_MAX_OPEN_CHUNKS,
            payload_probe: DEFAULT_PAYLOAD_PROBE,
            handoff_timeout: Duration::from_secs(DEFAULT_HANDOFF_TIMEOUT_SECS),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Open (creating if needed) a database stored in the directory `path`
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<Database<MappedMedium>> {
        let medium = MappedMedium::open(path.as_ref(), self.chunk_cells, self.max_open_chunks)?;
        info!(
            "Opening database at {} ({} cells per chunk)",
            path.as_ref().display(),
            self.chunk_cells
        );
        self.open_with(medium)
    }

    /// Open a volatile database kept entirely in memory
    pub fn open_in_memory(&self) -> Result<Database<MemoryMedium>> {
        self.open_with(MemoryMedium::new(self.chunk_cells))
    }

    /// Open a database on any medium
    ///
    /// The medium's own chunk size wins over the configured one.
    pub fn open_with<M: Medium>(&self, medium: M) -> Result<Database<M>> {
        if medium.chunk_cells() < MIN_CHUNK_CELLS {
            return Err(Error::InvalidConfig(format!(
                "medium chunks hold {} cells, at least {} are needed",
                medium.chunk_cells(),
                MIN_CHUNK_CELLS
            )));
        }
        let store = ChunkStore::new(medium, self.max_span_chunks);
        Database::open(store, self.options(), Box::new(MemoryMarkers::new()))
    }

    /// Settings handed to opened databases
    pub fn options(&self) -> DbOptions {
        DbOptions {
            limits: WalkLimits {
                max_steps: self.max_chain_steps,
                max_index: self.max_index,
            },
            payload_probe: self.payload_probe,
            handoff_timeout: self.handoff_timeout,
            base_url: self.base_url.clone(),
            flags: self.flags,
        }
    }

    /// Set or clear environment flags
    pub fn set_flags(&mut self, flags: EnvFlags, onoff: bool) -> Result<()> {
        if onoff {
            self.flags |= flags;
        } else {
            self.flags &= !flags;
        }
        Ok(())
    }

    pub fn get_flags(&self) -> EnvFlags {
        self.flags
    }

    /// Set the number of cells in every chunk
    ///
    /// Reads that fill a chunk without meeting an empty cell are reported as
    /// corruption, so this is also the per-chunk scan ceiling. A directory
    /// must always be reopened with the size it was created with.
    pub fn set_chunk_cells(&mut self, cells: usize) -> Result<()> {
        if cells < MIN_CHUNK_CELLS {
            return Err(Error::InvalidConfig(format!(
                "chunk_cells must be at least {}, got {}",
                MIN_CHUNK_CELLS, cells
            )));
        }
        self.chunk_cells = cells;
        Ok(())
    }

    pub fn get_chunk_cells(&self) -> usize {
        self.chunk_cells
    }

    /// Set the step cap of integrity walks and route bootstrap
    ///
    /// Ordinary reads and appends are bounded by `max_index` and the cycle
    /// check only.
    pub fn set_max_chain_steps(&mut self, steps: usize) -> Result<()> {
        if steps == 0 {
            return Err(Error::InvalidConfig("max_chain_steps must be positive".into()));
        }
        self.max_chain_steps = steps;
        Ok(())
    }

    pub fn get_max_chain_steps(&self) -> usize {
        self.max_chain_steps
    }

    /// Set the largest logical index accepted anywhere
    pub fn set_max_index(&mut self, index: u32) -> Result<()> {
        if index == 0 || index > INDEX_CEILING {
            return Err(Error::InvalidConfig(format!(
                "max_index must be within 1..={}, got {}",
                INDEX_CEILING, index
            )));
        }
        self.max_index = index;
        Ok(())
    }

    pub fn get_max_index(&self) -> u32 {
        self.max_index
    }

    /// Set how many chunks a spanning payload may cross
    pub fn set_max_span_chunks(&mut self, chunks: usize) -> Result<()> {
        if chunks == 0 {
            return Err(Error::InvalidConfig("max_span_chunks must be positive".into()));
        }
        self.max_span_chunks = chunks;
        Ok(())
    }

    pub fn get_max_span_chunks(&self) -> usize {
        self.max_span_chunks
    }

    /// Set how many chunk files an opened directory keeps mapped
    pub fn set_max_open_chunks(&mut self, chunks: usize) -> Result<()> {
        if chunks == 0 {
            return Err(Error::InvalidConfig("max_open_chunks must be positive".into()));
        }
        self.max_open_chunks = chunks;
        Ok(())
    }

    pub fn get_max_open_chunks(&self) -> usize {
        self.max_open_chunks
    }

    pub fn set_payload_probe(&mut self, chunks: usize) -> Result<()> {
        self.payload_probe = chunks;
        Ok(())
    }

    pub fn get_payload_probe(&self) -> usize {
        self.payload_probe
    }

    /// Set how long callers wait for the writer thread
    pub fn set_handoff_timeout(&mut self, timeout: Duration) -> Result<()> {
        if timeout.is_zero() {
            return Err(Error::InvalidConfig("handoff_timeout must be positive".into()));
        }
        self.handoff_timeout = timeout;
        Ok(())
    }

    pub fn get_handoff_timeout(&self) -> Duration {
        self.handoff_timeout
    }

    /// Set the prefix used when building file links
    pub fn set_base_url(&mut self, url: &str) -> Result<()> {
        let url = url.trim_end_matches('/');
        if url.is_empty() {
            return Err(Error::InvalidConfig("base_url must not be empty".into()));
        }
        self.base_url = url.to_string();
        Ok(())
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
