use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use log::debug;
use lru::LruCache;
use memmap2::{MmapMut, MmapOptions};

use crate::constants::EMPTY_CELL;
use crate::error::{Error, Result};
use crate::types::ChunkAddr;

/// Symbol-only storage substrate, addressed chunk by chunk
///
/// Each chunk is a fixed run of cells laid out in scan order. A chunk that
/// was never written reads as absent, which callers treat like a chunk full
/// of empty cells.
pub trait Medium: Send {
    /// Number of cells in every chunk
    fn chunk_cells(&self) -> usize;

    /// Cells of a chunk, `None` if it was never materialized
    fn chunk(&mut self, addr: ChunkAddr) -> Result<Option<&[u8]>>;

    /// Mutable cells of a chunk, materializing it if needed
    fn chunk_mut(&mut self, addr: ChunkAddr) -> Result<&mut [u8]>;

    /// Reset every cell of a chunk to empty
    fn clear_chunk(&mut self, addr: ChunkAddr) -> Result<()> {
        if self.chunk(addr)?.is_some() {
            self.chunk_mut(addr)?.fill(EMPTY_CELL);
        }
        Ok(())
    }

    /// Persist pending writes
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Volatile medium kept on the heap
#[derive(Debug)]
pub struct MemoryMedium {
    chunk_cells: usize,
    chunks: HashMap<ChunkAddr, Box<[u8]>>,
}

impl MemoryMedium {
    pub fn new(chunk_cells: usize) -> Self {
        MemoryMedium {
            chunk_cells,
            chunks: HashMap::new(),
        }
    }

    /// Number of chunks materialized so far
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

impl Medium for MemoryMedium {
    fn chunk_cells(&self) -> usize {
        self.chunk_cells
    }

    fn chunk(&mut self, addr: ChunkAddr) -> Result<Option<&[u8]>> {
        Ok(self.chunks.get(&addr).map(|cells| &cells[..]))
    }

    fn chunk_mut(&mut self, addr: ChunkAddr) -> Result<&mut [u8]> {
        let cells = self.chunk_cells;
        Ok(&mut self
            .chunks
            .entry(addr)
            .or_insert_with(|| vec![EMPTY_CELL; cells].into_boxed_slice())[..])
    }
}

/// Persistent medium: one memory-mapped file per chunk inside a directory
///
/// At most `max_open` chunk maps are held at once. The least recently used
/// map is flushed and unmapped when another chunk needs a slot.
#[derive(Debug)]
pub struct MappedMedium {
    /// Directory holding the chunk files
    path: PathBuf,
    /// Cells per chunk, equal to every chunk file's length
    chunk_cells: usize,
    /// Chunk maps currently open, least recently used first out
    maps: LruCache<ChunkAddr, MmapMut>,
}

impl MappedMedium {
    /// Open (creating if needed) the medium rooted at `path`
    pub fn open<P: AsRef<Path>>(path: P, chunk_cells: usize, max_open: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(max_open)
            .ok_or_else(|| Error::InvalidConfig("max_open_chunks must be positive".into()))?;
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        Ok(MappedMedium {
            path,
            chunk_cells,
            maps: LruCache::new(capacity),
        })
    }

    /// Directory the medium lives in
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of chunk maps currently held
    pub fn open_chunks(&self) -> usize {
        self.maps.len()
    }

    fn chunk_path(&self, addr: ChunkAddr) -> PathBuf {
        self.path.join(format!("chunk.{}.{}.cells", addr.x, addr.z))
    }

    /// Map one chunk file, creating it when `create` is set
    fn map_chunk(&self, addr: ChunkAddr, create: bool) -> Result<Option<MmapMut>> {
        let file_path = self.chunk_path(addr);
        if !create && !file_path.exists() {
            return Ok(None);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .truncate(false)
            .open(&file_path)?;

        let len = file.metadata()?.len() as usize;
        if len == 0 {
            file.set_len(self.chunk_cells as u64)?;
            debug!("Materialized chunk {} at {}", addr, file_path.display());
        } else if len != self.chunk_cells {
            return Err(Error::CorruptMetadata {
                addr,
                reason: format!(
                    "chunk file holds {} cells, expected {}",
                    len, self.chunk_cells
                ),
            });
        }

        // The file is owned by this medium and never resized while mapped
        let map = unsafe { MmapOptions::new().len(self.chunk_cells).map_mut(&file)? };
        Ok(Some(map))
    }

    /// Keep a freshly opened map, flushing whichever map it displaces
    fn hold(&mut self, addr: ChunkAddr, map: MmapMut) -> Result<()> {
        if let Some((evicted, old)) = self.maps.push(addr, map) {
            if evicted != addr {
                old.flush()?;
                debug!("Unmapped chunk {}", evicted);
            }
        }
        Ok(())
    }
}

impl Medium for MappedMedium {
    fn chunk_cells(&self) -> usize {
        self.chunk_cells
    }

    fn chunk(&mut self, addr: ChunkAddr) -> Result<Option<&[u8]>> {
        if !self.maps.contains(&addr) {
            match self.map_chunk(addr, false)? {
                Some(map) => self.hold(addr, map)?,
                None => return Ok(None),
            }
        }
        Ok(self.maps.get(&addr).map(|map| &map[..]))
    }

    fn chunk_mut(&mut self, addr: ChunkAddr) -> Result<&mut [u8]> {
        if !self.maps.contains(&addr) {
            if let Some(map) = self.map_chunk(addr, true)? {
                self.hold(addr, map)?;
            }
        }
        self.maps
            .get_mut(&addr)
            .map(|map| &mut map[..])
            .ok_or_else(|| Error::CorruptMetadata {
                addr,
                reason: "chunk file could not be mapped".into(),
            })
    }

    fn flush(&mut self) -> Result<()> {
        for (_, map) in self.maps.iter() {
            map.flush()?;
        }
        Ok(())
    }
}
