//! Free-chunk allocator.
//!
//! Freed indices are recorded as rows of the `freeChunks` table, tagged with
//! the coordinate space they belong to, and handed back oldest first before
//! any chain grows sequentially. The table itself is created on the first
//! push through sequential allocation only, and rows of the system tables are
//! never recycled, so the allocator never feeds on itself.
//!
//! Indices that cannot be recorded in the table are parked in small comma
//! separated lists at fixed bootstrap addresses, one per category, and moved
//! into the table by the next successful push of that category.

use log::{debug, info, warn};

use crate::constants::{FILES_TABLE, FREE_CHUNKS_TABLE};
use crate::database::Database;
use crate::error::{out_of_range, Error, Result};
use crate::layout::{self, ChainKind};
use crate::medium::Medium;
use crate::meta::{ChainNode, FreeChunkDescriptor, RowRecord, TableMeta};
use crate::types::{ChunkType, Index, Span, NONE};

/// Index handed out by the allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Allocation {
    pub index: Index,
    /// Came off a free list rather than the end of the chain
    pub recycled: bool,
}

/// Tables whose rows are never recycled
pub fn is_system_table(title: &str) -> bool {
    title == FREE_CHUNKS_TABLE || title == FILES_TABLE
}

fn chain_of(chunk_type: ChunkType, parent: Index) -> ChainKind {
    match chunk_type {
        ChunkType::Table => ChainKind::Tables,
        ChunkType::Row => ChainKind::Rows(parent),
        ChunkType::File => ChainKind::Files,
    }
}

impl<M: Medium> Database<M> {
    /// Rows of a system table never enter the allocator
    fn is_protected(&mut self, chunk_type: ChunkType, parent: Index) -> Result<bool> {
        if chunk_type != ChunkType::Row {
            return Ok(false);
        }
        Ok(self
            .chain(ChainKind::Tables)
            .get::<TableMeta>(parent)?
            .map_or(false, |table| is_system_table(&table.title)))
    }

    /// True when nothing lives at `index` of `kind`
    fn is_reusable(&mut self, kind: ChainKind, index: Index) -> Result<bool> {
        if !self.options.limits.in_range(index) {
            return Ok(false);
        }
        self.store.is_empty(kind.node(index))
    }

    /// Record `index` as free for its coordinate space
    ///
    /// Silently does nothing for rows of a system table.
    pub fn push_free(&mut self, index: Index, chunk_type: ChunkType, parent: Index) -> Result<()> {
        let kind = chain_of(chunk_type, parent);
        if !self.options.limits.in_range(index) {
            return Err(out_of_range(kind, index));
        }
        if self.is_protected(chunk_type, parent)? {
            debug!("Not recycling {} {} of system table {}", chunk_type, index, parent);
            return Ok(());
        }

        let free_table = match self.find_table(FREE_CHUNKS_TABLE)? {
            Some((table, _)) => table,
            None => match self.create_free_table() {
                Ok(table) => table,
                Err(err) => {
                    warn!("Could not create {}: {}", FREE_CHUNKS_TABLE, err);
                    return self.park(chunk_type, parent, index);
                }
            },
        };

        match self.record_free(free_table, index, chunk_type, parent) {
            Ok(row) => {
                info!(
                    "Recorded free {} index {} ({}) as row {}",
                    chunk_type,
                    index,
                    kind.coordinate_space(),
                    row
                );
                self.migrate_parked(free_table, chunk_type, parent)
            }
            Err(err) => {
                warn!("Could not record free {} index {}: {}", chunk_type, index, err);
                self.park(chunk_type, parent, index)
            }
        }
    }

    /// Take the oldest free index of a coordinate space, 0 if there is none
    pub fn pop_free(&mut self, chunk_type: ChunkType, parent: Index) -> Result<Index> {
        if self.is_protected(chunk_type, parent)? {
            return Ok(NONE);
        }
        let kind = chain_of(chunk_type, parent);
        let space = kind.coordinate_space();

        if let Some((free_table, _)) = self.find_table(FREE_CHUNKS_TABLE)? {
            let descriptors = ChainKind::Rows(free_table);
            let rows = self.chain(descriptors).walk::<RowRecord>()?;
            for (row, record) in rows {
                let descriptor = match FreeChunkDescriptor::from_content(&record.content) {
                    Ok(descriptor) => descriptor,
                    Err(err) => {
                        warn!("Skipping malformed free-chunk descriptor in row {}: {}", row, err);
                        continue;
                    }
                };
                if descriptor.coordinate_space != space {
                    continue;
                }

                // descriptor rows are never recycled themselves
                self.chain(descriptors).splice_out::<RowRecord>(row)?;
                if self.is_reusable(kind, descriptor.chunk_index)? {
                    debug!("Reusing {} index {} from {}", chunk_type, descriptor.chunk_index, space);
                    return Ok(descriptor.chunk_index);
                }
                warn!(
                    "Discarding stale free-chunk descriptor for {} index {}",
                    chunk_type, descriptor.chunk_index
                );
            }
        }

        self.pop_parked(chunk_type, parent)
    }

    /// Next index for a new node of `kind`: a recycled one, else one past the
    /// largest live index
    pub fn next_index<N: ChainNode>(&mut self, kind: ChainKind) -> Result<Index> {
        Ok(self.allocate::<N>(kind)?.index)
    }

    pub(crate) fn allocate<N: ChainNode>(&mut self, kind: ChainKind) -> Result<Allocation> {
        let popped = self.pop_free(kind.chunk_type(), kind.parent())?;
        if popped != NONE {
            return Ok(Allocation {
                index: popped,
                recycled: true,
            });
        }
        self.sequential::<N>(kind)
    }

    /// One past the largest live index, never consulting the free lists
    pub(crate) fn sequential<N: ChainNode>(&mut self, kind: ChainKind) -> Result<Allocation> {
        let (_, highest) = self.chain(kind).tail_and_max::<N>()?;
        let index = highest
            .checked_add(1)
            .filter(|index| self.options.limits.in_range(*index))
            .ok_or(Error::IndexExhausted(kind))?;
        Ok(Allocation {
            index,
            recycled: false,
        })
    }

    /// Give back an allocation whose node was never written
    pub(crate) fn release(&mut self, kind: ChainKind, allocation: Allocation) {
        if !allocation.recycled {
            return;
        }
        if let Err(err) = self.push_free(allocation.index, kind.chunk_type(), kind.parent()) {
            warn!("Lost free {} index {}: {}", kind, allocation.index, err);
        }
    }

    fn create_free_table(&mut self) -> Result<Index> {
        let allocation = self.sequential::<TableMeta>(ChainKind::Tables)?;
        self.create_table_at(allocation.index, FREE_CHUNKS_TABLE)?;
        Ok(allocation.index)
    }

    fn record_free(
        &mut self,
        free_table: Index,
        index: Index,
        chunk_type: ChunkType,
        parent: Index,
    ) -> Result<Index> {
        let descriptor = FreeChunkDescriptor {
            chunk_index: index,
            chunk_type,
            parent_table_index: parent,
            coordinate_space: layout::coordinate_space(chunk_type, parent),
        };
        let (row, _) =
            self.insert_content(free_table, FREE_CHUNKS_TABLE, descriptor.to_content()?, false)?;
        Ok(row)
    }

    /// Indices parked in the bootstrap list of one category
    pub fn parked(&mut self, chunk_type: ChunkType, parent: Index) -> Result<Vec<Index>> {
        let text = self
            .store
            .read(layout::bootstrap_list(chunk_type, parent), Span::Single)?;

        let mut list = Vec::new();
        for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.parse::<Index>() {
                Ok(index) if index != NONE => list.push(index),
                _ => warn!("Invalid free list entry: {}", part),
            }
        }
        Ok(list)
    }

    fn save_parked(&mut self, chunk_type: ChunkType, parent: Index, list: &[Index]) -> Result<()> {
        let addr = layout::bootstrap_list(chunk_type, parent);
        self.store.delete(addr, Span::Single)?;
        if list.is_empty() {
            return Ok(());
        }
        let text = list
            .iter()
            .map(Index::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.store.write(addr, &text, Span::Single)
    }

    fn park(&mut self, chunk_type: ChunkType, parent: Index, index: Index) -> Result<()> {
        let mut list = self.parked(chunk_type, parent)?;
        if !list.contains(&index) {
            list.push(index);
            self.save_parked(chunk_type, parent, &list)?;
        }
        warn!("Parked free {} index {} in its bootstrap list", chunk_type, index);
        Ok(())
    }

    fn pop_parked(&mut self, chunk_type: ChunkType, parent: Index) -> Result<Index> {
        let kind = chain_of(chunk_type, parent);
        let mut list = self.parked(chunk_type, parent)?;
        if list.is_empty() {
            return Ok(NONE);
        }

        let mut popped = NONE;
        while !list.is_empty() {
            let candidate = list.remove(0);
            if self.is_reusable(kind, candidate)? {
                popped = candidate;
                break;
            }
            warn!("Dropping stale parked {} index {}", chunk_type, candidate);
        }
        self.save_parked(chunk_type, parent, &list)?;

        if popped != NONE {
            info!("Recycling parked {} index {}", chunk_type, popped);
        }
        Ok(popped)
    }

    /// Move parked indices of one category into the free-chunk table
    fn migrate_parked(&mut self, free_table: Index, chunk_type: ChunkType, parent: Index) -> Result<()> {
        let parked = self.parked(chunk_type, parent)?;
        if parked.is_empty() {
            return Ok(());
        }
        self.save_parked(chunk_type, parent, &[])?;

        let mut stuck = Vec::new();
        for index in parked {
            if let Err(err) = self.record_free(free_table, index, chunk_type, parent) {
                warn!("Could not migrate parked {} index {}: {}", chunk_type, index, err);
                stuck.push(index);
            }
        }
        if !stuck.is_empty() {
            self.save_parked(chunk_type, parent, &stuck)?;
        }
        Ok(())
    }
}
