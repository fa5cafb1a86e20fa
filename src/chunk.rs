//! Chunk I/O on top of a symbol medium.
//!
//! A chunk's payload is the run of data symbols starting at its first cell
//! and ending at the first non-data cell. Spanning payloads continue at cell
//! 0 of the neighbouring chunk along x; readers and writers use the same
//! stride.

use log::{debug, error};

use crate::codec::{self, is_data_cell, Symbol};
use crate::constants::EMPTY_CELL;
use crate::error::{Error, Result};
use crate::medium::Medium;
use crate::types::{ChunkAddr, Span};

/// Byte-addressable region store over a medium
#[derive(Debug)]
pub struct ChunkStore<M> {
    medium: M,
    /// Chunks a spanning read or write may travel through
    max_span_chunks: usize,
}

impl<M: Medium> ChunkStore<M> {
    pub fn new(medium: M, max_span_chunks: usize) -> Self {
        ChunkStore {
            medium,
            max_span_chunks: max_span_chunks.max(1),
        }
    }

    pub fn medium(&self) -> &M {
        &self.medium
    }

    pub fn medium_mut(&mut self) -> &mut M {
        &mut self.medium
    }

    /// Cells per chunk
    pub fn chunk_cells(&self) -> usize {
        self.medium.chunk_cells()
    }

    /// Bytes a single non-spanning chunk can hold
    pub fn single_capacity(&self) -> usize {
        // one cell stays free for the end marker
        self.chunk_cells().saturating_sub(1) / 2
    }

    /// Write bytes starting at cell 0 of `addr`
    pub fn write_bytes(&mut self, addr: ChunkAddr, data: &[u8], span: Span) -> Result<()> {
        let run = codec::encode(data);
        let cells = self.chunk_cells();

        let step = match span.step() {
            Some(step) => step,
            None => {
                if run.len() >= cells {
                    debug!("Ran out of chunk space at {}, discontinuing write", addr);
                    return Err(Error::ChunkFull {
                        addr,
                        needed: run.len(),
                        capacity: cells.saturating_sub(1),
                    });
                }
                let target = self.medium.chunk_mut(addr)?;
                put_run(target, &run);
                if run.len() < target.len() {
                    target[run.len()] = EMPTY_CELL;
                }
                return Ok(());
            }
        };

        let pieces = run.len().div_ceil(cells).max(1);
        if pieces > self.max_span_chunks {
            debug!("Spanning write at {} needs {} chunks, discontinuing", addr, pieces);
            return Err(Error::ChunkFull {
                addr,
                needed: run.len(),
                capacity: cells * self.max_span_chunks,
            });
        }

        let mut current = addr;
        let mut last_len = 0;
        for (i, piece) in run.chunks(cells).enumerate() {
            if i > 0 {
                current = current.offset_x(step);
            }
            let target = self.medium.chunk_mut(current)?;
            put_run(target, piece);
            if piece.len() < target.len() {
                target[piece.len()] = EMPTY_CELL;
            }
            last_len = piece.len();
        }

        if run.is_empty() {
            let target = self.medium.chunk_mut(current)?;
            target[0] = EMPTY_CELL;
        } else if last_len == cells {
            // exactly full: the reader will look at the next chunk
            let next = current.offset_x(step);
            if self.medium.chunk(next)?.is_some() {
                self.medium.chunk_mut(next)?[0] = EMPTY_CELL;
            }
        }

        Ok(())
    }

    /// Read the payload stored at `addr`
    ///
    /// Reaching the cell ceiling without an end marker is reported as
    /// possible corruption, never as a normal end of data.
    pub fn read_bytes(&mut self, addr: ChunkAddr, span: Span) -> Result<Vec<u8>> {
        let mut run: Vec<Symbol> = Vec::new();
        let mut current = addr;

        for hop in 0..self.max_span_chunks {
            let cells = match self.medium.chunk(current)? {
                Some(cells) => cells,
                None => return codec::decode(&run),
            };

            let data_len = cells.iter().take_while(|&&c| is_data_cell(c)).count();
            run.extend(cells[..data_len].iter().map(|&c| Symbol::from_cell(c)));

            if data_len < cells.len() {
                return codec::decode(&run);
            }

            match span.step() {
                Some(step) if hop + 1 < self.max_span_chunks => {
                    debug!("Moving to next chunk after {}", current);
                    current = current.offset_x(step);
                }
                _ => break,
            }
        }

        error!(
            "Possible data corruption detected! Read {} cells from {} without finding end marker",
            run.len(),
            addr
        );
        Err(Error::CeilingExceeded {
            addr: current,
            cells: run.len(),
        })
    }

    /// Write UTF-8 text
    pub fn write(&mut self, addr: ChunkAddr, text: &str, span: Span) -> Result<()> {
        self.write_bytes(addr, text.as_bytes(), span)
    }

    /// Read UTF-8 text; empty string if the chunk holds nothing
    pub fn read(&mut self, addr: ChunkAddr, span: Span) -> Result<String> {
        let bytes = self.read_bytes(addr, span)?;
        String::from_utf8(bytes).map_err(|e| Error::CorruptMetadata {
            addr,
            reason: format!("payload is not valid UTF-8: {}", e),
        })
    }

    /// Reset every data cell of the payload at `addr` back to empty
    pub fn delete(&mut self, addr: ChunkAddr, span: Span) -> Result<()> {
        let mut current = addr;

        for _ in 0..self.max_span_chunks {
            if self.medium.chunk(current)?.is_none() {
                return Ok(());
            }
            let cells = self.medium.chunk_mut(current)?;
            let data_len = cells.iter().take_while(|&&c| is_data_cell(c)).count();
            cells[..data_len].fill(EMPTY_CELL);

            if data_len < cells.len() {
                return Ok(());
            }
            match span.step() {
                Some(step) => current = current.offset_x(step),
                None => return Ok(()),
            }
        }
        Ok(())
    }

    /// Zero the whole physical footprint of one chunk
    pub fn delete_completely(&mut self, addr: ChunkAddr) -> Result<()> {
        self.medium.clear_chunk(addr)
    }

    /// Zero every chunk a spanning payload may occupy, starting at `addr`
    ///
    /// Returns the number of chunks cleared.
    pub fn erase_span(&mut self, addr: ChunkAddr, span: Span) -> Result<usize> {
        let mut current = addr;
        let mut cleared = 0;

        for _ in 0..self.max_span_chunks {
            let full = match self.medium.chunk(current)? {
                Some(cells) => cells.last().map_or(false, |&c| is_data_cell(c)),
                None => break,
            };
            self.medium.clear_chunk(current)?;
            cleared += 1;

            match span.step() {
                Some(step) if full => current = current.offset_x(step),
                _ => break,
            }
        }
        Ok(cleared)
    }

    /// True when the chunk holds no payload
    pub fn is_empty(&mut self, addr: ChunkAddr) -> Result<bool> {
        Ok(match self.medium.chunk(addr)? {
            Some(cells) => !cells.first().map_or(false, |&c| is_data_cell(c)),
            None => true,
        })
    }

    /// Persist pending writes
    pub fn flush(&mut self) -> Result<()> {
        self.medium.flush()
    }
}

fn put_run(target: &mut [u8], run: &[Symbol]) {
    for (cell, symbol) in target.iter_mut().zip(run) {
        *cell = symbol.to_cell();
    }
}
