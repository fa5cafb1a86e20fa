//! Doubly linked chains over logical indices.
//!
//! A chain is a head pointer chunk holding the decimal index of the first
//! node (empty or `0` for an empty chain) plus one chunk per node. Nodes carry
//! their own `lastIndex`/`nextIndex`; the same protocol serves the table
//! chain, every table's row chain and the file chain.

use log::debug;
use serde::Serialize;

use crate::chunk::ChunkStore;
use crate::cursor::{Cursor, WalkLimits};
use crate::error::{out_of_range, Error, Result};
use crate::layout::ChainKind;
use crate::medium::Medium;
use crate::meta::{ChainNode, Links};
use crate::types::{Index, Span, NONE};

/// Summary of a verified chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ChainReport {
    /// Live nodes reachable from the head
    pub length: usize,
    /// Last node, 0 for an empty chain
    pub tail: Index,
    /// Largest live index, 0 for an empty chain
    pub highest: Index,
}

/// Handle on one chain of the store
pub struct Chain<'s, M> {
    store: &'s mut ChunkStore<M>,
    kind: ChainKind,
    limits: WalkLimits,
}

impl<'s, M: Medium> Chain<'s, M> {
    pub fn new(store: &'s mut ChunkStore<M>, kind: ChainKind, limits: WalkLimits) -> Self {
        Chain {
            store,
            kind,
            limits,
        }
    }

    pub fn kind(&self) -> ChainKind {
        self.kind
    }

    /// First node of the chain, 0 when empty
    pub fn head(&mut self) -> Result<Index> {
        let addr = self.kind.head();
        let text = self.store.read(addr, Span::Single)?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(NONE);
        }

        let head: Index = text.parse().map_err(|_| Error::CorruptMetadata {
            addr,
            reason: format!("head pointer \"{}\" is not an index", text),
        })?;
        if head != NONE && !self.limits.in_range(head) {
            return Err(out_of_range(self.kind, head));
        }
        Ok(head)
    }

    pub fn set_head(&mut self, index: Index) -> Result<()> {
        let addr = self.kind.head();
        self.store.delete(addr, Span::Single)?;
        self.store.write(addr, &index.to_string(), Span::Single)
    }

    /// Zero the head pointer chunk
    pub fn clear_head(&mut self) -> Result<()> {
        self.store.delete_completely(self.kind.head())
    }

    /// Node stored at `index`, `None` if the slot is empty or out of range
    pub fn get<N: ChainNode>(&mut self, index: Index) -> Result<Option<N>> {
        if !self.limits.in_range(index) {
            return Ok(None);
        }
        let addr = self.kind.node(index);
        let text = self.store.read(addr, Span::Single)?;
        if text.is_empty() {
            return Ok(None);
        }
        N::decode(addr, &text).map(Some)
    }

    /// Node that a live pointer names; a missing node is corruption
    fn load<N: ChainNode>(&mut self, index: Index) -> Result<N> {
        if !self.limits.in_range(index) {
            return Err(out_of_range(self.kind, index));
        }
        self.get(index)?.ok_or_else(|| {
            Error::corrupt_chain(self.kind, format!("pointer to missing node {}", index))
        })
    }

    /// Rewrite a node's chunk in full
    fn store_node<N: ChainNode>(&mut self, index: Index, node: &N) -> Result<()> {
        let addr = self.kind.node(index);
        let text = node.encode()?;
        self.store.delete(addr, Span::Single)?;
        self.store.write(addr, &text, Span::Single)
    }

    /// Bounded forward traversal from the head
    pub fn cursor<N: ChainNode>(&mut self) -> Result<Cursor<'_, M, N>> {
        let head = self.head()?;
        Ok(Cursor::new(&mut *self.store, self.kind, self.limits, head))
    }

    /// Every live node in chain order
    pub fn walk<N: ChainNode>(&mut self) -> Result<Vec<(Index, N)>> {
        self.cursor::<N>()?.collect()
    }

    /// Tail and largest live index
    pub fn tail_and_max<N: ChainNode>(&mut self) -> Result<(Index, Index)> {
        let mut tail = NONE;
        let mut highest = NONE;
        for entry in self.cursor::<N>()? {
            let (index, _) = entry?;
            tail = index;
            highest = highest.max(index);
        }
        Ok((tail, highest))
    }

    /// Link `node` in at the tail under `index`
    ///
    /// The tail is found by walking the chain, so recycled indices that are
    /// not adjacent to the tail link correctly.
    pub fn append<N: ChainNode>(&mut self, index: Index, mut node: N) -> Result<()> {
        if !self.limits.in_range(index) {
            return Err(out_of_range(self.kind, index));
        }

        let (tail, _) = self.tail_and_max::<N>()?;
        if self.get::<N>(index)?.is_some() {
            return Err(Error::corrupt_chain(
                self.kind,
                format!("index {} is already occupied", index),
            ));
        }

        // stale cells from an earlier tenant must not survive
        self.store.delete_completely(self.kind.node(index))?;

        node.set_links(Links::new(tail, NONE));
        self.store_node(index, &node)?;

        if tail == NONE {
            self.set_head(index)?;
        } else {
            let mut previous: N = self.load(tail)?;
            let links = previous.links();
            previous.set_links(Links::new(links.last, index));
            self.store_node(tail, &previous)?;
        }

        debug!("Appended node {} to {} after {}", index, self.kind, tail);
        Ok(())
    }

    /// Replace a node's record, keeping its position in the chain
    pub fn replace<N: ChainNode>(&mut self, index: Index, mut node: N) -> Result<()> {
        let current: N = self.load(index)?;
        node.set_links(current.links());
        self.store_node(index, &node)
    }

    /// Unlink the node at `index` and delete its chunk
    ///
    /// Returns the removed record; its links name the former neighbours.
    pub fn splice_out<N: ChainNode>(&mut self, index: Index) -> Result<N> {
        let node: N = self.load(index)?;
        let links = node.links();

        if links.last == NONE {
            let head = self.head()?;
            if head != index {
                return Err(Error::corrupt_chain(
                    self.kind,
                    format!("node {} has no predecessor but head is {}", index, head),
                ));
            }
            self.set_head(links.next)?;
        } else {
            let mut previous: N = self.load(links.last)?;
            let prev_links = previous.links();
            previous.set_links(Links::new(prev_links.last, links.next));
            self.store_node(links.last, &previous)?;
        }

        if links.next != NONE {
            let mut following: N = self.load(links.next)?;
            let next_links = following.links();
            following.set_links(Links::new(links.last, next_links.next));
            self.store_node(links.next, &following)?;
        }

        self.store.delete_completely(self.kind.node(index))?;
        debug!(
            "Spliced node {} out of {} (last {}, next {})",
            index, self.kind, links.last, links.next
        );
        Ok(node)
    }

    /// Walk the whole chain verifying every back pointer
    ///
    /// Bounded by the integrity step limit.
    pub fn check<N: ChainNode>(&mut self) -> Result<ChainReport> {
        let mut report = ChainReport::default();
        for entry in self.cursor::<N>()?.capped().verify_backlinks() {
            let (index, _) = entry?;
            report.length += 1;
            report.tail = index;
            report.highest = report.highest.max(index);
        }
        Ok(report)
    }
}
