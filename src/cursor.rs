use std::collections::HashSet;
use std::marker::PhantomData;

use log::error;

use crate::chunk::ChunkStore;
use crate::constants::{DEFAULT_MAX_CHAIN_STEPS, DEFAULT_MAX_INDEX};
use crate::error::{out_of_range, Error, Result};
use crate::layout::ChainKind;
use crate::medium::Medium;
use crate::meta::ChainNode;
use crate::types::{Index, Span, NONE};

/// Bounds applied to every chain traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkLimits {
    /// Nodes an integrity walk or route bootstrap may visit
    pub max_steps: usize,
    /// Largest logical index a pointer may hold
    pub max_index: Index,
}

impl Default for WalkLimits {
    fn default() -> Self {
        WalkLimits {
            max_steps: DEFAULT_MAX_CHAIN_STEPS,
            max_index: DEFAULT_MAX_INDEX,
        }
    }
}

impl WalkLimits {
    /// True if `index` can name a live node
    pub fn in_range(&self, index: Index) -> bool {
        index != NONE && index <= self.max_index
    }
}

/// Forward traversal of one chain from its head
///
/// Every step is checked: a revisited index, an index out of range, a
/// pointer to a missing node, a node failing validation or exceeding the
/// step cap ends the walk with a corruption error. After an error the cursor
/// yields nothing more.
///
/// Ordinary walks may visit every index in range; [`Cursor::capped`] bounds
/// a walk by the integrity step limit instead.
pub struct Cursor<'s, M, N> {
    store: &'s mut ChunkStore<M>,
    kind: ChainKind,
    limits: WalkLimits,
    /// Node to visit next, 0 once the tail was passed
    current: Index,
    /// Node visited last, expected as the next node's back pointer
    previous: Index,
    visited: HashSet<Index>,
    /// Nodes visited before the walk is declared corrupt
    step_cap: usize,
    /// Check each node's back pointer against its predecessor
    verify_backlinks: bool,
    finished: bool,
    _node: PhantomData<N>,
}

impl<'s, M: Medium, N: ChainNode> Cursor<'s, M, N> {
    pub(crate) fn new(
        store: &'s mut ChunkStore<M>,
        kind: ChainKind,
        limits: WalkLimits,
        head: Index,
    ) -> Self {
        Cursor {
            store,
            kind,
            limits,
            current: head,
            previous: NONE,
            visited: HashSet::new(),
            step_cap: limits.max_index as usize,
            verify_backlinks: false,
            finished: false,
            _node: PhantomData,
        }
    }

    /// Stop after `max_steps` nodes
    pub fn capped(mut self) -> Self {
        self.step_cap = self.limits.max_steps;
        self
    }

    /// Also require `last` of every node to name the node before it
    pub fn verify_backlinks(mut self) -> Self {
        self.verify_backlinks = true;
        self
    }

    fn fail(&mut self, err: Error) -> Option<Result<(Index, N)>> {
        self.finished = true;
        error!("Aborting walk over {}: {}", self.kind, err);
        Some(Err(err))
    }

    fn step(&mut self) -> Result<N> {
        let addr = self.kind.node(self.current);
        let text = self.store.read(addr, Span::Single)?;
        if text.is_empty() {
            return Err(Error::corrupt_chain(
                self.kind,
                format!("node {} at {} is missing", self.current, addr),
            ));
        }
        N::decode(addr, &text)
    }
}

impl<M: Medium, N: ChainNode> Iterator for Cursor<'_, M, N> {
    type Item = Result<(Index, N)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.current == NONE {
            return None;
        }

        if self.visited.len() >= self.step_cap {
            let err = Error::corrupt_chain(
                self.kind,
                format!("walk exceeded {} steps", self.step_cap),
            );
            return self.fail(err);
        }
        if !self.limits.in_range(self.current) {
            let err = out_of_range(self.kind, self.current);
            return self.fail(err);
        }
        if !self.visited.insert(self.current) {
            let err = Error::corrupt_chain(
                self.kind,
                format!("cycle detected at node {}", self.current),
            );
            return self.fail(err);
        }

        let node = match self.step() {
            Ok(node) => node,
            Err(err) => return self.fail(err),
        };

        let links = node.links();
        if self.verify_backlinks && links.last != self.previous {
            let err = Error::corrupt_chain(
                self.kind,
                format!(
                    "node {} points back to {} but follows {}",
                    self.current, links.last, self.previous
                ),
            );
            return self.fail(err);
        }

        let index = self.current;
        self.previous = index;
        self.current = links.next;
        Some(Ok((index, node)))
    }
}
