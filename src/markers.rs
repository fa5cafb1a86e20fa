use std::collections::BTreeMap;

use crate::types::ChunkAddr;

/// What a locator marker points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Table,
    File,
}

/// Human-facing sign placed beside a record's chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub position: ChunkAddr,
    pub kind: MarkerKind,
    /// Text shown to operators, one entry per line
    pub lines: Vec<String>,
}

/// Collaborator that owns the locator markers
///
/// Markers are cosmetic; the engine never reads them back to recover state.
pub trait MarkerBoard: Send {
    /// Place a marker, replacing any marker already at its position
    fn place(&mut self, marker: Marker);

    /// Remove the marker at `position`, returning it if there was one
    fn remove(&mut self, position: ChunkAddr) -> Option<Marker>;

    fn get(&self, position: ChunkAddr) -> Option<&Marker>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Marker board kept in memory
#[derive(Debug, Default)]
pub struct MemoryMarkers {
    markers: BTreeMap<ChunkAddr, Marker>,
}

impl MemoryMarkers {
    pub fn new() -> Self {
        MemoryMarkers::default()
    }
}

impl MarkerBoard for MemoryMarkers {
    fn place(&mut self, marker: Marker) {
        self.markers.insert(marker.position, marker);
    }

    fn remove(&mut self, position: ChunkAddr) -> Option<Marker> {
        self.markers.remove(&position)
    }

    fn get(&self, position: ChunkAddr) -> Option<&Marker> {
        self.markers.get(&position)
    }

    fn len(&self) -> usize {
        self.markers.len()
    }
}
