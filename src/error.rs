use std::io;
use std::result;
use std::time::Duration;

use thiserror::Error;

use crate::layout::ChainKind;
use crate::types::{ChunkAddr, Index};

/// Custom result type for storage operations
pub type Result<T> = result::Result<T, Error>;

/// Storage engine errors
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing input, unknown table/row/file, duplicate title
    #[error("Bad Request: {0}")]
    BadRequest(String),
    /// Protection flag string failed validation
    #[error("Bad Request: invalid protection flags: {0}")]
    InvalidProtectionFlags(String),
    /// A route path is already taken
    #[error("Bad Request: route {0} already exists")]
    DuplicateRoute(String),
    /// Payload does not fit and spanning is disabled or exhausted
    #[error("Internal Server Error: payload of {needed} cells does not fit at {addr} (capacity {capacity})")]
    ChunkFull {
        addr: ChunkAddr,
        needed: usize,
        capacity: usize,
    },
    /// Scan reached the cell ceiling without finding the end marker
    #[error("Internal Server Error: possible data corruption, read {cells} cells at {addr} without an end marker")]
    CeilingExceeded { addr: ChunkAddr, cells: usize },
    /// Symbol run with a dangling nibble
    #[error("Internal Server Error: odd-length symbol run of {0} symbols")]
    OddSymbolRun(usize),
    /// Empty cell found inside a symbol run
    #[error("Internal Server Error: empty cell inside symbol run at position {0}")]
    UnexpectedSentinel(usize),
    /// Stored record could not be parsed or failed its well-formedness check
    #[error("Internal Server Error: corrupt metadata at {addr}: {reason}")]
    CorruptMetadata { addr: ChunkAddr, reason: String },
    /// Chain traversal hit a cycle, a bad pointer or the iteration cap
    #[error("Internal Server Error: corrupt chain {kind}: {reason}")]
    CorruptChain { kind: ChainKind, reason: String },
    /// No logical index left in the valid range
    #[error("Internal Server Error: no free index left in {0}")]
    IndexExhausted(ChainKind),
    /// Invalid environment configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Writer thread is gone
    #[error("Internal Server Error: writer thread is not running")]
    WorkerClosed,
    /// Operation panicked on the writer thread
    #[error("Internal Server Error: operation aborted: {0}")]
    WorkerPanicked(String),
    /// Writer thread did not answer in time
    #[error("Service Unavailable: no response from writer thread within {0:?}")]
    HandoffTimeout(Duration),
    #[error("Internal Server Error: serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Internal Server Error: I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// HTTP-style status code reported for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::BadRequest(_) | Error::InvalidProtectionFlags(_) | Error::DuplicateRoute(_) => {
                400
            }
            Error::HandoffTimeout(_) => 503,
            _ => 500,
        }
    }

    /// True for failures that indicate damaged chains or chunks
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::CeilingExceeded { .. }
                | Error::OddSymbolRun(_)
                | Error::UnexpectedSentinel(_)
                | Error::CorruptMetadata { .. }
                | Error::CorruptChain { .. }
        )
    }

    pub(crate) fn bad_request(msg: impl Into<String>) -> Self {
        Error::BadRequest(msg.into())
    }

    pub(crate) fn corrupt_chain(kind: ChainKind, reason: impl Into<String>) -> Self {
        Error::CorruptChain {
            kind,
            reason: reason.into(),
        }
    }
}

/// Index that failed a range check
pub(crate) fn out_of_range(kind: ChainKind, index: Index) -> Error {
    Error::corrupt_chain(kind, format!("index {index} is outside the valid range"))
}
