use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// 1-based logical index of a node inside one chain; 0 means "no node"
pub type Index = u32;

/// The universal "no node" / empty-chain sentinel
pub const NONE: Index = 0;

/// Address of one chunk on the medium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkAddr {
    pub x: i32,
    pub z: i32,
}

impl ChunkAddr {
    pub const fn new(x: i32, z: i32) -> Self {
        ChunkAddr { x, z }
    }

    /// The chunk `dx` steps away along the spanning axis
    pub const fn offset_x(self, dx: i32) -> Self {
        ChunkAddr {
            x: self.x + dx,
            z: self.z,
        }
    }
}

impl fmt::Display for ChunkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Whether a payload may continue into neighbouring chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    /// Payload must fit in one chunk
    Single,
    /// Payload continues towards +x
    Forward,
    /// Payload continues towards -x
    Backward,
}

impl Span {
    /// Stride along the x axis, or `None` when spanning is disabled
    pub fn step(self) -> Option<i32> {
        match self {
            Span::Single => None,
            Span::Forward => Some(1),
            Span::Backward => Some(-1),
        }
    }
}

/// Category of a recyclable chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Table,
    Row,
    File,
}

impl ChunkType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkType::Table => "table",
            ChunkType::Row => "row",
            ChunkType::File => "file",
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured result of every public operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP-style status code
    pub status: u16,
    /// Human readable summary
    pub message: String,
    /// Operation output, if any
    pub payload: Option<String>,
    /// Set for every 4xx/5xx result
    pub is_error: bool,
}

impl Response {
    /// Successful result whose payload repeats the message
    pub fn ok(message: impl Into<String>) -> Self {
        let message = message.into();
        Response {
            status: 200,
            payload: Some(message.clone()),
            message,
            is_error: false,
        }
    }

    /// Successful result carrying a separate payload
    pub fn ok_with(message: impl Into<String>, payload: impl Into<String>) -> Self {
        Response {
            status: 200,
            message: message.into(),
            payload: Some(payload.into()),
            is_error: false,
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Response {
            status,
            message: message.into(),
            payload: None,
            is_error: true,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.is_error
    }

    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }
}

impl From<Error> for Response {
    fn from(err: Error) -> Self {
        Response::error(err.status_code(), err.to_string())
    }
}
