//! Byte to symbol codec.
//!
//! The medium stores one of seventeen symbols per cell: sixteen data symbols,
//! one per nibble value, and `Empty`. Every byte becomes two data symbols,
//! high nibble first. Any cell value outside the data alphabet reads back as
//! `Empty` and ends a scan.

use once_cell::sync::Lazy;

use crate::constants::EMPTY_CELL;
use crate::error::{Error, Result};

/// One cell's worth of data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Symbol {
    Empty = 0,
    White = 1,
    Orange = 2,
    Magenta = 3,
    LightBlue = 4,
    Yellow = 5,
    Lime = 6,
    Pink = 7,
    Gray = 8,
    LightGray = 9,
    Cyan = 10,
    Purple = 11,
    Blue = 12,
    Brown = 13,
    Green = 14,
    Red = 15,
    Black = 16,
}

/// Data symbols indexed by nibble value
const DATA_SYMBOLS: [Symbol; 16] = [
    Symbol::White,
    Symbol::Orange,
    Symbol::Magenta,
    Symbol::LightBlue,
    Symbol::Yellow,
    Symbol::Lime,
    Symbol::Pink,
    Symbol::Gray,
    Symbol::LightGray,
    Symbol::Cyan,
    Symbol::Purple,
    Symbol::Blue,
    Symbol::Brown,
    Symbol::Green,
    Symbol::Red,
    Symbol::Black,
];

/// Raw cell value to symbol
static CELL_TABLE: Lazy<[Symbol; 256]> = Lazy::new(|| {
    let mut table = [Symbol::Empty; 256];
    for (nibble, symbol) in DATA_SYMBOLS.iter().enumerate() {
        table[nibble + 1] = *symbol;
    }
    table
});

impl Symbol {
    /// Data symbol for the low four bits of `nibble`
    #[inline]
    pub fn from_nibble(nibble: u8) -> Symbol {
        DATA_SYMBOLS[(nibble & 0x0f) as usize]
    }

    /// Nibble carried by this symbol, `None` for `Empty`
    #[inline]
    pub fn nibble(self) -> Option<u8> {
        match self {
            Symbol::Empty => None,
            other => Some(other as u8 - 1),
        }
    }

    /// Interpret a raw cell value
    #[inline]
    pub fn from_cell(cell: u8) -> Symbol {
        CELL_TABLE[cell as usize]
    }

    /// Raw cell value stored for this symbol
    #[inline]
    pub fn to_cell(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn is_data(self) -> bool {
        self != Symbol::Empty
    }
}

/// True if the raw cell holds a data symbol
#[inline]
pub fn is_data_cell(cell: u8) -> bool {
    cell != EMPTY_CELL && Symbol::from_cell(cell).is_data()
}

/// Encode bytes as a run of data symbols, two per byte
pub fn encode(bytes: &[u8]) -> Vec<Symbol> {
    let mut run = Vec::with_capacity(bytes.len() * 2);
    for byte in bytes {
        run.push(Symbol::from_nibble(byte >> 4));
        run.push(Symbol::from_nibble(byte & 0x0f));
    }
    run
}

/// Decode a run of data symbols back into bytes
///
/// An odd-length run is corrupt: the trailing nibble is never dropped silently.
pub fn decode(run: &[Symbol]) -> Result<Vec<u8>> {
    if run.len() % 2 != 0 {
        return Err(Error::OddSymbolRun(run.len()));
    }

    let mut bytes = Vec::with_capacity(run.len() / 2);
    for (pair_idx, pair) in run.chunks_exact(2).enumerate() {
        let high = pair[0]
            .nibble()
            .ok_or(Error::UnexpectedSentinel(pair_idx * 2))?;
        let low = pair[1]
            .nibble()
            .ok_or(Error::UnexpectedSentinel(pair_idx * 2 + 1))?;
        bytes.push(high << 4 | low);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_byte_values() {
        let bytes: Vec<u8> = (0..=255u8).collect();
        let run = encode(&bytes);
        assert_eq!(run.len(), 512);
        assert!(run.iter().all(|s| s.is_data()));
        assert_eq!(decode(&run).unwrap(), bytes);
    }

    #[test]
    fn test_high_nibble_first() {
        let run = encode(&[0x4f]);
        assert_eq!(run, vec![Symbol::Yellow, Symbol::Black]);
    }

    #[test]
    fn test_odd_run_rejected() {
        let mut run = encode(b"ab");
        run.pop();
        assert!(matches!(decode(&run), Err(Error::OddSymbolRun(3))));
    }

    #[test]
    fn test_sentinel_inside_run_rejected() {
        let mut run = encode(b"ab");
        run[2] = Symbol::Empty;
        assert!(matches!(decode(&run), Err(Error::UnexpectedSentinel(2))));
    }

    #[test]
    fn test_foreign_cells_read_as_empty() {
        assert_eq!(Symbol::from_cell(0), Symbol::Empty);
        assert_eq!(Symbol::from_cell(17), Symbol::Empty);
        assert_eq!(Symbol::from_cell(255), Symbol::Empty);
        assert_eq!(Symbol::from_cell(16), Symbol::Black);
        assert!(!is_data_cell(200));
        assert!(is_data_cell(Symbol::Cyan.to_cell()));
    }
}
