//! Error kinds raised while decoding DEFLATE streams and walking TAR
//! archives.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the decoders can surface. A decode either returns a
/// complete result or exactly one of these; there is no partial recovery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A stored block's one's-complement length check failed.
    #[error("stored block length {length:#06x} does not match its check value {check:#06x}")]
    WrongUncompressedBlockLengths { length: u16, check: u16 },

    /// A block header carried the reserved type `0b11`.
    #[error("reserved block type")]
    WrongBlockType,

    /// A decoded symbol fell outside the alphabet valid at that point.
    #[error("symbol {0} is outside its alphabet")]
    WrongSymbol(usize),

    /// No Huffman code matched the remaining input bits.
    #[error("no Huffman code matches the input")]
    SymbolNotFound,

    /// A back reference pointed before the start of the produced output.
    #[error("back reference distance {distance} exceeds the {available} bytes produced so far")]
    WrongBackReference { distance: usize, available: usize },

    /// The input ended in the middle of a structure a size field promised.
    #[error("input is truncated")]
    TruncatedInput,

    /// A TAR input shorter than a single 512-byte record.
    #[error("input is shorter than one 512-byte record")]
    TooSmallFileIsPassed,

    /// A numeric header field held something other than digits.
    #[error("field {0:?} is not a number")]
    FieldIsNotNumber(&'static str),

    /// The stored header checksum does not match the record bytes.
    #[error("header checksum mismatch")]
    WrongHeaderCrc,

    /// An extended header record violated the `"<len> <key>=<value>\n"`
    /// grammar.
    #[error("malformed extended header record")]
    WrongPaxHeaderEntry,
}
