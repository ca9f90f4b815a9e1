// src/error.rs
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Unsupported URI prefix code: 0x{0:02X}")]
    UnsupportedPrefix(u8),

    #[error("URL remainder too long: payload length {payload_len} exceeds {max} bytes")]
    EncodingTooLarge { payload_len: usize, max: usize },

    #[error("Non-ASCII character {character:?} at position {position}")]
    NonAsciiCharacter { character: char, position: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentError {
    #[error("Trailer remainder {remainder} must be smaller than trailer modulus {modulus}")]
    InvalidTrailerRemainder { remainder: usize, modulus: usize },

    #[error("Trailer modulus 1 marks every block as a trailer; nothing can be skipped to")]
    NoDataBlocks,

    #[error("Block index overflow after block {last}")]
    IndexOverflow { last: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("No NDEF TLV found")]
    NoNdefTlv,

    #[error("Truncated data: {0}")]
    Truncated(&'static str),

    #[error("Unsupported NDEF record: {0}")]
    UnsupportedRecord(String),

    #[error("Unsupported URI prefix code: 0x{0:02X}")]
    UnsupportedPrefix(u8),

    #[error("URI remainder is not ASCII")]
    NonAsciiRemainder,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DumpError {
    #[error("Block {index} is reserved for card metadata")]
    ReservedBlock { index: usize },

    #[error("Block {index} is outside the card ({blocks} blocks)")]
    OutOfRange { index: usize, blocks: usize },

    #[error("Block {index} is a sector trailer and cannot hold payload")]
    TrailerCollision { index: usize },

    #[error("Block {index} appears more than once")]
    DuplicateBlock { index: usize },

    #[error("Block {index} has {len} bytes, expected {expected}")]
    BadBlockSize {
        index: usize,
        len: usize,
        expected: usize,
    },

    #[error("Line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Segment(#[from] SegmentError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Dump(#[from] DumpError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
