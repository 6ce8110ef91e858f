use std::ops::Range;

use thiserror::Error;

/// Result type of all decoding operations in this crate
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Errors that can occur while decoding a .pnts tile. Decoding is all-or-nothing, so any of these aborts
/// the whole decode call
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("buffer of {actual} bytes is too small to contain a PNTS header ({expected} bytes)")]
    TooSmall { actual: usize, expected: usize },
    #[error("no valid PNTS file, expected first four bytes to be 'pnts' but was {magic:?}")]
    BadMagic { magic: [u8; 4] },
    #[error("{segment} spans bytes {range:?}, which exceeds the buffer length {buffer_length}")]
    RangeOverflow {
        segment: &'static str,
        range: Range<u64>,
        buffer_length: usize,
    },
    #[error("mandatory value POINTS_LENGTH not found in feature table")]
    MissingPointCount,
    #[error("RTC_CENTER must be an array of three numbers, but was {0}")]
    MalformedRtcCenter(String),
    #[error("POSITION_QUANTIZED is not supported, only POSITION can be read")]
    UnsupportedQuantization,
    #[error("feature table defines neither POSITION nor POSITION_QUANTIZED")]
    MissingPosition,
    #[error("point cloud codec failed to decode the feature table binary: {0}")]
    CodecDecode(String),
    #[error("{document} JSON is malformed: {reason}")]
    MalformedJson {
        document: &'static str,
        reason: String,
    },
    #[error("reading {length} bytes of {what} at offset {offset} exceeds the {segment_length} bytes of its segment")]
    OutOfRange {
        what: String,
        offset: u64,
        length: u64,
        segment_length: usize,
    },
    #[error("invalid value for feature table entry {key}: {reason}")]
    InvalidFeatureTableValue { key: &'static str, reason: String },
    #[error("unsupported component type for {semantic}")]
    UnsupportedComponentType { semantic: String },
    #[error("buffer of {actual} bytes exceeds the configured limit of {limit} bytes")]
    BufferTooLarge { actual: u64, limit: u64 },
    #[error("point count {actual} exceeds the configured limit of {limit} points")]
    TooManyPoints { actual: u64, limit: u32 },
    #[error("could not deserialize PNTS header: {0}")]
    Header(#[from] bincode::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
