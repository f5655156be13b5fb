//! Error types for primitive parsing and encoding.

/// Errors from parsing keys.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// Wrong number of bytes.
    #[error("invalid key length: expected 32, got {0}")]
    InvalidLength(usize),

    /// Not valid hex.
    #[error("invalid key hex: {0}")]
    InvalidHex(String),
}

/// Errors from building chunk ranges.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    /// Range start lies after its end.
    #[error("invalid range: start {start} > end {end}")]
    Inverted { start: u64, end: u64 },
}

/// Errors from topic derivation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    /// One of the keys is all zeroes.
    #[error("malformed topic input: {0} key is zero")]
    ZeroKey(&'static str),
}

/// Errors from the wire codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The bytes could not be decoded into the expected message.
    #[error("decode error: {0}")]
    Decode(String),

    /// The value could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),
}

impl From<postcard::Error> for CodecError {
    fn from(err: postcard::Error) -> Self {
        CodecError::Decode(err.to_string())
    }
}
