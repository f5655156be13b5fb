//! Payload compression and scope framing.

use tether_primitives::{CodecError, ScopeId, ScopedContent, Wire};

use crate::VerifyError;

/// zstd level used for encoded payloads.
const COMPRESSION_LEVEL: i32 = 3;

/// Compresses `bytes` with zstd.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    zstd::encode_all(bytes, COMPRESSION_LEVEL).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Frames `data` with its session scope and compresses it.
pub fn encode_payload(scope: &ScopeId, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let content = ScopedContent { scope: scope.clone(), data: data.to_vec() };
    compress(&content.to_wire()?)
}

pub(crate) fn decompress(bytes: &[u8]) -> Result<Vec<u8>, VerifyError> {
    zstd::decode_all(bytes).map_err(|e| VerifyError::Decompress(e.to_string()))
}

/// Parses decompressed content, accepting it only under `expected` scope.
pub(crate) fn open_scoped(plain: &[u8], expected: &ScopeId) -> Result<Vec<u8>, VerifyError> {
    let content = ScopedContent::from_wire(plain)?;
    if &content.scope != expected {
        return Err(VerifyError::ScopeMismatch { expected: expected.clone(), found: content.scope });
    }
    Ok(content.data)
}
