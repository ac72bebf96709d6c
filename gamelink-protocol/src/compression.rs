//! LZ4 "pickle" (raw block, no frame header) compression for inbound
//! payloads. Requests are never compressed; only the server announces a
//! compressed payload, via a non-zero `original_size`.

use bytes::Bytes;

use crate::error::ProtocolError;

/// Decompress `data` into exactly `original_size` bytes.
pub fn decompress_pickle(data: &[u8], original_size: usize) -> Result<Bytes, ProtocolError> {
    let decompressed = lz4_flex::block::decompress(data, original_size)
        .map_err(|e| ProtocolError::Decompression(e.to_string()))?;
    if decompressed.len() != original_size {
        return Err(ProtocolError::DecompressedSizeMismatch {
            expected: original_size,
            actual: decompressed.len(),
        });
    }
    Ok(Bytes::from(decompressed))
}

/// Compress `data` with the raw LZ4 block format, for tests and for any
/// server-emulating test harness that needs to produce compressed frames.
pub fn compress_pickle(data: &[u8]) -> Vec<u8> {
    lz4_flex::block::compress(data)
}
