//! CRC-32 (zlib/gzip polynomial) payload check.

use crc32fast::Hasher;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Checksum mismatch: header says {expected:#010x}, payload hashes to {actual:#010x}")]
pub struct ChecksumMismatch {
    pub expected: u32,
    pub actual:   u32,
}

pub fn crc32(payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

/// Fails when the payload's CRC-32 differs from `expected`.  A mismatch
/// means a wrong key or a corrupt file; never decompress past it.
pub fn validate(payload: &[u8], expected: u32) -> Result<(), ChecksumMismatch> {
    let actual = crc32(payload);
    if actual != expected {
        return Err(ChecksumMismatch { expected, actual });
    }
    Ok(())
}
