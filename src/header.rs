//! Fixed-layout config header.
//!
//! Default layout (all integers in the blob's detected byte order):
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x00 | 4 | marker (see [`crate::sniff`]) |
//! | 0x04 | 4 | payload length |
//! | 0x08 | 4 | CRC-32 of the payload |
//! | 0x0C | 4 | reserved, written as zero |
//! | 0x10 | 4 | firmware format magic |
//! | 0x14 | n | payload |

use thiserror::Error;

use crate::family::HeaderLayout;
use crate::sniff::Endianness;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Header truncated: need {needed} bytes, have {available}")]
    TruncatedHeader { needed: usize, available: usize },
    #[error("Payload length {declared} exceeds the {available} bytes after the header")]
    PayloadOutOfRange { declared: u32, available: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub format_magic:   u32,
    pub payload_length: u32,
    pub checksum:       u32,
}

impl Header {
    /// Parse the header out of a plaintext blob.
    pub fn parse(blob: &[u8], endianness: Endianness, layout: &HeaderLayout) -> Result<Self, HeaderError> {
        let needed = layout.min_len();
        if blob.len() < needed {
            return Err(HeaderError::TruncatedHeader {
                needed,
                available: blob.len(),
            });
        }
        let field = |offset: usize| endianness.read_u32(&blob[offset..offset + 4]);
        let header = Self {
            format_magic:   field(layout.format_magic_offset),
            payload_length: field(layout.payload_length_offset),
            checksum:       field(layout.checksum_offset),
        };

        let available = blob.len() - layout.payload_offset;
        if header.payload_length as usize > available {
            return Err(HeaderError::PayloadOutOfRange {
                declared: header.payload_length,
                available,
            });
        }
        Ok(header)
    }

    /// The payload bytes this header describes.  Only valid on the blob it
    /// was parsed from.
    pub fn payload<'a>(&self, blob: &'a [u8], layout: &HeaderLayout) -> &'a [u8] {
        let start = layout.payload_offset;
        &blob[start..start + self.payload_length as usize]
    }

    /// Serialize the header, marker included, into a zero-filled buffer of
    /// `layout.payload_offset` bytes.
    pub fn write(&self, magic_be: [u8; 4], endianness: Endianness, layout: &HeaderLayout) -> Vec<u8> {
        let mut out = vec![0u8; layout.payload_offset];
        out[..4].copy_from_slice(&endianness.orient_magic(magic_be));
        let mut put = |offset: usize, value: u32| {
            endianness.write_u32(&mut out[offset..offset + 4], value)
        };
        put(layout.payload_length_offset, self.payload_length);
        put(layout.checksum_offset,       self.checksum);
        put(layout.format_magic_offset,   self.format_magic);
        out
    }
}
