//! Firmware family descriptors.
//!
//! Everything that ties the decode pipeline to one vendor's config format
//! lives here: the cipher key and IV, the leading marker, the header field
//! offsets and the decompression search table.  Adding a family means
//! building (or loading) another [`FirmwareFamily`]; the pipeline itself
//! never changes.
//!
//! # JSON form
//!
//! ```json
//! {
//!   "name":   "nokia-xs240x",
//!   "cipher": { "key": "f84a…4542", "iv": "87d0…d547" },
//!   "magic":  "00123123",
//!   "layout": { "payload_length_offset": 4, "checksum_offset": 8,
//!               "format_magic_offset": 16, "payload_offset": 20 },
//!   "search": { "offsets": [0, 4, 8, 12, 16],
//!               "wbits":   [-15, -14, -13, -12, -11, -10, -9, -8, 15, 31, 47] }
//! }
//! ```
//!
//! `layout` and `search` may be omitted and default to the values above.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::SearchTable;
use crate::crypto::CipherParams;
use crate::sniff::MAGIC_BE;

#[derive(Error, Debug)]
pub enum FamilyError {
    #[error("Invalid family description: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Header field {field} at {offset:#x} overlaps the payload at {payload_offset:#x}")]
    FieldOverlapsPayload { field: &'static str, offset: usize, payload_offset: usize },
    #[error("Search table has no {0}")]
    EmptySearch(&'static str),
}

// ── Header layout ────────────────────────────────────────────────────────────

/// Byte offsets of the fixed header fields, relative to the plaintext start.
/// Offset 0 always holds the 4-byte marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderLayout {
    pub payload_length_offset: usize,
    pub checksum_offset:       usize,
    pub format_magic_offset:   usize,
    /// First payload byte; also the header length.
    pub payload_offset:        usize,
}

impl Default for HeaderLayout {
    fn default() -> Self {
        Self {
            payload_length_offset: 0x04,
            checksum_offset:       0x08,
            format_magic_offset:   0x10,
            payload_offset:        0x14,
        }
    }
}

impl HeaderLayout {
    /// Bytes needed before any field can be read.
    pub fn min_len(&self) -> usize {
        [
            self.payload_offset,
            self.payload_length_offset + 4,
            self.checksum_offset + 4,
            self.format_magic_offset + 4,
        ]
        .into_iter()
        .max()
        .unwrap_or(self.payload_offset)
    }

    fn validate(&self) -> Result<(), FamilyError> {
        let fields = [
            ("payload_length", self.payload_length_offset),
            ("checksum",       self.checksum_offset),
            ("format_magic",   self.format_magic_offset),
        ];
        for (field, offset) in fields {
            if offset + 4 > self.payload_offset {
                return Err(FamilyError::FieldOverlapsPayload {
                    field,
                    offset,
                    payload_offset: self.payload_offset,
                });
            }
        }
        Ok(())
    }
}

// ── Family ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareFamily {
    pub name:   String,
    pub cipher: CipherParams,
    /// Leading marker as written by a big-endian device.
    #[serde(with = "hex::serde")]
    pub magic:  [u8; 4],
    #[serde(default)]
    pub layout: HeaderLayout,
    #[serde(default)]
    pub search: SearchTable,
}

impl FirmwareFamily {
    /// Nokia / Alcatel-Lucent XS-240X-A (XGS-PON) ONTs.
    pub fn nokia_xs240x() -> Self {
        Self {
            name: "nokia-xs240x".to_string(),
            cipher: CipherParams {
                key: [
                    0xF8, 0x4A, 0x90, 0xB1, 0xC5, 0xC7, 0x11, 0x9F,
                    0x4A, 0x24, 0xAC, 0x88, 0xF0, 0xC6, 0x27, 0x50,
                    0xB9, 0x4D, 0x05, 0x91, 0x6F, 0x08, 0xD9, 0x01,
                    0x4F, 0x35, 0x0C, 0xA4, 0xF8, 0x2B, 0x45, 0x42,
                ],
                iv: [
                    0x87, 0xD0, 0xE1, 0x59, 0x79, 0x36, 0x29, 0x48,
                    0x4D, 0x59, 0xCC, 0xA3, 0xF9, 0x54, 0xD5, 0x47,
                ],
            },
            magic:  MAGIC_BE,
            layout: HeaderLayout::default(),
            search: SearchTable::default(),
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, FamilyError> {
        let family: Self = serde_json::from_slice(bytes)?;
        family.validate()?;
        Ok(family)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FamilyError> {
        Self::from_json(&fs::read(path)?)
    }

    pub fn to_json(&self) -> Result<String, FamilyError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), FamilyError> {
        self.layout.validate()?;
        if self.search.offsets.is_empty() {
            return Err(FamilyError::EmptySearch("offsets"));
        }
        if self.search.params.is_empty() {
            return Err(FamilyError::EmptySearch("window parameters"));
        }
        Ok(())
    }
}

impl Default for FirmwareFamily {
    fn default() -> Self {
        Self::nokia_xs240x()
    }
}

/// Look up a built-in family by name.
pub fn builtin(name: &str) -> Option<FirmwareFamily> {
    match name {
        "nokia-xs240x" => Some(FirmwareFamily::nokia_xs240x()),
        _              => None,
    }
}
