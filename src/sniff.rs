//! Endianness detection from the 4-byte file magic.
//!
//! A configuration blob starts with a family-specific marker.  The marker is
//! written in the CPU's native byte order, so finding it verbatim means a
//! big-endian device and finding it byte-reversed means a little-endian one.
//! Anything else is either encrypted or not a configuration blob at all.

use std::fmt;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// Big-endian marker used by the Nokia/Alcatel-Lucent family.
pub const MAGIC_BE: [u8; 4] = [0x00, 0x12, 0x31, 0x23];
/// Byte-reversed counterpart of [`MAGIC_BE`].
pub const MAGIC_LE: [u8; 4] = [0x23, 0x31, 0x12, 0x00];

/// Byte order of every multi-byte integer in a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    Big,
    Little,
}

impl Endianness {
    /// Read a `u32` from the first four bytes of `buf` (panics if shorter).
    #[inline]
    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            Endianness::Big    => BigEndian::read_u32(buf),
            Endianness::Little => LittleEndian::read_u32(buf),
        }
    }

    #[inline]
    pub fn write_u32(self, buf: &mut [u8], value: u32) {
        match self {
            Endianness::Big    => BigEndian::write_u32(buf, value),
            Endianness::Little => LittleEndian::write_u32(buf, value),
        }
    }

    /// Orient a big-endian marker for this byte order.
    pub fn orient_magic(self, magic_be: [u8; 4]) -> [u8; 4] {
        match self {
            Endianness::Big => magic_be,
            Endianness::Little => {
                let mut m = magic_be;
                m.reverse();
                m
            }
        }
    }

    /// Short label used in repack flags (`b` / `l`).
    pub fn flag_char(self) -> char {
        match self {
            Endianness::Big    => 'b',
            Endianness::Little => 'l',
        }
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endianness::Big    => f.write_str("big endian"),
            Endianness::Little => f.write_str("little endian"),
        }
    }
}

/// Verdict of [`sniff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniffed {
    Big,
    Little,
    Unknown,
}

impl Sniffed {
    pub fn endianness(self) -> Option<Endianness> {
        match self {
            Sniffed::Big     => Some(Endianness::Big),
            Sniffed::Little  => Some(Endianness::Little),
            Sniffed::Unknown => None,
        }
    }
}

/// Classify `blob` by its leading marker.  Total over all inputs, including
/// ones shorter than four bytes.
pub fn sniff(blob: &[u8], magic_be: [u8; 4]) -> Sniffed {
    let Some(head) = blob.get(..4) else {
        return Sniffed::Unknown;
    };
    if head == magic_be {
        Sniffed::Big
    } else if head == Endianness::Little.orient_magic(magic_be) {
        Sniffed::Little
    } else {
        Sniffed::Unknown
    }
}
