//! Adaptive Deflate decoding.
//!
//! Config payloads are a Deflate stream behind a vendor wrapper whose width
//! differs between firmware revisions, and the stream itself may be raw,
//! zlib-wrapped or gzip-wrapped.  Neither is recorded anywhere, so decoding
//! tries every `(skip offset, window parameter)` pair of a [`SearchTable`]
//! and keeps the first one that yields output.
//!
//! # Search order
//! Offsets form the outer loop and window parameters the inner loop, both in
//! table order.  With the default table that is
//!
//! ```text
//! offset 0:  wbits -15, -14, ..., -8, 15, 31, 47
//! offset 4:  wbits -15, ..., 47
//! ...
//! offset 16: wbits -15, ..., 47
//! ```
//!
//! When several pairs decode, the earliest one in this order is reported,
//! including under the `parallel` feature.
//!
//! # Window parameters
//! [`WindowParam`] follows zlib's `wbits` convention: `-8..=-15` is raw
//! Deflate with a `2^n` byte window, `15` is zlib, `31` is gzip and `47`
//! lets the stream header pick between zlib and gzip.  A raw inflater with
//! a wide window accepts everything a narrow one does, so the negative
//! entries mostly matter for streams that reference past their window.

use std::fmt;
use std::io::{self, Write};

use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
use flate2::{Compression, Decompress, FlushDecompress, Status};
use log::trace;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Inflate buffer growth step.
const CHUNK: usize = 64 * 1024;
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

// ── Window parameter ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum WindowParam {
    /// Headerless Deflate, `window_bits` in `8..=15`.
    RawDeflate { window_bits: u8 },
    Zlib,
    Gzip,
    /// zlib or gzip, chosen by the stream's own header.
    Auto,
}

impl WindowParam {
    /// zlib `wbits` spelling of this parameter.
    pub fn wbits(self) -> i32 {
        match self {
            WindowParam::RawDeflate { window_bits } => -(window_bits as i32),
            WindowParam::Zlib => 15,
            WindowParam::Gzip => 31,
            WindowParam::Auto => 47,
        }
    }

    pub fn from_wbits(wbits: i32) -> Option<Self> {
        match wbits {
            -15..=-8 => Some(WindowParam::RawDeflate { window_bits: (-wbits) as u8 }),
            15 => Some(WindowParam::Zlib),
            31 => Some(WindowParam::Gzip),
            47 => Some(WindowParam::Auto),
            _  => None,
        }
    }
}

impl TryFrom<i32> for WindowParam {
    type Error = String;

    fn try_from(wbits: i32) -> Result<Self, Self::Error> {
        WindowParam::from_wbits(wbits).ok_or_else(|| format!("unsupported wbits {wbits}"))
    }
}

impl From<WindowParam> for i32 {
    fn from(param: WindowParam) -> i32 {
        param.wbits()
    }
}

impl fmt::Display for WindowParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wbits())
    }
}

/// Window parameters tried at every offset, in order.
pub const DEFAULT_PARAMS: [WindowParam; 11] = [
    WindowParam::RawDeflate { window_bits: 15 },
    WindowParam::RawDeflate { window_bits: 14 },
    WindowParam::RawDeflate { window_bits: 13 },
    WindowParam::RawDeflate { window_bits: 12 },
    WindowParam::RawDeflate { window_bits: 11 },
    WindowParam::RawDeflate { window_bits: 10 },
    WindowParam::RawDeflate { window_bits: 9 },
    WindowParam::RawDeflate { window_bits: 8 },
    WindowParam::Zlib,
    WindowParam::Gzip,
    WindowParam::Auto,
];

/// Wrapper widths skipped before the stream, in order.
pub const DEFAULT_OFFSETS: [usize; 5] = [0, 4, 8, 12, 16];

// ── Search table ─────────────────────────────────────────────────────────────

/// One trial of the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub offset: usize,
    pub param:  WindowParam,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offset {} wbits {}", self.offset, self.param)
    }
}

/// Ordered candidate space.  These lists were found empirically and may
/// need extending for newer firmware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTable {
    pub offsets: Vec<usize>,
    #[serde(rename = "wbits")]
    pub params:  Vec<WindowParam>,
}

impl Default for SearchTable {
    fn default() -> Self {
        Self {
            offsets: DEFAULT_OFFSETS.to_vec(),
            params:  DEFAULT_PARAMS.to_vec(),
        }
    }
}

impl SearchTable {
    /// All candidates in canonical order: offsets outer, parameters inner.
    pub fn candidates(&self) -> impl Iterator<Item = Candidate> + '_ {
        self.offsets.iter().flat_map(move |&offset| {
            self.params.iter().map(move |&param| Candidate { offset, param })
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len() * self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// Why a single candidate failed.  Never surfaced past the search.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Deflate error: {0}")]
    Deflate(#[from] flate2::DecompressError),
    #[error("Stream ended before its end marker")]
    Truncated,
    #[error("Output exceeds {0} bytes")]
    OutputLimit(usize),
    #[error("Skip offset {offset} is past the {len}-byte payload")]
    OffsetPastEnd { offset: usize, len: usize },
    #[error("Stream decoded to nothing")]
    EmptyOutput,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("No valid decompression parameters ({tried} combinations tried)")]
pub struct NoValidParameters {
    pub tried: usize,
}

// ── Stream decoders ──────────────────────────────────────────────────────────

/// Decodes one Deflate variant.  Implementations must be pure: the search
/// may call them concurrently and in any order.
pub trait StreamDecoder: Send + Sync {
    fn decode(&self, data: &[u8], param: WindowParam, limit: usize) -> Result<Vec<u8>, StreamError>;
}

/// Default decoder backed by flate2's zlib engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flate2Decoder;

impl StreamDecoder for Flate2Decoder {
    fn decode(&self, data: &[u8], param: WindowParam, limit: usize) -> Result<Vec<u8>, StreamError> {
        let engine = match param {
            // flate2 only accepts 9..=15; a 9-bit window still decodes every 8-bit stream.
            WindowParam::RawDeflate { window_bits } => {
                Decompress::new_with_window_bits(false, window_bits.clamp(9, 15))
            }
            WindowParam::Zlib => Decompress::new(true),
            WindowParam::Gzip => Decompress::new_gzip(15),
            WindowParam::Auto if data.starts_with(&GZIP_MAGIC) => Decompress::new_gzip(15),
            WindowParam::Auto => Decompress::new(true),
        };
        inflate(engine, data, limit)
    }
}

/// Run `engine` over `input` until the stream end marker.  Bytes after the
/// marker are ignored.
fn inflate(mut engine: Decompress, input: &[u8], limit: usize) -> Result<Vec<u8>, StreamError> {
    let mut out = Vec::new();
    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity().max(CHUNK));
        }
        let in_before  = engine.total_in();
        let out_before = engine.total_out();
        let status = engine.decompress_vec(&input[in_before as usize..], &mut out, FlushDecompress::Finish)?;

        if out.len() > limit {
            return Err(StreamError::OutputLimit(limit));
        }
        match status {
            Status::StreamEnd => return Ok(out),
            Status::Ok | Status::BufError => {
                if engine.total_in() == in_before && engine.total_out() == out_before {
                    return Err(StreamError::Truncated);
                }
            }
        }
    }
}

// ── Search ───────────────────────────────────────────────────────────────────

/// Winning candidate and its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decompressed {
    pub data:      Vec<u8>,
    pub candidate: Candidate,
}

fn attempt(
    payload:   &[u8],
    candidate: Candidate,
    decoder:   &dyn StreamDecoder,
    limit:     usize,
) -> Result<Vec<u8>, StreamError> {
    let data = payload.get(candidate.offset..).ok_or(StreamError::OffsetPastEnd {
        offset: candidate.offset,
        len:    payload.len(),
    })?;
    let out = decoder.decode(data, candidate.param, limit)?;
    if out.is_empty() {
        return Err(StreamError::EmptyOutput);
    }
    Ok(out)
}

fn attempt_logged(
    payload:   &[u8],
    candidate: Candidate,
    decoder:   &dyn StreamDecoder,
    limit:     usize,
) -> Option<Vec<u8>> {
    match attempt(payload, candidate, decoder, limit) {
        Ok(data) => Some(data),
        Err(e) => {
            trace!("{candidate}: {e}");
            None
        }
    }
}

/// Search `table` for the first candidate that decodes `payload` to a
/// non-empty document no longer than `limit` bytes.
pub fn decompress(
    payload: &[u8],
    table:   &SearchTable,
    decoder: &dyn StreamDecoder,
    limit:   usize,
) -> Result<Decompressed, NoValidParameters> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        let candidates: Vec<Candidate> = table.candidates().collect();
        // find_map_first keeps the sequentially earliest hit, not the fastest.
        let found = candidates.par_iter().find_map_first(|&candidate| {
            attempt_logged(payload, candidate, decoder, limit)
                .map(|data| Decompressed { data, candidate })
        });
        if let Some(hit) = found {
            return Ok(hit);
        }
    }

    #[cfg(not(feature = "parallel"))]
    for candidate in table.candidates() {
        if let Some(data) = attempt_logged(payload, candidate, decoder, limit) {
            return Ok(Decompressed { data, candidate });
        }
    }

    Err(NoValidParameters { tried: table.len() })
}

// ── Compression (repack) ─────────────────────────────────────────────────────

/// Compress `data` in the framing named by `param`.  Raw streams always use a
/// 32 KiB window; `Auto` produces zlib.
pub fn compress(data: &[u8], param: WindowParam, level: u32) -> io::Result<Vec<u8>> {
    let level = Compression::new(level.min(9));
    match param {
        WindowParam::RawDeflate { .. } => {
            let mut enc = DeflateEncoder::new(Vec::new(), level);
            enc.write_all(data)?;
            enc.finish()
        }
        WindowParam::Zlib | WindowParam::Auto => {
            let mut enc = ZlibEncoder::new(Vec::new(), level);
            enc.write_all(data)?;
            enc.finish()
        }
        WindowParam::Gzip => {
            let mut enc = GzEncoder::new(Vec::new(), level);
            enc.write_all(data)?;
            enc.finish()
        }
    }
}
