//! Decode and repack pipeline.
//!
//! ```text
//! raw bytes ─▶ classify ─▶ header ─▶ checksum ─▶ adaptive inflate ─▶ DecodeResult
//! ```
//!
//! Each stage either hands its output to the next or stops the decode with a
//! [`DecodeError`] naming the stage.  Nothing is retried apart from the
//! candidate search inside the inflate stage, and no partial document is
//! ever returned.
//!
//! [`CfgCodec::encode`] mirrors the pipeline for repacking an edited document.

use std::borrow::Cow;
use std::fmt;

use log::{debug, info};
use thiserror::Error;

use crate::checksum::{self, ChecksumMismatch};
use crate::classify::{classify, Classification};
use crate::codec::{self, Candidate, Flate2Decoder, NoValidParameters, StreamDecoder, WindowParam};
use crate::crypto::{BlockCipher, CryptoError};
use crate::family::FirmwareFamily;
use crate::header::{Header, HeaderError};
use crate::sniff::Endianness;

/// Default cap on a decoded document: 64 MiB.
pub const DEFAULT_MAX_DOCUMENT_LEN: usize = 64 * 1024 * 1024;
/// Default zlib level used when repacking.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 9;

// ── Errors ───────────────────────────────────────────────────────────────────

/// Pipeline stage that produced a [`DecodeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classify,
    Header,
    Checksum,
    Decompress,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Classify   => "classify",
            Stage::Header     => "header",
            Stage::Checksum   => "checksum",
            Stage::Decompress => "decompress",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeErrorKind {
    #[error("Input is empty")]
    TruncatedInput,
    #[error("Invalid cfg file or magic; decryption failed or the key is wrong")]
    UnrecognizedFormat { cipher_error: Option<CryptoError> },
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error("{0}; the file is corrupt or the key is wrong")]
    ChecksumMismatch(#[from] ChecksumMismatch),
    #[error("{0}; the payload may not be Deflate")]
    NoValidDecompressionParameters(#[from] NoValidParameters),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{stage} stage failed: {kind}")]
pub struct DecodeError {
    pub stage: Stage,
    pub kind:  DecodeErrorKind,
}

impl DecodeError {
    fn at(stage: Stage, kind: impl Into<DecodeErrorKind>) -> Self {
        Self { stage, kind: kind.into() }
    }
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Compression failed: {0}")]
    Compression(#[from] std::io::Error),
    #[error("Compressed payload of {0} bytes does not fit a 32-bit length field")]
    PayloadTooLarge(usize),
}

// ── Results / options ────────────────────────────────────────────────────────

/// A fully decoded blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeResult {
    pub document:      Vec<u8>,
    pub endianness:    Endianness,
    pub was_encrypted: bool,
    pub format_magic:  u32,
    /// Winning `(offset, wbits)` pair, for diagnostics.
    pub candidate:     Candidate,
}

impl DecodeResult {
    /// Options that repack a document with this blob's framing.
    pub fn repack_options(&self) -> EncodeOptions {
        EncodeOptions {
            endianness:   self.endianness,
            encrypt:      self.was_encrypted,
            format_magic: self.format_magic,
            level:        DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// CLI flag for the repack command: `-pb`, `-pl`, `-pbe` or `-ple`.
    pub fn repack_flag(&self) -> String {
        self.repack_options().flag()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub endianness:   Endianness,
    pub encrypt:      bool,
    pub format_magic: u32,
    pub level:        u32,
}

impl EncodeOptions {
    pub fn flag(&self) -> String {
        format!("-p{}{}", self.endianness.flag_char(), if self.encrypt { "e" } else { "" })
    }

    /// Parse `-pb`, `-pl`, `-pbe` or `-ple`.
    pub fn from_flag(flag: &str, format_magic: u32) -> Option<Self> {
        let (endianness, encrypt) = match flag {
            "-pb"  => (Endianness::Big, false),
            "-pl"  => (Endianness::Little, false),
            "-pbe" => (Endianness::Big, true),
            "-ple" => (Endianness::Little, true),
            _      => return None,
        };
        Some(Self { endianness, encrypt, format_magic, level: DEFAULT_COMPRESSION_LEVEL })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Candidates producing more than this many bytes are rejected.
    pub max_document_len: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self { max_document_len: DEFAULT_MAX_DOCUMENT_LEN }
    }
}

// ── Codec ────────────────────────────────────────────────────────────────────

/// Decoder/encoder bound to one firmware family.  Holds no per-call state,
/// so one instance can serve any number of threads.
pub struct CfgCodec {
    family:  FirmwareFamily,
    cipher:  BlockCipher,
    decoder: Box<dyn StreamDecoder>,
    options: DecodeOptions,
}

impl CfgCodec {
    pub fn new(family: FirmwareFamily) -> Self {
        Self::with_decoder(family, Box::new(Flate2Decoder))
    }

    pub fn with_decoder(family: FirmwareFamily, decoder: Box<dyn StreamDecoder>) -> Self {
        let cipher = BlockCipher::new(family.cipher.clone());
        Self { family, cipher, decoder, options: DecodeOptions::default() }
    }

    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn family(&self) -> &FirmwareFamily {
        &self.family
    }

    /// Classify, parse and checksum `raw` without inflating the payload.
    pub fn inspect(&self, raw: &[u8]) -> Result<Inspection, DecodeError> {
        if raw.is_empty() {
            return Err(DecodeError::at(Stage::Classify, DecodeErrorKind::TruncatedInput));
        }

        let (blob, endianness, was_encrypted) = match classify(raw, self.family.magic, &self.cipher) {
            Classification::Plaintext { blob, endianness } => (Cow::Borrowed(blob), endianness, false),
            Classification::Decrypted { blob, endianness } => (Cow::Owned(blob), endianness, true),
            Classification::Unrecognized { cipher_error } => {
                return Err(DecodeError::at(
                    Stage::Classify,
                    DecodeErrorKind::UnrecognizedFormat { cipher_error },
                ));
            }
        };
        info!(
            "{} cfg, {}",
            if was_encrypted { "encrypted" } else { "unencrypted" },
            endianness,
        );

        let layout = &self.family.layout;
        let header = Header::parse(&blob, endianness, layout)
            .map_err(|e| DecodeError::at(Stage::Header, e))?;
        debug!(
            "fw_magic={:#x} payload_length={} checksum={:#010x}",
            header.format_magic, header.payload_length, header.checksum,
        );

        let payload = header.payload(&blob, layout).to_vec();
        checksum::validate(&payload, header.checksum)
            .map_err(|e| DecodeError::at(Stage::Checksum, e))?;
        debug!("CRC32 check passed");

        Ok(Inspection { header, endianness, was_encrypted, payload })
    }

    /// Decode a raw config blob into its document.
    pub fn decode(&self, raw: &[u8]) -> Result<DecodeResult, DecodeError> {
        let inspection = self.inspect(raw)?;

        let hit = codec::decompress(
            &inspection.payload,
            &self.family.search,
            self.decoder.as_ref(),
            self.options.max_document_len,
        )
        .map_err(|e| DecodeError::at(Stage::Decompress, e))?;
        info!("unpacked with {} byte header skipped and wbits={}", hit.candidate.offset, hit.candidate.param);

        Ok(DecodeResult {
            document:      hit.data,
            endianness:    inspection.endianness,
            was_encrypted: inspection.was_encrypted,
            format_magic:  inspection.header.format_magic,
            candidate:     hit.candidate,
        })
    }

    /// Build a config blob around `document`.
    pub fn encode(&self, document: &[u8], opts: &EncodeOptions) -> Result<Vec<u8>, EncodeError> {
        let payload = codec::compress(document, WindowParam::Zlib, opts.level)?;
        let payload_length = u32::try_from(payload.len())
            .map_err(|_| EncodeError::PayloadTooLarge(payload.len()))?;

        let header = Header {
            format_magic: opts.format_magic,
            payload_length,
            checksum: checksum::crc32(&payload),
        };
        let mut blob = header.write(self.family.magic, opts.endianness, &self.family.layout);
        blob.extend_from_slice(&payload);
        debug!("packed {} byte document into {} byte blob", document.len(), blob.len());

        if opts.encrypt {
            return Ok(self.cipher.encrypt(&blob));
        }
        Ok(blob)
    }
}

impl Default for CfgCodec {
    fn default() -> Self {
        Self::new(FirmwareFamily::default())
    }
}

/// Header-level view of a blob that passed every check except inflation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    pub header:        Header,
    pub endianness:    Endianness,
    pub was_encrypted: bool,
    pub payload:       Vec<u8>,
}

/// Decode with the built-in Nokia family.
pub fn decode(raw: &[u8]) -> Result<DecodeResult, DecodeError> {
    CfgCodec::default().decode(raw)
}

/// Encode with the built-in Nokia family.
pub fn encode(document: &[u8], opts: &EncodeOptions) -> Result<Vec<u8>, EncodeError> {
    CfgCodec::default().encode(document, opts)
}
