//! Plaintext-or-encrypted detection.
//!
//! Config files carry no "encrypted" flag.  A blob whose marker is readable
//! is plaintext; otherwise it is decrypted with the family key and sniffed
//! again.  Whatever still has no marker is unrecognized, whether the key was
//! wrong or the file is not a config at all.

use log::debug;

use crate::crypto::{BlockCipher, CryptoError};
use crate::sniff::{sniff, Endianness};

/// Outcome of [`classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification<'a> {
    /// The marker was present in the raw bytes.
    Plaintext { blob: &'a [u8], endianness: Endianness },
    /// The marker appeared after decryption.
    Decrypted { blob: Vec<u8>, endianness: Endianness },
    /// Neither.  `cipher_error` records why decryption failed, if it did.
    Unrecognized { cipher_error: Option<CryptoError> },
}

pub fn classify<'a>(raw: &'a [u8], magic_be: [u8; 4], cipher: &BlockCipher) -> Classification<'a> {
    if let Some(endianness) = sniff(raw, magic_be).endianness() {
        debug!("marker found in raw input, {endianness}");
        return Classification::Plaintext { blob: raw, endianness };
    }

    let decrypted = match cipher.decrypt(raw) {
        Ok(d) => d,
        Err(e) => {
            debug!("no marker and decryption failed: {e}");
            return Classification::Unrecognized { cipher_error: Some(e) };
        }
    };

    match sniff(&decrypted, magic_be).endianness() {
        Some(endianness) => {
            debug!("marker found after decryption, {endianness}");
            Classification::Decrypted { blob: decrypted, endianness }
        }
        None => {
            debug!("no marker after decryption");
            Classification::Unrecognized { cipher_error: None }
        }
    }
}
