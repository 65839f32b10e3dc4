//! AES-256-CBC block cipher with fixed per-family key and IV.
//!
//! Decryption:  raw CBC over whole 16-byte blocks, then the last plaintext
//!              byte `n` says how many trailing bytes to drop.
//! Encryption:  PKCS#7 pad to a block boundary, then CBC.
//!
//! The adapter is stateless: a fresh CBC context is built for every call, so
//! one [`BlockCipher`] can be shared freely between threads and decodes.

use aes::Aes256;
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use log::trace;
use serde::{Deserialize, Serialize};
use thiserror::Error;

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;

/// AES block size in bytes.
pub const BLOCK_LEN: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Ciphertext is empty")]
    Empty,
    #[error("Ciphertext length {0} is not a multiple of {BLOCK_LEN}")]
    BlockLength(usize),
    #[error("Padding length {pad} exceeds decrypted length {len}")]
    Padding { pad: u8, len: usize },
}

/// Key material for one device family.  Never derived from input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherParams {
    #[serde(with = "hex::serde")]
    pub key: [u8; 32],
    #[serde(with = "hex::serde")]
    pub iv:  [u8; 16],
}

#[derive(Debug, Clone)]
pub struct BlockCipher {
    params: CipherParams,
}

impl BlockCipher {
    pub fn new(params: CipherParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &CipherParams {
        &self.params
    }

    /// Decrypt `ciphertext` and strip the trailing pad.
    ///
    /// The pad byte is trusted as-is: only a pad longer than the plaintext is
    /// rejected.  Judging whether the result makes sense is left to the caller.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.is_empty() {
            return Err(CryptoError::Empty);
        }
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(CryptoError::BlockLength(ciphertext.len()));
        }

        let mut buf = ciphertext.to_vec();
        let plain_len = Aes256CbcDec::new((&self.params.key).into(), (&self.params.iv).into())
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|_| CryptoError::BlockLength(ciphertext.len()))?
            .len();
        buf.truncate(plain_len);

        let pad = buf[plain_len - 1];
        if pad as usize > plain_len {
            return Err(CryptoError::Padding { pad, len: plain_len });
        }
        buf.truncate(plain_len - pad as usize);
        trace!("decrypted {} bytes, stripped {} pad bytes", ciphertext.len(), pad);
        Ok(buf)
    }

    /// PKCS#7-pad and encrypt `plaintext` with the same key and IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes256CbcEnc::new((&self.params.key).into(), (&self.params.iv).into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> BlockCipher {
        BlockCipher::new(CipherParams { key: [0x11; 32], iv: [0x22; 16] })
    }

    #[test]
    fn encrypt_then_decrypt() {
        let c = cipher();
        for len in [1usize, 15, 16, 17, 100] {
            let plain: Vec<u8> = (0..len as u8).collect();
            let ct = c.encrypt(&plain);
            assert_eq!(ct.len() % BLOCK_LEN, 0);
            assert!(ct.len() > plain.len());
            assert_eq!(c.decrypt(&ct).unwrap(), plain);
        }
    }

    #[test]
    fn rejects_partial_blocks() {
        assert_eq!(cipher().decrypt(&[0u8; 17]), Err(CryptoError::BlockLength(17)));
        assert_eq!(cipher().decrypt(&[]), Err(CryptoError::Empty));
    }

    #[test]
    fn oversized_pad_is_an_error() {
        // A block whose plaintext ends in 0xFF claims 255 pad bytes.
        let c = cipher();
        let mut block = [0u8; 16];
        block[15] = 0xFF;
        let ct = Aes256CbcEnc::new((&c.params.key).into(), (&c.params.iv).into())
            .encrypt_padded_vec_mut::<NoPadding>(&block);
        assert_eq!(c.decrypt(&ct), Err(CryptoError::Padding { pad: 0xFF, len: 16 }));
    }

    #[test]
    fn params_serialize_as_hex() {
        let json = serde_json::to_string(cipher().params()).unwrap();
        assert!(json.contains(&"11".repeat(32)));
        let back: CipherParams = serde_json::from_str(&json).unwrap();
        assert_eq!(&back, cipher().params());
    }
}
