use cfgcrypt::codec::{Candidate, StreamDecoder, StreamError, WindowParam};
use cfgcrypt::crypto::BlockCipher;
use cfgcrypt::pipeline::{CfgCodec, DecodeErrorKind, EncodeOptions, Stage};
use cfgcrypt::{decode, Endianness, FirmwareFamily};
use std::io::Write;
use tempfile::NamedTempFile;

/// `<config>1</config>` compressed with zlib level 9: exactly 20 bytes.
const PAYLOAD: [u8; 20] = [
    0x78, 0xda, 0xb3, 0x49, 0xce, 0xcf, 0x4b, 0xcb, 0x4c, 0xb7,
    0x33, 0xb4, 0xd1, 0x87, 0xb2, 0x00, 0x3b, 0x78, 0x06, 0x41,
];
const PAYLOAD_CRC: u32 = 0xb6f8_e78d;
const DOCUMENT: &[u8] = b"<config>1</config>";
const FW_MAGIC: u32 = 0x3c5a_0f21;

fn big_endian_blob() -> Vec<u8> {
    let mut blob = vec![0x00, 0x12, 0x31, 0x23];
    blob.extend_from_slice(&(PAYLOAD.len() as u32).to_be_bytes());
    blob.extend_from_slice(&PAYLOAD_CRC.to_be_bytes());
    blob.extend_from_slice(&[0u8; 4]);
    blob.extend_from_slice(&FW_MAGIC.to_be_bytes());
    blob.extend_from_slice(&PAYLOAD);
    blob
}

fn little_endian_blob() -> Vec<u8> {
    let mut blob = vec![0x23, 0x31, 0x12, 0x00];
    blob.extend_from_slice(&(PAYLOAD.len() as u32).to_le_bytes());
    blob.extend_from_slice(&PAYLOAD_CRC.to_le_bytes());
    blob.extend_from_slice(&[0u8; 4]);
    blob.extend_from_slice(&FW_MAGIC.to_le_bytes());
    blob.extend_from_slice(&PAYLOAD);
    blob
}

fn nokia_cipher() -> BlockCipher {
    BlockCipher::new(FirmwareFamily::nokia_xs240x().cipher)
}

#[test]
fn test_plaintext_big_endian() {
    let result = decode(&big_endian_blob()).unwrap();
    assert_eq!(result.document, DOCUMENT);
    assert!(!result.was_encrypted);
    assert_eq!(result.endianness, Endianness::Big);
    assert_eq!(result.format_magic, FW_MAGIC);
    assert_eq!(result.candidate, Candidate { offset: 0, param: WindowParam::Zlib });
}

#[test]
fn test_encrypted_little_endian() {
    let raw = nokia_cipher().encrypt(&little_endian_blob());
    assert_ne!(&raw[..4], &[0x23, 0x31, 0x12, 0x00]);

    let result = decode(&raw).unwrap();
    assert_eq!(result.document, DOCUMENT);
    assert!(result.was_encrypted);
    assert_eq!(result.endianness, Endianness::Little);
    assert_eq!(result.format_magic, FW_MAGIC);
}

#[test]
fn test_checksum_mismatch_stops_before_inflate() {
    struct MustNotRun;
    impl StreamDecoder for MustNotRun {
        fn decode(&self, _: &[u8], _: WindowParam, _: usize) -> Result<Vec<u8>, StreamError> {
            panic!("inflate attempted after checksum mismatch");
        }
    }

    let mut blob = big_endian_blob();
    blob[8] ^= 0x01;
    let codec = CfgCodec::with_decoder(FirmwareFamily::default(), Box::new(MustNotRun));
    let err = codec.decode(&blob).unwrap_err();
    assert_eq!(err.stage, Stage::Checksum);
    assert!(matches!(err.kind, DecodeErrorKind::ChecksumMismatch(_)));
}

#[test]
fn test_wrapper_offset_sixteen_reports_pair() {
    /// Only a raw 256-byte-window stream 16 bytes in is decodable.
    struct OnlyRawEightAtSixteen;
    impl StreamDecoder for OnlyRawEightAtSixteen {
        fn decode(&self, data: &[u8], param: WindowParam, _: usize) -> Result<Vec<u8>, StreamError> {
            match (data.first(), param) {
                (Some(0xA5), WindowParam::RawDeflate { window_bits: 8 }) => Ok(DOCUMENT.to_vec()),
                _ => Err(StreamError::Truncated),
            }
        }
    }

    let mut payload = vec![0u8; 16];
    payload.extend_from_slice(&[0xA5; 8]);
    let crc = cfgcrypt::checksum::crc32(&payload);

    let mut blob = vec![0x00, 0x12, 0x31, 0x23];
    blob.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    blob.extend_from_slice(&crc.to_be_bytes());
    blob.extend_from_slice(&[0u8; 4]);
    blob.extend_from_slice(&FW_MAGIC.to_be_bytes());
    blob.extend_from_slice(&payload);

    let codec = CfgCodec::with_decoder(FirmwareFamily::default(), Box::new(OnlyRawEightAtSixteen));
    let result = codec.decode(&blob).unwrap();
    assert_eq!(result.document, DOCUMENT);
    assert_eq!(result.candidate.offset, 16);
    assert_eq!(result.candidate.param.wbits(), -8);
}

#[test]
fn test_real_raw_stream_behind_wrapper() {
    let mut payload = vec![0xFF; 16];
    payload.extend(cfgcrypt::codec::compress(DOCUMENT, WindowParam::RawDeflate { window_bits: 15 }, 9).unwrap());
    let crc = cfgcrypt::checksum::crc32(&payload);

    let mut blob = vec![0x23, 0x31, 0x12, 0x00];
    blob.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    blob.extend_from_slice(&crc.to_le_bytes());
    blob.extend_from_slice(&[0u8; 4]);
    blob.extend_from_slice(&FW_MAGIC.to_le_bytes());
    blob.extend_from_slice(&payload);

    let result = decode(&blob).unwrap();
    assert_eq!(result.document, DOCUMENT);
    assert_eq!(result.candidate, Candidate { offset: 16, param: WindowParam::RawDeflate { window_bits: 15 } });
}

#[test]
fn test_partial_block_ciphertext_is_unrecognized() {
    let mut raw = nokia_cipher().encrypt(&big_endian_blob());
    raw.pop();
    let err = decode(&raw).unwrap_err();
    assert_eq!(err.stage, Stage::Classify);
    assert!(matches!(err.kind, DecodeErrorKind::UnrecognizedFormat { .. }));
}

#[test]
fn test_payload_length_past_end() {
    let mut blob = big_endian_blob();
    blob.truncate(blob.len() - 1);
    let err = decode(&blob).unwrap_err();
    assert_eq!(err.stage, Stage::Header);
}

#[test]
fn test_undecodable_payload() {
    let payload = [0xFFu8; 24];
    let mut blob = vec![0x00, 0x12, 0x31, 0x23];
    blob.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    blob.extend_from_slice(&cfgcrypt::checksum::crc32(&payload).to_be_bytes());
    blob.extend_from_slice(&[0u8; 8]);
    blob.extend_from_slice(&payload);

    let err = decode(&blob).unwrap_err();
    assert_eq!(err.stage, Stage::Decompress);
    assert!(matches!(err.kind, DecodeErrorKind::NoValidDecompressionParameters(_)));
}

#[test]
fn test_repack_matches_original_framing() {
    let raw = nokia_cipher().encrypt(&big_endian_blob());
    let first = decode(&raw).unwrap();

    let edited = b"<config>2</config>";
    let repacked = cfgcrypt::encode(edited, &first.repack_options()).unwrap();
    let second = decode(&repacked).unwrap();

    assert_eq!(second.document, edited);
    assert_eq!(second.endianness, first.endianness);
    assert_eq!(second.was_encrypted, first.was_encrypted);
    assert_eq!(second.format_magic, first.format_magic);
}

#[test]
fn test_family_loaded_from_file() {
    let mut family = FirmwareFamily::nokia_xs240x();
    family.name = "custom".into();
    family.cipher.key = [0x5A; 32];
    family.magic = [0xCA, 0xFE, 0xBA, 0xBE];

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(family.to_json().unwrap().as_bytes()).unwrap();
    let loaded = FirmwareFamily::load(file.path()).unwrap();
    assert_eq!(loaded, family);

    let codec = CfgCodec::new(loaded);
    let opts = EncodeOptions { endianness: Endianness::Little, encrypt: true, format_magic: 7, level: 9 };
    let blob = codec.encode(DOCUMENT, &opts).unwrap();

    // The built-in family neither recognizes the marker nor holds the key.
    assert!(decode(&blob).is_err());

    let result = codec.decode(&blob).unwrap();
    assert_eq!(result.document, DOCUMENT);
    assert_eq!(result.endianness, Endianness::Little);
    assert!(result.was_encrypted);
}
