pub mod sniff;
pub mod crypto;
pub mod classify;
pub mod header;
pub mod checksum;
pub mod codec;
pub mod family;
pub mod pipeline;

pub use sniff::Endianness;
pub use family::FirmwareFamily;
pub use codec::{Candidate, WindowParam};
pub use pipeline::{decode, encode, CfgCodec, DecodeError, DecodeResult, EncodeOptions};
