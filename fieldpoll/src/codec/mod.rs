//! Pure conversions between wire bytes and typed values
//!
//! Registers travel big-endian on the wire. Some devices (and the vendor extension)
//! send the bytes of every 16-bit word reversed while keeping the word order, which is
//! what [`ByteOrder::Swapped`] describes.

mod checksum;
mod hex;
mod registers;

pub use checksum::*;
pub use hex::*;
pub use registers::*;

/// Byte order of a multi-byte value held in registers
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum ByteOrder {
    /// big-endian within each word, most significant word first
    #[default]
    Natural,
    /// bytes reversed within each 16-bit word, most significant word first
    Swapped,
}

impl std::str::FromStr for ByteOrder {
    type Err = crate::error::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "natural" | "big-endian" => Ok(ByteOrder::Natural),
            "swapped" => Ok(ByteOrder::Swapped),
            _ => Err(crate::error::ConfigError::UnknownName),
        }
    }
}

/// reverse the two bytes of every complete 16-bit word in place
pub fn swap_words(bytes: &mut [u8]) {
    for word in bytes.chunks_exact_mut(2) {
        word.swap(0, 1);
    }
}
