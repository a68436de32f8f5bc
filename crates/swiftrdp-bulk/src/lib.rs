#![doc = include_str!("../README.md")]

mod bitstream;
mod bulk;
mod error;
mod mppc;

pub use self::bulk::BulkCodec;
pub use self::error::BulkError;

/// Per-record compression flags carried in the `compressionFlags` byte of a
/// Fast-Path update record (shared with the share-data header layout).
pub mod flags {
    /// Low bits select the compression algorithm, see [`CompressionType`].
    pub const COMPRESSION_TYPE_MASK: u8 = 0x0F;
    /// The payload is actually compressed.
    pub const PACKET_COMPRESSED: u8 = 0x20;
    /// The decompressed payload must be placed at the start of the history buffer.
    pub const PACKET_AT_FRONT: u8 = 0x40;
    /// The history buffer must be reinitialized before decompressing.
    pub const PACKET_FLUSHED: u8 = 0x80;
}

/// Negotiated bulk compression algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    /// MPPC with an 8 KiB history buffer.
    Rdp4 = 0x00,
    /// MPPC with a 64 KiB history buffer.
    Rdp5 = 0x01,
    /// NCRUSH (Huffman based).
    Rdp6 = 0x02,
    /// XCRUSH (chunk matching over MPPC).
    Rdp61 = 0x03,
}

impl CompressionType {
    pub fn from_flags(flags_value: u8) -> Option<Self> {
        match flags_value & flags::COMPRESSION_TYPE_MASK {
            0x00 => Some(Self::Rdp4),
            0x01 => Some(Self::Rdp5),
            0x02 => Some(Self::Rdp6),
            0x03 => Some(Self::Rdp61),
            _ => None,
        }
    }
}
