//! Coordinator that routes compress/decompress requests by compression type.

use crate::error::BulkError;
use crate::mppc::MppcContext;
use crate::{flags, CompressionType};

/// Upper bound on the output of one decompression, advertised to the
/// outbound fragmenter so a compressed fragment can never expand past what
/// the receive path is prepared to buffer.
const COMPRESSION_MAX_SIZE: usize = 65535;

/// Minimum input size worth compressing; smaller packets are sent as-is.
const COMPRESS_MIN_SIZE: usize = 50;

/// Maximum input size for compression; larger packets are fragmented first.
const COMPRESS_MAX_SIZE: usize = 16384;

/// Bulk compression bridge for one session.
///
/// Holds one MPPC history per direction: the receive side is driven by the
/// type bits of each record's compression flags, the send side by the
/// negotiated level.
pub struct BulkCodec {
    recv: MppcContext,
    send_level: CompressionType,
}

impl BulkCodec {
    pub fn new(send_level: CompressionType) -> Self {
        Self {
            recv: MppcContext::new(true),
            send_level,
        }
    }

    pub fn compression_level(&self) -> CompressionType {
        self.send_level
    }

    /// Maximum number of bytes one decompressed record may span.
    pub fn max_compressed_size(&self) -> usize {
        COMPRESSION_MAX_SIZE
    }

    /// Returns `true` if the input size is outside the compressible range.
    pub fn should_skip_compression(src_size: usize) -> bool {
        src_size <= COMPRESS_MIN_SIZE || src_size >= COMPRESS_MAX_SIZE
    }

    /// Decompresses one record according to its compression flags.
    ///
    /// The returned slice borrows either the source (flags say the payload is
    /// not compressed) or the history buffer, and is valid until the next
    /// call on this codec. Its length equals the source length exactly when
    /// the flags indicate no compression.
    pub fn decompress<'a>(&'a mut self, src: &'a [u8], flags_value: u8) -> Result<&'a [u8], BulkError> {
        match CompressionType::from_flags(flags_value) {
            Some(CompressionType::Rdp4) => {
                self.recv.set_level(false);
                self.recv.decompress(src, flags_value)
            }
            Some(CompressionType::Rdp5) => {
                self.recv.set_level(true);
                self.recv.decompress(src, flags_value)
            }
            Some(CompressionType::Rdp6) | Some(CompressionType::Rdp61) | None => {
                if flags_value & flags::PACKET_COMPRESSED == 0 {
                    // Type bits are only meaningful on compressed records.
                    Ok(src)
                } else {
                    Err(BulkError::UnsupportedCompressionType(
                        flags_value & flags::COMPRESSION_TYPE_MASK,
                    ))
                }
            }
        }
    }

    /// Compresses one outgoing record, returning the bytes to put on the wire
    /// and the compression flags describing them.
    ///
    /// Sending uncompressed (empty flags) is always a legal encoding, and it
    /// is what this codec does: the MPPC compressor is not implemented, this
    /// method is the hook point for it. `should_skip_compression` mirrors the
    /// gate a real compressor applies so one slots in without touching
    /// callers.
    pub fn compress<'a>(&mut self, src: &'a [u8]) -> (&'a [u8], u8) {
        (src, 0)
    }

    /// Drops all compression history, e.g. after a peer-requested reset.
    pub fn reset(&mut self) {
        self.recv.reset();
    }
}
