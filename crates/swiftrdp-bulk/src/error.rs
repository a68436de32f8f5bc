use core::fmt;

/// Error type for bulk compression and decompression operations.
#[derive(Debug)]
pub enum BulkError {
    /// The compression type selected by the flags is not supported.
    UnsupportedCompressionType(u8),
    /// The compressed data is malformed or truncated.
    InvalidCompressedData(&'static str),
    /// The decompressed data would overflow the history buffer.
    HistoryBufferOverflow,
}

impl fmt::Display for BulkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedCompressionType(value) => {
                write!(f, "unsupported compression type: {value:#04x}")
            }
            Self::InvalidCompressedData(detail) => {
                write!(f, "invalid compressed data: {detail}")
            }
            Self::HistoryBufferOverflow => {
                write!(f, "history buffer overflow")
            }
        }
    }
}

impl std::error::Error for BulkError {}
