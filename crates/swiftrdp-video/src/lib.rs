#![doc = include_str!("../README.md")]

use thiserror::Error;

/// Pixel layout of a decoded frame.
///
/// Software paths produce `Yuv420P`. Hardware-accelerated decoders work on
/// an opaque surface format and bridge to one of these through a transfer
/// step before the frame is handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, three planes, chroma sub-sampled 2x2.
    Yuv420P,
    /// Semi-planar 4:2:0 with interleaved chroma, as produced by most
    /// hardware surface transfers.
    Nv12,
}

/// One planar video frame borrowed from a codec.
///
/// The backing memory is owned by the codec that produced the frame and is
/// only valid until the next `decode` or `encode` call on it.
#[derive(Debug, Clone, Copy)]
pub struct YuvFrame<'a> {
    /// Y, U and V planes (U holds the interleaved chroma for `Nv12`).
    pub planes: [&'a [u8]; 3],
    /// Bytes per row of each plane.
    pub strides: [usize; 3],
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Rate control applied by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateControl {
    /// Variable bitrate; sets the target bitrate in bits per second.
    Vbr { bit_rate: u32 },
    /// Constant quantizer; sets the quantization parameter directly.
    Cqp { qp: u32 },
}

/// Encoder speed/quality preset.
///
/// Software encoders run `Medium`; hardware encoders can afford `VerySlow`
/// because the heavy lifting is offloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Medium,
    VerySlow,
}

impl Preset {
    pub fn for_acceleration(hardware: bool) -> Self {
        if hardware {
            Self::VerySlow
        } else {
            Self::Medium
        }
    }
}

/// Latency tuning applied to every encoder context.
pub const TUNE: &str = "zerolatency";

/// Encoder configuration.
///
/// Implementations compare against the previously opened context and must
/// rebuild their internal state when `width`, `height` or `frame_rate`
/// changed; unchanged configurations are applied without a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub rate_control: RateControl,
}

#[derive(Debug, Error)]
pub enum VideoError {
    /// The decoder consumed the input without producing a frame yet.
    /// Not fatal; feed more data.
    #[error("decoder needs more data before a frame is available")]
    NeedMore,
    /// The encoder buffered the frame without emitting an access unit.
    /// Not fatal; the output will come with a later frame.
    #[error("encoder produced no output for this frame")]
    NoOutput,
    #[error("failed to decode access unit")]
    Decode,
    #[error("failed to encode frame")]
    Encode,
    #[error("codec initialization failed")]
    Init,
}

impl VideoError {
    /// `NeedMore` and `NoOutput` are flow-control results, not failures.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NeedMore | Self::NoOutput)
    }
}

/// A decoder/encoder pair for one video stream.
///
/// Implementations wrap an external codec library. Whether the context is a
/// decoder or an encoder is fixed at construction by the implementation
/// (`init(compressor)` in the original API); calling the other direction is
/// an `Init` error. All resources, including hardware device contexts and
/// reference-counted frame pools, are released on drop.
///
/// Hardware acceleration is a policy of the implementation: when
/// accelerated initialization fails, it must fall back to the software path
/// transparently instead of surfacing an error.
pub trait VideoCodec {
    /// Decodes one compressed access unit.
    ///
    /// Returns [`VideoError::NeedMore`] when the codec has not produced a
    /// frame yet. The returned frame borrows codec-owned memory and is valid
    /// until the next call on this codec.
    fn decode(&mut self, src: &[u8]) -> Result<YuvFrame<'_>, VideoError>;

    /// Encodes one frame into a single compressed access unit.
    ///
    /// `pts` is the presentation timestamp for this frame; callers own the
    /// timestamp policy (the original implementation bumped it on every call
    /// whether or not output was produced, which is reproducible by the
    /// caller if desired). Returns [`VideoError::NoOutput`] when the encoder
    /// buffered the frame.
    fn encode(&mut self, frame: &YuvFrame<'_>, pts: i64) -> Result<&[u8], VideoError>;

    /// Applies an encoder configuration.
    ///
    /// Called before encoding whenever the caller's geometry or frame rate
    /// may have changed; cheap when nothing did (see [`EncoderConfig`]).
    fn configure(&mut self, config: &EncoderConfig) -> Result<(), VideoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Canned codec: yields `NeedMore` until enough input arrived, then
    /// repeats the last input byte as a 2x2 frame.
    struct CannedCodec {
        buffered: Vec<u8>,
        plane: [u8; 4],
        chroma: [u8; 1],
    }

    impl CannedCodec {
        fn new() -> Self {
            Self {
                buffered: Vec::new(),
                plane: [0; 4],
                chroma: [0x80; 1],
            }
        }
    }

    impl VideoCodec for CannedCodec {
        fn decode(&mut self, src: &[u8]) -> Result<YuvFrame<'_>, VideoError> {
            self.buffered.extend_from_slice(src);
            if self.buffered.len() < 4 {
                return Err(VideoError::NeedMore);
            }

            let luma = *self.buffered.last().ok_or(VideoError::Decode)?;
            self.plane = [luma; 4];
            self.buffered.clear();

            Ok(YuvFrame {
                planes: [&self.plane, &self.chroma, &self.chroma],
                strides: [2, 1, 1],
                width: 2,
                height: 2,
                format: PixelFormat::Yuv420P,
            })
        }

        fn encode(&mut self, _frame: &YuvFrame<'_>, _pts: i64) -> Result<&[u8], VideoError> {
            Err(VideoError::Init)
        }

        fn configure(&mut self, _config: &EncoderConfig) -> Result<(), VideoError> {
            Ok(())
        }
    }

    #[test]
    fn need_more_is_not_fatal() {
        assert!(!VideoError::NeedMore.is_fatal());
        assert!(!VideoError::NoOutput.is_fatal());
        assert!(VideoError::Decode.is_fatal());
    }

    #[test]
    fn decoder_yields_frame_once_fed() {
        let mut codec = CannedCodec::new();

        assert!(matches!(codec.decode(&[1, 2]), Err(VideoError::NeedMore)));

        let frame = codec.decode(&[3, 7]).unwrap();
        assert_eq!(frame.planes[0], [7, 7, 7, 7]);
        assert_eq!(frame.width, 2);
        assert_eq!(frame.format, PixelFormat::Yuv420P);
    }

    #[test]
    fn preset_follows_acceleration() {
        assert_eq!(Preset::for_acceleration(false), Preset::Medium);
        assert_eq!(Preset::for_acceleration(true), Preset::VerySlow);
    }
}
