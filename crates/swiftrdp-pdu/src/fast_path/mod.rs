#[cfg(test)]
mod tests;

use bit_field::BitField as _;
use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use swiftrdp_core::{
    cast_length, decode_cursor, ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeError,
    DecodeResult, Encode, EncodeResult, InvalidFieldErr as _, ReadCursor, WriteCursor,
};

use crate::bitmap::BitmapUpdateData;
use crate::palette::PaletteUpdateData;
use crate::pointer::PointerUpdateData;
use crate::surface_commands::{SurfaceCommand, SURFACE_COMMAND_HEADER_SIZE};
use crate::per;

/// Fast-Path packet format is defined in [MS-RDPBCGR] 2.2.9.1.2, which revises
/// server output packets from the first byte with the goal of improving
/// bandwidth: a slow-path packet always starts with a TPKT header (first byte
/// 0x03), while a Fast-Path packet carries zero in the two least significant
/// bits of the first byte.
///
/// TS_FP_UPDATE_PDU header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPathHeader {
    pub flags: EncryptionFlags,
    /// Number of bytes following this header, security envelope included.
    pub data_length: usize,
    /// Present iff the envelope was read/written under FIPS encryption.
    pub fips_information: Option<FipsInformation>,
    /// Present iff `flags` contains `ENCRYPTED`; zeroed until signed.
    pub data_signature: Option<[u8; 8]>,
}

impl FastPathHeader {
    const NAME: &'static str = "TS_FP_UPDATE_PDU header";
    const FIXED_PART_SIZE: usize = 1 /* fpOutputHeader */;

    pub fn new(flags: EncryptionFlags, data_length: usize) -> Self {
        Self {
            flags,
            data_length,
            fips_information: None,
            data_signature: None,
        }
    }

    /// Decodes the fixed part plus the security envelope.
    ///
    /// Whether a `fipsInformation` field is on the wire cannot be told from
    /// the PDU itself; the caller supplies the negotiated state.
    pub fn decode_with_envelope(src: &mut ReadCursor<'_>, fips: bool) -> DecodeResult<Self> {
        let mut header = decode_cursor::<Self>(src)?;

        if !header.flags.is_empty() {
            if fips {
                ensure_size!(ctx: Self::NAME, in: src, size: FipsInformation::FIXED_PART_SIZE);
                header.fips_information = Some(decode_cursor(src)?);
            }

            ensure_size!(ctx: Self::NAME, in: src, size: 8);
            header.data_signature = Some(src.read_array::<8>());

            let envelope_size = header.size() - Self::FIXED_PART_SIZE - per::U16_SIZE;
            if header.data_length < envelope_size {
                return Err(invalid_field_err!(
                    ctx: Self::NAME,
                    "length",
                    "PDU length is smaller than its security envelope"
                ));
            }
            header.data_length -= envelope_size;
        }

        Ok(header)
    }
}

impl Encode for FastPathHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let mut header = 0u8;
        header.set_bits(0..2, 0); // fast-path action
        header.set_bits(6..8, self.flags.bits());
        dst.write_u8(header);

        // The length is always emitted in the two-byte form, even when it
        // would fit in one byte: the fixed-size slot is what allows writing
        // the header after the payload has been encrypted, without shifting
        // the payload.
        let length = self.data_length + self.size();
        per::write_long_length(dst, cast_length!("length", length)?);

        if !self.flags.is_empty() {
            if let Some(fips_information) = self.fips_information {
                fips_information.encode(dst)?;
            }

            dst.write_array(self.data_signature.unwrap_or([0; 8]));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let mut size = Self::FIXED_PART_SIZE + per::U16_SIZE;

        if !self.flags.is_empty() {
            size += 8; // dataSignature

            if self.fips_information.is_some() {
                size += FipsInformation::FIXED_PART_SIZE;
            }
        }

        size
    }
}

impl Decode<'_> for FastPathHeader {
    fn decode(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let header = src.read_u8();
        let flags = EncryptionFlags::from_bits_truncate(header.get_bits(6..8));

        let (length, sizeof_length) = per::read_length(src).map_err(|e| {
            DecodeError::invalid_field("", "length", "invalid encoded fast path PDU length").with_source(e)
        })?;
        let length = usize::from(length);
        if length < sizeof_length + Self::FIXED_PART_SIZE {
            return Err(invalid_field_err!(
                "length",
                "received fast path PDU length is smaller than header size"
            ));
        }
        let data_length = length - sizeof_length - Self::FIXED_PART_SIZE;

        Ok(FastPathHeader {
            flags,
            data_length,
            fips_information: None,
            data_signature: None,
        })
    }
}

/// TS_FP_FIPS_INFO
///
/// On the wire this is the fixed prefix `10 00 01` followed by the count of
/// pad bytes appended to align the encrypted region to the 3DES block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FipsInformation {
    pub version: u8,
    pub padding: u8,
}

impl FipsInformation {
    const NAME: &'static str = "TS_FP_FIPS_INFO";
    const FIXED_PART_SIZE: usize = 2 /* length */ + 1 /* version */ + 1 /* padding */;

    const LENGTH: u16 = 0x10;
    pub const TSFIPS_VERSION1: u8 = 0x01;

    pub fn with_padding(padding: u8) -> Self {
        Self {
            version: Self::TSFIPS_VERSION1,
            padding,
        }
    }
}

impl Encode for FipsInformation {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(Self::LENGTH);
        dst.write_u8(self.version);
        dst.write_u8(self.padding);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl Decode<'_> for FipsInformation {
    fn decode(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let length = src.read_u16();
        if length != Self::LENGTH {
            return Err(invalid_field_err!("length", "unexpected FIPS information length"));
        }

        let version = src.read_u8();
        let padding = src.read_u8();

        Ok(Self { version, padding })
    }
}

/// TS_FP_UPDATE
///
/// One update record: `updateHeader` packing the update code, fragmentation
/// state and compression indicator, an optional `compressionFlags` byte, the
/// payload size and the payload itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPathUpdatePdu<'a> {
    pub fragmentation: Fragmentation,
    /// Raw 4-bit update code. Codes unknown to [`UpdateCode`] still decode so
    /// that the record can be consumed and skipped.
    pub update_code: u8,
    /// Bulk compression flags, present iff the compression indicator is set.
    pub compression_flags: Option<u8>,
    pub data: &'a [u8],
}

impl FastPathUpdatePdu<'_> {
    const NAME: &'static str = "TS_FP_UPDATE";
    const FIXED_PART_SIZE: usize = 1 /* updateHeader */;

    pub fn code(&self) -> Option<UpdateCode> {
        UpdateCode::from_u8(self.update_code)
    }
}

impl Encode for FastPathUpdatePdu<'_> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let data_len = cast_length!("size", self.data.len())?;

        let mut header = 0u8;
        header.set_bits(0..4, self.update_code & 0x0F);
        header.set_bits(4..6, self.fragmentation.as_u8());
        if self.compression_flags.is_some() {
            header.set_bits(6..8, Compression::COMPRESSION_USED.bits());
        }
        dst.write_u8(header);

        if let Some(compression_flags) = self.compression_flags {
            dst.write_u8(compression_flags);
        }

        dst.write_u16(data_len);
        dst.write_slice(self.data);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let compression_flags_size = if self.compression_flags.is_some() { 1 } else { 0 };

        Self::FIXED_PART_SIZE + compression_flags_size + 2 /* size */ + self.data.len()
    }
}

impl<'de> Decode<'de> for FastPathUpdatePdu<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let header = src.read_u8();

        let update_code = header.get_bits(0..4);

        let fragmentation = Fragmentation::from_u8(header.get_bits(4..6))
            .ok_or_else(|| invalid_field_err!("updateHeader", "invalid fragmentation"))?;

        let compression = Compression::from_bits_truncate(header.get_bits(6..8));

        let compression_flags = if compression.contains(Compression::COMPRESSION_USED) {
            ensure_size!(in: src, size: 1);
            Some(src.read_u8())
        } else {
            None
        };

        ensure_size!(in: src, size: 2);
        let data_length = usize::from(src.read_u16());
        ensure_size!(in: src, size: data_length);
        let data = src.read_slice(data_length);

        Ok(Self {
            fragmentation,
            update_code,
            compression_flags,
            data,
        })
    }
}

/// TS_FP_UPDATE data for the update codes whose payload this crate parses.
///
/// Orders and Synchronize have no typed payload here: orders are consumed one
/// at a time by the registered order parser, and synchronize is two bytes of
/// padding some servers do not even send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastPathUpdate<'a> {
    Bitmap(BitmapUpdateData<'a>),
    Palette(PaletteUpdateData),
    SurfaceCommands(Vec<SurfaceCommand<'a>>),
    Pointer(PointerUpdateData<'a>),
}

impl<'a> FastPathUpdate<'a> {
    const NAME: &'static str = "TS_FP_UPDATE data";

    pub fn decode_with_code(src: &'a [u8], code: UpdateCode) -> DecodeResult<Self> {
        let mut cursor = ReadCursor::<'a>::new(src);
        Self::decode_cursor_with_code(&mut cursor, code)
    }

    pub fn decode_cursor_with_code(src: &mut ReadCursor<'a>, code: UpdateCode) -> DecodeResult<Self> {
        match code {
            UpdateCode::Bitmap => Ok(Self::Bitmap(decode_cursor(src)?)),
            UpdateCode::Palette => Ok(Self::Palette(decode_cursor(src)?)),
            UpdateCode::SurfaceCommands => {
                let mut commands = Vec::with_capacity(1);
                while src.len() >= SURFACE_COMMAND_HEADER_SIZE {
                    commands.push(decode_cursor::<SurfaceCommand<'_>>(src)?);
                }

                Ok(Self::SurfaceCommands(commands))
            }
            UpdateCode::HiddenPointer => Ok(Self::Pointer(PointerUpdateData::SetHidden)),
            UpdateCode::DefaultPointer => Ok(Self::Pointer(PointerUpdateData::SetDefault)),
            UpdateCode::PositionPointer => Ok(Self::Pointer(PointerUpdateData::SetPosition(decode_cursor(src)?))),
            UpdateCode::ColorPointer => Ok(Self::Pointer(PointerUpdateData::Color(decode_cursor(src)?))),
            UpdateCode::CachedPointer => Ok(Self::Pointer(PointerUpdateData::Cached(decode_cursor(src)?))),
            UpdateCode::NewPointer => Ok(Self::Pointer(PointerUpdateData::New(decode_cursor(src)?))),
            UpdateCode::LargePointer => Ok(Self::Pointer(PointerUpdateData::Large(decode_cursor(src)?))),
            UpdateCode::Orders | UpdateCode::Synchronize => {
                Err(invalid_field_err!("updateCode", "update code has no typed payload"))
            }
        }
    }
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub enum UpdateCode {
    Orders = 0x0,
    Bitmap = 0x1,
    Palette = 0x2,
    Synchronize = 0x3,
    SurfaceCommands = 0x4,
    HiddenPointer = 0x5,
    DefaultPointer = 0x6,
    PositionPointer = 0x8,
    ColorPointer = 0x9,
    CachedPointer = 0xa,
    NewPointer = 0xb,
    LargePointer = 0xc,
}

impl UpdateCode {
    /// Typed view of a raw 4-bit update code.
    pub fn from_u8(value: u8) -> Option<Self> {
        <Self as num_traits::FromPrimitive>::from_u8(value)
    }

    #[expect(
        clippy::as_conversions,
        reason = "guarantees discriminant layout, and as is the only way to cast enum -> primitive"
    )]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub enum Fragmentation {
    Single = 0x0,
    Last = 0x1,
    First = 0x2,
    Next = 0x3,
}

impl Fragmentation {
    #[expect(
        clippy::as_conversions,
        reason = "guarantees discriminant layout, and as is the only way to cast enum -> primitive"
    )]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct EncryptionFlags: u8 {
        const SECURE_CHECKSUM = 0x1;
        const ENCRYPTED = 0x2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Compression: u8 {
        const COMPRESSION_USED = 0x2;
    }
}
