use bit_field::BitField as _;
use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};
use swiftrdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, other_err, Decode, DecodeError, DecodeResult,
    Encode, EncodeResult, InvalidFieldErr as _, OtherErr as _, ReadCursor, WriteCursor,
};

use crate::fast_path::EncryptionFlags;
use crate::input::{MousePdu, MouseRelPdu, MouseXPdu};
use crate::per;

/// A maximum of 15 events fit in one PDU when the optional `numEvents`
/// byte is not used ([MS-RDPBCGR] 2.2.8.1.2).
pub const MAX_EVENTS_PER_PDU: usize = 15;

/// TS_FP_INPUT_PDU header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPathInputHeader {
    pub flags: EncryptionFlags,
    /// Number of bytes following this header, security envelope included.
    pub data_length: usize,
    /// Zero means the count is carried in an extra byte at the start of the
    /// (decrypted) event data.
    pub num_events: u8,
}

impl FastPathInputHeader {
    const NAME: &'static str = "TS_FP_INPUT_PDU header";

    const FIXED_PART_SIZE: usize = 1 /* fpInputHeader */;
}

impl Encode for FastPathInputHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        if usize::from(self.num_events) > MAX_EVENTS_PER_PDU {
            return Err(invalid_field_err!("numberEvents", "too many events for one PDU"));
        }

        let mut header = 0u8;
        header.set_bits(0..2, 0); // FASTPATH_INPUT_ACTION_FASTPATH
        header.set_bits(2..6, self.num_events);
        header.set_bits(6..8, self.flags.bits());
        dst.write_u8(header);

        // Same fixed-slot rule as the output header: two bytes, always, so the
        // header can be patched in after encryption may have padded the body.
        let length = self.data_length + self.size();
        per::write_long_length(dst, cast_length!("length", length)?);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + per::U16_SIZE
    }
}

impl Decode<'_> for FastPathInputHeader {
    fn decode(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let header = src.read_u8();
        let flags = EncryptionFlags::from_bits_truncate(header.get_bits(6..8));
        let num_events = header.get_bits(2..6);

        let (length, sizeof_length) =
            per::read_length(src).map_err(|e| DecodeError::other("perLen", "invalid length").with_source(e))?;
        let length = usize::from(length);
        if length < sizeof_length + Self::FIXED_PART_SIZE {
            return Err(invalid_field_err!(
                "length",
                "received fast path PDU length is smaller than header size"
            ));
        }
        let data_length = length - sizeof_length - Self::FIXED_PART_SIZE;

        Ok(FastPathInputHeader {
            flags,
            data_length,
            num_events,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum FastpathInputEventType {
    ScanCode = 0x0000,
    Mouse = 0x0001,
    MouseX = 0x0002,
    Sync = 0x0003,
    Unicode = 0x0004,
    MouseRel = 0x0005,
    QoeTimestamp = 0x0006,
}

/// TS_FP_INPUT_EVENT
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastPathInputEvent {
    KeyboardEvent(KeyboardFlags, u8),
    UnicodeKeyboardEvent(KeyboardFlags, u16),
    MouseEvent(MousePdu),
    MouseEventEx(MouseXPdu),
    MouseEventRel(MouseRelPdu),
    QoeEvent(u32),
    SyncEvent(SynchronizeFlags),
}

impl FastPathInputEvent {
    const NAME: &'static str = "TS_FP_INPUT_EVENT";

    const FIXED_PART_SIZE: usize = 1 /* eventHeader */;
}

impl Encode for FastPathInputEvent {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let (flags, code) = match self {
            FastPathInputEvent::KeyboardEvent(flags, _) => (flags.bits(), FastpathInputEventType::ScanCode),
            FastPathInputEvent::UnicodeKeyboardEvent(flags, _) => (flags.bits(), FastpathInputEventType::Unicode),
            FastPathInputEvent::MouseEvent(_) => (0, FastpathInputEventType::Mouse),
            FastPathInputEvent::MouseEventEx(_) => (0, FastpathInputEventType::MouseX),
            FastPathInputEvent::MouseEventRel(_) => (0, FastpathInputEventType::MouseRel),
            FastPathInputEvent::QoeEvent(_) => (0, FastpathInputEventType::QoeTimestamp),
            FastPathInputEvent::SyncEvent(flags) => (flags.bits(), FastpathInputEventType::Sync),
        };

        let mut header = 0u8;
        header.set_bits(0..5, flags);
        header.set_bits(5..8, code.to_u8().expect("in-range event code"));
        dst.write_u8(header);

        match self {
            FastPathInputEvent::KeyboardEvent(_, code) => {
                dst.write_u8(*code);
            }
            FastPathInputEvent::UnicodeKeyboardEvent(_, code) => {
                dst.write_u16(*code);
            }
            FastPathInputEvent::MouseEvent(pdu) => {
                pdu.encode(dst)?;
            }
            FastPathInputEvent::MouseEventEx(pdu) => {
                pdu.encode(dst)?;
            }
            FastPathInputEvent::MouseEventRel(pdu) => {
                pdu.encode(dst)?;
            }
            FastPathInputEvent::QoeEvent(stamp) => {
                dst.write_u32(*stamp);
            }
            FastPathInputEvent::SyncEvent(_) => {}
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
            + match self {
                FastPathInputEvent::KeyboardEvent(_, _) => 1,
                FastPathInputEvent::UnicodeKeyboardEvent(_, _) => 2,
                FastPathInputEvent::MouseEvent(pdu) => pdu.size(),
                FastPathInputEvent::MouseEventEx(pdu) => pdu.size(),
                FastPathInputEvent::MouseEventRel(pdu) => pdu.size(),
                FastPathInputEvent::QoeEvent(_) => 4,
                FastPathInputEvent::SyncEvent(_) => 0,
            }
    }
}

impl Decode<'_> for FastPathInputEvent {
    fn decode(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let header = src.read_u8();
        let flags = header.get_bits(0..5);
        let code = header.get_bits(5..8);
        let code: FastpathInputEventType =
            FastpathInputEventType::from_u8(code).ok_or_else(|| invalid_field_err!("eventCode", "unknown event code"))?;

        let event = match code {
            FastpathInputEventType::ScanCode => {
                ensure_size!(in: src, size: 1);
                let code = src.read_u8();
                let flags = KeyboardFlags::from_bits(flags)
                    .ok_or_else(|| invalid_field_err!("eventFlags", "keyboard flags unsupported"))?;
                FastPathInputEvent::KeyboardEvent(flags, code)
            }
            FastpathInputEventType::Mouse => FastPathInputEvent::MouseEvent(MousePdu::decode(src)?),
            FastpathInputEventType::MouseX => FastPathInputEvent::MouseEventEx(MouseXPdu::decode(src)?),
            FastpathInputEventType::MouseRel => FastPathInputEvent::MouseEventRel(MouseRelPdu::decode(src)?),
            FastpathInputEventType::Sync => {
                let flags = SynchronizeFlags::from_bits(flags)
                    .ok_or_else(|| invalid_field_err!("eventFlags", "synchronize flags unsupported"))?;
                FastPathInputEvent::SyncEvent(flags)
            }
            FastpathInputEventType::Unicode => {
                ensure_size!(in: src, size: 2);
                let code = src.read_u16();
                let flags = KeyboardFlags::from_bits(flags)
                    .ok_or_else(|| invalid_field_err!("eventFlags", "keyboard flags unsupported"))?;
                FastPathInputEvent::UnicodeKeyboardEvent(flags, code)
            }
            FastpathInputEventType::QoeTimestamp => {
                ensure_size!(in: src, size: 4);
                FastPathInputEvent::QoeEvent(src.read_u32())
            }
        };

        Ok(event)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct KeyboardFlags: u8 {
        const RELEASE = 0x01;
        const EXTENDED = 0x02;
        const EXTENDED1 = 0x04;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct SynchronizeFlags: u8 {
        const SCROLL_LOCK = 0x01;
        const NUM_LOCK = 0x02;
        const CAPS_LOCK = 0x04;
        const KANA_LOCK = 0x08;
    }
}

/// A whole unencrypted input PDU: header plus events.
///
/// The encrypting path goes through the session input builder instead, which
/// owns the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPathInput(pub Vec<FastPathInputEvent>);

impl FastPathInput {
    const NAME: &'static str = "TS_FP_INPUT_PDU";
}

impl Encode for FastPathInput {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        if self.0.is_empty() {
            return Err(other_err!("empty fast-path input"));
        }

        let data_length = self.0.iter().map(Encode::size).sum::<usize>();
        let header = FastPathInputHeader {
            num_events: cast_length!("numberEvents", self.0.len())?,
            flags: EncryptionFlags::empty(),
            data_length,
        };
        header.encode(dst)?;

        for event in self.0.iter() {
            event.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let data_length = self.0.iter().map(Encode::size).sum::<usize>();
        let header = FastPathInputHeader {
            num_events: u8::try_from(self.0.len()).unwrap_or(u8::MAX),
            flags: EncryptionFlags::empty(),
            data_length,
        };
        header.size() + data_length
    }
}

impl Decode<'_> for FastPathInput {
    fn decode(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        let header = FastPathInputHeader::decode(src)?;

        let num_events = if header.num_events == 0 {
            ensure_size!(ctx: Self::NAME, in: src, size: 1);
            src.read_u8()
        } else {
            header.num_events
        };

        let events = (0..num_events)
            .map(|_| FastPathInputEvent::decode(src))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self(events))
    }
}
