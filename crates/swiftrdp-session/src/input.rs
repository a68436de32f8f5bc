//! Fast-Path input: the outgoing PDU assembler (client side) and the
//! incoming event dispatcher (server side).

use swiftrdp_core::{decode_cursor, encode, ReadCursor};
use swiftrdp_pdu::fast_path::{EncryptionFlags, FipsInformation};
use swiftrdp_pdu::input::fast_path::MAX_EVENTS_PER_PDU;
use swiftrdp_pdu::input::{
    FastPathInputEvent, FastPathInputHeader, KeyboardFlags, MousePdu, MouseRelPdu, MouseXPdu, SynchronizeFlags,
};
use swiftrdp_pdu::MAX_PACKET_SIZE;

use crate::envelope::{fips_pad_length, SecurityLayer};
use crate::{CallbackResult, CallbackStatus, SessionContext, SessionErrorExt, SessionResult};

const PDU_PREFIX_SIZE: usize = 3; // fpInputHeader, length1, length2

/// Assembles one outgoing Fast-Path input PDU.
///
/// The 3-byte PDU prefix and the security envelope room are reserved up
/// front; events are appended as they come; `finish` back-patches the
/// header, runs the envelope and returns the wire frame.
pub struct InputPduBuilder {
    frame: Vec<u8>,
    num_events: usize,
    sec_bytes: usize,
}

impl InputPduBuilder {
    pub fn new(ctx: &SessionContext) -> Self {
        let sec_bytes = ctx.sec_bytes();
        Self {
            frame: vec![0; PDU_PREFIX_SIZE + sec_bytes],
            num_events: 0,
            sec_bytes,
        }
    }

    pub fn num_events(&self) -> usize {
        self.num_events
    }

    /// Appends one event record.
    ///
    /// At most 15 events fit in one PDU when the optional `numEvents` byte
    /// is not used, which this assembler never does.
    pub fn add_event(&mut self, event: &FastPathInputEvent) -> SessionResult<()> {
        use swiftrdp_core::Encode as _;

        if self.num_events >= MAX_EVENTS_PER_PDU {
            return Err(general_err!("too many events for one input PDU"));
        }

        let start = self.frame.len();
        self.frame.resize(start + event.size(), 0);
        encode(event, &mut self.frame[start..]).map_err(SessionErrorExt::encode)?;
        self.num_events += 1;

        Ok(())
    }

    /// Finalises the PDU: back-patches the header bytes, applies the
    /// security envelope and returns the bytes to hand to the transport.
    pub fn finish(mut self, ctx: &SessionContext, security: &SecurityLayer) -> SessionResult<Vec<u8>> {
        if self.num_events == 0 {
            return Err(general_err!("empty input PDU"));
        }

        let events_len = self.frame.len() - PDU_PREFIX_SIZE - self.sec_bytes;

        // RDP encryption may add block padding; the length is patched in
        // after the pad is known, which the fixed two-byte slot allows.
        let pad = if ctx.encrypting && ctx.fips {
            fips_pad_length(events_len)
        } else {
            0
        };
        self.frame.resize(self.frame.len() + pad, 0);

        let total = self.frame.len();
        if total >= MAX_PACKET_SIZE {
            return Err(general_err!("input PDU exceeds the 14-bit length field"));
        }

        let mut flags = EncryptionFlags::empty();
        if ctx.encrypting {
            flags |= EncryptionFlags::ENCRYPTED;
            if ctx.secure_checksum {
                flags |= EncryptionFlags::SECURE_CHECKSUM;
            }
        }

        let event_header = u8::try_from(self.num_events << 2).expect("at most 15 events") | (flags.bits() << 6);
        self.frame[0] = event_header;
        let length = u16::try_from(total).expect("checked against MAX_PACKET_SIZE");
        self.frame[1..PDU_PREFIX_SIZE].copy_from_slice(&(0x8000 | length).to_be_bytes());

        if ctx.encrypting {
            if ctx.fips {
                let mut info = [0u8; 4];
                encode(
                    &FipsInformation::with_padding(u8::try_from(pad).expect("pad is below the block size")),
                    &mut info,
                )
                .map_err(SessionErrorExt::encode)?;
                self.frame[PDU_PREFIX_SIZE..PDU_PREFIX_SIZE + 4].copy_from_slice(&info);
            }

            security.seal(
                &mut self.frame,
                PDU_PREFIX_SIZE + self.sec_bytes,
                pad,
                ctx.secure_checksum,
                ctx.fips,
            )?;
        }

        Ok(self.frame)
    }
}

/// Consumers for the input side of the session (server role).
///
/// Unlike display updates, a missing input consumer is not an error: the
/// event is simply dropped.
pub trait InputHandler {
    fn on_keyboard(&mut self, _flags: KeyboardFlags, _key_code: u8) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    fn on_unicode_keyboard(&mut self, _flags: KeyboardFlags, _code: u16) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    fn on_mouse(&mut self, _mouse: &MousePdu) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    fn on_extended_mouse(&mut self, _mouse: &MouseXPdu) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    fn on_relative_mouse(&mut self, _mouse: &MouseRelPdu) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    fn on_synchronize(&mut self, _flags: SynchronizeFlags) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    fn on_qoe(&mut self, _timestamp_ms: u32) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }
}

/// Server-side processor for incoming Fast-Path input PDUs.
pub struct InputProcessor;

impl InputProcessor {
    /// Processes one complete inbound input PDU, first byte included,
    /// decrypting in place when the envelope says so.
    pub fn process_pdu(
        ctx: &SessionContext,
        security: &SecurityLayer,
        frame: &mut [u8],
        handler: &mut dyn InputHandler,
    ) -> SessionResult<()> {
        let mut src = ReadCursor::new(frame);
        let header = decode_cursor::<FastPathInputHeader>(&mut src).map_err(SessionErrorExt::decode)?;
        trace!(input_header = ?header, "received Fast-Path input PDU");

        let mut payload_len = header.data_length;

        let mut pad = 0;
        if header.flags.contains(EncryptionFlags::ENCRYPTED) {
            let envelope_size = if ctx.fips { 12 } else { 8 };
            if payload_len < envelope_size || src.len() < envelope_size {
                return Err(protocol_err!("fast path input", "truncated security envelope"));
            }
            payload_len -= envelope_size;

            if ctx.fips {
                let info = decode_cursor::<FipsInformation>(&mut src).map_err(SessionErrorExt::decode)?;
                pad = usize::from(info.padding);
            }

            src.advance(8); // dataSignature, verified below
        }

        let payload_start = src.pos();
        if payload_start + payload_len > frame.len() {
            return Err(protocol_err!("fast path input", "PDU length exceeds received frame"));
        }

        if header.flags.contains(EncryptionFlags::ENCRYPTED) {
            let salted = header.flags.contains(EncryptionFlags::SECURE_CHECKSUM);
            payload_len = security.open(
                &mut frame[..payload_start + payload_len],
                payload_start,
                pad,
                salted,
                ctx.fips,
            )?;
        }

        Self::process_events(
            ctx,
            header.num_events,
            &frame[payload_start..payload_start + payload_len],
            handler,
        )
    }

    /// Dispatches the decrypted event records of one PDU.
    ///
    /// `num_events == 0` means the count is carried in one extra byte at
    /// the start of the event data.
    pub fn process_events(
        ctx: &SessionContext,
        num_events: u8,
        events: &[u8],
        handler: &mut dyn InputHandler,
    ) -> SessionResult<()> {
        let mut src = ReadCursor::new(events);

        let num_events = if num_events == 0 {
            if src.is_empty() {
                return Err(protocol_err!("fast path input", "missing event count"));
            }
            src.read_u8()
        } else {
            num_events
        };

        for _ in 0..num_events {
            if src.is_empty() {
                return Err(protocol_err!("fast path input", "truncated event stream"));
            }

            // Unknown event codes cannot be skipped individually (their body
            // length is unknown), so the rest of the PDU is dropped.
            let event_code = src.peek_u8() >> 5;
            if event_code > 6 {
                warn!(event_code, "unknown input event code, dropping remaining events");
                return Ok(());
            }

            let event = decode_cursor::<FastPathInputEvent>(&mut src).map_err(SessionErrorExt::decode)?;
            Self::dispatch_event(ctx, event, handler)?;
        }

        Ok(())
    }

    fn dispatch_event(ctx: &SessionContext, event: FastPathInputEvent, handler: &mut dyn InputHandler) -> SessionResult<()> {
        let result = match event {
            FastPathInputEvent::KeyboardEvent(flags, key_code) => handler.on_keyboard(flags, key_code),
            FastPathInputEvent::UnicodeKeyboardEvent(flags, code) => handler.on_unicode_keyboard(flags, code),
            FastPathInputEvent::MouseEvent(mouse) => handler.on_mouse(&mouse),
            FastPathInputEvent::MouseEventEx(mouse) => {
                if !ctx.supports_extended_mouse {
                    warn!("received extended mouse event, but we did not announce support for it");
                    return Err(protocol_err!("fast path input", "extended mouse event not announced"));
                }
                handler.on_extended_mouse(&mouse)
            }
            FastPathInputEvent::MouseEventRel(mouse) => {
                if !ctx.supports_relative_mouse {
                    warn!("received relative mouse event, but we did not announce support for it");
                    return Err(protocol_err!("fast path input", "relative mouse event not announced"));
                }
                handler.on_relative_mouse(&mouse)
            }
            FastPathInputEvent::QoeEvent(timestamp_ms) => {
                if !ctx.supports_qoe {
                    warn!("received QoE event, but we did not announce support for it");
                    return Err(protocol_err!("fast path input", "QoE event not announced"));
                }
                handler.on_qoe(timestamp_ms)
            }
            FastPathInputEvent::SyncEvent(flags) => handler.on_synchronize(flags),
        };

        // A missing consumer drops the event; a failing consumer fails the PDU.
        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use swiftrdp_pdu::input::PointerFlags;

    use super::*;
    use crate::envelope::tests::xor_layer;
    use crate::SessionErrorKind;

    #[derive(Debug, PartialEq, Eq)]
    enum Event {
        Keyboard(u8),
        Unicode(u16),
        Mouse(u16, u16),
        ExtendedMouse,
        RelativeMouse(i16, i16),
        Sync,
        Qoe(u32),
    }

    #[derive(Default)]
    struct RecordingHandler {
        events: Vec<Event>,
    }

    impl InputHandler for RecordingHandler {
        fn on_keyboard(&mut self, _flags: KeyboardFlags, key_code: u8) -> CallbackResult {
            self.events.push(Event::Keyboard(key_code));
            Ok(CallbackStatus::Handled)
        }

        fn on_unicode_keyboard(&mut self, _flags: KeyboardFlags, code: u16) -> CallbackResult {
            self.events.push(Event::Unicode(code));
            Ok(CallbackStatus::Handled)
        }

        fn on_mouse(&mut self, mouse: &MousePdu) -> CallbackResult {
            self.events.push(Event::Mouse(mouse.x_position, mouse.y_position));
            Ok(CallbackStatus::Handled)
        }

        fn on_extended_mouse(&mut self, _mouse: &MouseXPdu) -> CallbackResult {
            self.events.push(Event::ExtendedMouse);
            Ok(CallbackStatus::Handled)
        }

        fn on_relative_mouse(&mut self, mouse: &MouseRelPdu) -> CallbackResult {
            self.events.push(Event::RelativeMouse(mouse.x_delta, mouse.y_delta));
            Ok(CallbackStatus::Handled)
        }

        fn on_synchronize(&mut self, _flags: SynchronizeFlags) -> CallbackResult {
            self.events.push(Event::Sync);
            Ok(CallbackStatus::Handled)
        }

        fn on_qoe(&mut self, timestamp_ms: u32) -> CallbackResult {
            self.events.push(Event::Qoe(timestamp_ms));
            Ok(CallbackStatus::Handled)
        }
    }

    fn scancode(flags: KeyboardFlags, code: u8) -> FastPathInputEvent {
        FastPathInputEvent::KeyboardEvent(flags, code)
    }

    #[test]
    fn builds_single_scancode_pdu() {
        let ctx = SessionContext::default();
        let security = xor_layer();

        let mut builder = InputPduBuilder::new(&ctx);
        builder
            .add_event(&scancode(KeyboardFlags::RELEASE | KeyboardFlags::EXTENDED, 0x3A))
            .unwrap();
        let frame = builder.finish(&ctx, &security).unwrap();

        assert_eq!(frame, [0x04, 0x80, 0x05, 0x03, 0x3A]);
    }

    #[test]
    fn refuses_sixteenth_event() {
        let ctx = SessionContext::default();

        let mut builder = InputPduBuilder::new(&ctx);
        for _ in 0..15 {
            builder.add_event(&scancode(KeyboardFlags::empty(), 0x1C)).unwrap();
        }

        let err = builder.add_event(&scancode(KeyboardFlags::empty(), 0x1C)).unwrap_err();
        assert!(matches!(err.kind(), SessionErrorKind::General));
    }

    #[test]
    fn refuses_empty_pdu() {
        let ctx = SessionContext::default();
        let security = xor_layer();

        let builder = InputPduBuilder::new(&ctx);
        assert!(builder.finish(&ctx, &security).is_err());
    }

    #[test]
    fn plain_pdu_roundtrip() {
        let ctx = SessionContext::default();
        let security = xor_layer();

        let mut builder = InputPduBuilder::new(&ctx);
        builder.add_event(&scancode(KeyboardFlags::empty(), 0x1C)).unwrap();
        builder
            .add_event(&FastPathInputEvent::MouseEvent(MousePdu {
                flags: PointerFlags::MOVE,
                x_position: 320,
                y_position: 240,
            }))
            .unwrap();
        let mut frame = builder.finish(&ctx, &security).unwrap();

        let mut handler = RecordingHandler::default();
        InputProcessor::process_pdu(&ctx, &security, &mut frame, &mut handler).unwrap();

        assert_eq!(handler.events, vec![Event::Keyboard(0x1C), Event::Mouse(320, 240)]);
    }

    #[test]
    fn encrypted_pdu_roundtrip() {
        let ctx = SessionContext {
            encrypting: true,
            secure_checksum: true,
            ..Default::default()
        };
        let security = xor_layer();

        let mut builder = InputPduBuilder::new(&ctx);
        builder.add_event(&FastPathInputEvent::SyncEvent(SynchronizeFlags::CAPS_LOCK)).unwrap();
        let mut frame = builder.finish(&ctx, &security).unwrap();

        // 3-byte prefix + 8-byte signature before the event data, all of it
        // counted by the back-patched length.
        assert_eq!(frame.len(), 3 + 8 + 1);
        assert_eq!(frame[1..3], [0x80, 0x0C]);

        let mut handler = RecordingHandler::default();
        InputProcessor::process_pdu(&ctx, &security, &mut frame, &mut handler).unwrap();

        assert_eq!(handler.events, vec![Event::Sync]);
    }

    #[test]
    fn fips_pdu_pads_to_block_size() {
        let ctx = SessionContext {
            encrypting: true,
            fips: true,
            ..Default::default()
        };
        let security = xor_layer();

        // 13 bytes of events: two unicode keys and one mouse event.
        let mut builder = InputPduBuilder::new(&ctx);
        builder
            .add_event(&FastPathInputEvent::UnicodeKeyboardEvent(KeyboardFlags::empty(), 0x0416))
            .unwrap();
        builder
            .add_event(&FastPathInputEvent::UnicodeKeyboardEvent(KeyboardFlags::RELEASE, 0x0416))
            .unwrap();
        builder
            .add_event(&FastPathInputEvent::MouseEvent(MousePdu {
                flags: PointerFlags::MOVE,
                x_position: 10,
                y_position: 20,
            }))
            .unwrap();
        let mut frame = builder.finish(&ctx, &security).unwrap();

        // 3-byte prefix, 4-byte fipsInformation, 8-byte signature,
        // 13 event bytes, 3 pad bytes.
        assert_eq!(frame.len(), 3 + 4 + 8 + 13 + 3);
        assert_eq!(frame[3..7], [0x10, 0x00, 0x01, 0x03]);
        assert_eq!(frame[1..3], (0x8000u16 | 31).to_be_bytes());

        let mut handler = RecordingHandler::default();
        InputProcessor::process_pdu(&ctx, &security, &mut frame, &mut handler).unwrap();

        assert_eq!(
            handler.events,
            vec![Event::Unicode(0x0416), Event::Unicode(0x0416), Event::Mouse(10, 20)]
        );
    }

    #[test]
    fn overflow_event_count_is_read_from_payload() {
        let mut handler = RecordingHandler::default();
        let ctx = SessionContext::default();

        // Count byte 2, then two sync events.
        let events = [0x02, 0x60, 0x60];
        InputProcessor::process_events(&ctx, 0, &events, &mut handler).unwrap();

        assert_eq!(handler.events, vec![Event::Sync, Event::Sync]);
    }

    #[test]
    fn gated_events_require_announced_support() {
        let security = xor_layer();
        let make_frame = |ctx: &SessionContext| {
            let mut builder = InputPduBuilder::new(ctx);
            builder
                .add_event(&FastPathInputEvent::MouseEventRel(MouseRelPdu {
                    flags: swiftrdp_pdu::input::PointerRelFlags::MOVE,
                    x_delta: -1,
                    y_delta: 1,
                }))
                .unwrap();
            builder.finish(ctx, &security).unwrap()
        };

        let ctx = SessionContext::default();
        let mut frame = make_frame(&ctx);
        let mut handler = RecordingHandler::default();
        let err = InputProcessor::process_pdu(&ctx, &security, &mut frame, &mut handler).unwrap_err();
        assert!(matches!(err.kind(), SessionErrorKind::Protocol(_)));
        assert!(handler.events.is_empty());

        let ctx = SessionContext {
            supports_relative_mouse: true,
            ..Default::default()
        };
        let mut frame = make_frame(&ctx);
        let mut handler = RecordingHandler::default();
        InputProcessor::process_pdu(&ctx, &security, &mut frame, &mut handler).unwrap();
        assert_eq!(handler.events, vec![Event::RelativeMouse(-1, 1)]);
    }

    #[test]
    fn unknown_event_code_drops_remaining_events() {
        let mut handler = RecordingHandler::default();
        let ctx = SessionContext::default();

        // One sync event, then an event with the unassigned code 7.
        let events = [0x60, 0xE0, 0x00];
        InputProcessor::process_events(&ctx, 2, &events, &mut handler).unwrap();

        assert_eq!(handler.events, vec![Event::Sync]);
    }
}
