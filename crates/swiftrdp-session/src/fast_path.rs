//! Inbound Fast-Path update processing: envelope, fragment reassembly,
//! bulk decompression and dispatch to the registered consumers.

use swiftrdp_bulk::BulkCodec;
use swiftrdp_core::{decode_cursor, ReadCursor};
use swiftrdp_pdu::bitmap::BitmapUpdateData;
use swiftrdp_pdu::fast_path::{
    EncryptionFlags, FastPathHeader, FastPathUpdate, FastPathUpdatePdu, Fragmentation, UpdateCode,
};
use swiftrdp_pdu::geometry::ExclusiveRectangle;
use swiftrdp_pdu::palette::PaletteUpdateData;
use swiftrdp_pdu::pointer::{
    CachedPointerAttribute, ColorPointerAttribute, LargePointerAttribute, PointerAttribute, PointerPositionAttribute,
    PointerUpdateData,
};
use swiftrdp_pdu::surface_commands::{FrameMarkerPdu, SurfaceBitsPdu, SurfaceCommand};
use swiftrdp_video::{VideoCodec, YuvFrame};

use crate::envelope::SecurityLayer;
use crate::{CallbackResult, CallbackStatus, SessionContext, SessionError, SessionErrorExt, SessionResult};

/// Consumers for the display-update side of the session.
///
/// Every method has a default implementation reporting
/// [`CallbackStatus::Unhandled`]; the dispatcher decides what that means
/// based on [`SessionContext::deactivate_client_decoding`].
pub trait UpdateHandler {
    /// Called before the update records of one PDU are dispatched.
    fn begin_paint(&mut self) -> SessionResult<()> {
        Ok(())
    }

    /// Called after the update records of one PDU were dispatched, on
    /// failure as well as on success.
    fn end_paint(&mut self) -> SessionResult<()> {
        Ok(())
    }

    /// Called once per order; the implementation must consume exactly one
    /// order from the cursor.
    fn on_order(&mut self, _orders: &mut ReadCursor<'_>) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    fn on_bitmap(&mut self, _bitmap: &BitmapUpdateData<'_>) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    fn on_palette(&mut self, _palette: &PaletteUpdateData) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    fn on_synchronize(&mut self) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    fn on_pointer_hidden(&mut self) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    fn on_pointer_default(&mut self) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    fn on_pointer_position(&mut self, _position: &PointerPositionAttribute) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    fn on_pointer_color(&mut self, _pointer: &ColorPointerAttribute<'_>) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    fn on_pointer_cached(&mut self, _pointer: &CachedPointerAttribute) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    fn on_pointer_new(&mut self, _pointer: &PointerAttribute<'_>) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    fn on_pointer_large(&mut self, _pointer: &LargePointerAttribute<'_>) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    /// Surface bits when no video codec is attached to the processor.
    fn on_surface_bits(&mut self, _bits: &SurfaceBitsPdu<'_>) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    /// A frame decoded from a surface command by the attached video codec.
    ///
    /// The frame borrows codec memory and is only valid during the call.
    fn on_video_frame(&mut self, _destination: &ExclusiveRectangle, _frame: &YuvFrame<'_>) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }

    fn on_frame_marker(&mut self, _marker: &FrameMarkerPdu) -> CallbackResult {
        Ok(CallbackStatus::Unhandled)
    }
}

/// Applies the consumer-callback policy.
///
/// `default_ok` marks the callbacks whose absence is success regardless of
/// configuration (synchronize, frame markers).
fn apply_callback(
    ctx: &SessionContext,
    result: CallbackResult,
    what: &'static str,
    default_ok: bool,
) -> SessionResult<()> {
    match result {
        Ok(CallbackStatus::Handled) => Ok(()),
        Ok(CallbackStatus::Unhandled) => {
            if default_ok || ctx.deactivate_client_decoding {
                Ok(())
            } else {
                warn!(what, "update has no registered consumer");
                Err(SessionError::declined(what))
            }
        }
        Err(e) => {
            warn!(error = %e.report(), what, "consumer callback failed");
            if ctx.deactivate_client_decoding {
                Ok(())
            } else {
                Err(e)
            }
        }
    }
}

/// Inbound Fast-Path processor for one session.
pub struct Processor {
    reassembler: Reassembler,
    bulk: BulkCodec,
    video: Option<Box<dyn VideoCodec>>,
}

impl Processor {
    pub fn new(bulk: BulkCodec) -> Self {
        Self {
            reassembler: Reassembler::new(),
            bulk,
            video: None,
        }
    }

    /// Attaches the video codec used to decode surface-command payloads.
    #[must_use]
    pub fn with_video(mut self, video: Box<dyn VideoCodec>) -> Self {
        self.video = Some(video);
        self
    }

    /// Processes one complete inbound Fast-Path PDU, first byte included.
    ///
    /// Decrypts in place when the header's encryption flags say so, then
    /// feeds the update records to [`Self::process_updates`].
    pub fn process_pdu(
        &mut self,
        ctx: &SessionContext,
        security: &SecurityLayer,
        frame: &mut [u8],
        handler: &mut dyn UpdateHandler,
    ) -> SessionResult<()> {
        let mut src = ReadCursor::new(frame);
        let header = FastPathHeader::decode_with_envelope(&mut src, ctx.fips).map_err(SessionErrorExt::decode)?;
        debug!(fast_path_header = ?header, "received Fast-Path PDU");

        let payload_start = src.pos();
        let mut payload_len = header.data_length;
        if payload_start + payload_len > frame.len() {
            return Err(protocol_err!("fast path", "PDU length exceeds received frame"));
        }

        if header.flags.contains(EncryptionFlags::ENCRYPTED) {
            let pad = header.fips_information.map_or(0, |info| usize::from(info.padding));
            let salted = header.flags.contains(EncryptionFlags::SECURE_CHECKSUM);
            payload_len = security.open(
                &mut frame[..payload_start + payload_len],
                payload_start,
                pad,
                salted,
                ctx.fips,
            )?;
        }

        self.process_updates(ctx, &frame[payload_start..payload_start + payload_len], handler)
    }

    /// Processes the decrypted update records of one PDU.
    ///
    /// The whole cycle runs between `begin_paint` and `end_paint` so that
    /// all records of the PDU contribute to a single repaint; `end_paint`
    /// runs on failure too.
    pub fn process_updates(
        &mut self,
        ctx: &SessionContext,
        updates: &[u8],
        handler: &mut dyn UpdateHandler,
    ) -> SessionResult<()> {
        handler.begin_paint()?;

        let result = self.process_update_records(ctx, updates, handler);
        let ended = handler.end_paint();

        result?;
        ended
    }

    fn process_update_records(
        &mut self,
        ctx: &SessionContext,
        updates: &[u8],
        handler: &mut dyn UpdateHandler,
    ) -> SessionResult<()> {
        let mut src = ReadCursor::new(updates);

        while src.len() >= 3 {
            self.process_update_record(ctx, &mut src, handler)?;
        }

        Ok(())
    }

    fn process_update_record(
        &mut self,
        ctx: &SessionContext,
        src: &mut ReadCursor<'_>,
        handler: &mut dyn UpdateHandler,
    ) -> SessionResult<()> {
        let record = decode_cursor::<FastPathUpdatePdu<'_>>(src).map_err(SessionErrorExt::decode)?;
        trace!(
            update_code = record.update_code,
            fragmentation = ?record.fragmentation,
            size = record.data.len(),
            "received update record"
        );

        let compression_flags = record.compression_flags.unwrap_or(0);
        let data = match self.bulk.decompress(record.data, compression_flags) {
            Ok(data) => data,
            Err(e) => {
                // Fatal to this update record only; the record bytes are
                // already consumed, so the session survives.
                warn!(error = %e, "bulk decompression failed, dropping update record");
                self.reassembler.reset();
                return Ok(());
            }
        };

        let complete = self
            .reassembler
            .process(record.update_code, record.fragmentation, data, ctx.multifrag_max_request_size)?;

        match complete {
            Some(update_data) => self.dispatch_update(ctx, record.update_code, &update_data, handler),
            None => Ok(()),
        }
    }

    fn dispatch_update(
        &mut self,
        ctx: &SessionContext,
        update_code: u8,
        data: &[u8],
        handler: &mut dyn UpdateHandler,
    ) -> SessionResult<()> {
        let Some(code) = UpdateCode::from_u8(update_code) else {
            debug!(update_code, "skipping unknown Fast-Path update code");
            return Ok(());
        };

        trace!(?code, len = data.len(), "dispatching Fast-Path update");

        match code {
            UpdateCode::Orders => {
                let mut src = ReadCursor::new(data);
                if src.len() < 2 {
                    return Err(protocol_err!("orders", "missing order count"));
                }

                let number_orders = src.read_u16();
                for _ in 0..number_orders {
                    apply_callback(ctx, handler.on_order(&mut src), "order", false)?;
                }

                Ok(())
            }
            UpdateCode::Synchronize => {
                // Server 2008 can send the synchronize update without its
                // two padding bytes; tolerate that instead of failing.
                let mut src = ReadCursor::new(data);
                src.safe_advance(2);

                apply_callback(ctx, handler.on_synchronize(), "synchronize", true)
            }
            _ => {
                let update = FastPathUpdate::decode_with_code(data, code).map_err(SessionErrorExt::decode)?;
                self.dispatch_typed_update(ctx, update, handler)
            }
        }
    }

    fn dispatch_typed_update(
        &mut self,
        ctx: &SessionContext,
        update: FastPathUpdate<'_>,
        handler: &mut dyn UpdateHandler,
    ) -> SessionResult<()> {
        match update {
            FastPathUpdate::Bitmap(bitmap) => apply_callback(ctx, handler.on_bitmap(&bitmap), "bitmap", false),
            FastPathUpdate::Palette(palette) => apply_callback(ctx, handler.on_palette(&palette), "palette", false),
            FastPathUpdate::SurfaceCommands(commands) => self.process_surface_commands(ctx, commands, handler),
            FastPathUpdate::Pointer(pointer) => {
                let result = match &pointer {
                    PointerUpdateData::SetHidden => handler.on_pointer_hidden(),
                    PointerUpdateData::SetDefault => handler.on_pointer_default(),
                    PointerUpdateData::SetPosition(position) => handler.on_pointer_position(position),
                    PointerUpdateData::Color(color) => handler.on_pointer_color(color),
                    PointerUpdateData::Cached(cached) => handler.on_pointer_cached(cached),
                    PointerUpdateData::New(new) => handler.on_pointer_new(new),
                    PointerUpdateData::Large(large) => handler.on_pointer_large(large),
                };

                apply_callback(ctx, result, "pointer", false)
            }
        }
    }

    fn process_surface_commands(
        &mut self,
        ctx: &SessionContext,
        commands: Vec<SurfaceCommand<'_>>,
        handler: &mut dyn UpdateHandler,
    ) -> SessionResult<()> {
        trace!("received {} surface commands", commands.len());

        for command in commands {
            match command {
                SurfaceCommand::SetSurfaceBits(bits) | SurfaceCommand::StreamSurfaceBits(bits) => {
                    let Some(video) = self.video.as_mut() else {
                        apply_callback(ctx, handler.on_surface_bits(&bits), "surface bits", false)?;
                        continue;
                    };

                    match video.decode(bits.extended_bitmap_data.data) {
                        Ok(frame) => {
                            apply_callback(ctx, handler.on_video_frame(&bits.destination, &frame), "video frame", false)?;
                        }
                        Err(e) if !e.is_fatal() => {
                            trace!("video decoder consumed input without a frame");
                        }
                        Err(e) => {
                            // Fatal to this update record only.
                            warn!(error = %e, "video decode failed, dropping surface command");
                            return Ok(());
                        }
                    }
                }
                SurfaceCommand::FrameMarker(marker) => {
                    trace!(
                        "frame marker: action {:?} with id #{}",
                        marker.frame_action,
                        marker.frame_id.unwrap_or(0)
                    );
                    apply_callback(ctx, handler.on_frame_marker(&marker), "frame marker", true)?;
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum FragmentationState {
    Idle,
    InProgress { update_code: u8 },
}

/// Accumulates SINGLE/FIRST/NEXT/LAST fragments into complete updates.
#[derive(Debug)]
struct Reassembler {
    data: Vec<u8>,
    state: FragmentationState,
}

impl Reassembler {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            state: FragmentationState::Idle,
        }
    }

    fn reset(&mut self) {
        self.data.clear();
        self.state = FragmentationState::Idle;
    }

    /// Feeds one decompressed fragment; returns the complete update payload
    /// on SINGLE and LAST. Any state-machine violation resets to `Idle`
    /// with an empty buffer before reporting the error.
    fn process(
        &mut self,
        update_code: u8,
        fragmentation: Fragmentation,
        data: &[u8],
        max_request_size: u32,
    ) -> SessionResult<Option<Vec<u8>>> {
        let result = self.advance(update_code, fragmentation, data, max_request_size);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn advance(
        &mut self,
        update_code: u8,
        fragmentation: Fragmentation,
        data: &[u8],
        max_request_size: u32,
    ) -> SessionResult<Option<Vec<u8>>> {
        let max_request_size = usize::try_from(max_request_size).expect("u32 fits in usize");

        let check_size = |total: usize| {
            if total > max_request_size {
                Err(protocol_err!("reassembler", "update exceeds MultifragMaxRequestSize"))
            } else {
                Ok(())
            }
        };

        match fragmentation {
            Fragmentation::Single => {
                if self.state != FragmentationState::Idle {
                    return Err(protocol_err!("reassembler", "unexpected SINGLE fragment"));
                }

                check_size(data.len())?;
                Ok(Some(data.to_vec()))
            }
            Fragmentation::First => {
                if self.state != FragmentationState::Idle {
                    return Err(protocol_err!("reassembler", "unexpected FIRST fragment"));
                }

                check_size(data.len())?;
                self.data.extend_from_slice(data);
                self.state = FragmentationState::InProgress { update_code };
                Ok(None)
            }
            Fragmentation::Next => {
                self.expect_in_progress(update_code, "unexpected NEXT fragment")?;

                check_size(self.data.len() + data.len())?;
                self.data.extend_from_slice(data);
                Ok(None)
            }
            Fragmentation::Last => {
                self.expect_in_progress(update_code, "unexpected LAST fragment")?;

                check_size(self.data.len() + data.len())?;
                self.data.extend_from_slice(data);
                self.state = FragmentationState::Idle;
                Ok(Some(core::mem::take(&mut self.data)))
            }
        }
    }

    fn expect_in_progress(&self, update_code: u8, description: &'static str) -> SessionResult<()> {
        match self.state {
            FragmentationState::InProgress { update_code: current } if current == update_code => Ok(()),
            FragmentationState::InProgress { .. } => Err(protocol_err!(
                "reassembler",
                "interleaved fragments of different updates"
            )),
            FragmentationState::Idle => Err(protocol_err!("reassembler", description)),
        }
    }
}

#[cfg(test)]
mod tests {
    use swiftrdp_bulk::CompressionType;
    use swiftrdp_core::encode_vec;
    use swiftrdp_pdu::fast_path::FipsInformation;
    use swiftrdp_video::{PixelFormat, VideoError};

    use super::*;
    use crate::envelope::tests::xor_layer;
    use crate::SessionErrorKind;

    #[derive(Debug, PartialEq, Eq)]
    enum Event {
        BeginPaint,
        EndPaint,
        Order(Vec<u8>),
        Bitmap(Vec<u8>),
        Palette,
        Synchronize,
        PointerHidden,
        PointerPosition(u16, u16),
        VideoFrame(u32, u32),
        FrameMarker,
    }

    #[derive(Default)]
    struct RecordingHandler {
        events: Vec<Event>,
        /// Bytes each order consumes from the orders stream.
        order_size: usize,
    }

    impl UpdateHandler for RecordingHandler {
        fn begin_paint(&mut self) -> SessionResult<()> {
            self.events.push(Event::BeginPaint);
            Ok(())
        }

        fn end_paint(&mut self) -> SessionResult<()> {
            self.events.push(Event::EndPaint);
            Ok(())
        }

        fn on_order(&mut self, orders: &mut ReadCursor<'_>) -> CallbackResult {
            let order = orders.read_slice(self.order_size).to_vec();
            self.events.push(Event::Order(order));
            Ok(CallbackStatus::Handled)
        }

        fn on_bitmap(&mut self, bitmap: &BitmapUpdateData<'_>) -> CallbackResult {
            let bits = bitmap.rectangles.first().map(|r| r.bitmap_data.to_vec()).unwrap_or_default();
            self.events.push(Event::Bitmap(bits));
            Ok(CallbackStatus::Handled)
        }

        fn on_palette(&mut self, _palette: &PaletteUpdateData) -> CallbackResult {
            self.events.push(Event::Palette);
            Ok(CallbackStatus::Handled)
        }

        fn on_synchronize(&mut self) -> CallbackResult {
            self.events.push(Event::Synchronize);
            Ok(CallbackStatus::Handled)
        }

        fn on_pointer_hidden(&mut self) -> CallbackResult {
            self.events.push(Event::PointerHidden);
            Ok(CallbackStatus::Handled)
        }

        fn on_pointer_position(&mut self, position: &PointerPositionAttribute) -> CallbackResult {
            self.events.push(Event::PointerPosition(position.x, position.y));
            Ok(CallbackStatus::Handled)
        }

        fn on_video_frame(&mut self, _destination: &ExclusiveRectangle, frame: &YuvFrame<'_>) -> CallbackResult {
            self.events.push(Event::VideoFrame(frame.width, frame.height));
            Ok(CallbackStatus::Handled)
        }

        fn on_frame_marker(&mut self, _marker: &FrameMarkerPdu) -> CallbackResult {
            self.events.push(Event::FrameMarker);
            Ok(CallbackStatus::Handled)
        }
    }

    fn processor() -> Processor {
        Processor::new(BulkCodec::new(CompressionType::Rdp5))
    }

    fn record(update_code: u8, fragmentation: Fragmentation, data: &[u8]) -> Vec<u8> {
        encode_vec(&FastPathUpdatePdu {
            fragmentation,
            update_code,
            compression_flags: None,
            data,
        })
        .unwrap()
    }

    /// A raw bitmap update payload carrying the given bits in one rectangle.
    fn bitmap_payload(bits: &[u8]) -> Vec<u8> {
        let len = u16::try_from(bits.len()).unwrap();
        let mut payload = vec![
            0x01, 0x00, // updateType
            0x01, 0x00, // numberRectangles
            0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x01, 0x00, // destination 0,0..=3,1
            0x04, 0x00, // width
            0x02, 0x00, // height
            0x10, 0x00, // bitsPerPixel
            0x00, 0x00, // flags
        ];
        payload.extend_from_slice(&len.to_le_bytes());
        payload.extend_from_slice(bits);
        payload
    }

    #[test]
    fn single_bitmap_update_dispatches_once() {
        let mut processor = processor();
        let ctx = SessionContext::default();
        let mut handler = RecordingHandler::default();

        let payload = bitmap_payload(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00, 0x11]);
        let updates = record(UpdateCode::Bitmap.as_u8(), Fragmentation::Single, &payload);

        processor.process_updates(&ctx, &updates, &mut handler).unwrap();

        assert_eq!(
            handler.events,
            vec![
                Event::BeginPaint,
                Event::Bitmap(vec![0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00, 0x11]),
                Event::EndPaint,
            ]
        );
        assert_eq!(processor.reassembler.state, FragmentationState::Idle);
        assert!(processor.reassembler.data.is_empty());
    }

    #[test]
    fn fragmented_orders_update_dispatches_reassembled() {
        let mut processor = processor();
        let ctx = SessionContext::default();
        let mut handler = RecordingHandler {
            order_size: 5,
            ..Default::default()
        };

        // One order of five bytes, split across FIRST and LAST. The orders
        // payload is: numberOrders=1, then the order bytes.
        let mut updates = record(UpdateCode::Orders.as_u8(), Fragmentation::First, &[0x01, 0x00, 0x01, 0x02]);
        updates.extend_from_slice(&record(UpdateCode::Orders.as_u8(), Fragmentation::Last, &[0x03, 0x04, 0x05]));

        processor.process_updates(&ctx, &updates, &mut handler).unwrap();

        assert_eq!(
            handler.events,
            vec![
                Event::BeginPaint,
                Event::Order(vec![0x01, 0x02, 0x03, 0x04, 0x05]),
                Event::EndPaint,
            ]
        );
        assert_eq!(processor.reassembler.state, FragmentationState::Idle);
        assert!(processor.reassembler.data.is_empty());
    }

    #[test]
    fn next_without_first_is_a_protocol_violation() {
        let mut processor = processor();
        let ctx = SessionContext::default();
        let mut handler = RecordingHandler::default();

        let updates = record(UpdateCode::Bitmap.as_u8(), Fragmentation::Next, &[0xFF]);

        let err = processor.process_updates(&ctx, &updates, &mut handler).unwrap_err();

        assert!(matches!(err.kind(), SessionErrorKind::Protocol(_)));
        assert_eq!(processor.reassembler.state, FragmentationState::Idle);
        assert!(processor.reassembler.data.is_empty());
        // end_paint still ran.
        assert_eq!(handler.events, vec![Event::BeginPaint, Event::EndPaint]);
    }

    #[test]
    fn interleaved_fragments_are_a_protocol_violation() {
        let mut processor = processor();
        let ctx = SessionContext::default();
        let mut handler = RecordingHandler::default();

        let mut updates = record(UpdateCode::Orders.as_u8(), Fragmentation::First, &[0x01, 0x00]);
        updates.extend_from_slice(&record(UpdateCode::Bitmap.as_u8(), Fragmentation::Last, &[0x00]));

        let err = processor.process_updates(&ctx, &updates, &mut handler).unwrap_err();

        assert!(matches!(err.kind(), SessionErrorKind::Protocol(_)));
        assert_eq!(processor.reassembler.state, FragmentationState::Idle);
    }

    #[test]
    fn synchronize_without_padding_is_tolerated() {
        let mut processor = processor();
        let ctx = SessionContext::default();
        let mut handler = RecordingHandler::default();

        let updates = record(UpdateCode::Synchronize.as_u8(), Fragmentation::Single, &[]);

        processor.process_updates(&ctx, &updates, &mut handler).unwrap();

        assert_eq!(handler.events, vec![Event::BeginPaint, Event::Synchronize, Event::EndPaint]);
    }

    #[test]
    fn unknown_update_code_is_skipped() {
        let mut processor = processor();
        let ctx = SessionContext::default();
        let mut handler = RecordingHandler::default();

        let mut updates = record(0x7, Fragmentation::Single, &[0xDE, 0xAD]);
        updates.extend_from_slice(&record(UpdateCode::HiddenPointer.as_u8(), Fragmentation::Single, &[]));

        processor.process_updates(&ctx, &updates, &mut handler).unwrap();

        assert_eq!(
            handler.events,
            vec![Event::BeginPaint, Event::PointerHidden, Event::EndPaint]
        );
    }

    #[test]
    fn oversize_update_fails_the_session() {
        let mut processor = processor();
        let ctx = SessionContext {
            multifrag_max_request_size: 4,
            ..Default::default()
        };
        let mut handler = RecordingHandler::default();

        let updates = record(UpdateCode::Orders.as_u8(), Fragmentation::First, &[0u8; 5]);

        let err = processor.process_updates(&ctx, &updates, &mut handler).unwrap_err();

        assert!(matches!(err.kind(), SessionErrorKind::Protocol(_)));
        assert!(processor.reassembler.data.is_empty());
    }

    #[test]
    fn unhandled_update_is_declined_unless_decoding_deactivated() {
        #[derive(Default)]
        struct SilentHandler;
        impl UpdateHandler for SilentHandler {}

        let updates = record(UpdateCode::PositionPointer.as_u8(), Fragmentation::Single, &[1, 0, 2, 0]);

        let mut processor = processor();
        let ctx = SessionContext::default();
        let err = processor
            .process_updates(&ctx, &updates, &mut SilentHandler)
            .unwrap_err();
        assert!(matches!(err.kind(), SessionErrorKind::Declined(_)));

        let mut processor = self::processor();
        let ctx = SessionContext {
            deactivate_client_decoding: true,
            ..Default::default()
        };
        processor.process_updates(&ctx, &updates, &mut SilentHandler).unwrap();
    }

    #[test]
    fn pointer_position_reaches_consumer() {
        let mut processor = processor();
        let ctx = SessionContext::default();
        let mut handler = RecordingHandler::default();

        let updates = record(
            UpdateCode::PositionPointer.as_u8(),
            Fragmentation::Single,
            &[0x34, 0x12, 0x78, 0x56],
        );

        processor.process_updates(&ctx, &updates, &mut handler).unwrap();

        assert_eq!(
            handler.events,
            vec![Event::BeginPaint, Event::PointerPosition(0x1234, 0x5678), Event::EndPaint]
        );
    }

    struct FixedFrameCodec {
        luma: Vec<u8>,
        chroma: Vec<u8>,
        fail: bool,
    }

    impl VideoCodec for FixedFrameCodec {
        fn decode(&mut self, src: &[u8]) -> Result<YuvFrame<'_>, VideoError> {
            if self.fail {
                return Err(VideoError::Decode);
            }
            if src.is_empty() {
                return Err(VideoError::NeedMore);
            }

            Ok(YuvFrame {
                planes: [&self.luma, &self.chroma, &self.chroma],
                strides: [4, 2, 2],
                width: 4,
                height: 2,
                format: PixelFormat::Yuv420P,
            })
        }

        fn encode(&mut self, _frame: &YuvFrame<'_>, _pts: i64) -> Result<&[u8], VideoError> {
            Err(VideoError::Encode)
        }

        fn configure(&mut self, _config: &swiftrdp_video::EncoderConfig) -> Result<(), VideoError> {
            Ok(())
        }
    }

    /// A stream surface bits command wrapping the given codec payload, plus
    /// an end frame marker.
    fn surface_commands_payload(data: &[u8]) -> Vec<u8> {
        let mut payload = encode_vec(&SurfaceCommand::StreamSurfaceBits(SurfaceBitsPdu {
            destination: ExclusiveRectangle {
                left: 0,
                top: 0,
                right: 4,
                bottom: 2,
            },
            extended_bitmap_data: swiftrdp_pdu::surface_commands::ExtendedBitmapDataPdu {
                bpp: 32,
                codec_id: 1,
                width: 4,
                height: 2,
                data,
            },
        }))
        .unwrap();
        payload.extend_from_slice(
            &encode_vec(&SurfaceCommand::FrameMarker(FrameMarkerPdu {
                frame_action: swiftrdp_pdu::surface_commands::FrameAction::End,
                frame_id: Some(7),
            }))
            .unwrap(),
        );
        payload
    }

    #[test]
    fn surface_command_video_frame_reaches_consumer() {
        let codec = FixedFrameCodec {
            luma: vec![0x10; 8],
            chroma: vec![0x80; 4],
            fail: false,
        };
        let mut processor = processor().with_video(Box::new(codec));
        let ctx = SessionContext::default();
        let mut handler = RecordingHandler::default();

        let payload = surface_commands_payload(&[0x00, 0x01, 0x02]);
        let updates = record(UpdateCode::SurfaceCommands.as_u8(), Fragmentation::Single, &payload);

        processor.process_updates(&ctx, &updates, &mut handler).unwrap();

        assert_eq!(
            handler.events,
            vec![
                Event::BeginPaint,
                Event::VideoFrame(4, 2),
                Event::FrameMarker,
                Event::EndPaint,
            ]
        );
    }

    #[test]
    fn video_decode_failure_drops_record_but_not_session() {
        let codec = FixedFrameCodec {
            luma: vec![],
            chroma: vec![],
            fail: true,
        };
        let mut processor = processor().with_video(Box::new(codec));
        let ctx = SessionContext::default();
        let mut handler = RecordingHandler::default();

        let payload = surface_commands_payload(&[0x00]);
        let mut updates = record(UpdateCode::SurfaceCommands.as_u8(), Fragmentation::Single, &payload);
        updates.extend_from_slice(&record(UpdateCode::HiddenPointer.as_u8(), Fragmentation::Single, &[]));

        processor.process_updates(&ctx, &updates, &mut handler).unwrap();

        // The surface command was dropped, the following record survived.
        assert_eq!(
            handler.events,
            vec![Event::BeginPaint, Event::PointerHidden, Event::EndPaint]
        );
    }

    #[test]
    fn encrypted_pdu_roundtrip_through_envelope() {
        let security = xor_layer();
        let ctx = SessionContext {
            encrypting: true,
            ..Default::default()
        };

        // Build the encrypted frame by hand: header + signature slot + record.
        let payload = bitmap_payload(&[0x55, 0x66]);
        let updates = record(UpdateCode::Bitmap.as_u8(), Fragmentation::Single, &payload);

        let header = FastPathHeader {
            flags: EncryptionFlags::ENCRYPTED,
            data_length: updates.len(),
            fips_information: None,
            data_signature: Some([0; 8]),
        };
        let mut frame = encode_vec(&header).unwrap();
        let protected_from = frame.len();
        frame.extend_from_slice(&updates);
        security.seal(&mut frame, protected_from, 0, false, false).unwrap();

        let mut processor = processor();
        let mut handler = RecordingHandler::default();
        processor.process_pdu(&ctx, &security, &mut frame, &mut handler).unwrap();

        assert_eq!(
            handler.events,
            vec![Event::BeginPaint, Event::Bitmap(vec![0x55, 0x66]), Event::EndPaint]
        );
    }

    #[test]
    fn fips_pdu_roundtrip_through_envelope() {
        let security = xor_layer();
        let ctx = SessionContext {
            encrypting: true,
            fips: true,
            ..Default::default()
        };

        let payload = bitmap_payload(&[0x01, 0x02, 0x03]);
        let updates = record(UpdateCode::Bitmap.as_u8(), Fragmentation::Single, &payload);
        let pad = crate::envelope::fips_pad_length(updates.len());

        let header = FastPathHeader {
            flags: EncryptionFlags::ENCRYPTED,
            data_length: updates.len() + pad,
            fips_information: Some(FipsInformation::with_padding(u8::try_from(pad).unwrap())),
            data_signature: Some([0; 8]),
        };
        let mut frame = encode_vec(&header).unwrap();
        let protected_from = frame.len();
        frame.extend_from_slice(&updates);
        frame.resize(frame.len() + pad, 0);
        security.seal(&mut frame, protected_from, pad, false, true).unwrap();

        let mut processor = processor();
        let mut handler = RecordingHandler::default();
        processor.process_pdu(&ctx, &security, &mut frame, &mut handler).unwrap();

        assert_eq!(
            handler.events,
            vec![Event::BeginPaint, Event::Bitmap(vec![0x01, 0x02, 0x03]), Event::EndPaint]
        );
    }

    #[test]
    fn tampered_pdu_is_rejected() {
        let security = xor_layer();
        let ctx = SessionContext {
            encrypting: true,
            ..Default::default()
        };

        let updates = record(UpdateCode::HiddenPointer.as_u8(), Fragmentation::Single, &[]);
        let header = FastPathHeader {
            flags: EncryptionFlags::ENCRYPTED,
            data_length: updates.len(),
            fips_information: None,
            data_signature: Some([0; 8]),
        };
        let mut frame = encode_vec(&header).unwrap();
        let protected_from = frame.len();
        frame.extend_from_slice(&updates);
        security.seal(&mut frame, protected_from, 0, false, false).unwrap();

        let last = frame.len() - 1;
        frame[last] ^= 0x01;

        let mut processor = processor();
        let mut handler = RecordingHandler::default();
        let err = processor
            .process_pdu(&ctx, &security, &mut frame, &mut handler)
            .unwrap_err();

        assert!(matches!(err.kind(), SessionErrorKind::Crypto(_)));
        // Nothing was dispatched.
        assert!(handler.events.is_empty());
    }
}
