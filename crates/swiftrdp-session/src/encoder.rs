//! Outbound Fast-Path update encoding: fragmenting, optional bulk
//! compression and the security envelope, producing wire-ready PDUs.

use swiftrdp_bulk::BulkCodec;
use swiftrdp_core::{Encode as _, WriteCursor};
use swiftrdp_pdu::fast_path::{
    EncryptionFlags, FastPathHeader, FastPathUpdatePdu, FipsInformation, Fragmentation, UpdateCode,
};
use swiftrdp_pdu::{MAX_FRAGMENT_DATA_SIZE, MAX_PACKET_SIZE};

use crate::envelope::{fips_pad_length, SecurityLayer};
use crate::{SessionContext, SessionErrorExt, SessionResult};

/// Extra room kept below the compression codec's limit for headers, like
/// the cap below `MAX_PACKET_SIZE`.
const HEADER_RESERVE: usize = 20;

/// Encodes one logical update into a sequence of Fast-Path PDUs.
///
/// The update is cut into SINGLE or FIRST/NEXT*/LAST fragments, each
/// optionally bulk-compressed and wrapped in the security envelope. The
/// returned frames must be written to the transport in order.
pub fn encode_update(
    ctx: &SessionContext,
    security: &SecurityLayer,
    bulk: &mut BulkCodec,
    update_code: UpdateCode,
    data: &[u8],
    skip_compression: bool,
) -> SessionResult<Vec<Vec<u8>>> {
    if !ctx.fast_path_output_enabled {
        return Err(general_err!("peer does not support fast path output"));
    }

    let max_request_size = usize::try_from(ctx.multifrag_max_request_size).expect("u32 fits in usize");
    if data.len() > max_request_size {
        return Err(reason_err!(
            "fast path",
            "update size ({}) exceeds the peer's maximum request size ({})",
            data.len(),
            max_request_size
        ));
    }

    let compress = ctx.compression_enabled && !skip_compression;
    let mut max_fragment_size = MAX_FRAGMENT_DATA_SIZE;
    if compress {
        max_fragment_size = core::cmp::min(max_fragment_size, bulk.max_compressed_size()) - HEADER_RESERVE;
    }

    let mut flags = EncryptionFlags::empty();
    if ctx.encrypting {
        flags |= EncryptionFlags::ENCRYPTED;
        if ctx.secure_checksum {
            flags |= EncryptionFlags::SECURE_CHECKSUM;
        }
    }

    let mut frames = Vec::with_capacity(data.len() / max_fragment_size + 1);
    let mut position = 0;
    let mut fragment = 0;

    // An empty update still produces one (SINGLE) PDU.
    while position < data.len() || fragment == 0 {
        let chunk_len = core::cmp::min(data.len() - position, max_fragment_size);
        let chunk = &data[position..position + chunk_len];
        position += chunk_len;

        let fragmentation = if position == data.len() {
            if fragment == 0 {
                Fragmentation::Single
            } else {
                Fragmentation::Last
            }
        } else if fragment == 0 {
            Fragmentation::First
        } else {
            Fragmentation::Next
        };

        let (payload, compression_flags) = if compress {
            bulk.compress(chunk)
        } else {
            (chunk, 0)
        };

        let update_pdu = FastPathUpdatePdu {
            fragmentation,
            update_code: update_code.as_u8(),
            compression_flags: (compression_flags != 0).then_some(compression_flags),
            data: payload,
        };

        let update_size = update_pdu.size();

        // FIPS pads the encrypted region, which starts at the update header.
        let pad = if ctx.encrypting && ctx.fips {
            fips_pad_length(update_size)
        } else {
            0
        };

        let header = FastPathHeader {
            flags,
            data_length: update_size + pad,
            fips_information: (ctx.encrypting && ctx.fips)
                .then(|| FipsInformation::with_padding(u8::try_from(pad).expect("pad is below the block size"))),
            data_signature: ctx.encrypting.then_some([0; 8]),
        };

        let total = header.size() + update_size + pad;
        debug_assert!(total < MAX_PACKET_SIZE);

        let mut frame = vec![0u8; total];
        let mut dst = WriteCursor::new(&mut frame);
        header.encode(&mut dst).map_err(SessionErrorExt::encode)?;
        let protected_from = dst.pos();
        update_pdu.encode(&mut dst).map_err(SessionErrorExt::encode)?;
        // Pad bytes stay zero for the FIPS block alignment.

        if ctx.encrypting {
            security.seal(&mut frame, protected_from, pad, ctx.secure_checksum, ctx.fips)?;
        }

        frames.push(frame);
        fragment += 1;
    }

    Ok(frames)
}
