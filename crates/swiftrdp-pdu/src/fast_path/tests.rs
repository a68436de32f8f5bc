use swiftrdp_core::{decode, encode, encode_vec, Encode as _};

use super::*;

const HEADER_WITH_SHORT_LEN_BUFFER: [u8; 2] = [0x80, 0x08];
const HEADER_WITH_LONG_LEN_BUFFER: [u8; 3] = [0x80, 0x81, 0xE7];
const HEADER_WITH_FORCED_LONG_LEN_BUFFER: [u8; 3] = [0x80, 0x80, 0x08];

// Single bitmap update record: code=1, SINGLE, no compression, five payload bytes.
const SINGLE_BITMAP_RECORD_BUFFER: [u8; 8] = [0x01, 0x05, 0x00, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE];

#[test]
fn decodes_header_with_short_length() {
    let header: FastPathHeader = decode(HEADER_WITH_SHORT_LEN_BUFFER.as_ref()).unwrap();

    assert_eq!(header.flags, EncryptionFlags::ENCRYPTED);
    assert_eq!(header.data_length, 6);
}

#[test]
fn decodes_header_with_long_length() {
    let header: FastPathHeader = decode(HEADER_WITH_LONG_LEN_BUFFER.as_ref()).unwrap();

    assert_eq!(header.flags, EncryptionFlags::ENCRYPTED);
    assert_eq!(header.data_length, 484);
}

#[test]
fn decodes_header_with_non_minimal_length_encoding() {
    let header: FastPathHeader = decode(HEADER_WITH_FORCED_LONG_LEN_BUFFER.as_ref()).unwrap();

    assert_eq!(header.flags, EncryptionFlags::ENCRYPTED);
    assert_eq!(header.data_length, 5);
}

#[test]
fn encodes_length_in_two_bytes_even_when_small() {
    let header = FastPathHeader::new(EncryptionFlags::empty(), 5);

    let encoded = encode_vec(&header).unwrap();

    assert_eq!(encoded, [0x00, 0x80, 0x08]);
    assert_eq!(header.size(), encoded.len());
    // Top bit of the first length byte is always set.
    assert_ne!(encoded[1] & 0x80, 0);
}

#[test]
fn header_roundtrip_with_plain_envelope() {
    let header = FastPathHeader {
        flags: EncryptionFlags::ENCRYPTED,
        data_length: 10,
        fips_information: None,
        data_signature: Some([1, 2, 3, 4, 5, 6, 7, 8]),
    };

    let encoded = encode_vec(&header).unwrap();
    assert_eq!(encoded.len(), 3 + 8);

    let mut cursor = ReadCursor::new(&encoded);
    let decoded = FastPathHeader::decode_with_envelope(&mut cursor, false).unwrap();

    assert_eq!(decoded, header);
}

#[test]
fn header_roundtrip_with_fips_envelope() {
    let header = FastPathHeader {
        flags: EncryptionFlags::ENCRYPTED | EncryptionFlags::SECURE_CHECKSUM,
        data_length: 13,
        fips_information: Some(FipsInformation::with_padding(3)),
        data_signature: Some([8, 7, 6, 5, 4, 3, 2, 1]),
    };

    let encoded = encode_vec(&header).unwrap();
    assert_eq!(encoded.len(), 3 + 4 + 8);
    // fipsInformation is the fixed prefix 10 00 01 followed by the pad count.
    assert_eq!(&encoded[3..7], &[0x10, 0x00, 0x01, 0x03]);

    let mut cursor = ReadCursor::new(&encoded);
    let decoded = FastPathHeader::decode_with_envelope(&mut cursor, true).unwrap();

    assert_eq!(decoded, header);
}

#[test]
fn decodes_single_bitmap_update_record() {
    let update: FastPathUpdatePdu<'_> = decode(SINGLE_BITMAP_RECORD_BUFFER.as_ref()).unwrap();

    assert_eq!(update.fragmentation, Fragmentation::Single);
    assert_eq!(update.code(), Some(UpdateCode::Bitmap));
    assert_eq!(update.compression_flags, None);
    assert_eq!(update.data, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
}

#[test]
fn update_record_roundtrip() {
    let update = FastPathUpdatePdu {
        fragmentation: Fragmentation::Next,
        update_code: UpdateCode::Orders.as_u8(),
        compression_flags: Some(0x21),
        data: &[1, 2, 3],
    };

    let encoded = encode_vec(&update).unwrap();
    assert_eq!(update.size(), encoded.len());

    // Compression indicator must be set in the update header.
    assert_eq!(encoded[0] >> 6, Compression::COMPRESSION_USED.bits());

    let decoded: FastPathUpdatePdu<'_> = decode(&encoded).unwrap();
    assert_eq!(decoded, update);
}

#[test]
fn unknown_update_code_still_decodes() {
    // Code 0x7 is unassigned; the record must still be consumable.
    let buffer = [0x07, 0x01, 0x00, 0xFF];
    let update: FastPathUpdatePdu<'_> = decode(buffer.as_ref()).unwrap();

    assert_eq!(update.update_code, 0x7);
    assert_eq!(update.code(), None);
    assert_eq!(update.data, [0xFF]);
}

#[test]
fn update_record_decode_reports_short_payload() {
    let buffer = [0x01, 0x05, 0x00, 0xAA];
    assert!(decode::<FastPathUpdatePdu<'_>>(buffer.as_ref()).is_err());
}

#[test]
fn encode_fails_on_undersized_buffer() {
    let header = FastPathHeader::new(EncryptionFlags::empty(), 64);
    let mut buffer = [0u8; 2];

    assert!(encode(&header, buffer.as_mut_slice()).is_err());
}
