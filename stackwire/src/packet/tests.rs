use std::sync::OnceLock;

use super::*;
use crate::registry::Registry;
use crate::schema::{BitField, Coverage, Dispatch, Field, Schema};
use crate::wire::checksum;

static TLV: Protocol = Protocol::new("tlv", Schema::new(&[
    Field::uint("type", 1),
    Field::uint("len", 2),
    Field::variable("payload", LengthSource::Field("len")),
]));

static FRAME: Protocol = Protocol::new("frame", Schema::new(&[
    Field::uint("kind", 1),
    Field::length("size", 2, Coverage::Packet),
    Field::checksum("sum", Coverage::Packet),
]).with_next(Dispatch::new("kind", kinds)));

static OPTIONS: Protocol = Protocol::new("options", Schema::new(&[
    Field::uint("v_hl", 1).with_default(0x41),
    Field::int("offset", 2).little_endian(),
    Field::uint("pad", 1),
    Field::variable("options", LengthSource::HeaderLength { field: "hl", unit: 4 }),
]).with_bits(&[
    BitField::new("version", "v_hl", 4, 4),
    BitField::new("hl", "v_hl", 0, 4),
]));

fn kinds() -> &'static Registry {
    static KINDS: OnceLock<Registry> = OnceLock::new();
    KINDS.get_or_init(|| {
        Registry::from_entries("kinds", &[(1, &TLV), (2, &FRAME), (3, &OPTIONS)])
            .expect("valid fixture registry")
    })
}

enum_with_unknown! {
    pub enum FrameKind(u8) {
        Tlv = 1,
        Frame = 2,
    }
}

static TLV_BYTES: [u8; 6] = [0x07, 0x00, 0x03, 0xaa, 0xbb, 0xcc];

fn tlv() -> Packet {
    let mut packet = TLV.new_packet();
    packet.set("type", 7u8).unwrap();
    packet.set("payload", vec![0xaa, 0xbb, 0xcc]).unwrap();
    packet
}

fn framed_bytes() -> Vec<u8> {
    let mut frame = FRAME.new_packet();
    frame.set_trailing(vec![1, 2, 3]);
    frame.encode().unwrap()
}

#[test]
fn tlv_round_trip() {
    let mut packet = tlv();
    assert_eq!(packet.uint("len"), Ok(3));
    assert_eq!(packet.encode(), Ok(TLV_BYTES.to_vec()));

    let decoded = TLV.decode(&TLV_BYTES).unwrap();
    assert_eq!(decoded, packet);
    assert_eq!(decoded.bytes("payload"), Ok(&[0xaa, 0xbb, 0xcc][..]));
    assert!(decoded.trailing().is_empty());
    assert_eq!(decoded.header_len(), 6);
    assert_eq!(decoded.len(), 6);
}

#[test]
fn length_field_must_agree() {
    let mut packet = tlv();
    assert_eq!(packet.set("len", 4u8), Err(Error::InvalidFieldValue));
    assert_eq!(packet.uint("len"), Ok(3));
    assert_eq!(packet.set("len", 3u8), Ok(()));

    packet.set("payload", Vec::<u8>::new()).unwrap();
    assert_eq!(packet.uint("len"), Ok(0));
    assert_eq!(packet.encode(), Ok(vec![0x07, 0x00, 0x00]));
}

#[test]
fn truncated() {
    assert_eq!(TLV.decode(&TLV_BYTES[..2]), Err(Error::Truncated));
    // The length claims more than there is.
    assert_eq!(TLV.decode(&TLV_BYTES[..5]), Err(Error::Truncated));
    assert_eq!(FRAME.decode(&[0; 4]), Err(Error::Truncated));

    // Exactly the fixed part.
    let empty = TLV.decode(&[0x07, 0x00, 0x00]).unwrap();
    assert_eq!(empty.bytes("payload"), Ok(&[][..]));
    assert_eq!(FRAME.decode(&[0; 5]).unwrap().depth(), 1);
}

#[test]
fn rejected_values() {
    let mut packet = tlv();
    assert_eq!(packet.set("type", 0x100u16), Err(Error::InvalidFieldValue));
    assert_eq!(packet.set("type", -1i8), Err(Error::InvalidFieldValue));
    assert_eq!(packet.set("payload", 5u8), Err(Error::InvalidFieldValue));
    assert_eq!(packet.set("ttl", 5u8), Err(Error::UnknownField));
    assert_eq!(packet.get("ttl"), Err(Error::UnknownField));
    assert_eq!(packet.uint("payload"), Err(Error::InvalidFieldValue));
    assert_eq!(packet.int("type"), Err(Error::InvalidFieldValue));
    assert_eq!(packet, tlv());
}

#[test]
fn header_length() {
    let mut packet = OPTIONS.new_packet();
    assert_eq!(packet.encode(), Ok(vec![0x41, 0x00, 0x00, 0x00]));

    packet.set("options", vec![1, 2, 3, 4]).unwrap();
    assert_eq!(packet.uint("hl"), Ok(2));
    assert_eq!(packet.uint("v_hl"), Ok(0x42));

    // Options fill whole words only.
    assert_eq!(packet.set("options", vec![1, 2, 3]), Err(Error::InvalidFieldValue));
    assert_eq!(packet.bytes("options"), Ok(&[1, 2, 3, 4][..]));

    assert_eq!(packet.set("hl", 3u8), Err(Error::InvalidFieldValue));
    packet.set("version", 6u8).unwrap();
    assert_eq!(packet.uint("v_hl"), Ok(0x62));
    // Writing the whole byte keeps the length part consistent.
    packet.set("v_hl", 0x4fu8).unwrap();
    assert_eq!(packet.uint("v_hl"), Ok(0x42));
    assert_eq!(packet.set("version", 16u8), Err(Error::InvalidFieldValue));

    packet.set("offset", -2i8).unwrap();
    assert_eq!(packet.int("offset"), Ok(-2));
    assert_eq!(packet.encode(), Ok(vec![0x42, 0xfe, 0xff, 0x00, 1, 2, 3, 4]));
}

#[test]
fn header_length_decode() {
    let packet = OPTIONS.decode(&[0x42, 0xfe, 0xff, 0x00, 1, 2, 3, 4, 9]).unwrap();
    assert_eq!(packet.uint("version"), Ok(4));
    assert_eq!(packet.int("offset"), Ok(-2));
    assert_eq!(packet.bytes("options"), Ok(&[1, 2, 3, 4][..]));
    assert_eq!(packet.trailing(), &[9]);

    // Shorter than the fixed part.
    assert_eq!(OPTIONS.decode(&[0x40, 0, 0, 0]), Err(Error::Malformed));
    assert_eq!(OPTIONS.decode(&[0x43, 0, 0, 0, 1, 2, 3, 4]), Err(Error::Truncated));
}

#[test]
fn computed_fields() {
    let bytes = framed_bytes();
    assert_eq!(bytes.len(), 8);
    assert_eq!(&bytes[..3], &[0x00, 0x00, 0x08]);
    assert_eq!(&bytes[5..], &[1, 2, 3]);

    // The checksum starts on an odd offset, so its bytes sit in swapped word halves.
    let expected = checksum::internet(&[0x00, 0x00, 0x08, 0x00, 0x00, 1, 2, 3]);
    assert_eq!(&bytes[3..5], &expected.swap_bytes().to_be_bytes());
    assert!(checksum::verify(&bytes));
}

#[test]
fn encoding_stores_computed_values() {
    let mut frame = FRAME.new_packet();
    frame.set("kind", 7u8).unwrap();
    frame.set_trailing(vec![1, 2, 3]);

    let bytes = frame.encode().unwrap();
    assert_eq!(frame.uint("size"), Ok(8));
    assert_eq!(FRAME.decode(&bytes).unwrap(), frame);
    assert!(frame.verify_checksums());

    // Offloaded checksums are stored as the zero that was sent.
    frame.set("kind", 6u8).unwrap();
    let options = Options {
        checksum: Checksum::Ignored,
        ..Options::default()
    };
    let bytes = frame.encode_with(&options).unwrap();
    assert_eq!(frame.uint("sum"), Ok(0));
    assert_eq!(FRAME.decode(&bytes).unwrap(), frame);
    assert!(checksum::verify(&frame.encode().unwrap()));
}

#[test]
fn refresh_stores_computed_values() {
    let mut frame = FRAME.new_packet();
    frame.set_trailing(vec![1, 2, 3]);
    assert_eq!(frame.uint("size"), Ok(0));
    assert!(!frame.verify_checksums());
    assert_eq!(frame.verify_checksum("sum"), Ok(false));

    frame.refresh().unwrap();
    assert_eq!(frame.uint("size"), Ok(8));
    assert!(frame.verify_checksums());
    assert_eq!(frame.verify_checksum("sum"), Ok(true));
    assert_eq!(frame.verify_checksum("kind"), Err(Error::InvalidFieldValue));
    assert_eq!(frame.encode(), Ok(framed_bytes()));
}

#[test]
fn pinned_values() {
    let mut frame = FRAME.new_packet();
    frame.set("sum", 0x1234u16).unwrap();
    assert_eq!(frame.is_pinned("sum"), Ok(true));
    assert_eq!(frame.is_pinned("size"), Ok(false));

    let bytes = frame.encode().unwrap();
    assert_eq!(bytes, [0x00, 0x00, 0x05, 0x12, 0x34]);
    assert!(!frame.verify_checksums());

    frame.unpin("sum").unwrap();
    assert!(checksum::verify(&frame.encode().unwrap()));

    frame.pin("size", 2u8).unwrap();
    assert_eq!(&frame.encode().unwrap()[1..3], &[0x00, 0x02]);
    assert_eq!(frame.pin("kind", 1u8), Err(Error::InvalidFieldValue));
    assert_eq!(frame.is_pinned("kind"), Err(Error::InvalidFieldValue));
}

#[test]
fn decoded_packets_encode_identically() {
    let mut bytes = framed_bytes();
    bytes[7] ^= 0xff;

    let mut frame = FRAME.decode(&bytes).unwrap();
    assert!(!frame.verify_checksums());
    assert_eq!(frame.encode(), Ok(bytes.clone()));

    // Any change recomputes.
    frame.set("kind", 0u8).unwrap();
    let fixed = frame.encode().unwrap();
    assert_ne!(fixed, bytes);
    assert!(checksum::verify(&fixed));

    let mut frame = FRAME.decode(&bytes).unwrap();
    frame.refresh().unwrap();
    assert!(frame.verify_checksums());
    assert_eq!(frame.encode(), Ok(fixed));
}

#[test]
fn checksum_offload() {
    let mut frame = FRAME.new_packet();
    frame.set_trailing(vec![1, 2, 3]);
    let options = Options {
        checksum: Checksum::Ignored,
        ..Options::default()
    };
    assert_eq!(frame.encode_with(&options), Ok(vec![0x00, 0x00, 0x08, 0x00, 0x00, 1, 2, 3]));
}

#[test]
fn capacity() {
    let mut frame = FRAME.new_packet();
    frame.set_trailing(vec![1, 2, 3]);
    let limited = |capacity| Options {
        capacity: Some(capacity),
        ..Options::default()
    };
    assert_eq!(frame.encode_with(&limited(7)), Err(Error::CapacityExceeded));
    assert_eq!(frame.uint("size"), Ok(0));
    assert_eq!(frame.encode_with(&limited(8)).map(|bytes| bytes.len()), Ok(8));
}

#[test]
fn chaining() {
    let mut frame = FRAME.new_packet();
    frame.set_next_layer(tlv()).unwrap();
    assert_eq!(frame.uint("kind"), Ok(1));
    assert_eq!(FrameKind::from(frame.uint("kind").unwrap() as u8), FrameKind::Tlv);

    let bytes = frame.encode().unwrap();
    assert_eq!(bytes.len(), 5 + TLV_BYTES.len());
    assert_eq!(&bytes[5..], &TLV_BYTES);
    assert_eq!(frame.len(), bytes.len());
    assert_eq!(frame.header_len(), 5);

    let decoded = FRAME.decode(&bytes).unwrap();
    let names: Vec<_> = decoded.layers().map(Packet::name).collect();
    assert_eq!(names, ["frame", "tlv"]);
    assert_eq!(decoded.depth(), 2);
    assert_eq!(decoded.layer("tlv").unwrap(), &tlv());
    assert!(decoded.layer("options").is_none());
    assert!(decoded.verify_checksums());

    frame.refresh().unwrap();
    assert_eq!(decoded, frame);
}

#[test]
fn chaining_failures_are_absorbed() {
    let mut frame = FRAME.new_packet();
    frame.set("kind", FrameKind::Tlv).unwrap();
    // Claims nine bytes of payload but has none.
    frame.set_trailing(vec![0x07, 0x00, 0x09]);
    let bytes = frame.encode().unwrap();

    let decoded = FRAME.decode(&bytes).unwrap();
    assert!(decoded.next_layer().is_none());
    assert_eq!(decoded.trailing(), &[0x07, 0x00, 0x09]);

    frame.set("kind", FrameKind::Unknown(9)).unwrap();
    frame.set_trailing(TLV_BYTES.to_vec());
    let decoded = FRAME.decode(&frame.encode().unwrap()).unwrap();
    assert!(decoded.next_layer().is_none());
    assert_eq!(decoded.trailing(), &TLV_BYTES);
}

#[test]
fn depth_limit() {
    let mut inner = FRAME.new_packet();
    inner.set_next_layer(FRAME.new_packet()).unwrap();
    let mut outer = FRAME.new_packet();
    outer.set_next_layer(inner).unwrap();
    assert_eq!(outer.uint("kind"), Ok(u64::from(u8::from(FrameKind::Frame))));

    let bytes = outer.encode().unwrap();
    assert_eq!(bytes.len(), 15);
    assert_eq!(FRAME.decode(&bytes).unwrap().depth(), 3);

    let limited = |max_depth| Options {
        max_depth,
        ..Options::default()
    };
    let two = FRAME.decode_with(&bytes, &limited(2)).unwrap();
    assert_eq!(two.depth(), 2);
    assert_eq!(two.next_layer().unwrap().trailing().len(), 5);
    assert_eq!(FRAME.decode_with(&bytes, &limited(1)).unwrap().depth(), 1);
    assert_eq!(FRAME.decode_with(&bytes, &limited(0)).unwrap().depth(), 1);
}

#[test]
fn next_layer_changes_recompute_enclosing() {
    let mut frame = FRAME.new_packet();
    frame.set_next_layer(tlv()).unwrap();
    let bytes = frame.encode().unwrap();

    let mut decoded = FRAME.decode(&bytes).unwrap();
    decoded.next_layer_mut().unwrap().set("payload", vec![1, 2, 3, 4]).unwrap();
    let changed = decoded.encode().unwrap();
    assert_eq!(changed.len(), 5 + 3 + 4);
    assert_eq!(&changed[1..3], &[0x00, 12]);
    assert!(checksum::verify(&changed));

    let inner = decoded.take_next_layer().unwrap();
    assert_eq!(inner.bytes("payload"), Ok(&[1, 2, 3, 4][..]));
    assert!(decoded.next_layer().is_none());
    assert!(decoded.take_next_layer().is_none());
    assert_eq!(decoded.len(), 5);
}

#[test]
fn unregistered_next_layer_keeps_discriminant() {
    static LOOSE: Protocol = Protocol::new("loose", Schema::new(&[Field::uint("x", 1)]));

    let mut frame = FRAME.new_packet();
    frame.set("kind", 3u8).unwrap();
    frame.set_next_layer(LOOSE.new_packet()).unwrap();
    assert_eq!(frame.uint("kind"), Ok(3));
    assert_eq!(frame.next_layer().map(Packet::name), Some("loose"));
}

#[test]
fn unvalidated_zero_width() {
    static ZERO: Protocol = Protocol::new("zero", Schema::new(&[Field::int("x", 0)]));
    assert_eq!(ZERO.schema().validate(), Err(Error::InvalidSchema));

    let mut packet = ZERO.new_packet();
    assert_eq!(packet.int("x"), Ok(0));
    assert_eq!(packet.encode(), Err(Error::InvalidSchema));
}

#[test]
fn shared_between_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Packet>();
    assert_send_sync::<Options>();
}
