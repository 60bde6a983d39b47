//! Integration tests for the ppa-protocol crate.
//!
//! These exercise the public API across module boundaries: header and
//! payload codecs, gain quantization, and the command factory producing
//! frames a real device would accept.

use ppa_protocol::commands;
use ppa_protocol::messages::{
    MessageHeader, MessageType, PresetRecall, ProtocolError, RecallType, StatusType,
};
use ppa_protocol::volume::{decode_volume, encode_volume, GAIN_FULL_SCALE};
use ppa_protocol::{BROADCAST_UNIQUE_ID, COMPONENT_ALL, PROTOCOL_ID};

// ---------------------------------------------------------------------------
// 1. Header codec
// ---------------------------------------------------------------------------

#[test]
fn header_roundtrip_all_fields() {
    let header = MessageHeader::new(
        MessageType::PresetSave,
        StatusType::WaitServer,
        [1, 2, 3, 4],
        65535,
        0x0A,
    );

    let decoded = MessageHeader::decode(&header.encode()).expect("decode should succeed");
    assert_eq!(decoded, header);
    assert_eq!(decoded.protocol_id, PROTOCOL_ID);
    assert_eq!(decoded.reserved, 0);
}

#[test]
fn header_decode_tolerates_foreign_protocol_id() {
    // Forward-compat: decode does not validate protocol_id.
    let mut buf = MessageHeader::new(
        MessageType::Ping,
        StatusType::ResponseServer,
        [9, 9, 9, 9],
        1,
        COMPONENT_ALL,
    )
    .encode();
    buf[1] = 7;

    let decoded = MessageHeader::decode(&buf).expect("decode should succeed");
    assert_eq!(decoded.protocol_id, 7);
}

#[test]
fn header_decode_ignores_trailing_payload() {
    let mut frame = commands::ping(5, COMPONENT_ALL);
    frame.extend_from_slice(&[0xAA; 32]);

    let decoded = MessageHeader::decode(&frame).expect("decode should succeed");
    assert_eq!(decoded.message_type, MessageType::Ping);
    assert_eq!(decoded.sequence_number, 5);
}

#[test]
fn short_buffers_fail_with_short_buffer_error_only() {
    assert!(matches!(
        MessageHeader::decode(&[]),
        Err(ProtocolError::ShortBuffer { needed: 12, got: 0 })
    ));
    assert!(matches!(
        PresetRecall::decode(&[1]),
        Err(ProtocolError::ShortBuffer { needed: 3, got: 1 })
    ));
}

// ---------------------------------------------------------------------------
// 2. Preset recall payload
// ---------------------------------------------------------------------------

#[test]
fn preset_recall_by_position_roundtrip() {
    let recall = PresetRecall {
        recall_type: RecallType::ByPosition,
        option: 0,
        index_position: 12,
    };

    let decoded = PresetRecall::decode(&recall.encode()).expect("decode should succeed");
    assert_eq!(decoded, recall);
    assert_eq!(decoded.recall_type.as_u8(), 2);
}

// ---------------------------------------------------------------------------
// 3. Gain quantization
// ---------------------------------------------------------------------------

#[test]
fn volume_quantization_is_monotonic() {
    let mut previous = 0;
    for i in 0..=1000 {
        let encoded = encode_volume(i as f32 / 1000.0);
        assert!(encoded >= previous, "quantization went backwards at {i}");
        previous = encoded;
    }
    assert_eq!(previous, GAIN_FULL_SCALE);
}

#[test]
fn volume_decode_of_full_scale_is_unity() {
    assert_eq!(decode_volume(GAIN_FULL_SCALE), 1.0);
    assert_eq!(decode_volume(0), 0.0);
}

// ---------------------------------------------------------------------------
// 4. Command factory wire output
// ---------------------------------------------------------------------------

#[test]
fn discovery_ping_matches_reference_bytes() {
    let frame = commands::ping(0x0102, COMPONENT_ALL);
    assert_eq!(
        frame,
        vec![
            0x00, // Ping
            0x01, // protocol id
            0x06, 0x00, // RequestServer
            0x00, 0x00, 0x00, 0x00, // broadcast unique id
            0x02, 0x01, // sequence 0x0102 LE
            0xFF, // all components
            0x00, // reserved
        ]
    );
}

#[test]
fn volume_command_tail_encodes_the_gain() {
    // Half volume must put 500 (LE) in the last four payload bytes.
    let frame = commands::volume(0.5, 1, COMPONENT_ALL);
    let tail = &frame[frame.len() - 4..];
    assert_eq!(u32::from_le_bytes(tail.try_into().unwrap()), 500);
}

#[test]
fn muted_volume_command_is_gain_zero() {
    // Mute is modeled as volume 0.0, not as a dedicated message.
    let frame = commands::volume(0.0, 1, COMPONENT_ALL);
    let tail = &frame[frame.len() - 4..];
    assert_eq!(u32::from_le_bytes(tail.try_into().unwrap()), 0);
}

#[test]
fn factory_headers_use_broadcast_unique_id() {
    for frame in [
        commands::ping(1, COMPONENT_ALL),
        commands::volume(1.0, 2, COMPONENT_ALL),
        commands::preset_recall(3, 3, COMPONENT_ALL),
    ] {
        let header = MessageHeader::decode(&frame).expect("decode should succeed");
        assert_eq!(header.device_unique_id, BROADCAST_UNIQUE_ID);
    }
}
