//! Factory for the wire messages this client actually sends: discovery /
//! liveness pings, master volume changes, and preset recalls.

use crate::messages::{MessageHeader, MessageType, PresetRecall, StatusType};
use crate::volume::{encode_volume, MASTER_INPUT_GAIN_PATH};
use crate::BROADCAST_UNIQUE_ID;

/// Header + optional payload, concatenated. A payload-less message is
/// exactly the 12 header bytes.
pub fn build_message(header: &MessageHeader, payload: Option<&[u8]>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MessageHeader::SIZE + payload.map_or(0, <[u8]>::len));
    buf.extend_from_slice(&header.encode());
    if let Some(payload) = payload {
        buf.extend_from_slice(payload);
    }
    buf
}

/// Ping request. Sent both as the periodic discovery broadcast and as a
/// unicast liveness probe; either way the device id is the broadcast id.
pub fn ping(sequence: u16, component_id: u8) -> Vec<u8> {
    let header = MessageHeader::new(
        MessageType::Ping,
        StatusType::RequestServer,
        BROADCAST_UNIQUE_ID,
        sequence,
        component_id,
    );
    build_message(&header, None)
}

/// Master volume command. Payload is the fixed master-input-gain routing
/// path followed by the quantized gain as a little-endian u32.
pub fn volume(level: f32, sequence: u16, component_id: u8) -> Vec<u8> {
    let header = MessageHeader::new(
        MessageType::DeviceData,
        StatusType::CommandClient,
        BROADCAST_UNIQUE_ID,
        sequence,
        component_id,
    );

    let mut payload = [0u8; 8];
    payload[..4].copy_from_slice(&MASTER_INPUT_GAIN_PATH);
    payload[4..].copy_from_slice(&encode_volume(level).to_le_bytes());

    build_message(&header, Some(&payload))
}

/// Preset recall by index.
pub fn preset_recall(index: u8, sequence: u16, component_id: u8) -> Vec<u8> {
    let header = MessageHeader::new(
        MessageType::PresetRecall,
        StatusType::CommandClient,
        BROADCAST_UNIQUE_ID,
        sequence,
        component_id,
    );
    build_message(&header, Some(&PresetRecall::by_index(index).encode()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::COMPONENT_ALL;

    #[test]
    fn test_ping_is_header_only() {
        let msg = ping(17, COMPONENT_ALL);
        assert_eq!(msg.len(), MessageHeader::SIZE);

        let header = MessageHeader::decode(&msg).unwrap();
        assert_eq!(header.message_type, MessageType::Ping);
        assert_eq!(header.status, StatusType::RequestServer);
        assert_eq!(header.device_unique_id, BROADCAST_UNIQUE_ID);
        assert_eq!(header.sequence_number, 17);
        assert_eq!(header.component_id, COMPONENT_ALL);
    }

    #[test]
    fn test_volume_message_layout() {
        let msg = volume(0.5, 3, COMPONENT_ALL);
        assert_eq!(msg.len(), MessageHeader::SIZE + 8);

        let header = MessageHeader::decode(&msg).unwrap();
        assert_eq!(header.message_type, MessageType::DeviceData);
        assert_eq!(header.status, StatusType::CommandClient);

        assert_eq!(&msg[12..16], &[1, 0, 3, 6]);
        let gain = u32::from_le_bytes([msg[16], msg[17], msg[18], msg[19]]);
        assert_eq!(gain, 500);
    }

    #[test]
    fn test_preset_recall_message_layout() {
        let msg = preset_recall(9, 5, COMPONENT_ALL);
        assert_eq!(msg.len(), MessageHeader::SIZE + PresetRecall::SIZE);

        let header = MessageHeader::decode(&msg).unwrap();
        assert_eq!(header.message_type, MessageType::PresetRecall);
        assert_eq!(header.status, StatusType::CommandClient);

        let recall = PresetRecall::decode(&msg[12..]).unwrap();
        assert_eq!(recall, PresetRecall::by_index(9));
    }

    #[test]
    fn test_build_message_without_payload() {
        let header = MessageHeader::new(
            MessageType::Ping,
            StatusType::RequestServer,
            BROADCAST_UNIQUE_ID,
            1,
            COMPONENT_ALL,
        );
        assert_eq!(build_message(&header, None), header.encode().to_vec());
    }
}
