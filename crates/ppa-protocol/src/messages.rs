use thiserror::Error;

use crate::PROTOCOL_ID;

/// Decode failure. The codec has exactly one failure mode: not enough
/// bytes for the fixed-size structure being decoded. Unknown enum values
/// are not an error, they pass through as raw integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("buffer too short: need {needed} bytes, got {got}")]
    ShortBuffer { needed: usize, got: usize },
}

// -- Message type (header byte 0) --

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Ping,
    LiveCmd,
    DeviceData,
    PresetRecall,
    PresetSave,
    /// Message type we don't recognize. Kept raw so unknown frames still
    /// round-trip unchanged.
    Unknown(u8),
}

impl MessageType {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Ping,
            1 => Self::LiveCmd,
            2 => Self::DeviceData,
            4 => Self::PresetRecall,
            5 => Self::PresetSave,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Ping => 0,
            Self::LiveCmd => 1,
            Self::DeviceData => 2,
            Self::PresetRecall => 4,
            Self::PresetSave => 5,
            Self::Unknown(v) => v,
        }
    }
}

// -- Status word (header bytes 2..4) --
// High byte selects the side (0x01 = client, 0x00 = server), low byte the
// kind of exchange. Devices answer client requests with the server-side
// variants.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusType {
    ResponseClient,
    CommandClient,
    RequestClient,
    ErrorClient,
    WaitClient,
    ResponseServer,
    CommandServer,
    RequestServer,
    ErrorServer,
    WaitServer,
    Unknown(u16),
}

impl StatusType {
    pub fn from_u16(v: u16) -> Self {
        match v {
            0x0101 => Self::ResponseClient,
            0x0102 => Self::CommandClient,
            0x0106 => Self::RequestClient,
            0x0109 => Self::ErrorClient,
            0x0141 => Self::WaitClient,
            0x0001 => Self::ResponseServer,
            0x0002 => Self::CommandServer,
            0x0006 => Self::RequestServer,
            0x0009 => Self::ErrorServer,
            0x0041 => Self::WaitServer,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            Self::ResponseClient => 0x0101,
            Self::CommandClient => 0x0102,
            Self::RequestClient => 0x0106,
            Self::ErrorClient => 0x0109,
            Self::WaitClient => 0x0141,
            Self::ResponseServer => 0x0001,
            Self::CommandServer => 0x0002,
            Self::RequestServer => 0x0006,
            Self::ErrorServer => 0x0009,
            Self::WaitServer => 0x0041,
            Self::Unknown(v) => v,
        }
    }
}

// -- Message header (12 bytes) --

/// Fixed 12-byte prefix of every protocol message.
///
/// Layout (multi-byte fields little-endian):
/// type(1) + protocol_id(1) + status(2) + unique_id(4) + sequence(2) +
/// component(1) + reserved(1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_type: MessageType,
    pub protocol_id: u8,
    pub status: StatusType,
    pub device_unique_id: [u8; 4],
    pub sequence_number: u16,
    pub component_id: u8,
    pub reserved: u8,
}

impl MessageHeader {
    pub const SIZE: usize = 12;

    pub fn new(
        message_type: MessageType,
        status: StatusType,
        device_unique_id: [u8; 4],
        sequence_number: u16,
        component_id: u8,
    ) -> Self {
        Self {
            message_type,
            protocol_id: PROTOCOL_ID,
            status,
            device_unique_id,
            sequence_number,
            component_id,
            reserved: 0,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.message_type.as_u8();
        buf[1] = self.protocol_id;
        buf[2..4].copy_from_slice(&self.status.as_u16().to_le_bytes());
        buf[4..8].copy_from_slice(&self.device_unique_id);
        buf[8..10].copy_from_slice(&self.sequence_number.to_le_bytes());
        buf[10] = self.component_id;
        buf[11] = self.reserved;
        buf
    }

    /// Decode a header from the front of a datagram. Does not validate
    /// protocol_id or enum ranges, so frames from newer firmware still
    /// parse.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < Self::SIZE {
            return Err(ProtocolError::ShortBuffer {
                needed: Self::SIZE,
                got: data.len(),
            });
        }

        let mut device_unique_id = [0u8; 4];
        device_unique_id.copy_from_slice(&data[4..8]);

        Ok(Self {
            message_type: MessageType::from_u8(data[0]),
            protocol_id: data[1],
            status: StatusType::from_u16(u16::from_le_bytes([data[2], data[3]])),
            device_unique_id,
            sequence_number: u16::from_le_bytes([data[8], data[9]]),
            component_id: data[10],
            reserved: data[11],
        })
    }
}

// -- Preset recall payload (3 bytes) --

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecallType {
    ByIndex,
    ByPosition,
    Unknown(u8),
}

impl RecallType {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::ByIndex,
            2 => Self::ByPosition,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::ByIndex => 0,
            Self::ByPosition => 2,
            Self::Unknown(v) => v,
        }
    }
}

/// Payload of a `PresetRecall` message: recall mode, a reserved option
/// selector (currently always 0), and the preset number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetRecall {
    pub recall_type: RecallType,
    pub option: u8,
    pub index_position: u8,
}

impl PresetRecall {
    pub const SIZE: usize = 3;

    pub fn by_index(index: u8) -> Self {
        Self {
            recall_type: RecallType::ByIndex,
            option: 0,
            index_position: index,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        [self.recall_type.as_u8(), self.option, self.index_position]
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < Self::SIZE {
            return Err(ProtocolError::ShortBuffer {
                needed: Self::SIZE,
                got: data.len(),
            });
        }

        Ok(Self {
            recall_type: RecallType::from_u8(data[0]),
            option: data[1],
            index_position: data[2],
        })
    }
}
