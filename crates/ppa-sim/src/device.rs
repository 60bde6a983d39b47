//! Simulated DSP device state and frame handling.
//!
//! Answers pings with this device's fingerprint and applies volume and
//! preset-recall commands to in-memory state. Commands are fire-and-forget
//! in the real protocol, so only pings produce a reply frame.

use ppa_protocol::messages::{MessageHeader, MessageType, PresetRecall, StatusType};
use ppa_protocol::volume::decode_volume;
use tracing::{debug, info};

pub struct SimulatedDevice {
    name: String,
    unique_id: [u8; 4],
    component_id: u8,
    current_volume: f32,
    active_preset: u8,
}

impl SimulatedDevice {
    pub fn new(name: impl Into<String>, unique_id: [u8; 4], component_id: u8) -> Self {
        Self {
            name: name.into(),
            unique_id,
            component_id,
            current_volume: 0.0,
            active_preset: 0,
        }
    }

    pub fn current_volume(&self) -> f32 {
        self.current_volume
    }

    pub fn active_preset(&self) -> u8 {
        self.active_preset
    }

    /// Process one inbound datagram. Returns the frame to send back to
    /// the sender, if the message warrants one.
    pub fn handle_frame(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        let header = match MessageHeader::decode(data) {
            Ok(header) => header,
            Err(e) => {
                debug!(len = data.len(), %e, "dropping undecodable frame");
                return None;
            }
        };

        match header.message_type {
            MessageType::Ping => {
                debug!(seq = header.sequence_number, "answering ping");
                let reply = MessageHeader::new(
                    MessageType::Ping,
                    StatusType::ResponseServer,
                    self.unique_id,
                    header.sequence_number,
                    self.component_id,
                );
                Some(reply.encode().to_vec())
            }
            MessageType::DeviceData => {
                self.apply_volume(&data[MessageHeader::SIZE..]);
                None
            }
            MessageType::PresetRecall => {
                match PresetRecall::decode(&data[MessageHeader::SIZE..]) {
                    Ok(recall) => {
                        self.active_preset = recall.index_position;
                        info!(
                            device = %self.name,
                            preset = recall.index_position,
                            "preset recalled"
                        );
                    }
                    Err(e) => debug!(%e, "short preset recall payload"),
                }
                None
            }
            other => {
                debug!(message_type = ?other, "ignoring message");
                None
            }
        }
    }

    fn apply_volume(&mut self, payload: &[u8]) {
        // path(4) + gain(4)
        if payload.len() < 8 {
            debug!(len = payload.len(), "short volume payload");
            return;
        }
        let gain = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
        self.current_volume = decode_volume(gain);
        info!(
            device = %self.name,
            gain,
            volume = self.current_volume,
            "volume set"
        );
    }
}
