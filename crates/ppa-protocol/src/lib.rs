pub mod commands;
pub mod messages;
pub mod volume;

/// Protocol identifier carried in every header (byte 1).
pub const PROTOCOL_ID: u8 = 1;

/// UDP port the DSP devices listen on.
pub const DEFAULT_DEVICE_PORT: u16 = 5001;

/// Component id meaning "all components of the device".
///
/// Application-level convention only; the wire format itself attaches no
/// meaning to this value.
pub const COMPONENT_ALL: u8 = 0xFF;

/// Device unique id used when addressing a broadcast, or when the real
/// fingerprint of a device is not yet known.
pub const BROADCAST_UNIQUE_ID: [u8; 4] = [0, 0, 0, 0];

/// Discovery defaults
pub const DEFAULT_DISCOVERY_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_DEVICE_TIMEOUT_MS: u64 = 30000;
pub const DEFAULT_BROADCAST_ADDRESS: std::net::Ipv4Addr = std::net::Ipv4Addr::BROADCAST;
