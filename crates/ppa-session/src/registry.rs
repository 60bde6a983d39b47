//! In-memory registry of devices seen on the network.
//!
//! Pure state, no I/O. The session owns one of these and mutates it only
//! from its own loop; last write wins when inbound messages race, which
//! matches UDP's unordered delivery.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::{Duration, Instant};

use ppa_protocol::{BROADCAST_UNIQUE_ID, DEFAULT_DEVICE_PORT};

/// Composite device identity. Two devices sharing an address and port
/// cannot coexist; the unique id is informational, not identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceKey {
    pub host: String,
    pub port: u16,
}

impl DeviceKey {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn from_addr(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }

    /// Resolve to a socket address. Hosts are IP literals in this
    /// protocol; names are not looked up.
    pub fn to_socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        let ip: IpAddr = self.host.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for DeviceKey {
    type Err = std::convert::Infallible;

    /// Accepts `host` or `host:port`; a missing or unparseable port falls
    /// back to the default device port.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => Ok(Self::new(host, port)),
                Err(_) => Ok(Self::new(host, DEFAULT_DEVICE_PORT)),
            },
            None => Ok(Self::new(s, DEFAULT_DEVICE_PORT)),
        }
    }
}

/// Everything the session knows about one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub key: DeviceKey,
    /// 4-byte device fingerprint, all zero until a response supplies one.
    pub unique_id: [u8; 4],
    pub name: String,
    pub last_seen: Instant,
    pub is_connected: bool,
}

impl DeviceInfo {
    /// A freshly registered device: named after its address, fingerprint
    /// unknown, not yet confirmed reachable.
    pub fn new(key: DeviceKey, now: Instant) -> Self {
        let name = format!("Speaker {}", key.host);
        Self {
            key,
            unique_id: BROADCAST_UNIQUE_ID,
            name,
            last_seen: now,
            is_connected: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceKey, DeviceInfo>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or fully replace the entry for the device's key.
    pub fn upsert(&mut self, device: DeviceInfo) {
        self.devices.insert(device.key.clone(), device);
    }

    pub fn get(&self, key: &DeviceKey) -> Option<&DeviceInfo> {
        self.devices.get(key)
    }

    pub fn contains(&self, key: &DeviceKey) -> bool {
        self.devices.contains_key(key)
    }

    pub fn remove(&mut self, key: &DeviceKey) -> Option<DeviceInfo> {
        self.devices.remove(key)
    }

    pub fn all(&self) -> Vec<DeviceInfo> {
        self.devices.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }

    /// Record an inbound message from a known device: refresh its
    /// last-seen time, flag it connected, and take over the fingerprint
    /// if the message carried one. Returns false for unknown keys.
    pub fn mark_connected(
        &mut self,
        key: &DeviceKey,
        unique_id: Option<[u8; 4]>,
        now: Instant,
    ) -> bool {
        let Some(device) = self.devices.get_mut(key) else {
            return false;
        };
        device.last_seen = now;
        device.is_connected = true;
        if let Some(id) = unique_id {
            device.unique_id = id;
        }
        true
    }

    /// Flip connected devices that have been silent longer than the
    /// threshold to disconnected, returning them so the caller can raise
    /// events. Entries are never removed here; a device that comes back
    /// is found again under the same key.
    pub fn sweep_timeouts(&mut self, now: Instant, threshold: Duration) -> Vec<DeviceInfo> {
        let mut timed_out = Vec::new();
        for device in self.devices.values_mut() {
            if device.is_connected
                && now.saturating_duration_since(device.last_seen) > threshold
            {
                device.is_connected = false;
                timed_out.push(device.clone());
            }
        }
        timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(host: &str, port: u16) -> DeviceKey {
        DeviceKey::new(host, port)
    }

    #[test]
    fn test_key_parsing() {
        let k: DeviceKey = "10.0.0.5:5001".parse().unwrap();
        assert_eq!(k, key("10.0.0.5", 5001));

        let k: DeviceKey = "10.0.0.5".parse().unwrap();
        assert_eq!(k, key("10.0.0.5", DEFAULT_DEVICE_PORT));

        assert_eq!(k.to_string(), "10.0.0.5:5001");
    }

    #[test]
    fn test_key_resolves_to_socket_addr() {
        let addr = key("10.0.0.5", 5001).to_socket_addr().unwrap();
        assert_eq!(addr.to_string(), "10.0.0.5:5001");
        assert!(key("not an ip", 5001).to_socket_addr().is_err());
    }

    #[test]
    fn test_upsert_replaces_by_key() {
        let now = Instant::now();
        let mut registry = DeviceRegistry::new();

        registry.upsert(DeviceInfo::new(key("10.0.0.5", 5001), now));
        let mut replacement = DeviceInfo::new(key("10.0.0.5", 5001), now);
        replacement.unique_id = [1, 2, 3, 4];
        registry.upsert(replacement);

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(&key("10.0.0.5", 5001)).unwrap().unique_id,
            [1, 2, 3, 4]
        );
    }

    #[test]
    fn test_mark_connected_refreshes_state() {
        let start = Instant::now();
        let later = start + Duration::from_secs(5);
        let mut registry = DeviceRegistry::new();
        registry.upsert(DeviceInfo::new(key("10.0.0.5", 5001), start));

        assert!(registry.mark_connected(&key("10.0.0.5", 5001), Some([1, 2, 3, 4]), later));

        let device = registry.get(&key("10.0.0.5", 5001)).unwrap();
        assert!(device.is_connected);
        assert_eq!(device.last_seen, later);
        assert_eq!(device.unique_id, [1, 2, 3, 4]);

        assert!(!registry.mark_connected(&key("10.0.0.9", 5001), None, later));
    }

    #[test]
    fn test_sweep_flips_stale_devices_but_keeps_them() {
        let start = Instant::now();
        let timeout = Duration::from_secs(30);
        let mut registry = DeviceRegistry::new();

        registry.upsert(DeviceInfo::new(key("10.0.0.5", 5001), start));
        registry.mark_connected(&key("10.0.0.5", 5001), None, start);

        // Inside the threshold: nothing happens
        assert!(registry
            .sweep_timeouts(start + Duration::from_secs(29), timeout)
            .is_empty());

        // Past the threshold: flipped and reported, still present
        let timed_out = registry.sweep_timeouts(start + Duration::from_secs(31), timeout);
        assert_eq!(timed_out.len(), 1);
        assert_eq!(timed_out[0].key, key("10.0.0.5", 5001));

        let device = registry.get(&key("10.0.0.5", 5001)).unwrap();
        assert!(!device.is_connected);

        // Already disconnected: not reported again
        assert!(registry
            .sweep_timeouts(start + Duration::from_secs(62), timeout)
            .is_empty());
    }

    #[test]
    fn test_device_can_reconnect_after_timeout() {
        let start = Instant::now();
        let timeout = Duration::from_secs(30);
        let mut registry = DeviceRegistry::new();

        registry.upsert(DeviceInfo::new(key("10.0.0.5", 5001), start));
        registry.mark_connected(&key("10.0.0.5", 5001), None, start);
        registry.sweep_timeouts(start + Duration::from_secs(60), timeout);

        let reconnect = start + Duration::from_secs(90);
        assert!(registry.mark_connected(&key("10.0.0.5", 5001), None, reconnect));
        assert!(registry.get(&key("10.0.0.5", 5001)).unwrap().is_connected);
    }
}
