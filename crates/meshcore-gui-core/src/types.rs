//! Record types shared between the device worker and the presentation layer

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Ordered 1-byte path-hash fragments ("b8", "7b", ...) as hex strings
pub type PathHashes = SmallVec<[String; 8]>;

/// Get current timestamp in milliseconds
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ----------------------------------------------------------------------------
// Device
// ----------------------------------------------------------------------------

/// Identity and radio parameters of the locally attached device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Advertised device name
    pub name: String,
    /// Device public key as hex string
    pub public_key: String,
    /// Radio frequency in MHz
    pub radio_freq: f64,
    /// LoRa spreading factor
    pub radio_sf: u8,
    /// Bandwidth in kHz
    pub radio_bw: f64,
    /// Transmit power in dBm
    pub tx_power: i32,
    /// Advertised latitude
    pub adv_lat: f64,
    /// Advertised longitude
    pub adv_lon: f64,
    /// Firmware version string
    pub firmware_version: String,
}

impl DeviceState {
    /// Advertised position of the device
    pub fn position(&self) -> Position {
        Position::new(self.adv_lat, self.adv_lon)
    }
}

/// Partial device update; `None` fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DevicePatch {
    pub name: Option<String>,
    pub public_key: Option<String>,
    pub radio_freq: Option<f64>,
    pub radio_sf: Option<u8>,
    pub radio_bw: Option<f64>,
    pub tx_power: Option<i32>,
    pub adv_lat: Option<f64>,
    pub adv_lon: Option<f64>,
    pub firmware_version: Option<String>,
}

impl DevicePatch {
    /// Patch that only carries a firmware version
    pub fn firmware(version: impl Into<String>) -> Self {
        Self {
            firmware_version: Some(version.into()),
            ..Default::default()
        }
    }

    /// Apply the present fields to `device`
    pub fn apply(self, device: &mut DeviceState) {
        if let Some(name) = self.name {
            device.name = name;
        }
        if let Some(public_key) = self.public_key {
            device.public_key = public_key;
        }
        if let Some(freq) = self.radio_freq {
            device.radio_freq = freq;
        }
        if let Some(sf) = self.radio_sf {
            device.radio_sf = sf;
        }
        if let Some(bw) = self.radio_bw {
            device.radio_bw = bw;
        }
        if let Some(power) = self.tx_power {
            device.tx_power = power;
        }
        if let Some(lat) = self.adv_lat {
            device.adv_lat = lat;
        }
        if let Some(lon) = self.adv_lon {
            device.adv_lon = lon;
        }
        if let Some(version) = self.firmware_version {
            device.firmware_version = version;
        }
    }
}

/// Link state plus the free-text status line shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub message: String,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            connected: false,
            message: "Starting...".to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Contacts and Channels
// ----------------------------------------------------------------------------

/// Geographic position; (0, 0) means "not advertised"
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether this carries a real (non-zero) position
    pub fn is_set(&self) -> bool {
        self.latitude != 0.0 || self.longitude != 0.0
    }
}

/// Contact kind as advertised by the node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactType {
    #[default]
    Plain,
    Client,
    Repeater,
    Room,
}

impl From<u8> for ContactType {
    fn from(value: u8) -> Self {
        match value {
            1 => ContactType::Client,
            2 => ContactType::Repeater,
            3 => ContactType::Room,
            _ => ContactType::Plain,
        }
    }
}

impl core::fmt::Display for ContactType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ContactType::Plain => write!(f, "-"),
            ContactType::Client => write!(f, "CLI"),
            ContactType::Repeater => write!(f, "REP"),
            ContactType::Room => write!(f, "ROOM"),
        }
    }
}

/// Route a contact was last reached over, as stored on the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRoute {
    /// Hex string, two characters per hop
    pub out_path: String,
    /// Number of hops encoded in `out_path`
    pub hop_count: usize,
}

/// A node known to the device, identified by its public key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// Full public key as hex string
    pub public_key: String,
    /// Advertised display name
    pub name: String,
    pub contact_type: ContactType,
    pub position: Option<Position>,
    pub route: Option<StoredRoute>,
}

impl Contact {
    pub fn new(
        public_key: impl Into<String>,
        name: impl Into<String>,
        contact_type: ContactType,
    ) -> Self {
        Self {
            public_key: public_key.into(),
            name: name.into(),
            contact_type,
            position: None,
            route: None,
        }
    }

    pub fn with_position(mut self, latitude: f64, longitude: f64) -> Self {
        self.position = Some(Position::new(latitude, longitude));
        self
    }

    pub fn with_route(mut self, out_path: impl Into<String>, hop_count: usize) -> Self {
        self.route = Some(StoredRoute {
            out_path: out_path.into(),
            hop_count,
        });
        self
    }
}

/// A configured group channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub index: u8,
    pub name: String,
}

impl Channel {
    pub fn new(index: u8, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Messages and RX Log
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
}

/// A chat message, either received from the mesh or sent by this host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub sender: String,
    pub text: String,
    /// Channel index; `None` for a direct message
    pub channel: Option<u8>,
    pub direction: Direction,
    /// Signal-to-noise ratio at reception
    pub snr: Option<f32>,
    pub hop_count: u8,
    /// Path-hash fragments captured from the received packet
    pub path_hashes: Option<PathHashes>,
    pub sender_pubkey: Option<String>,
}

impl Message {
    /// Outbound message to a channel
    pub fn outgoing_channel(channel: u8, text: impl Into<String>) -> Self {
        Self::outgoing(Some(channel), text.into(), None)
    }

    /// Outbound direct message to `pubkey`
    pub fn outgoing_direct(pubkey: impl Into<String>, text: impl Into<String>) -> Self {
        Self::outgoing(None, text.into(), Some(pubkey.into()))
    }

    fn outgoing(channel: Option<u8>, text: String, sender_pubkey: Option<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            sender: "Me".to_string(),
            text,
            channel,
            direction: Direction::Out,
            snr: None,
            hop_count: 0,
            path_hashes: None,
            sender_pubkey,
        }
    }

    /// Inbound message; channel `None` marks a direct message
    pub fn incoming(sender: impl Into<String>, text: impl Into<String>, channel: Option<u8>) -> Self {
        Self {
            timestamp: current_timestamp(),
            sender: sender.into(),
            text: text.into(),
            channel,
            direction: Direction::In,
            snr: None,
            hop_count: 0,
            path_hashes: None,
            sender_pubkey: None,
        }
    }

    pub fn with_snr(mut self, snr: Option<f32>) -> Self {
        self.snr = snr;
        self
    }

    pub fn with_hop_count(mut self, hop_count: u8) -> Self {
        self.hop_count = hop_count;
        self
    }

    pub fn with_path_hashes<I, S>(mut self, hashes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path_hashes = Some(hashes.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_sender_pubkey(mut self, pubkey: impl Into<String>) -> Self {
        let pubkey = pubkey.into();
        self.sender_pubkey = if pubkey.is_empty() { None } else { Some(pubkey) };
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_direct_message(&self) -> bool {
        self.channel.is_none()
    }
}

/// One raw receive record from the radio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RxLogEntry {
    pub timestamp: u64,
    pub snr: f32,
    pub rssi: i32,
    pub payload_type: String,
    pub hop_count: u8,
}

impl RxLogEntry {
    pub fn new(snr: f32, rssi: i32, payload_type: impl Into<String>, hop_count: u8) -> Self {
        Self {
            timestamp: current_timestamp(),
            snr,
            rssi,
            payload_type: payload_type.into(),
            hop_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_patch_keeps_absent_fields() {
        let mut device = DeviceState {
            name: "node".to_string(),
            radio_sf: 11,
            ..Default::default()
        };

        DevicePatch::firmware("v1.9.0").apply(&mut device);

        assert_eq!(device.name, "node");
        assert_eq!(device.radio_sf, 11);
        assert_eq!(device.firmware_version, "v1.9.0");
    }

    #[test]
    fn test_position_zero_is_unset() {
        assert!(!Position::default().is_set());
        assert!(Position::new(52.5, 0.0).is_set());
    }

    #[test]
    fn test_contact_type_from_wire_value() {
        assert_eq!(ContactType::from(2), ContactType::Repeater);
        assert_eq!(ContactType::from(9), ContactType::Plain);
    }

    #[test]
    fn test_empty_sender_pubkey_is_none() {
        let msg = Message::incoming("alice", "hi", Some(0)).with_sender_pubkey("");
        assert!(msg.sender_pubkey.is_none());
    }
}
