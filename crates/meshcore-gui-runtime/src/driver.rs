//! Device driver interface
//!
//! The radio protocol library is an external collaborator. The runtime only
//! sees it through [`DeviceDriver`] for request/response calls and through
//! the event receiver of a [`DeviceSession`] for unsolicited traffic.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use meshcore_gui_core::{Contact, DevicePatch};

use crate::error::DeviceError;

// ----------------------------------------------------------------------------
// Query Results
// ----------------------------------------------------------------------------

/// Identity and radio parameters reported by the device at app start
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelfInfo {
    pub name: String,
    pub public_key: String,
    pub radio_freq: f64,
    pub radio_sf: u8,
    pub radio_bw: f64,
    pub tx_power: i32,
    pub adv_lat: f64,
    pub adv_lon: f64,
}

impl From<SelfInfo> for DevicePatch {
    fn from(info: SelfInfo) -> Self {
        DevicePatch {
            name: Some(info.name),
            public_key: Some(info.public_key),
            radio_freq: Some(info.radio_freq),
            radio_sf: Some(info.radio_sf),
            radio_bw: Some(info.radio_bw),
            tx_power: Some(info.tx_power),
            adv_lat: Some(info.adv_lat),
            adv_lon: Some(info.adv_lon),
            firmware_version: None,
        }
    }
}

/// Result of a device query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceQuery {
    pub firmware_version: String,
}

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Unsolicited traffic from the device
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    ChannelMessage {
        channel: u8,
        sender: String,
        text: String,
        snr: Option<f32>,
        hop_count: u8,
        /// 1-byte path fragments from the packet metadata, if captured
        path_hashes: Vec<String>,
    },
    DirectMessage {
        pubkey_prefix: String,
        text: String,
        snr: Option<f32>,
        hop_count: u8,
    },
    RxLog {
        snr: f32,
        rssi: i32,
        payload_type: String,
        hop_count: u8,
    },
    /// The link went down
    Disconnected,
}

// ----------------------------------------------------------------------------
// Driver Traits
// ----------------------------------------------------------------------------

/// Request/response operations on a connected device
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// App start handshake returning identity and radio parameters
    async fn self_info(&self) -> Result<SelfInfo, DeviceError>;

    async fn device_query(&self) -> Result<DeviceQuery, DeviceError>;

    async fn get_contacts(&self) -> Result<Vec<Contact>, DeviceError>;

    async fn send_channel_message(&self, channel: u8, text: &str) -> Result<(), DeviceError>;

    async fn send_direct_message(&self, pubkey: &str, text: &str) -> Result<(), DeviceError>;

    /// Broadcast an advert; `flood` lets repeaters forward it
    async fn send_advert(&self, flood: bool) -> Result<(), DeviceError>;

    async fn remove_contact(&self, pubkey: &str) -> Result<(), DeviceError>;

    /// `true` means newly seen contacts need manual approval
    async fn set_manual_add_contacts(&self, manual: bool) -> Result<(), DeviceError>;

    async fn set_name(&self, name: &str) -> Result<(), DeviceError>;

    /// Ask the device to push queued messages as events
    async fn start_auto_message_fetching(&self) -> Result<(), DeviceError>;

    async fn disconnect(&self) -> Result<(), DeviceError>;
}

/// A connected driver plus the receiving end of its event stream
pub struct DeviceSession {
    pub driver: Arc<dyn DeviceDriver>,
    pub events: mpsc::Receiver<DeviceEvent>,
}

impl DeviceSession {
    pub fn new(driver: Arc<dyn DeviceDriver>, events: mpsc::Receiver<DeviceEvent>) -> Self {
        Self { driver, events }
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession").finish_non_exhaustive()
    }
}

/// Opens sessions to a device address
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self, address: &str) -> Result<DeviceSession, DeviceError>;
}

// ----------------------------------------------------------------------------
// Bond Removal
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondRemoval {
    Removed,
    /// No pairing record existed; counts as success
    AlreadyAbsent,
}

/// Removes the host's stored pairing record for a peripheral
#[async_trait]
pub trait BondRemover: Send + Sync {
    async fn remove_bond(&self, address: &str) -> Result<BondRemoval, DeviceError>;
}
