//! Bond removal through BlueZ
//!
//! A stale pairing record makes BlueZ refuse to reconnect to a peripheral
//! that rebooted. [`BluezBondRemover`] deletes it over D-Bus, the same as
//! `bluetoothctl remove <address>`.

use async_trait::async_trait;
use bluer::{Address, ErrorKind};
use tracing::{debug, info, warn};

use crate::driver::{BondRemoval, BondRemover};
use crate::error::DeviceError;

/// Strip the `literal:` prefix some BLE address strings carry
pub fn clean_address(address: &str) -> &str {
    address.strip_prefix("literal:").unwrap_or(address)
}

fn parse_address(address: &str) -> Result<Address, DeviceError> {
    let cleaned = clean_address(address);
    cleaned
        .parse::<Address>()
        .map_err(|e| DeviceError::Transport(format!("Invalid BLE address '{}': {}", cleaned, e)))
}

/// Map the result of `remove_device`; a missing device counts as removed
fn classify_removal(result: Result<(), bluer::Error>) -> Result<BondRemoval, DeviceError> {
    match result {
        Ok(()) => Ok(BondRemoval::Removed),
        Err(e) if matches!(e.kind, ErrorKind::DoesNotExist | ErrorKind::NotFound) => {
            Ok(BondRemoval::AlreadyAbsent)
        }
        Err(e) => Err(DeviceError::Transport(format!("BlueZ remove_device: {}", e))),
    }
}

// ----------------------------------------------------------------------------
// BlueZ Implementation
// ----------------------------------------------------------------------------

/// [`BondRemover`] backed by the default BlueZ adapter
#[derive(Debug, Clone, Default)]
pub struct BluezBondRemover;

impl BluezBondRemover {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BondRemover for BluezBondRemover {
    async fn remove_bond(&self, address: &str) -> Result<BondRemoval, DeviceError> {
        let address = parse_address(address)?;

        let session = bluer::Session::new()
            .await
            .map_err(|e| DeviceError::Transport(format!("BlueZ session: {}", e)))?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|e| DeviceError::Transport(format!("BLE adapter: {}", e)))?;

        debug!("Removing bond for {} on {}", address, adapter.name());
        match classify_removal(adapter.remove_device(address).await) {
            Ok(BondRemoval::Removed) => {
                info!("Bond removed for {}", address);
                Ok(BondRemoval::Removed)
            }
            Ok(BondRemoval::AlreadyAbsent) => {
                debug!("Bond was already removed for {}", address);
                Ok(BondRemoval::AlreadyAbsent)
            }
            Err(e) => {
                warn!("Bond removal failed for {}: {}", address, e);
                Err(e)
            }
        }
    }
}
