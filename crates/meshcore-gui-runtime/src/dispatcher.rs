//! Command execution against the device
//!
//! The [`CommandDispatcher`] drains the command queue of [`SharedState`] and
//! runs one handler per [`Command`] variant, strictly one at a time. Handler
//! failures are turned into status lines and, for mode flags, a rollback of
//! the stored value. Only a lost connection is returned to the caller, so the
//! worker can start reconnecting.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use meshcore_gui_core::{Command, Message, SharedState};

use crate::config::RuntimeConfig;
use crate::driver::DeviceDriver;
use crate::error::DeviceError;

/// Default pause between removals of a purge
pub const DEFAULT_PURGE_PAUSE: Duration = Duration::from_millis(500);

// ----------------------------------------------------------------------------
// Collaborators
// ----------------------------------------------------------------------------

/// Re-runs the bulk data load; registered after construction
#[async_trait]
pub trait RefreshHandler: Send + Sync {
    async fn refresh(&self, driver: &dyn DeviceDriver) -> Result<(), DeviceError>;
}

/// The two names the device alternates between
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNames {
    pub regular: String,
    pub bot: String,
}

impl DeviceNames {
    pub fn new(regular: impl Into<String>, bot: impl Into<String>) -> Self {
        Self {
            regular: regular.into(),
            bot: bot.into(),
        }
    }

    pub fn for_mode(&self, bot_enabled: bool) -> &str {
        if bot_enabled {
            &self.bot
        } else {
            &self.regular
        }
    }
}

// ----------------------------------------------------------------------------
// Outcomes
// ----------------------------------------------------------------------------

/// Result of changing a boolean device setting
#[derive(Debug)]
pub enum SettingOutcome {
    Confirmed,
    /// Sent, but the reply could not be parsed; the requested value is kept
    Provisional { detail: String },
    /// The device refused; the flag goes back to `previous`
    Rejected { error: DeviceError, previous: bool },
}

impl SettingOutcome {
    /// Classify a driver result for a toggle to `requested`
    ///
    /// The flag is a toggle, so the value before the request is `!requested`.
    /// With `accept_malformed` a malformed response counts as provisional
    /// success instead of a rejection.
    pub fn resolve(result: Result<(), DeviceError>, requested: bool, accept_malformed: bool) -> Self {
        match result {
            Ok(()) => SettingOutcome::Confirmed,
            Err(DeviceError::MalformedResponse { detail }) if accept_malformed => {
                SettingOutcome::Provisional { detail }
            }
            Err(error) => SettingOutcome::Rejected {
                error,
                previous: !requested,
            },
        }
    }

    /// Value the stored flag should hold afterwards
    pub fn stored_value(&self, requested: bool) -> bool {
        match self {
            SettingOutcome::Confirmed | SettingOutcome::Provisional { .. } => requested,
            SettingOutcome::Rejected { previous, .. } => *previous,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, SettingOutcome::Rejected { .. })
    }

    /// Hand back a lost connection so the worker can react to it
    fn into_connection_lost(self) -> Result<(), DeviceError> {
        match self {
            SettingOutcome::Rejected { error, .. } if error.is_connection_lost() => Err(error),
            _ => Ok(()),
        }
    }
}

/// Counts of a finished purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub total: usize,
    pub removed: usize,
    pub failed: usize,
}

impl PurgeReport {
    /// Status line describing the result
    pub fn summary(&self) -> String {
        if self.failed > 0 {
            format!("{} contacts removed, {} failed", self.removed, self.failed)
        } else {
            format!("{} contacts removed from device", self.removed)
        }
    }
}

// ----------------------------------------------------------------------------
// Command Dispatcher
// ----------------------------------------------------------------------------

pub struct CommandDispatcher {
    state: Arc<SharedState>,
    names: DeviceNames,
    purge_pause: Duration,
    refresh: Option<Arc<dyn RefreshHandler>>,
}

impl CommandDispatcher {
    pub fn new(state: Arc<SharedState>, names: DeviceNames) -> Self {
        Self {
            state,
            names,
            purge_pause: DEFAULT_PURGE_PAUSE,
            refresh: None,
        }
    }

    pub fn from_config(state: Arc<SharedState>, config: &RuntimeConfig) -> Self {
        let names = DeviceNames::new(
            config.device.device_name.clone(),
            config.device.bot_device_name.clone(),
        );
        Self::new(state, names).with_purge_pause(config.purge_pause())
    }

    pub fn with_purge_pause(mut self, pause: Duration) -> Self {
        self.purge_pause = pause;
        self
    }

    /// Register the handler behind `refresh` and post-purge resyncs
    pub fn set_refresh_handler(&mut self, handler: Arc<dyn RefreshHandler>) {
        self.refresh = Some(handler);
    }

    /// Drain the whole queue, returning how many commands ran
    ///
    /// Stops at the first lost connection; anything still queued stays
    /// there for after the reconnect.
    pub async fn process_all(&self, driver: &dyn DeviceDriver) -> Result<usize, DeviceError> {
        let mut processed = 0;
        while let Some(command) = self.state.dequeue_command() {
            processed += 1;
            self.dispatch(driver, command).await?;
        }
        Ok(processed)
    }

    pub async fn dispatch(&self, driver: &dyn DeviceDriver, command: Command) -> Result<(), DeviceError> {
        match command {
            Command::SendMessage { channel, text, bot } => {
                self.send_message(driver, channel, &text, bot).await
            }
            Command::SendDm {
                pubkey,
                text,
                contact_name,
            } => self.send_dm(driver, &pubkey, &text, contact_name).await,
            Command::SendAdvert => self.send_advert(driver).await,
            Command::Refresh => {
                debug!("Refresh requested");
                self.run_refresh(driver).await
            }
            Command::PurgeUnpinned { pubkeys } => {
                self.purge_unpinned(driver, &pubkeys).await.map(|_| ())
            }
            Command::SetAutoAdd { enabled } => self.set_auto_add(driver, enabled).await,
            Command::SetDeviceName { bot_enabled } => {
                self.set_device_name(driver, bot_enabled).await
            }
            Command::Unknown => {
                debug!("Unknown command action dropped");
                Ok(())
            }
        }
    }

    /// Log a failed command and show it as status; only a lost link propagates
    fn surface(&self, context: &str, error: DeviceError) -> Result<(), DeviceError> {
        if error.is_connection_lost() {
            return Err(error);
        }
        warn!("{}: {}", context, error);
        self.state.set_status(format!("{}: {}", context, error));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    async fn send_message(
        &self,
        driver: &dyn DeviceDriver,
        channel: u8,
        text: &str,
        bot: bool,
    ) -> Result<(), DeviceError> {
        if text.is_empty() {
            debug!("Skipping empty channel message");
            return Ok(());
        }
        if let Err(e) = driver.send_channel_message(channel, text).await {
            return self.surface("Send failed", e);
        }
        if !bot {
            self.state.add_message(Message::outgoing_channel(channel, text));
        }
        debug!(
            "{} message to channel {}: {}",
            if bot { "BOT" } else { "Sent" },
            channel,
            text.chars().take(30).collect::<String>()
        );
        Ok(())
    }

    async fn send_dm(
        &self,
        driver: &dyn DeviceDriver,
        pubkey: &str,
        text: &str,
        contact_name: Option<String>,
    ) -> Result<(), DeviceError> {
        if text.is_empty() || pubkey.is_empty() {
            debug!("Skipping direct message without text or recipient");
            return Ok(());
        }
        if let Err(e) = driver.send_direct_message(pubkey, text).await {
            return self.surface("Direct message failed", e);
        }
        self.state.add_message(Message::outgoing_direct(pubkey, text));
        let name = contact_name.unwrap_or_else(|| pubkey.chars().take(8).collect());
        debug!(
            "Sent DM to {}: {}",
            name,
            text.chars().take(30).collect::<String>()
        );
        Ok(())
    }

    async fn send_advert(&self, driver: &dyn DeviceDriver) -> Result<(), DeviceError> {
        match driver.send_advert(true).await {
            Ok(()) => {
                self.state.set_status("Advert sent");
                debug!("Advert sent");
                Ok(())
            }
            Err(e) => self.surface("Advert failed", e),
        }
    }

    async fn run_refresh(&self, driver: &dyn DeviceDriver) -> Result<(), DeviceError> {
        match &self.refresh {
            Some(handler) => handler.refresh(driver).await,
            None => {
                debug!("No refresh handler registered");
                Ok(())
            }
        }
    }

    /// Remove every listed contact, then resync once
    ///
    /// Individual failures are counted and never stop the run.
    pub async fn purge_unpinned(
        &self,
        driver: &dyn DeviceDriver,
        pubkeys: &[String],
    ) -> Result<PurgeReport, DeviceError> {
        if pubkeys.is_empty() {
            self.state.set_status("No contacts to remove");
            return Ok(PurgeReport::default());
        }

        let mut report = PurgeReport {
            total: pubkeys.len(),
            ..Default::default()
        };
        self.state
            .set_status(format!("Removing {} contacts...", report.total));
        debug!("Purge: starting removal of {} contacts", report.total);

        for (i, pubkey) in pubkeys.iter().enumerate() {
            let position = i + 1;
            let short: String = pubkey.chars().take(16).collect();
            match driver.remove_contact(pubkey).await {
                Ok(()) => {
                    report.removed += 1;
                    debug!("Purge: removed {} ({}/{})", short, position, report.total);
                }
                Err(e) => {
                    report.failed += 1;
                    debug!("Purge: remove_contact({}) failed: {}", short, e);
                }
            }

            self.state
                .set_status(format!("Removing... {}/{}", position, report.total));

            if position < report.total {
                tokio::time::sleep(self.purge_pause).await;
            }
        }

        let summary = report.summary();
        info!("Purge: {}", summary);
        self.state.set_status(summary);

        self.run_refresh(driver).await?;
        Ok(report)
    }

    async fn set_auto_add(&self, driver: &dyn DeviceDriver, enabled: bool) -> Result<(), DeviceError> {
        let label = if enabled { "ON" } else { "OFF" };
        // The device flag means "manual approval", the inverse of auto-add
        let result = driver.set_manual_add_contacts(!enabled).await;
        let outcome = SettingOutcome::resolve(result, enabled, true);
        self.state
            .set_auto_add_enabled(outcome.stored_value(enabled));

        match &outcome {
            SettingOutcome::Confirmed => {
                self.state.set_status(format!("Auto-add contacts: {}", label));
                debug!("set_auto_add: success -> {}", label);
            }
            SettingOutcome::Provisional { detail } => {
                self.state.set_status(format!("Auto-add contacts: {}", label));
                debug!(
                    "set_auto_add: unreadable reply ({}), command was sent, keeping {}",
                    detail, label
                );
            }
            SettingOutcome::Rejected { error, previous } => {
                warn!("set_auto_add failed, rolled back to {}: {}", previous, error);
                self.state
                    .set_status(format!("Failed to change auto-add setting: {}", error));
            }
        }
        outcome.into_connection_lost()
    }

    async fn set_device_name(&self, driver: &dyn DeviceDriver, bot_enabled: bool) -> Result<(), DeviceError> {
        let target = self.names.for_mode(bot_enabled).to_string();
        let result = driver.set_name(&target).await;
        let outcome = SettingOutcome::resolve(result, bot_enabled, false);
        self.state.set_bot_enabled(outcome.stored_value(bot_enabled));

        if let SettingOutcome::Rejected { error, previous } = &outcome {
            warn!(
                "set_device_name '{}' failed, bot mode rolled back to {}: {}",
                target, previous, error
            );
            self.state
                .set_status(format!("Failed to set device name to '{}'", target));
            return outcome.into_connection_lost();
        }

        self.state.set_status(format!("Device name set to {}", target));
        debug!("set_device_name: success -> '{}'", target);

        // Let the mesh learn the new name
        if let Err(e) = driver.send_advert(true).await {
            return self.surface("Advert after rename failed", e);
        }
        debug!("set_device_name: advert sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_reply_keeps_requested_value() {
        let outcome = SettingOutcome::resolve(Err(DeviceError::malformed("telemetry_mode_base")), true, true);
        assert!(!outcome.is_rejected());
        assert!(outcome.stored_value(true));
    }

    #[test]
    fn test_rejection_restores_previous_value() {
        let outcome = SettingOutcome::resolve(Err(DeviceError::rejected("busy")), true, true);
        assert!(outcome.is_rejected());
        assert!(!outcome.stored_value(true));

        let outcome = SettingOutcome::resolve(Err(DeviceError::malformed("x")), false, false);
        assert!(outcome.stored_value(false));
    }

    #[test]
    fn test_purge_summary() {
        let report = PurgeReport {
            total: 3,
            removed: 2,
            failed: 1,
        };
        assert_eq!(report.summary(), "2 contacts removed, 1 failed");

        let report = PurgeReport {
            total: 2,
            removed: 2,
            failed: 0,
        };
        assert_eq!(report.summary(), "2 contacts removed from device");
    }

    #[test]
    fn test_device_names_for_mode() {
        let names = DeviceNames::new("PE1HVH T1000e", "PE1HVH Bot");
        assert_eq!(names.for_mode(false), "PE1HVH T1000e");
        assert_eq!(names.for_mode(true), "PE1HVH Bot");
    }
}
