//! Resilient bulk load of device data
//!
//! Identity and device queries are retried a fixed number of times on
//! transient errors; giving up only leaves a status line behind. Channels
//! come from configuration because reading them over BLE is unreliable.
//! Contacts are fetched once per load.
//!
//! Whatever could not be loaded is collected in a [`LoadReport`] and kept
//! in the final status line, since intermediate statuses are overwritten
//! as soon as the next step starts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use meshcore_gui_core::{Channel, DevicePatch, SharedState};

use crate::config::RuntimeConfig;
use crate::dispatcher::RefreshHandler;
use crate::driver::DeviceDriver;
use crate::error::DeviceError;

/// What a load could not fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Short lowercase notes, e.g. "firmware version unavailable"
    pub warnings: Vec<String>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// `status` followed by the warnings in parentheses, if any
    pub fn annotate(&self, status: &str) -> String {
        if self.warnings.is_empty() {
            status.to_string()
        } else {
            format!("{} ({})", status, self.warnings.join(", "))
        }
    }
}

pub struct DataLoader {
    state: Arc<SharedState>,
    channels: Vec<Channel>,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl DataLoader {
    pub fn new(state: Arc<SharedState>, channels: Vec<Channel>) -> Self {
        Self {
            state,
            channels,
            retry_attempts: 5,
            retry_delay: Duration::from_millis(300),
        }
    }

    pub fn from_config(state: Arc<SharedState>, config: &RuntimeConfig) -> Self {
        Self::new(state, config.device.channels.clone())
            .with_retry(config.worker.load_retry_attempts, config.load_retry_delay())
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    /// Run the full load against `driver`
    ///
    /// Only a lost connection is returned as an error; everything else ends
    /// up in the returned report and the status line.
    pub async fn load(&self, driver: &dyn DeviceDriver) -> Result<LoadReport, DeviceError> {
        let mut report = LoadReport::default();

        self.state.set_status("Loading device info...");
        match self.with_retry_loop("send_appstart", || driver.self_info()).await? {
            Some(info) => {
                info!("Device info loaded: {}", info.name);
                self.state.update_device(DevicePatch::from(info));
            }
            None => report.warn("device info unavailable"),
        }

        match self
            .with_retry_loop("send_device_query", || driver.device_query())
            .await?
        {
            Some(query) => {
                info!("Device query loaded: firmware {}", query.firmware_version);
                self.state
                    .update_device(DevicePatch::firmware(query.firmware_version));
            }
            None => report.warn("firmware version unavailable"),
        }

        self.state.set_status("Loading channels...");
        self.state.replace_channels(self.channels.clone());
        debug!(
            "Channels loaded: {:?}",
            self.channels.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
        );

        self.state.set_status("Loading contacts...");
        match driver.get_contacts().await {
            Ok(contacts) => {
                let count = contacts.len();
                self.state.replace_contacts(contacts);
                info!("Contacts loaded: {} contacts", count);
                self.state
                    .set_status(report.annotate(&format!("{} contacts loaded", count)));
            }
            Err(e) if e.is_connection_lost() => return Err(e),
            Err(e) => {
                warn!("Contact load failed: {}", e);
                self.state
                    .set_status(report.annotate(&format!("Contacts unavailable: {}", e)));
                report.warn("contacts unavailable");
            }
        }

        Ok(report)
    }

    /// Retry `op` on transient errors; `Ok(None)` once it gives up
    async fn with_retry_loop<T, F, Fut>(&self, name: &str, mut op: F) -> Result<Option<T>, DeviceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DeviceError>>,
    {
        for attempt in 1..=self.retry_attempts {
            debug!("{} attempt {}", name, attempt);
            match op().await {
                Ok(value) => return Ok(Some(value)),
                Err(e) if e.is_connection_lost() => return Err(e),
                Err(e) if e.is_transient() => {
                    debug!("{} attempt {} failed: {}", name, attempt, e);
                    if attempt < self.retry_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                Err(e) => {
                    warn!("{} failed: {}", name, e);
                    return Ok(None);
                }
            }
        }
        warn!("{} gave up after {} attempts", name, self.retry_attempts);
        Ok(None)
    }
}

#[async_trait]
impl RefreshHandler for DataLoader {
    async fn refresh(&self, driver: &dyn DeviceDriver) -> Result<(), DeviceError> {
        self.load(driver).await.map(|_| ())
    }
}
