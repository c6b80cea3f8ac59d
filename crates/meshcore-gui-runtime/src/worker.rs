//! Device worker
//!
//! Owns the device session for its whole lifetime. After connecting it runs
//! the bulk load, then loops on two sources: device events from the session
//! channel and a fixed tick on which the command queue is drained. A lost
//! link sends it through the [`ReconnectPolicy`] before anything else runs,
//! so no command or refresh reaches the device while a reconnect is in
//! flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use meshcore_gui_core::{Message, RxLogEntry, SharedState};

use crate::config::RuntimeConfig;
use crate::dispatcher::CommandDispatcher;
use crate::driver::{BondRemover, ConnectionFactory, DeviceDriver, DeviceEvent, DeviceSession};
use crate::error::{DeviceError, Result, RuntimeError};
use crate::loader::{DataLoader, LoadReport};
use crate::reconnect::{ReconnectOutcome, ReconnectPolicy};

/// Longest sender name stored with a received message
pub const MAX_SENDER_LEN: usize = 15;

fn truncate_sender(sender: &str) -> String {
    sender.chars().take(MAX_SENDER_LEN).collect()
}

// ----------------------------------------------------------------------------
// Worker Handle
// ----------------------------------------------------------------------------

/// Cooperative stop switch for a running worker
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    running: Arc<AtomicBool>,
}

impl WorkerHandle {
    pub(crate) fn from_flag(running: Arc<AtomicBool>) -> Self {
        Self { running }
    }

    /// Ask the worker to stop after its current tick
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------------
// Device Worker
// ----------------------------------------------------------------------------

enum Step {
    Event(Option<DeviceEvent>),
    Tick,
}

pub struct DeviceWorker {
    config: RuntimeConfig,
    state: Arc<SharedState>,
    factory: Arc<dyn ConnectionFactory>,
    dispatcher: CommandDispatcher,
    loader: Arc<DataLoader>,
    reconnect: ReconnectPolicy,
    session: Option<DeviceSession>,
    running: Arc<AtomicBool>,
}

impl DeviceWorker {
    /// Build a worker for `config`, which must pass validation
    pub fn new(
        config: RuntimeConfig,
        state: Arc<SharedState>,
        factory: Arc<dyn ConnectionFactory>,
        bond_remover: Arc<dyn BondRemover>,
    ) -> Result<Self> {
        config.validate()?;
        let loader = Arc::new(DataLoader::from_config(state.clone(), &config));
        let mut dispatcher = CommandDispatcher::from_config(state.clone(), &config);
        dispatcher.set_refresh_handler(loader.clone());
        let reconnect = ReconnectPolicy::from_config(&config, bond_remover);

        Ok(Self {
            config,
            state,
            factory,
            dispatcher,
            loader,
            reconnect,
            session: None,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle::from_flag(self.running.clone())
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn driver(&self) -> Option<Arc<dyn DeviceDriver>> {
        self.session.as_ref().map(|s| s.driver.clone())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Connect, load device data and enable message fetching
    pub async fn start(&mut self) -> Result<()> {
        let address = self.config.device.address.clone();
        self.state
            .set_status(format!("Connecting to {}...", address));
        info!("Connecting to {}...", address);

        let session = self.factory.connect(&address).await?;
        info!("Connected to {}", address);
        let driver = session.driver.clone();
        self.session = Some(session);

        match self.initialize(driver.as_ref()).await {
            Ok(report) => {
                self.state.set_connected(true);
                self.state.set_status(report.annotate("Connected"));
                info!("Device ready");
                Ok(())
            }
            Err(e) if e.is_connection_lost() => self.recover().await,
            Err(e) => Err(e.into()),
        }
    }

    /// Run until stopped or until reconnecting gives up
    pub async fn run(mut self) -> Result<()> {
        if let Err(e) = self.start().await {
            error!("Connection error: {}", e);
            // Exhaustion already left its own status
            if !matches!(e, RuntimeError::ReconnectExhausted { .. }) {
                self.state.set_status(format!("Connection error: {}", e));
            }
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running.load(Ordering::SeqCst) {
            let step = match self.session.as_mut() {
                Some(session) => tokio::select! {
                    event = session.events.recv() => Step::Event(event),
                    _ = ticker.tick() => Step::Tick,
                },
                None => {
                    ticker.tick().await;
                    Step::Tick
                }
            };

            let result = match step {
                Step::Event(Some(event)) => self.handle_event(event).await,
                Step::Event(None) => {
                    warn!("Device event channel closed");
                    self.recover().await
                }
                Step::Tick => self.drain_commands().await,
            };

            if let Err(e) = result {
                error!("Device worker stopping: {}", e);
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }

        if let Some(session) = self.session.take() {
            if let Err(e) = session.driver.disconnect().await {
                debug!("Disconnect on shutdown failed: {}", e);
            }
        }
        self.state.set_connected(false);
        info!("Device worker stopped");
        Ok(())
    }

    /// Run on a dedicated OS thread with its own current-thread runtime
    pub fn spawn_thread(self) -> std::io::Result<(WorkerHandle, JoinHandle<Result<()>>)> {
        let handle = self.handle();
        let join = std::thread::Builder::new()
            .name("device-worker".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| RuntimeError::Runtime(format!("Failed to build runtime: {}", e)))?;
                runtime.block_on(self.run())
            })?;
        debug!("Device worker thread started");
        Ok((handle, join))
    }

    // ------------------------------------------------------------------
    // Connection handling
    // ------------------------------------------------------------------

    /// Post-connect sequence shared by startup and reconnect
    async fn initialize(&self, driver: &dyn DeviceDriver) -> std::result::Result<LoadReport, DeviceError> {
        tokio::time::sleep(self.config.connect_settle()).await;
        let mut report = self.loader.load(driver).await?;

        match driver.start_auto_message_fetching().await {
            Ok(()) => {}
            Err(e) if e.is_connection_lost() => return Err(e),
            Err(e) => {
                warn!("Could not start message fetching: {}", e);
                report.warn("message fetching unavailable");
            }
        }
        Ok(report)
    }

    /// Reconnect after link loss and reload
    ///
    /// A session that drops again while reloading uses up its attempt, so
    /// the whole recovery never exceeds the policy's budget. Fails only when
    /// every attempt was used up.
    async fn recover(&mut self) -> Result<()> {
        let address = self.config.device.address.clone();
        let mut next_attempt = 1;

        loop {
            warn!("Connection to {} lost", address);
            self.state.set_connected(false);
            self.state.set_status("Connection lost, reconnecting...");
            self.session = None;

            let outcome = self
                .reconnect
                .reconnect_from(self.factory.as_ref(), &address, next_attempt)
                .await;
            match outcome {
                ReconnectOutcome::Reconnected { session, attempts } => {
                    let driver = session.driver.clone();
                    self.session = Some(session);
                    match self.initialize(driver.as_ref()).await {
                        Ok(report) => {
                            self.state.set_connected(true);
                            self.state.set_status(report.annotate(&format!(
                                "Reconnected after attempt {}",
                                attempts
                            )));
                            return Ok(());
                        }
                        Err(e) if e.is_connection_lost() => {
                            warn!("Connection lost again while reloading after attempt {}", attempts);
                            next_attempt = attempts + 1;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                ReconnectOutcome::Exhausted { attempts } => {
                    self.state
                        .set_status(format!("Reconnect failed after {} attempts", attempts));
                    return Err(RuntimeError::ReconnectExhausted { attempts });
                }
            }
        }
    }

    async fn drain_commands(&mut self) -> Result<()> {
        let Some(driver) = self.driver() else {
            return Ok(());
        };

        match self.dispatcher.process_all(driver.as_ref()).await {
            Ok(0) => Ok(()),
            Ok(count) => {
                debug!("Processed {} commands", count);
                Ok(())
            }
            Err(e) if e.is_connection_lost() => self.recover().await,
            Err(e) => {
                warn!("Command processing failed: {}", e);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Event ingestion
    // ------------------------------------------------------------------

    async fn handle_event(&mut self, event: DeviceEvent) -> Result<()> {
        match event {
            DeviceEvent::ChannelMessage {
                channel,
                sender,
                text,
                snr,
                hop_count,
                path_hashes,
            } => {
                let mut message = Message::incoming(truncate_sender(&sender), text, Some(channel))
                    .with_snr(snr)
                    .with_hop_count(hop_count);
                if !path_hashes.is_empty() {
                    message = message.with_path_hashes(path_hashes);
                }
                self.state.add_message(message);
            }
            DeviceEvent::DirectMessage {
                pubkey_prefix,
                text,
                snr,
                hop_count,
            } => {
                let sender = self.state.lookup_contact_name_by_prefix(&pubkey_prefix);
                debug!(
                    "DM received from {}: {}",
                    sender,
                    text.chars().take(30).collect::<String>()
                );
                let message = Message::incoming(truncate_sender(&sender), text, None)
                    .with_snr(snr)
                    .with_hop_count(hop_count)
                    .with_sender_pubkey(pubkey_prefix);
                self.state.add_message(message);
            }
            DeviceEvent::RxLog {
                snr,
                rssi,
                payload_type,
                hop_count,
            } => {
                self.state
                    .add_rx_log(RxLogEntry::new(snr, rssi, payload_type, hop_count));
            }
            DeviceEvent::Disconnected => return self.recover().await,
        }
        Ok(())
    }
}
