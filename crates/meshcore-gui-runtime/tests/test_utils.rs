//! Test utilities for the device runtime
//!
//! Scriptable stand-ins for the device driver, the connection factory and
//! the bond remover. Every mock records the calls it receives so tests can
//! assert on the exact sequence of device operations.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use meshcore_gui_core::Contact;
use meshcore_gui_runtime::{
    BondRemoval, BondRemover, ConnectionFactory, DeviceDriver, DeviceError, DeviceEvent,
    DeviceQuery, DeviceSession, RefreshHandler, SelfInfo,
};
use tokio::sync::mpsc;

// ----------------------------------------------------------------------------
// Scripted Failures
// ----------------------------------------------------------------------------

/// Cloneable description of a [`DeviceError`]
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    Timeout,
    Malformed,
    Rejected,
    ConnectionLost,
}

impl Failure {
    pub fn to_error(&self) -> DeviceError {
        match self {
            Failure::Timeout => DeviceError::Timeout { duration_ms: 1000 },
            Failure::Malformed => DeviceError::malformed("missing 'telemetry_mode_base'"),
            Failure::Rejected => DeviceError::rejected("ERROR"),
            Failure::ConnectionLost => DeviceError::ConnectionLost,
        }
    }
}

// ----------------------------------------------------------------------------
// Mock Driver
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    SelfInfo,
    DeviceQuery,
    GetContacts,
    SendChannel,
    SendDirect,
    SendAdvert,
    RemoveContact,
    SetManualAdd,
    SetName,
    StartAutoFetch,
    Disconnect,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    SelfInfo,
    DeviceQuery,
    GetContacts,
    SendChannel { channel: u8, text: String },
    SendDirect { pubkey: String, text: String },
    SendAdvert { flood: bool },
    RemoveContact(String),
    SetManualAdd(bool),
    SetName(String),
    StartAutoFetch,
    Disconnect,
}

impl DriverCall {
    pub fn op(&self) -> Op {
        match self {
            DriverCall::SelfInfo => Op::SelfInfo,
            DriverCall::DeviceQuery => Op::DeviceQuery,
            DriverCall::GetContacts => Op::GetContacts,
            DriverCall::SendChannel { .. } => Op::SendChannel,
            DriverCall::SendDirect { .. } => Op::SendDirect,
            DriverCall::SendAdvert { .. } => Op::SendAdvert,
            DriverCall::RemoveContact(_) => Op::RemoveContact,
            DriverCall::SetManualAdd(_) => Op::SetManualAdd,
            DriverCall::SetName(_) => Op::SetName,
            DriverCall::StartAutoFetch => Op::StartAutoFetch,
            DriverCall::Disconnect => Op::Disconnect,
        }
    }
}

/// Device driver whose results are scripted per operation
///
/// Each operation pops the next scripted outcome; `None` or an empty script
/// means success.
#[derive(Debug, Default)]
pub struct MockDriver {
    pub id: usize,
    self_info: SelfInfo,
    contacts: Vec<Contact>,
    calls: Mutex<Vec<DriverCall>>,
    scripts: Mutex<HashMap<Op, VecDeque<Option<Failure>>>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            self_info: SelfInfo {
                name: "PE1HVH T1000e".to_string(),
                public_key: "ab".repeat(32),
                radio_freq: 869.618,
                radio_sf: 8,
                radio_bw: 62.5,
                tx_power: 22,
                adv_lat: 52.5,
                adv_lon: 6.1,
            },
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    pub fn with_contacts(mut self, contacts: Vec<Contact>) -> Self {
        self.contacts = contacts;
        self
    }

    /// Queue outcomes for `op`; `None` entries succeed
    pub fn script<I>(&self, op: Op, outcomes: I)
    where
        I: IntoIterator<Item = Option<Failure>>,
    {
        self.scripts
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .extend(outcomes);
    }

    pub fn fail_next(&self, op: Op, failure: Failure) {
        self.script(op, [Some(failure)]);
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.op() == op)
            .count()
    }

    fn record(&self, call: DriverCall) -> Result<(), DeviceError> {
        let op = call.op();
        self.calls.lock().unwrap().push(call);
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&op)
            .and_then(|q| q.pop_front())
            .flatten();
        match next {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DeviceDriver for MockDriver {
    async fn self_info(&self) -> Result<SelfInfo, DeviceError> {
        self.record(DriverCall::SelfInfo)?;
        Ok(self.self_info.clone())
    }

    async fn device_query(&self) -> Result<DeviceQuery, DeviceError> {
        self.record(DriverCall::DeviceQuery)?;
        Ok(DeviceQuery {
            firmware_version: "v1.9.1".to_string(),
        })
    }

    async fn get_contacts(&self) -> Result<Vec<Contact>, DeviceError> {
        self.record(DriverCall::GetContacts)?;
        Ok(self.contacts.clone())
    }

    async fn send_channel_message(&self, channel: u8, text: &str) -> Result<(), DeviceError> {
        self.record(DriverCall::SendChannel {
            channel,
            text: text.to_string(),
        })
    }

    async fn send_direct_message(&self, pubkey: &str, text: &str) -> Result<(), DeviceError> {
        self.record(DriverCall::SendDirect {
            pubkey: pubkey.to_string(),
            text: text.to_string(),
        })
    }

    async fn send_advert(&self, flood: bool) -> Result<(), DeviceError> {
        self.record(DriverCall::SendAdvert { flood })
    }

    async fn remove_contact(&self, pubkey: &str) -> Result<(), DeviceError> {
        self.record(DriverCall::RemoveContact(pubkey.to_string()))
    }

    async fn set_manual_add_contacts(&self, manual: bool) -> Result<(), DeviceError> {
        self.record(DriverCall::SetManualAdd(manual))
    }

    async fn set_name(&self, name: &str) -> Result<(), DeviceError> {
        self.record(DriverCall::SetName(name.to_string()))
    }

    async fn start_auto_message_fetching(&self) -> Result<(), DeviceError> {
        self.record(DriverCall::StartAutoFetch)
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        self.record(DriverCall::Disconnect)
    }
}

// ----------------------------------------------------------------------------
// Mock Connection Factory
// ----------------------------------------------------------------------------

/// Hands out [`MockDriver`] sessions, numbered from 1 per successful connect
#[derive(Debug, Default)]
pub struct MockFactory {
    contacts: Vec<Contact>,
    driver_scripts: Vec<(Op, Vec<Option<Failure>>)>,
    script: Mutex<VecDeque<bool>>,
    attempts: AtomicUsize,
    drivers: Mutex<Vec<Arc<MockDriver>>>,
    senders: Mutex<Vec<mpsc::Sender<DeviceEvent>>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contacts(mut self, contacts: Vec<Contact>) -> Self {
        self.contacts = contacts;
        self
    }

    /// Script `op` on every driver this factory creates
    pub fn with_driver_script<I>(mut self, op: Op, outcomes: I) -> Self
    where
        I: IntoIterator<Item = Option<Failure>>,
    {
        self.driver_scripts.push((op, outcomes.into_iter().collect()));
        self
    }

    /// Script connect results in order; `true` connects. Unscripted attempts connect.
    pub fn script<I: IntoIterator<Item = bool>>(self, outcomes: I) -> Self {
        self.script.lock().unwrap().extend(outcomes);
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> usize {
        self.drivers.lock().unwrap().len()
    }

    pub fn driver(&self, index: usize) -> Arc<MockDriver> {
        self.drivers.lock().unwrap()[index].clone()
    }

    pub fn last_driver(&self) -> Arc<MockDriver> {
        self.drivers.lock().unwrap().last().cloned().unwrap()
    }

    /// Event sender of the most recent session
    pub fn events(&self) -> mpsc::Sender<DeviceEvent> {
        self.senders.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn connect(&self, _address: &str) -> Result<DeviceSession, DeviceError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let succeed = self.script.lock().unwrap().pop_front().unwrap_or(true);
        if !succeed {
            return Err(DeviceError::Transport(format!(
                "connect attempt {} refused",
                attempt
            )));
        }

        let driver = Arc::new(
            MockDriver::new()
                .with_id(attempt)
                .with_contacts(self.contacts.clone()),
        );
        for (op, outcomes) in &self.driver_scripts {
            driver.script(*op, outcomes.iter().cloned());
        }
        let (tx, rx) = mpsc::channel(64);
        self.drivers.lock().unwrap().push(driver.clone());
        self.senders.lock().unwrap().push(tx);
        Ok(DeviceSession::new(driver, rx))
    }
}

// ----------------------------------------------------------------------------
// Mock Bond Remover
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondBehavior {
    Removed,
    AlreadyAbsent,
    Fail,
}

#[derive(Debug)]
pub struct MockBondRemover {
    behavior: BondBehavior,
    calls: Mutex<Vec<String>>,
}

impl MockBondRemover {
    pub fn new(behavior: BondBehavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BondRemover for MockBondRemover {
    async fn remove_bond(&self, address: &str) -> Result<BondRemoval, DeviceError> {
        self.calls.lock().unwrap().push(address.to_string());
        match self.behavior {
            BondBehavior::Removed => Ok(BondRemoval::Removed),
            BondBehavior::AlreadyAbsent => Ok(BondRemoval::AlreadyAbsent),
            BondBehavior::Fail => Err(DeviceError::Transport("org.bluez.Error.Failed".to_string())),
        }
    }
}

// ----------------------------------------------------------------------------
// Counting Refresh Handler
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct CountingRefresh {
    count: AtomicUsize,
}

impl CountingRefresh {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RefreshHandler for CountingRefresh {
    async fn refresh(&self, _driver: &dyn DeviceDriver) -> Result<(), DeviceError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
