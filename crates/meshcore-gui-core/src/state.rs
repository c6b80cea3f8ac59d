//! Shared state between the device worker and the presentation loop
//!
//! [`SharedState`] is the only channel through which the two loops exchange
//! data. Every operation takes the single internal lock, performs one
//! in-memory copy or mutation and releases it again; no method ever awaits,
//! sleeps or calls into the device while the lock is held.
//!
//! Readers never get references into the live store. They get a
//! [`StateSnapshot`], an owned copy that later mutations cannot reach.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::debug;

use crate::command::Command;
use crate::types::{Channel, ConnectionStatus, Contact, DevicePatch, DeviceState, Message, RxLogEntry};

/// Maximum number of messages kept in history
pub const MAX_MESSAGES: usize = 100;

/// Maximum number of RX log entries kept
pub const MAX_RX_LOG: usize = 50;

// ----------------------------------------------------------------------------
// Update Flags
// ----------------------------------------------------------------------------

/// Dirty flags telling the presentation layer which sections changed
///
/// Flags are raised by writers and only lowered by
/// [`SharedState::clear_update_flags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateFlags {
    pub device: bool,
    pub contacts: bool,
    pub channels: bool,
    pub messages: bool,
    pub rx_log: bool,
}

impl UpdateFlags {
    fn all_set() -> Self {
        Self {
            device: true,
            contacts: true,
            channels: true,
            messages: true,
            rx_log: true,
        }
    }

    fn cleared() -> Self {
        Self {
            device: false,
            contacts: false,
            channels: false,
            messages: false,
            rx_log: false,
        }
    }

    pub fn any(&self) -> bool {
        self.device || self.contacts || self.channels || self.messages || self.rx_log
    }
}

impl Default for UpdateFlags {
    /// Everything starts dirty so the first render shows all sections
    fn default() -> Self {
        Self::all_set()
    }
}

// ----------------------------------------------------------------------------
// Contact Lookup
// ----------------------------------------------------------------------------

/// Resolution of public-key prefixes and display names to contacts
pub trait ContactLookup {
    /// First contact whose key starts with `prefix`, or that `prefix` starts with
    fn lookup_contact_by_prefix(&self, prefix: &str) -> Option<Contact>;

    /// Contact advertising `name`, together with its public key
    fn lookup_contact_by_name(&self, name: &str) -> Option<(String, Contact)>;
}

fn find_by_prefix(contacts: &BTreeMap<String, Contact>, prefix: &str) -> Option<Contact> {
    if prefix.is_empty() {
        return None;
    }
    contacts
        .iter()
        .filter(|(key, _)| !key.is_empty())
        .find(|(key, _)| key.starts_with(prefix) || prefix.starts_with(key.as_str()))
        .map(|(_, contact)| contact.clone())
}

fn find_by_name(contacts: &BTreeMap<String, Contact>, name: &str) -> Option<(String, Contact)> {
    if name.is_empty() {
        return None;
    }
    let exact = contacts.iter().find(|(_, c)| c.name == name);
    exact
        .or_else(|| {
            let lowered = name.to_lowercase();
            contacts
                .iter()
                .find(|(_, c)| !c.name.is_empty() && c.name.to_lowercase() == lowered)
        })
        .map(|(key, contact)| (key.clone(), contact.clone()))
}

// ----------------------------------------------------------------------------
// Snapshot
// ----------------------------------------------------------------------------

/// Owned, point-in-time copy of the whole shared state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub device: DeviceState,
    pub status: ConnectionStatus,
    /// Contacts keyed by full public key
    pub contacts: BTreeMap<String, Contact>,
    pub channels: Vec<Channel>,
    /// Oldest first
    pub messages: Vec<Message>,
    /// Newest first
    pub rx_log: Vec<RxLogEntry>,
    pub flags: UpdateFlags,
    /// Whether the presentation layer completed its first full render
    pub initialized: bool,
    pub auto_add_enabled: bool,
    pub bot_enabled: bool,
}

impl ContactLookup for StateSnapshot {
    fn lookup_contact_by_prefix(&self, prefix: &str) -> Option<Contact> {
        find_by_prefix(&self.contacts, prefix)
    }

    fn lookup_contact_by_name(&self, name: &str) -> Option<(String, Contact)> {
        find_by_name(&self.contacts, name)
    }
}

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Inner {
    device: DeviceState,
    status: ConnectionStatus,
    contacts: BTreeMap<String, Contact>,
    channels: Vec<Channel>,
    messages: VecDeque<Message>,
    rx_log: VecDeque<RxLogEntry>,
    commands: VecDeque<Command>,
    flags: UpdateFlags,
    initialized: bool,
    auto_add_enabled: bool,
    bot_enabled: bool,
}

/// Lock-guarded store shared by the device worker and the presentation loop
#[derive(Debug, Default)]
pub struct SharedState {
    inner: Mutex<Inner>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    // Every mutation leaves `Inner` consistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    pub fn set_status(&self, message: impl Into<String>) {
        self.lock().status.message = message.into();
    }

    pub fn set_connected(&self, connected: bool) {
        self.lock().status.connected = connected;
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.lock().status.clone()
    }

    // ------------------------------------------------------------------
    // Device and collections
    // ------------------------------------------------------------------

    /// Merge the present fields of `patch` into the device record
    pub fn update_device(&self, patch: DevicePatch) {
        let name = {
            let mut inner = self.lock();
            patch.apply(&mut inner.device);
            inner.flags.device = true;
            inner.device.name.clone()
        };
        debug!("Device info updated: {}", name);
    }

    /// Replace all contacts; later duplicates of a key win
    ///
    /// Contacts without a public key are dropped.
    pub fn replace_contacts<I>(&self, contacts: I)
    where
        I: IntoIterator<Item = Contact>,
    {
        let contacts: BTreeMap<String, Contact> = contacts
            .into_iter()
            .filter(|c| !c.public_key.is_empty())
            .map(|c| (c.public_key.clone(), c))
            .collect();
        let count = contacts.len();
        {
            let mut inner = self.lock();
            inner.contacts = contacts;
            inner.flags.contacts = true;
        }
        debug!("Contacts updated: {} contacts", count);
    }

    pub fn replace_channels(&self, channels: Vec<Channel>) {
        let count = channels.len();
        {
            let mut inner = self.lock();
            inner.channels = channels;
            inner.flags.channels = true;
        }
        debug!("Channels updated: {} channels", count);
    }

    /// Append to history, evicting the oldest beyond [`MAX_MESSAGES`]
    pub fn add_message(&self, message: Message) {
        debug!(
            "Message added: {}: {}",
            message.sender,
            message.text.chars().take(30).collect::<String>()
        );
        let mut inner = self.lock();
        inner.messages.push_back(message);
        while inner.messages.len() > MAX_MESSAGES {
            inner.messages.pop_front();
        }
        inner.flags.messages = true;
    }

    /// Insert at the front, dropping the oldest beyond [`MAX_RX_LOG`]
    pub fn add_rx_log(&self, entry: RxLogEntry) {
        let mut inner = self.lock();
        inner.rx_log.push_front(entry);
        inner.rx_log.truncate(MAX_RX_LOG);
        inner.flags.rx_log = true;
    }

    // ------------------------------------------------------------------
    // Mode flags
    // ------------------------------------------------------------------

    /// Store the auto-add flag, returning the previous value
    pub fn set_auto_add_enabled(&self, enabled: bool) -> bool {
        let mut inner = self.lock();
        core::mem::replace(&mut inner.auto_add_enabled, enabled)
    }

    /// Store the bot-mode flag, returning the previous value
    pub fn set_bot_enabled(&self, enabled: bool) -> bool {
        let mut inner = self.lock();
        core::mem::replace(&mut inner.bot_enabled, enabled)
    }

    pub fn auto_add_enabled(&self) -> bool {
        self.lock().auto_add_enabled
    }

    pub fn bot_enabled(&self) -> bool {
        self.lock().bot_enabled
    }

    // ------------------------------------------------------------------
    // Command queue
    // ------------------------------------------------------------------

    pub fn enqueue_command(&self, command: Command) {
        self.lock().commands.push_back(command);
    }

    /// Next queued command, or `None` when the queue is empty; never blocks
    pub fn dequeue_command(&self) -> Option<Command> {
        self.lock().commands.pop_front()
    }

    pub fn pending_commands(&self) -> usize {
        self.lock().commands.len()
    }

    // ------------------------------------------------------------------
    // Snapshot and flags
    // ------------------------------------------------------------------

    /// Owned copy of everything except the command queue
    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.lock();
        StateSnapshot {
            device: inner.device.clone(),
            status: inner.status.clone(),
            contacts: inner.contacts.clone(),
            channels: inner.channels.clone(),
            messages: inner.messages.iter().cloned().collect(),
            rx_log: inner.rx_log.iter().cloned().collect(),
            flags: inner.flags,
            initialized: inner.initialized,
            auto_add_enabled: inner.auto_add_enabled,
            bot_enabled: inner.bot_enabled,
        }
    }

    pub fn clear_update_flags(&self) {
        self.lock().flags = UpdateFlags::cleared();
    }

    pub fn mark_initialized(&self) {
        self.lock().initialized = true;
        debug!("Presentation marked as initialized");
    }

    // ------------------------------------------------------------------
    // Contact lookups
    // ------------------------------------------------------------------

    pub fn lookup_contact_by_prefix(&self, prefix: &str) -> Option<Contact> {
        find_by_prefix(&self.lock().contacts, prefix)
    }

    pub fn lookup_contact_by_name(&self, name: &str) -> Option<(String, Contact)> {
        find_by_name(&self.lock().contacts, name)
    }

    /// Display name for a key prefix
    ///
    /// Falls back to the first 8 characters of the prefix when no named
    /// contact matches, and to an empty string for an empty prefix.
    pub fn lookup_contact_name_by_prefix(&self, prefix: &str) -> String {
        if prefix.is_empty() {
            return String::new();
        }
        let inner = self.lock();
        inner
            .contacts
            .iter()
            .find(|(key, c)| key.starts_with(prefix) && !c.name.is_empty())
            .map(|(_, c)| c.name.clone())
            .unwrap_or_else(|| prefix.chars().take(8).collect())
    }
}

impl ContactLookup for SharedState {
    fn lookup_contact_by_prefix(&self, prefix: &str) -> Option<Contact> {
        SharedState::lookup_contact_by_prefix(self, prefix)
    }

    fn lookup_contact_by_name(&self, name: &str) -> Option<(String, Contact)> {
        SharedState::lookup_contact_by_name(self, name)
    }
}
