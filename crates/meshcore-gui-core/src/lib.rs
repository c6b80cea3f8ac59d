//! MeshCore GUI Core
//!
//! This crate holds the platform-agnostic half of the MeshCore GUI bridge:
//!
//! - [`types`] - Device, contact, channel, message and RX log records
//! - [`command`] - The closed set of user actions sent to the device worker
//! - [`state`] - `SharedState`, the lock-guarded store shared by the device
//!   worker and the presentation loop, plus point-in-time snapshots
//! - [`route`] - Reconstruction of a message's path through the mesh
//! - [`stores`] - Interfaces for the pinned-contact and credential stores
//! - [`purge`] - Planning of bulk removal of unpinned contacts
//!
//! Nothing here performs device I/O. The async runtime that talks to the
//! radio lives in `meshcore-gui-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod command;
pub mod purge;
pub mod route;
pub mod state;
pub mod stores;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use command::{Command, CommandKind};
pub use purge::PurgePlan;
pub use route::{
    PathSource, PathStrategy, RouteBuilder, RouteNode, RouteQuery, RouteResult, SenderStrategy,
};
pub use state::{
    ContactLookup, SharedState, StateSnapshot, UpdateFlags, MAX_MESSAGES, MAX_RX_LOG,
};
pub use stores::{CredentialStore, MemoryCredentialStore, MemoryPinStore, PinnedContacts};
pub use types::{
    current_timestamp, Channel, ConnectionStatus, Contact, ContactType, DevicePatch, DeviceState,
    Direction, Message, PathHashes, Position, RxLogEntry, StoredRoute,
};
