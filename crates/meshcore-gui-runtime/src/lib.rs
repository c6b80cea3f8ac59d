//! MeshCore GUI Runtime
//!
//! Tokio side of the bridge. A [`DeviceWorker`] owns the device session,
//! loads device data, ingests radio events into [`SharedState`] and drains
//! the command queue through the [`CommandDispatcher`]. A
//! [`PresentationLoop`] samples snapshots on its own timer.
//!
//! ## Architecture
//!
//! ```text
//! presentation --enqueue--> SharedState <--snapshot-- PresentationLoop
//!                               ^  |
//!                   write back  |  | dequeue
//!                               |  v
//!   DeviceEvent --mpsc--> DeviceWorker --> CommandDispatcher --> DeviceDriver
//!                               |
//!                               +--link lost--> ReconnectPolicy --> ConnectionFactory
//! ```
//!
//! [`SharedState`]: meshcore_gui_core::SharedState

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

#[cfg(target_os = "linux")]
pub mod bluez;
pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod loader;
pub mod logging;
pub mod presenter;
pub mod reconnect;
pub mod worker;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

#[cfg(target_os = "linux")]
pub use bluez::BluezBondRemover;
pub use config::{
    CommandSettings, DeviceSettings, PresentationSettings, ReconnectSettings, RuntimeConfig,
    WorkerSettings,
};
pub use dispatcher::{CommandDispatcher, DeviceNames, PurgeReport, RefreshHandler, SettingOutcome};
pub use driver::{
    BondRemoval, BondRemover, ConnectionFactory, DeviceDriver, DeviceEvent, DeviceQuery,
    DeviceSession, SelfInfo,
};
pub use error::{ConfigError, DeviceError, Result, RuntimeError};
pub use loader::{DataLoader, LoadReport};
pub use logging::init_logging;
pub use presenter::{PresentationLoop, SnapshotView};
pub use reconnect::{ReconnectOutcome, ReconnectPolicy, ReconnectState};
pub use worker::{DeviceWorker, WorkerHandle};
