//! Timer-driven consumer side of the shared state
//!
//! The presentation layer itself is external. It plugs in as a
//! [`SnapshotView`]; the [`PresentationLoop`] hands it a fresh snapshot on
//! every tick and acknowledges the update flags afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use meshcore_gui_core::{SharedState, StateSnapshot};

use crate::config::RuntimeConfig;
use crate::error::{ConfigError, Result};
use crate::worker::WorkerHandle;

/// Something that draws a snapshot
pub trait SnapshotView: Send {
    fn render(&mut self, snapshot: &StateSnapshot) -> Result<()>;
}

pub struct PresentationLoop<V: SnapshotView> {
    state: Arc<SharedState>,
    view: V,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl<V: SnapshotView> PresentationLoop<V> {
    /// Fails for a zero `interval`
    pub fn new(state: Arc<SharedState>, view: V, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(ConfigError::Validation(
                "Presentation update interval must be greater than 0".to_string(),
            )
            .into());
        }
        Ok(Self {
            state,
            view,
            interval,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn from_config(state: Arc<SharedState>, view: V, config: &RuntimeConfig) -> Result<Self> {
        Self::new(state, view, config.update_interval())
    }

    /// Stop switch for [`run`](Self::run)
    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle::from_flag(self.running.clone())
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    /// One update: snapshot, render, acknowledge
    ///
    /// The first render that had both channels and contacts marks the state
    /// initialized. A render error is logged and the flags stay raised.
    pub fn tick(&mut self) {
        let snapshot = self.state.snapshot();
        let first_render = !snapshot.initialized;

        if let Err(e) = self.view.render(&snapshot) {
            warn!("Render failed: {}", e);
            return;
        }

        self.state.clear_update_flags();

        if first_render && !snapshot.channels.is_empty() && !snapshot.contacts.is_empty() {
            self.state.mark_initialized();
            debug!(
                "Initial render complete: {} channels, {} contacts",
                snapshot.channels.len(),
                snapshot.contacts.len()
            );
        }
    }

    /// Tick every interval until stopped
    pub async fn run(mut self) -> V {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            self.tick();
        }
        info!("Presentation loop stopped");
        self.view
    }
}
