//! Reconnect with linear backoff and bond cleanup
//!
//! Each attempt waits `base_delay * attempt`, removes the stale bond, waits
//! the settle delay and then asks the [`ConnectionFactory`] for a new
//! session. Attempts never overlap.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::RuntimeConfig;
use crate::driver::{BondRemoval, BondRemover, ConnectionFactory, DeviceSession};

// ----------------------------------------------------------------------------
// State and Outcome
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    Connected,
    /// Waiting for or running the given 1-based attempt
    Reconnecting { attempt: u32 },
    Failed,
}

#[derive(Debug)]
pub enum ReconnectOutcome {
    Reconnected { session: DeviceSession, attempts: u32 },
    Exhausted { attempts: u32 },
}

impl ReconnectOutcome {
    pub fn is_reconnected(&self) -> bool {
        matches!(self, ReconnectOutcome::Reconnected { .. })
    }

    pub fn into_session(self) -> Option<DeviceSession> {
        match self {
            ReconnectOutcome::Reconnected { session, .. } => Some(session),
            ReconnectOutcome::Exhausted { .. } => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Reconnect Policy
// ----------------------------------------------------------------------------

pub struct ReconnectPolicy {
    max_attempts: u32,
    base_delay: Duration,
    settle_delay: Duration,
    bond_remover: Arc<dyn BondRemover>,
    state: ReconnectState,
}

impl ReconnectPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        settle_delay: Duration,
        bond_remover: Arc<dyn BondRemover>,
    ) -> Self {
        Self {
            max_attempts,
            base_delay,
            settle_delay,
            bond_remover,
            state: ReconnectState::Connected,
        }
    }

    pub fn from_config(config: &RuntimeConfig, bond_remover: Arc<dyn BondRemover>) -> Self {
        Self::new(
            config.reconnect.max_attempts,
            config.reconnect_base_delay(),
            config.reconnect_settle_delay(),
            bond_remover,
        )
    }

    pub fn state(&self) -> ReconnectState {
        self.state
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before the given 1-based attempt
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Run attempts until one connects or all are used up
    pub async fn reconnect(
        &mut self,
        factory: &dyn ConnectionFactory,
        address: &str,
    ) -> ReconnectOutcome {
        self.reconnect_from(factory, address, 1).await
    }

    /// Like [`reconnect`](Self::reconnect), resuming at `first_attempt`
    ///
    /// Used when a session from an earlier attempt dropped before it was
    /// usable, so that attempt still counts against the budget. Starting
    /// past `max_attempts` exhausts immediately.
    pub async fn reconnect_from(
        &mut self,
        factory: &dyn ConnectionFactory,
        address: &str,
        first_attempt: u32,
    ) -> ReconnectOutcome {
        for attempt in first_attempt.max(1)..=self.max_attempts {
            self.state = ReconnectState::Reconnecting { attempt };
            let delay = self.backoff_delay(attempt);
            info!(
                "Reconnect attempt {}/{} in {}s...",
                attempt,
                self.max_attempts,
                delay.as_secs()
            );
            tokio::time::sleep(delay).await;

            match self.bond_remover.remove_bond(address).await {
                Ok(BondRemoval::Removed) => debug!("Stale bond removed for {}", address),
                Ok(BondRemoval::AlreadyAbsent) => debug!("No bond left for {}", address),
                Err(e) => warn!("Bond removal failed: {}", e),
            }
            tokio::time::sleep(self.settle_delay).await;

            match factory.connect(address).await {
                Ok(session) => {
                    info!("Reconnected after attempt {}", attempt);
                    self.state = ReconnectState::Connected;
                    return ReconnectOutcome::Reconnected {
                        session,
                        attempts: attempt,
                    };
                }
                Err(e) => error!("Reconnect attempt {} failed: {}", attempt, e),
            }
        }

        error!("Reconnect failed after {} attempts", self.max_attempts);
        self.state = ReconnectState::Failed;
        ReconnectOutcome::Exhausted {
            attempts: self.max_attempts,
        }
    }
}
