//! Tests for the reconnect loop
//!
//! Time is paused so the backoff schedule can be measured exactly.

use std::sync::Arc;
use std::time::Duration;

use meshcore_gui_runtime::{DeviceDriver, ReconnectOutcome, ReconnectPolicy, ReconnectState};

mod test_utils;
use test_utils::{BondBehavior, MockBondRemover, MockFactory, Op};

const ADDRESS: &str = "literal:FF:05:D6:71:83:8D";

#[tokio::test(start_paused = true)]
async fn test_third_attempt_connects_after_linear_backoff() {
    let factory = MockFactory::new().script([false, false, true]);
    let bonds = Arc::new(MockBondRemover::new(BondBehavior::Removed));
    let mut policy = ReconnectPolicy::new(5, Duration::from_secs(5), Duration::ZERO, bonds.clone());

    let start = tokio::time::Instant::now();
    let outcome = policy.reconnect(&factory, ADDRESS).await;
    let elapsed = start.elapsed();

    // 5 + 10 + 15 seconds
    assert!(elapsed >= Duration::from_secs(30) && elapsed < Duration::from_secs(31));
    assert_eq!(factory.attempts(), 3);
    assert_eq!(bonds.calls().len(), 3);
    assert_eq!(policy.state(), ReconnectState::Connected);

    match outcome {
        ReconnectOutcome::Reconnected { session, attempts } => {
            assert_eq!(attempts, 3);
            // Only one session was ever produced, by the third attempt
            assert_eq!(factory.connections(), 1);
            assert_eq!(factory.driver(0).id, 3);
            session.driver.send_advert(true).await.unwrap();
            assert_eq!(factory.driver(0).count(Op::SendAdvert), 1);
        }
        ReconnectOutcome::Exhausted { .. } => panic!("expected reconnect"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_settle_delay_follows_bond_removal() {
    let factory = MockFactory::new();
    let bonds = Arc::new(MockBondRemover::new(BondBehavior::AlreadyAbsent));
    let mut policy = ReconnectPolicy::new(
        5,
        Duration::from_secs(5),
        Duration::from_secs(2),
        bonds.clone(),
    );

    let start = tokio::time::Instant::now();
    let outcome = policy.reconnect(&factory, ADDRESS).await;

    assert!(outcome.is_reconnected());
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(7) && elapsed < Duration::from_secs(8));
    assert_eq!(bonds.calls(), vec![ADDRESS.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_bond_removal_failure_is_not_fatal() {
    let factory = MockFactory::new();
    let bonds = Arc::new(MockBondRemover::new(BondBehavior::Fail));
    let mut policy = ReconnectPolicy::new(3, Duration::from_secs(1), Duration::ZERO, bonds);

    let outcome = policy.reconnect(&factory, ADDRESS).await;

    assert!(outcome.is_reconnected());
    assert_eq!(factory.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_returns_sentinel() {
    let factory = MockFactory::new().script([false; 5]);
    let bonds = Arc::new(MockBondRemover::new(BondBehavior::Removed));
    let mut policy = ReconnectPolicy::new(5, Duration::from_secs(5), Duration::from_secs(2), bonds);

    let start = tokio::time::Instant::now();
    let outcome = policy.reconnect(&factory, ADDRESS).await;

    assert!(matches!(outcome, ReconnectOutcome::Exhausted { attempts: 5 }));
    assert!(outcome.into_session().is_none());
    assert_eq!(factory.attempts(), 5);
    assert_eq!(policy.state(), ReconnectState::Failed);
    // 5+10+15+20+25 backoff plus 5 settle pauses
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(85) && elapsed < Duration::from_secs(86));
}
