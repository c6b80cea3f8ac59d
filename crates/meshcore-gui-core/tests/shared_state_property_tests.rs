//! Property-based tests for the bounded histories in SharedState
//!
//! These tests verify the eviction order of the message history and the RX
//! log, and that snapshots are unaffected by later mutations.

use meshcore_gui_core::{
    Command, Message, RxLogEntry, SharedState, MAX_MESSAGES, MAX_RX_LOG,
};
use proptest::prelude::*;

/// Generate arbitrary message text
fn arb_text() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"[a-zA-Z0-9 .,!?]{0,40}").unwrap()
}

fn numbered_message(i: usize) -> Message {
    Message::incoming(format!("node{}", i), format!("msg {}", i), Some(0)).with_timestamp(i as u64)
}

fn numbered_rx(i: usize) -> RxLogEntry {
    let mut entry = RxLogEntry::new(5.0, -90, "GRP_TXT", 0);
    entry.timestamp = i as u64;
    entry
}

proptest! {
    /// Property: history never exceeds its bound and keeps the newest messages
    #[test]
    fn message_history_keeps_newest(count in 0usize..300) {
        let state = SharedState::new();
        for i in 0..count {
            state.add_message(numbered_message(i));
        }

        let snapshot = state.snapshot();
        let expected = count.min(MAX_MESSAGES);
        prop_assert_eq!(snapshot.messages.len(), expected);

        // Oldest-first, ending with the last one added
        let first = count - expected;
        for (offset, msg) in snapshot.messages.iter().enumerate() {
            prop_assert_eq!(msg.timestamp, (first + offset) as u64);
        }
    }

    /// Property: RX log is newest-first and never exceeds its bound
    #[test]
    fn rx_log_is_newest_first(count in 0usize..150) {
        let state = SharedState::new();
        for i in 0..count {
            state.add_rx_log(numbered_rx(i));
        }

        let snapshot = state.snapshot();
        prop_assert_eq!(snapshot.rx_log.len(), count.min(MAX_RX_LOG));
        for (offset, entry) in snapshot.rx_log.iter().enumerate() {
            prop_assert_eq!(entry.timestamp, (count - 1 - offset) as u64);
        }
    }

    /// Property: a snapshot never observes writes made after it was taken
    #[test]
    fn snapshot_is_independent(texts in prop::collection::vec(arb_text(), 1..20)) {
        let state = SharedState::new();
        state.add_message(Message::incoming("a", "before", Some(0)));
        let snapshot = state.snapshot();

        for text in &texts {
            state.add_message(Message::incoming("b", text.clone(), Some(1)));
        }
        state.clear_update_flags();

        prop_assert_eq!(snapshot.messages.len(), 1);
        prop_assert_eq!(&snapshot.messages[0].text, "before");
        prop_assert!(snapshot.flags.messages);
        prop_assert_eq!(state.snapshot().messages.len(), (texts.len() + 1).min(MAX_MESSAGES));
    }

    /// Property: commands come out in the order they went in, exactly once
    #[test]
    fn command_queue_is_fifo(channels in prop::collection::vec(any::<u8>(), 0..50)) {
        let state = SharedState::new();
        for ch in &channels {
            state.enqueue_command(Command::channel_message(*ch, "x"));
        }
        prop_assert_eq!(state.pending_commands(), channels.len());

        for ch in &channels {
            prop_assert_eq!(state.dequeue_command(), Some(Command::channel_message(*ch, "x")));
        }
        prop_assert_eq!(state.dequeue_command(), None);
    }
}

#[test]
fn test_fresh_state_flags_start_raised() {
    let state = SharedState::new();
    let snapshot = state.snapshot();

    assert!(snapshot.flags.device);
    assert!(snapshot.flags.contacts);
    assert!(snapshot.flags.channels);
    assert!(snapshot.flags.messages);
    assert!(snapshot.flags.rx_log);
    assert!(!snapshot.initialized);
    assert_eq!(snapshot.status.message, "Starting...");
    assert!(!snapshot.status.connected);

    state.clear_update_flags();
    assert!(!state.snapshot().flags.any());
}
