//! User actions queued by the presentation layer for the device worker
//!
//! Commands arrive as tagged records (`{"action": "send_message", ...}`).
//! Tags the worker does not know deserialize to [`Command::Unknown`] instead
//! of failing, so a stale UI can never wedge the queue.

use serde::{Deserialize, Serialize};

/// A single queued action, consumed exactly once by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    /// Send `text` to a group channel
    SendMessage {
        #[serde(default)]
        channel: u8,
        text: String,
        /// Machine-generated (bot) replies are not added to history
        #[serde(default)]
        bot: bool,
    },
    /// Send a direct message to the contact with `pubkey`
    SendDm {
        pubkey: String,
        text: String,
        #[serde(default)]
        contact_name: Option<String>,
    },
    /// Flood an advert so the mesh learns about this node
    SendAdvert,
    /// Re-run the bulk data load
    Refresh,
    /// Remove every listed contact from the device
    PurgeUnpinned {
        #[serde(default)]
        pubkeys: Vec<String>,
    },
    /// Toggle automatic admission of newly seen contacts
    SetAutoAdd { enabled: bool },
    /// Switch between the regular and the bot device name
    SetDeviceName { bot_enabled: bool },
    /// Any action tag this build does not handle
    #[serde(other)]
    Unknown,
}

/// Tag identifying a [`Command`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    SendMessage,
    SendDm,
    SendAdvert,
    Refresh,
    PurgeUnpinned,
    SetAutoAdd,
    SetDeviceName,
    Unknown,
}

impl Command {
    /// Parse a command record from JSON
    pub fn from_json(record: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(record)
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::SendMessage { .. } => CommandKind::SendMessage,
            Command::SendDm { .. } => CommandKind::SendDm,
            Command::SendAdvert => CommandKind::SendAdvert,
            Command::Refresh => CommandKind::Refresh,
            Command::PurgeUnpinned { .. } => CommandKind::PurgeUnpinned,
            Command::SetAutoAdd { .. } => CommandKind::SetAutoAdd,
            Command::SetDeviceName { .. } => CommandKind::SetDeviceName,
            Command::Unknown => CommandKind::Unknown,
        }
    }

    /// Channel message typed by the user
    pub fn channel_message(channel: u8, text: impl Into<String>) -> Self {
        Command::SendMessage {
            channel,
            text: text.into(),
            bot: false,
        }
    }

    /// Channel message produced by the bot
    pub fn bot_message(channel: u8, text: impl Into<String>) -> Self {
        Command::SendMessage {
            channel,
            text: text.into(),
            bot: true,
        }
    }

    pub fn direct_message(pubkey: impl Into<String>, text: impl Into<String>) -> Self {
        Command::SendDm {
            pubkey: pubkey.into(),
            text: text.into(),
            contact_name: None,
        }
    }
}

impl core::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let tag = match self {
            CommandKind::SendMessage => "send_message",
            CommandKind::SendDm => "send_dm",
            CommandKind::SendAdvert => "send_advert",
            CommandKind::Refresh => "refresh",
            CommandKind::PurgeUnpinned => "purge_unpinned",
            CommandKind::SetAutoAdd => "set_auto_add",
            CommandKind::SetDeviceName => "set_device_name",
            CommandKind::Unknown => "unknown",
        };
        write!(f, "{}", tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tagged_record() {
        let cmd = Command::from_json(r#"{"action":"send_message","channel":2,"text":"hello"}"#)
            .unwrap();
        assert_eq!(cmd, Command::channel_message(2, "hello"));
        assert_eq!(cmd.kind(), CommandKind::SendMessage);
    }

    #[test]
    fn test_unknown_action_is_not_an_error() {
        let cmd = Command::from_json(r#"{"action":"reboot_device"}"#).unwrap();
        assert_eq!(cmd, Command::Unknown);
    }

    #[test]
    fn test_purge_without_keys_defaults_to_empty() {
        let cmd = Command::from_json(r#"{"action":"purge_unpinned"}"#).unwrap();
        assert_eq!(cmd, Command::PurgeUnpinned { pubkeys: vec![] });
    }

    #[test]
    fn test_kind_display_matches_tag() {
        assert_eq!(CommandKind::SetAutoAdd.to_string(), "set_auto_add");
    }
}
