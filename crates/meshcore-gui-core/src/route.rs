//! Route reconstruction for received messages
//!
//! Given a message and a state snapshot, [`RouteBuilder`] works out who sent
//! the message and which repeaters it passed through, using only data that is
//! already in memory. No device I/O happens here and nothing fails: missing
//! data simply yields `None` fields or an empty path.
//!
//! ## Resolution order
//!
//! The sender is resolved by the strategies in [`SENDER_STRATEGIES`], first
//! match wins, with a synthesized node from the message itself as the last
//! resort. Path nodes come from the first [`PathStrategy`] in
//! [`PATH_STRATEGIES`] that has data.
//!
//! Path-hash fragments are a single byte of the node's public key, so two
//! contacts can share one. The first contact whose key starts with the
//! fragment is taken; nothing tries to disambiguate further.

use serde::Serialize;
use tracing::debug;

use crate::state::{ContactLookup, StateSnapshot};
use crate::types::{Contact, ContactType, Message, Position};

// ----------------------------------------------------------------------------
// Result Types
// ----------------------------------------------------------------------------

/// Where the path nodes of a [`RouteResult`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSource {
    /// Hash fragments captured from the received packet
    ReceivedPacket,
    /// The sender contact's stored `out_path`
    StoredRoute,
    None,
}

/// One hop of a reconstructed route
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteNode {
    pub name: String,
    pub position: Option<Position>,
    pub contact_type: Option<ContactType>,
    /// Full public key or hash fragment identifying the node
    pub key: Option<String>,
}

impl RouteNode {
    pub fn has_location(&self) -> bool {
        self.position.map_or(false, |p| p.is_set())
    }

    fn from_contact(name: String, contact: &Contact, key: String) -> Self {
        Self {
            name,
            position: contact.position,
            contact_type: Some(contact.contact_type),
            key: Some(key),
        }
    }
}

/// Reconstructed route of a single message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteResult {
    pub sender: Option<RouteNode>,
    pub self_node: RouteNode,
    /// Repeaters between sender and this node, in traversal order
    pub path_nodes: Vec<RouteNode>,
    pub snr: Option<f32>,
    /// Hop count reported by the message itself
    pub hop_count: u8,
    pub has_locations: bool,
    pub path_source: PathSource,
}

impl RouteResult {
    /// Received without any intermediate repeater
    pub fn is_direct(&self) -> bool {
        self.path_nodes.is_empty() && self.hop_count == 0
    }
}

// ----------------------------------------------------------------------------
// Sender Strategies
// ----------------------------------------------------------------------------

/// Inputs shared by all resolution strategies
pub struct RouteQuery<'a> {
    pub message: &'a Message,
    pub snapshot: &'a StateSnapshot,
    pub live: &'a dyn ContactLookup,
}

impl RouteQuery<'_> {
    fn pubkey(&self) -> &str {
        self.message.sender_pubkey.as_deref().unwrap_or("")
    }

    /// The message's own key when present, else the one found by lookup
    fn key_or(&self, matched: &str) -> String {
        let pubkey = self.pubkey();
        if pubkey.is_empty() {
            matched.to_string()
        } else {
            pubkey.to_string()
        }
    }
}

/// A sender contact together with the key it was resolved under
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSender {
    pub key: String,
    pub contact: Contact,
}

/// One way of finding the sender's contact record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderStrategy {
    /// Sender key prefix against the live contact store
    LivePrefix,
    /// Sender key prefix against the snapshot contacts
    SnapshotPrefix,
    /// Sender display name against the live contact store
    LiveName,
    /// Case-insensitive exact-or-prefix name match against the snapshot
    SnapshotName,
}

/// Sender strategies in priority order
pub const SENDER_STRATEGIES: [SenderStrategy; 4] = [
    SenderStrategy::LivePrefix,
    SenderStrategy::SnapshotPrefix,
    SenderStrategy::LiveName,
    SenderStrategy::SnapshotName,
];

impl SenderStrategy {
    pub fn resolve(self, query: &RouteQuery<'_>) -> Option<ResolvedSender> {
        let pubkey = query.pubkey();
        let sender = query.message.sender.as_str();

        match self {
            SenderStrategy::LivePrefix => {
                if pubkey.is_empty() {
                    return None;
                }
                query
                    .live
                    .lookup_contact_by_prefix(pubkey)
                    .map(|contact| ResolvedSender {
                        key: pubkey.to_string(),
                        contact,
                    })
            }
            SenderStrategy::SnapshotPrefix => {
                if pubkey.is_empty() {
                    return None;
                }
                query
                    .snapshot
                    .contacts
                    .iter()
                    .find(|(key, _)| key.starts_with(pubkey) || pubkey.starts_with(key.as_str()))
                    .map(|(key, contact)| ResolvedSender {
                        key: key.clone(),
                        contact: contact.clone(),
                    })
            }
            SenderStrategy::LiveName => {
                if sender.is_empty() {
                    return None;
                }
                query
                    .live
                    .lookup_contact_by_name(sender)
                    .map(|(key, contact)| ResolvedSender {
                        key: query.key_or(&key),
                        contact,
                    })
            }
            SenderStrategy::SnapshotName => {
                if sender.is_empty() {
                    return None;
                }
                let lowered = sender.to_lowercase();
                query
                    .snapshot
                    .contacts
                    .iter()
                    .find(|(_, c)| {
                        let name = c.name.as_str();
                        !name.is_empty()
                            && (name.to_lowercase() == lowered
                                || sender.starts_with(name)
                                || name.starts_with(sender))
                    })
                    .map(|(key, contact)| ResolvedSender {
                        key: query.key_or(key),
                        contact: contact.clone(),
                    })
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Path Strategies
// ----------------------------------------------------------------------------

/// One source of path-hash fragments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStrategy {
    ReceivedPacket,
    StoredRoute,
}

/// Path strategies in priority order
pub const PATH_STRATEGIES: [PathStrategy; 2] =
    [PathStrategy::ReceivedPacket, PathStrategy::StoredRoute];

impl PathStrategy {
    /// Hash fragments from this source, or `None` when it has no data
    pub fn hashes(self, message: &Message, sender: Option<&ResolvedSender>) -> Option<Vec<String>> {
        match self {
            PathStrategy::ReceivedPacket => message
                .path_hashes
                .as_ref()
                .filter(|hashes| !hashes.is_empty())
                .map(|hashes| hashes.iter().cloned().collect()),
            PathStrategy::StoredRoute => {
                let route = sender?.contact.route.as_ref()?;
                if route.out_path.is_empty() || route.hop_count == 0 {
                    return None;
                }
                Some(decode_out_path(&route.out_path, route.hop_count))
            }
        }
    }

    pub fn source(self) -> PathSource {
        match self {
            PathStrategy::ReceivedPacket => PathSource::ReceivedPacket,
            PathStrategy::StoredRoute => PathSource::StoredRoute,
        }
    }
}

/// Split a stored `out_path` into per-hop fragments
///
/// Reads at most `hop_count` hops of two hex characters each. A trailing
/// half fragment or a chunk that is not hex is skipped.
pub fn decode_out_path(out_path: &str, hop_count: usize) -> Vec<String> {
    let bytes = out_path.as_bytes();
    let limit = bytes.len().min(hop_count.saturating_mul(2));

    bytes[..limit]
        .chunks_exact(2)
        .filter_map(|chunk| match hex::decode(chunk) {
            Ok(byte) => Some(hex::encode(byte)),
            Err(e) => {
                debug!("Skipping invalid out_path hop {:?}: {}", chunk, e);
                None
            }
        })
        .collect()
}

/// First contact whose key starts with `fragment`, ignoring case
pub fn find_contact_by_hash<'a>(
    fragment: &str,
    contacts: impl IntoIterator<Item = (&'a String, &'a Contact)>,
) -> Option<&'a Contact> {
    let fragment = fragment.to_lowercase();
    contacts
        .into_iter()
        .find(|(key, _)| key.to_lowercase().starts_with(&fragment))
        .map(|(_, contact)| contact)
}

fn resolve_hashes(hashes: &[String], snapshot: &StateSnapshot) -> Vec<RouteNode> {
    hashes
        .iter()
        .filter(|hash| hash.len() >= 2)
        .map(|hash| match find_contact_by_hash(hash, &snapshot.contacts) {
            Some(contact) => {
                let name = if contact.name.is_empty() {
                    format!("0x{}", hash)
                } else {
                    contact.name.clone()
                };
                RouteNode::from_contact(name, contact, hash.clone())
            }
            None => RouteNode {
                name: "-".to_string(),
                position: None,
                contact_type: None,
                key: Some(hash.clone()),
            },
        })
        .collect()
}

// ----------------------------------------------------------------------------
// Route Builder
// ----------------------------------------------------------------------------

/// Builds [`RouteResult`]s from in-memory data only
pub struct RouteBuilder<'a> {
    live: &'a dyn ContactLookup,
}

impl<'a> RouteBuilder<'a> {
    /// `live` is consulted before the snapshot when resolving the sender
    pub fn new(live: &'a dyn ContactLookup) -> Self {
        Self { live }
    }

    pub fn build(&self, message: &Message, snapshot: &StateSnapshot) -> RouteResult {
        let query = RouteQuery {
            message,
            snapshot,
            live: self.live,
        };

        let self_node = RouteNode {
            name: if snapshot.device.name.is_empty() {
                "Me".to_string()
            } else {
                snapshot.device.name.clone()
            },
            position: Some(snapshot.device.position()),
            contact_type: None,
            key: None,
        };

        let resolved = SENDER_STRATEGIES.iter().find_map(|strategy| {
            let found = strategy.resolve(&query);
            if let Some(ref sender) = found {
                debug!(
                    "Route build: {:?} found {} ({})",
                    strategy, sender.contact.name, sender.key
                );
            }
            found
        });

        let sender = match &resolved {
            Some(found) => Some(Self::sender_node(message, found)),
            None => Self::fallback_sender(message),
        };

        let (path_nodes, path_source) = PATH_STRATEGIES
            .iter()
            .find_map(|strategy| {
                strategy
                    .hashes(message, resolved.as_ref())
                    .map(|hashes| (resolve_hashes(&hashes, snapshot), strategy.source()))
            })
            .unwrap_or((Vec::new(), PathSource::None));

        debug!(
            "Route build: {} path nodes from {:?}, message hops {}",
            path_nodes.len(),
            path_source,
            message.hop_count
        );

        let has_locations = self_node.has_location()
            || sender.as_ref().map_or(false, RouteNode::has_location)
            || path_nodes.iter().any(RouteNode::has_location);

        RouteResult {
            sender,
            self_node,
            path_nodes,
            snr: message.snr,
            hop_count: message.hop_count,
            has_locations,
            path_source,
        }
    }

    fn sender_node(message: &Message, found: &ResolvedSender) -> RouteNode {
        let name = if !found.contact.name.is_empty() {
            found.contact.name.clone()
        } else if !message.sender.is_empty() {
            message.sender.clone()
        } else {
            found.key.chars().take(8).collect()
        };
        RouteNode::from_contact(name, &found.contact, found.key.clone())
    }

    /// Minimal node built from whatever the message carries
    fn fallback_sender(message: &Message) -> Option<RouteNode> {
        let pubkey = message.sender_pubkey.as_deref().unwrap_or("");
        if message.sender.is_empty() && pubkey.is_empty() {
            return None;
        }
        let name = if !message.sender.is_empty() {
            message.sender.clone()
        } else {
            pubkey.chars().take(8).collect()
        };
        debug!("Route build: fallback sender {:?}", name);
        Some(RouteNode {
            name,
            position: None,
            contact_type: None,
            key: message.sender_pubkey.clone(),
        })
    }
}
