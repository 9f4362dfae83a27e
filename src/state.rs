use std::collections::HashMap;

/// Network-assigned conversation kind. Carried on the conversation itself so
/// downstream code can match on it instead of probing capabilities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ConversationKind {
    DirectMessage,
    Group,
}

/// A conversation as handed to us by the messaging network.
///
/// `created_at_ns` is non-decreasing in network order but ties are possible;
/// `peer_inbox_id` is the network-reported counterparty for two-party
/// conversations, when the network knows it.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Conversation {
    pub id: String,
    pub kind: ConversationKind,
    pub created_at_ns: u64,
    /// Explicit display name; groups only, often unset.
    pub name: Option<String>,
    /// Inbox id of whoever added the other party. Used to tell "self" from
    /// "peer" in two-party conversations.
    pub added_by_inbox_id: String,
    pub peer_inbox_id: Option<String>,
}

/// A participant record, read-only once fetched for a given ingestion.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Member {
    pub inbox_id: String,
    /// Chain-level account identifiers (e.g. an address). May be empty.
    pub account_identifiers: Vec<String>,
}

/// A message as handed to us by the network. Immutable once stored; message
/// ids are only unique within their conversation, so cache keys are always
/// `(conversation_id, id)`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_inbox_id: String,
    /// Nanosecond send time; 0 means the network never set one.
    pub sent_at_ns: u64,
    /// Opaque payload; the cache never inspects it.
    pub content: String,
}

/// Display metadata derived from membership. Recomputed from scratch on every
/// membership (re)ingestion, never merged or edited in place.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConversationMetadata {
    pub name: String,
    pub peer_inbox_id: Option<String>,
    /// Lower-cased chain identifier of the peer, when one exists.
    pub identifier: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connected { inbox_id: String },
}

/// "In flight" flags for UI spinners. Advisory only: correctness relies on
/// the watermarks and idempotent ingestion, never on these.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct BusyState {
    pub syncing: bool,
    pub loading: bool,
    pub sending: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self::default()
    }
}

/// One row of the sorted conversation projection.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ConversationView {
    pub id: String,
    pub kind: ConversationKind,
    pub created_at_ns: u64,
    pub name: String,
    pub identifier: Option<String>,
    pub peer_inbox_id: Option<String>,
    /// Preview of the most recent message, if any.
    pub last_message: Option<Message>,
}

/// Read-only snapshot pushed to the UI. Everything here is a derived
/// projection of the store; consumers must never mutate it in place.
#[derive(Clone, Debug, serde::Serialize)]
pub struct InboxState {
    pub rev: u64,
    pub connection: ConnectionState,
    pub busy: BusyState,
    /// Conversations in descending activity order.
    pub conversation_list: Vec<ConversationView>,
    /// Per-conversation messages in ascending send-time order.
    pub messages: HashMap<String, Vec<Message>>,
    pub message_count: usize,
    pub last_synced_at_ns: Option<u64>,
    /// Non-fatal inline failure notice ("failed to sync"); cleared by the UI.
    pub notice: Option<String>,
}

impl InboxState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            connection: ConnectionState::Disconnected,
            busy: BusyState::idle(),
            conversation_list: vec![],
            messages: HashMap::new(),
            message_count: 0,
            last_synced_at_ns: None,
            notice: None,
        }
    }
}

pub fn now_ns() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
