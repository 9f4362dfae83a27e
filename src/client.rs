//! Seam to the external messaging network.
//!
//! The cache never talks to a transport directly; everything it consumes is
//! behind this trait so the core can be driven by a real client or by an
//! in-process mock in tests. Identifiers and nanosecond timestamps are
//! assigned by the network and treated as opaque here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::state::{Conversation, Member, Message};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transient transport failure; the cache keeps its last-known-good state.
    #[error("network failure: {0}")]
    Network(String),
    /// The network refused the request (bad input, unauthorized, ...).
    #[error("rejected by network: {0}")]
    Rejected(String),
}

/// Stop-delivery handle for a push subscription. Invoking `stop` prevents
/// future deliveries; items already in flight may still arrive and are
/// dropped by the consumer.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionHandle {
    stopped: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// A live push stream plus its termination handle. The channel closing means
/// the stream ended on the network side; no automatic reconnect happens here.
pub struct Subscription<T> {
    pub receiver: flume::Receiver<T>,
    pub handle: SubscriptionHandle,
}

/// Operations consumed from the messaging network client.
///
/// `sync` is the transport-level forced sync; the `*_after` fetches are
/// bounded by the caller's watermarks (`None` means "from the beginning").
#[async_trait]
pub trait MessagingClient: Send + Sync + 'static {
    /// Force a network-level sync of the underlying transport.
    async fn sync(&self) -> Result<(), ClientError>;

    /// Conversations created strictly after the watermark.
    async fn conversations_created_after(
        &self,
        created_after_ns: Option<u64>,
    ) -> Result<Vec<Conversation>, ClientError>;

    async fn conversation_members(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Member>, ClientError>;

    /// Most recent message of a conversation, if it has any.
    async fn last_message(&self, conversation_id: &str) -> Result<Option<Message>, ClientError>;

    /// Messages sent strictly after the watermark.
    async fn messages_sent_after(
        &self,
        conversation_id: &str,
        sent_after_ns: Option<u64>,
    ) -> Result<Vec<Message>, ClientError>;

    /// Map a chain address to an inbox id; `None` when the address is not
    /// registered on the network.
    async fn resolve_inbox_id(&self, address: &str) -> Result<Option<String>, ClientError>;

    /// Create (or return the existing) direct conversation with a peer.
    async fn create_conversation(&self, peer_inbox_id: &str)
        -> Result<Conversation, ClientError>;

    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<(), ClientError>;

    /// Push stream of newly created conversations.
    fn subscribe_conversations(&self) -> Result<Subscription<Conversation>, ClientError>;

    /// Push stream of new messages across all conversations.
    fn subscribe_messages(&self) -> Result<Subscription<Message>, ClientError>;
}
