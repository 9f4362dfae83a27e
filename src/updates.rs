use crate::state::{BusyState, ConnectionState, ConversationView, InboxState, Message};
use crate::store::HydratedConversation;
use crate::InboxAction;

/// Revisioned deltas pushed to the UI. `rev` increases with every emission;
/// a reconciler that sees a gap can fall back to a full `state()` snapshot.
#[derive(Clone, Debug)]
pub enum InboxUpdate {
    FullState(InboxState),
    ConnectionChanged {
        rev: u64,
        connection: ConnectionState,
    },
    BusyChanged {
        rev: u64,
        busy: BusyState,
    },
    ConversationListChanged {
        rev: u64,
        conversation_list: Vec<ConversationView>,
    },
    MessagesChanged {
        rev: u64,
        conversation_id: String,
        messages: Vec<Message>,
    },
    NoticeChanged {
        rev: u64,
        notice: Option<String>,
    },
}

impl InboxUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            InboxUpdate::FullState(s) => s.rev,
            InboxUpdate::ConnectionChanged { rev, .. } => *rev,
            InboxUpdate::BusyChanged { rev, .. } => *rev,
            InboxUpdate::ConversationListChanged { rev, .. } => *rev,
            InboxUpdate::MessagesChanged { rev, .. } => *rev,
            InboxUpdate::NoticeChanged { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(InboxAction),
    Internal(Box<InternalEvent>),
}

/// Async results and pushed network events re-entering the actor. Every
/// variant that touches the cache carries the session epoch it was produced
/// under; results from a previous identity are dropped on arrival.
#[derive(Debug)]
pub enum InternalEvent {
    // Push streams
    ConversationPushed {
        epoch: u64,
        conversation: crate::state::Conversation,
    },
    MessagePushed {
        epoch: u64,
        message: Message,
    },
    StreamEnded {
        epoch: u64,
        stream: &'static str,
    },

    // Fetch-task results
    ConversationsHydrated {
        epoch: u64,
        batch: Vec<HydratedConversation>,
        /// Wall-clock time of the refresh that produced the batch, when the
        /// batch came from a full sync rather than a single push.
        synced_at_ns: Option<u64>,
    },
    MessagesFetched {
        epoch: u64,
        conversation_id: String,
        messages: Vec<Message>,
    },
    ConversationCreated {
        epoch: u64,
        hydrated: HydratedConversation,
    },
    RefreshFailed {
        epoch: u64,
        error: String,
    },
    SendCompleted {
        epoch: u64,
        conversation_id: String,
        error: Option<String>,
    },
}
