/// UI-driven commands. Dispatching never blocks the caller; results come
/// back as `InboxUpdate`s.
#[derive(Debug, Clone)]
pub enum InboxAction {
    // Identity
    Connect {
        inbox_id: String,
    },
    Disconnect,

    // Sync
    Refresh {
        from_network: bool,
    },
    SyncConversation {
        conversation_id: String,
        from_network: bool,
    },

    // Conversations
    CreateConversation {
        address: String,
    },
    CreateConversationWithInbox {
        peer_inbox_id: String,
    },

    // Messaging
    SendText {
        conversation_id: String,
        text: String,
    },

    // UI
    ClearNotice,
}

impl InboxAction {
    /// Log-safe action tag (never includes message content).
    pub fn tag(&self) -> &'static str {
        match self {
            InboxAction::Connect { .. } => "Connect",
            InboxAction::Disconnect => "Disconnect",
            InboxAction::Refresh { .. } => "Refresh",
            InboxAction::SyncConversation { .. } => "SyncConversation",
            InboxAction::CreateConversation { .. } => "CreateConversation",
            InboxAction::CreateConversationWithInbox { .. } => "CreateConversationWithInbox",
            InboxAction::SendText { .. } => "SendText",
            InboxAction::ClearNotice => "ClearNotice",
        }
    }
}
