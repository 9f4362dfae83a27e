//! The in-memory inbox cache.
//!
//! Owns the authoritative conversation/message maps, the monotonic
//! watermarks, and the memoized sorted projections. All mutation happens on
//! the core actor thread; every operation merges into the maps (overwrite by
//! key, never append duplicates) and rebuilds the affected projections, so a
//! projection is never stale relative to its source map.

use std::collections::HashMap;

use crate::metadata::derive_metadata;
use crate::order::{sort_conversations, sort_messages};
use crate::state::{Conversation, ConversationMetadata, Member, Message};

/// Policy for the "is this the newest message" check against the
/// per-conversation send-time watermark.
///
/// `StrictlyNewer` preserves the observed behavior: a message whose send time
/// exactly equals the watermark does not become the preview, so callers must
/// not rely on preview accuracy under timestamp collisions. `NewerOrEqual`
/// trades that for collision tolerance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LastMessageTieBreak {
    #[default]
    StrictlyNewer,
    NewerOrEqual,
}

/// A conversation together with the collaborator lookups ingestion needs:
/// freshly fetched membership and the most recent message, if any.
#[derive(Clone, Debug)]
pub struct HydratedConversation {
    pub conversation: Conversation,
    pub members: Vec<Member>,
    pub last_message: Option<Message>,
}

#[derive(Debug, Default)]
pub struct InboxStore {
    tie_break: LastMessageTieBreak,

    conversations: HashMap<String, Conversation>,
    members: HashMap<String, HashMap<String, Member>>,
    metadata: HashMap<String, ConversationMetadata>,
    last_messages: HashMap<String, Message>,
    messages: HashMap<String, HashMap<String, Message>>,

    sorted_conversations: Vec<Conversation>,
    sorted_messages: HashMap<String, Vec<Message>>,

    last_created_at: Option<u64>,
    last_sent_at: HashMap<String, u64>,
    last_synced_at: Option<u64>,
}

impl InboxStore {
    pub fn new(tie_break: LastMessageTieBreak) -> Self {
        Self {
            tie_break,
            ..Self::default()
        }
    }

    /// Merge one hydrated conversation. Idempotent: membership, metadata and
    /// the last-message reference are overwritten wholesale, never appended.
    pub fn apply_conversation(&mut self, hydrated: HydratedConversation) {
        self.merge_conversation(hydrated);
        self.rebuild_conversation_projection();
    }

    /// Merge a batch in one step; the projection reflects the whole batch.
    pub fn apply_conversations(&mut self, batch: Vec<HydratedConversation>) {
        if batch.is_empty() {
            return;
        }
        for hydrated in batch {
            self.merge_conversation(hydrated);
        }
        self.rebuild_conversation_projection();
    }

    fn merge_conversation(&mut self, hydrated: HydratedConversation) {
        let HydratedConversation {
            conversation,
            members,
            last_message,
        } = hydrated;
        let id = conversation.id.clone();

        self.metadata
            .insert(id.clone(), derive_metadata(&conversation, &members));
        self.members.insert(
            id.clone(),
            members
                .into_iter()
                .map(|m| (m.inbox_id.clone(), m))
                .collect(),
        );

        // Watermark only ever goes up; equal or older creation times leave it
        // alone.
        self.last_created_at = Some(match self.last_created_at {
            Some(current) => current.max(conversation.created_at_ns),
            None => conversation.created_at_ns,
        });

        match last_message {
            Some(m) => {
                self.last_messages.insert(id.clone(), m);
            }
            None => {
                self.last_messages.remove(&id);
            }
        }

        self.conversations.insert(id, conversation);
    }

    /// Merge one message into its conversation. Duplicate ids overwrite; the
    /// preview and `last_sent_at` only move when the tie-break check passes.
    pub fn apply_message(&mut self, conversation_id: &str, message: Message) {
        self.merge_message(conversation_id, message);
        self.rebuild_message_projection(conversation_id);
        self.rebuild_conversation_projection();
    }

    pub fn apply_messages(&mut self, conversation_id: &str, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }
        for message in messages {
            self.merge_message(conversation_id, message);
        }
        self.rebuild_message_projection(conversation_id);
        self.rebuild_conversation_projection();
    }

    fn merge_message(&mut self, conversation_id: &str, message: Message) {
        if self.is_last_sent_at(conversation_id, message.sent_at_ns) {
            self.last_sent_at
                .insert(conversation_id.to_string(), message.sent_at_ns);
            self.last_messages
                .insert(conversation_id.to_string(), message.clone());
        }
        self.messages
            .entry(conversation_id.to_string())
            .or_default()
            .insert(message.id.clone(), message);
    }

    /// First message observed for a conversation always counts as newest;
    /// after that the configured tie-break applies.
    fn is_last_sent_at(&self, conversation_id: &str, sent_at_ns: u64) -> bool {
        match self.last_sent_at.get(conversation_id) {
            None => true,
            Some(&current) => match self.tie_break {
                LastMessageTieBreak::StrictlyNewer => sent_at_ns > current,
                LastMessageTieBreak::NewerOrEqual => sent_at_ns >= current,
            },
        }
    }

    fn rebuild_conversation_projection(&mut self) {
        self.sorted_conversations = sort_conversations(&self.conversations, &self.last_messages);
    }

    fn rebuild_message_projection(&mut self, conversation_id: &str) {
        let sorted = self
            .messages
            .get(conversation_id)
            .map(sort_messages)
            .unwrap_or_default();
        self.sorted_messages
            .insert(conversation_id.to_string(), sorted);
    }

    // Point lookups. Unknown keys answer None/false/empty, never panic.

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn contains_conversation(&self, id: &str) -> bool {
        self.conversations.contains_key(id)
    }

    pub fn members(&self, conversation_id: &str) -> Option<&HashMap<String, Member>> {
        self.members.get(conversation_id)
    }

    pub fn metadata(&self, conversation_id: &str) -> Option<&ConversationMetadata> {
        self.metadata.get(conversation_id)
    }

    pub fn last_message(&self, conversation_id: &str) -> Option<&Message> {
        self.last_messages.get(conversation_id)
    }

    pub fn message(&self, conversation_id: &str, message_id: &str) -> Option<&Message> {
        self.messages.get(conversation_id)?.get(message_id)
    }

    pub fn contains_message(&self, conversation_id: &str, message_id: &str) -> bool {
        self.message(conversation_id, message_id).is_some()
    }

    /// Sorted messages of one conversation. Empty slice for unknown ids.
    pub fn messages(&self, conversation_id: &str) -> &[Message] {
        self.sorted_messages
            .get(conversation_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Conversations in descending activity order.
    pub fn sorted_conversations(&self) -> &[Conversation] {
        &self.sorted_conversations
    }

    pub fn sorted_messages(&self) -> &HashMap<String, Vec<Message>> {
        &self.sorted_messages
    }

    pub fn message_count(&self) -> usize {
        self.sorted_messages.values().map(Vec::len).sum()
    }

    pub fn last_created_at(&self) -> Option<u64> {
        self.last_created_at
    }

    pub fn last_sent_at(&self, conversation_id: &str) -> Option<u64> {
        self.last_sent_at.get(conversation_id).copied()
    }

    pub fn last_synced_at(&self) -> Option<u64> {
        self.last_synced_at
    }

    pub fn set_last_synced_at(&mut self, synced_at_ns: u64) {
        self.last_synced_at = Some(synced_at_ns);
    }

    /// Back to the initial empty state: maps and projections cleared,
    /// watermarks undefined. The tie-break policy survives.
    pub fn reset(&mut self) {
        self.conversations.clear();
        self.members.clear();
        self.metadata.clear();
        self.last_messages.clear();
        self.messages.clear();
        self.sorted_conversations.clear();
        self.sorted_messages.clear();
        self.last_created_at = None;
        self.last_sent_at.clear();
        self.last_synced_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ConversationKind;

    fn conversation(id: &str, created_at_ns: u64) -> Conversation {
        Conversation {
            id: id.to_string(),
            kind: ConversationKind::DirectMessage,
            created_at_ns,
            name: None,
            added_by_inbox_id: "self-inbox".to_string(),
            peer_inbox_id: None,
        }
    }

    fn member(inbox_id: &str, identifiers: &[&str]) -> Member {
        Member {
            inbox_id: inbox_id.to_string(),
            account_identifiers: identifiers.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn message(id: &str, conversation_id: &str, sent_at_ns: u64) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: conversation_id.to_string(),
            sender_inbox_id: "peer-inbox".to_string(),
            sent_at_ns,
            content: format!("content of {id}"),
        }
    }

    fn hydrated(id: &str, created_at_ns: u64) -> HydratedConversation {
        HydratedConversation {
            conversation: conversation(id, created_at_ns),
            members: vec![member("self-inbox", &[]), member("peer-inbox", &["0xABC"])],
            last_message: None,
        }
    }

    #[test]
    fn ingesting_a_conversation_twice_is_idempotent() {
        let mut store = InboxStore::default();
        store.apply_conversation(hydrated("c1", 100));
        let once = (
            store.sorted_conversations().to_vec(),
            store.metadata("c1").cloned(),
            store.last_created_at(),
        );

        store.apply_conversation(hydrated("c1", 100));
        assert_eq!(store.sorted_conversations().len(), 1);
        assert_eq!(store.sorted_conversations().to_vec(), once.0);
        assert_eq!(store.metadata("c1").cloned(), once.1);
        assert_eq!(store.last_created_at(), once.2);
    }

    #[test]
    fn reingestion_overwrites_membership_and_metadata() {
        let mut store = InboxStore::default();
        store.apply_conversation(hydrated("c1", 100));
        assert_eq!(store.metadata("c1").unwrap().name, "0xabc");

        let renamed = HydratedConversation {
            conversation: conversation("c1", 100),
            members: vec![member("self-inbox", &[]), member("peer-inbox", &["0xDEF"])],
            last_message: None,
        };
        store.apply_conversation(renamed);
        assert_eq!(store.metadata("c1").unwrap().name, "0xdef");
        assert_eq!(store.members("c1").unwrap().len(), 2);
    }

    #[test]
    fn last_created_at_is_monotonic() {
        let mut store = InboxStore::default();
        assert_eq!(store.last_created_at(), None);

        store.apply_conversation(hydrated("c1", 100));
        assert_eq!(store.last_created_at(), Some(100));

        store.apply_conversation(hydrated("c2", 150));
        assert_eq!(store.last_created_at(), Some(150));

        // An older conversation arriving late cannot lower the watermark.
        store.apply_conversation(hydrated("c0", 50));
        assert_eq!(store.last_created_at(), Some(150));
    }

    #[test]
    fn conversations_sort_by_creation_then_by_last_message() {
        let mut store = InboxStore::default();
        store.apply_conversations(vec![hydrated("c1", 100), hydrated("c2", 150)]);
        let ids: Vec<&str> = store
            .sorted_conversations()
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c2", "c1"]);

        // A message in c1 moves it on top.
        store.apply_message("c1", message("m1", "c1", 200));
        let ids: Vec<&str> = store
            .sorted_conversations()
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[test]
    fn first_message_sets_watermark_and_preview() {
        let mut store = InboxStore::default();
        store.apply_conversation(hydrated("c1", 100));
        assert_eq!(store.last_sent_at("c1"), None);

        store.apply_message("c1", message("m1", "c1", 200));
        assert_eq!(store.last_sent_at("c1"), Some(200));
        assert_eq!(store.last_message("c1").unwrap().id, "m1");
        assert_eq!(store.sorted_conversations().len(), 1);
    }

    #[test]
    fn duplicate_message_id_overwrites_instead_of_duplicating() {
        let mut store = InboxStore::default();
        store.apply_message("c1", message("m1", "c1", 200));
        store.apply_message("c1", message("m1", "c1", 200));
        assert_eq!(store.messages("c1").len(), 1);

        // Most recently ingested content wins.
        let mut edited = message("m1", "c1", 200);
        edited.content = "edited".to_string();
        store.apply_message("c1", edited);
        assert_eq!(store.messages("c1").len(), 1);
        assert_eq!(store.message("c1", "m1").unwrap().content, "edited");
    }

    #[test]
    fn older_message_is_stored_but_not_previewed() {
        let mut store = InboxStore::default();
        store.apply_message("c1", message("m1", "c1", 200));
        store.apply_message("c1", message("m2", "c1", 150));

        assert_eq!(store.last_sent_at("c1"), Some(200));
        assert_eq!(store.last_message("c1").unwrap().id, "m1");
        assert_eq!(store.messages("c1").len(), 2);
        // Sorted ascending by send time.
        let ids: Vec<&str> = store.messages("c1").iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m1"]);
    }

    #[test]
    fn equal_timestamp_is_not_newest_under_strict_tie_break() {
        let mut store = InboxStore::new(LastMessageTieBreak::StrictlyNewer);
        store.apply_message("c1", message("m1", "c1", 200));
        store.apply_message("c1", message("m2", "c1", 200));

        assert_eq!(store.last_message("c1").unwrap().id, "m1");
        assert_eq!(store.last_sent_at("c1"), Some(200));
        assert_eq!(store.messages("c1").len(), 2);
    }

    #[test]
    fn equal_timestamp_updates_preview_under_newer_or_equal() {
        let mut store = InboxStore::new(LastMessageTieBreak::NewerOrEqual);
        store.apply_message("c1", message("m1", "c1", 200));
        store.apply_message("c1", message("m2", "c1", 200));

        assert_eq!(store.last_message("c1").unwrap().id, "m2");
        assert_eq!(store.last_sent_at("c1"), Some(200));
    }

    #[test]
    fn batch_ingestion_matches_sequential_ingestion() {
        let mut sequential = InboxStore::default();
        sequential.apply_message("c1", message("m1", "c1", 200));
        sequential.apply_message("c1", message("m2", "c1", 150));
        sequential.apply_message("c1", message("m3", "c1", 300));

        let mut batched = InboxStore::default();
        batched.apply_messages(
            "c1",
            vec![
                message("m1", "c1", 200),
                message("m2", "c1", 150),
                message("m3", "c1", 300),
            ],
        );

        assert_eq!(sequential.messages("c1"), batched.messages("c1"));
        assert_eq!(sequential.last_sent_at("c1"), batched.last_sent_at("c1"));
        assert_eq!(
            sequential.last_message("c1").unwrap().id,
            batched.last_message("c1").unwrap().id
        );
    }

    #[test]
    fn message_ids_are_conversation_scoped() {
        let mut store = InboxStore::default();
        store.apply_message("c1", message("m1", "c1", 200));
        store.apply_message("c2", message("m1", "c2", 300));

        assert_eq!(store.messages("c1").len(), 1);
        assert_eq!(store.messages("c2").len(), 1);
        assert_eq!(store.message_count(), 2);
        assert!(store.contains_message("c1", "m1"));
        assert!(!store.contains_message("c3", "m1"));
    }

    #[test]
    fn unknown_keys_answer_empty() {
        let store = InboxStore::default();
        assert!(store.conversation("nope").is_none());
        assert!(!store.contains_conversation("nope"));
        assert!(store.message("nope", "m").is_none());
        assert!(store.messages("nope").is_empty());
        assert_eq!(store.last_sent_at("nope"), None);
    }

    #[test]
    fn reset_restores_the_initial_state() {
        let mut store = InboxStore::default();
        store.apply_conversations(vec![hydrated("c1", 100), hydrated("c2", 150)]);
        store.apply_messages("c1", vec![message("m1", "c1", 200)]);
        store.set_last_synced_at(999);

        store.reset();

        assert!(store.sorted_conversations().is_empty());
        assert!(store.sorted_messages().is_empty());
        assert_eq!(store.message_count(), 0);
        assert_eq!(store.last_created_at(), None);
        assert_eq!(store.last_sent_at("c1"), None);
        assert_eq!(store.last_synced_at(), None);
        assert!(!store.contains_conversation("c1"));
    }

    #[test]
    fn hydrated_last_message_becomes_the_preview() {
        let mut store = InboxStore::default();
        let with_last = HydratedConversation {
            conversation: conversation("c1", 100),
            members: vec![member("self-inbox", &[]), member("peer-inbox", &[])],
            last_message: Some(message("m9", "c1", 500)),
        };
        store.apply_conversation(with_last);
        assert_eq!(store.last_message("c1").unwrap().id, "m9");

        // Re-hydration without a last message clears the preview; watermarks
        // are untouched by conversation ingestion.
        store.apply_conversation(hydrated("c1", 100));
        assert!(store.last_message("c1").is_none());
    }
}
