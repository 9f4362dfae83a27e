//! Pure ordering helpers over cache snapshots. No hidden state; safe to call
//! repeatedly and on partial sets.

use std::collections::HashMap;

use crate::state::{Conversation, Message};

/// Activity time of a conversation: send time of its last message when one is
/// recorded, else its creation time, else zero.
pub fn activity_time_ns(
    conversation: &Conversation,
    last_messages: &HashMap<String, Message>,
) -> u64 {
    match last_messages.get(&conversation.id) {
        Some(m) if m.sent_at_ns != 0 => m.sent_at_ns,
        _ => conversation.created_at_ns,
    }
}

/// Conversations in descending activity order. Ties compare equal; no further
/// ordering is promised between them.
pub fn sort_conversations(
    conversations: &HashMap<String, Conversation>,
    last_messages: &HashMap<String, Message>,
) -> Vec<Conversation> {
    let mut list: Vec<Conversation> = conversations.values().cloned().collect();
    list.sort_by_key(|c| std::cmp::Reverse(activity_time_ns(c, last_messages)));
    list
}

/// Messages of one conversation in ascending send-time order. An unset send
/// time sorts as zero, i.e. first.
pub fn sort_messages(messages: &HashMap<String, Message>) -> Vec<Message> {
    let mut list: Vec<Message> = messages.values().cloned().collect();
    list.sort_by_key(|m| m.sent_at_ns);
    list
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

    fn message(id: &str, conversation_id: &str, sent_at_ns: u64) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: conversation_id.to_string(),
            sender_inbox_id: "peer-inbox".to_string(),
            sent_at_ns,
            content: "hi".to_string(),
        }
    }

    #[test]
    fn conversations_sort_by_creation_when_no_messages() {
        let mut conversations = HashMap::new();
        conversations.insert("c1".to_string(), conversation("c1", 100));
        conversations.insert("c2".to_string(), conversation("c2", 150));

        let sorted = sort_conversations(&conversations, &HashMap::new());
        let ids: Vec<&str> = sorted.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c1"]);
    }

    #[test]
    fn last_message_time_outranks_creation_time() {
        let mut conversations = HashMap::new();
        conversations.insert("old".to_string(), conversation("old", 100));
        conversations.insert("new".to_string(), conversation("new", 150));

        let mut last_messages = HashMap::new();
        last_messages.insert("old".to_string(), message("m1", "old", 500));

        let sorted = sort_conversations(&conversations, &last_messages);
        let ids: Vec<&str> = sorted.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "new"]);
    }

    #[test]
    fn last_message_with_unset_send_time_falls_back_to_creation() {
        let conversation = conversation("c1", 100);
        let mut last_messages = HashMap::new();
        last_messages.insert("c1".to_string(), message("m1", "c1", 0));

        assert_eq!(activity_time_ns(&conversation, &last_messages), 100);
    }

    #[test]
    fn messages_sort_ascending_with_unset_times_first() {
        let mut messages = HashMap::new();
        messages.insert("m1".to_string(), message("m1", "c1", 300));
        messages.insert("m2".to_string(), message("m2", "c1", 100));
        messages.insert("m3".to_string(), message("m3", "c1", 0));

        let sorted = sort_messages(&messages);
        let ids: Vec<&str> = sorted.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m3", "m2", "m1"]);
    }

    #[test]
    fn sorting_is_stable_under_resorting() {
        let mut conversations = HashMap::new();
        for i in 0..10u64 {
            let id = format!("c{i}");
            conversations.insert(id.clone(), conversation(&id, i * 10));
        }
        let once = sort_conversations(&conversations, &HashMap::new());
        let twice = sort_conversations(&conversations, &HashMap::new());
        assert_eq!(once, twice);
    }
}
