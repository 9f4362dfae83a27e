//! Display metadata derivation.
//!
//! Pure and total: malformed membership degrades through a fallback chain
//! (chain identifier → peer inbox id → conversation id prefix → "Group")
//! instead of failing, so the UI always has something to render.

use crate::state::{Conversation, ConversationKind, ConversationMetadata, Member};

const GROUP_FALLBACK_NAME: &str = "Group";

/// Derive metadata for a conversation from its freshly fetched membership.
///
/// Must be called every time membership is (re)ingested; the result replaces
/// whatever was derived before.
pub fn derive_metadata(conversation: &Conversation, members: &[Member]) -> ConversationMetadata {
    // Two-party: the kind says DM, or the membership happens to be a pair.
    if conversation.kind == ConversationKind::DirectMessage || members.len() == 2 {
        // The peer is whoever was not the one doing the adding.
        if let Some(peer) = members
            .iter()
            .find(|m| m.inbox_id != conversation.added_by_inbox_id)
        {
            let peer_inbox_id = conversation
                .peer_inbox_id
                .clone()
                .filter(|id| !id.is_empty())
                .or_else(|| {
                    if peer.inbox_id.is_empty() {
                        None
                    } else {
                        Some(peer.inbox_id.clone())
                    }
                });

            if let Some(identifier) = peer
                .account_identifiers
                .first()
                .filter(|id| !id.is_empty())
                .map(|id| id.to_lowercase())
            {
                return ConversationMetadata {
                    name: identifier.clone(),
                    peer_inbox_id,
                    identifier: Some(identifier),
                };
            }

            // No chain identifier: fall back to the inbox id, then to a
            // prefix of the conversation id so the name is never empty.
            let name = peer_inbox_id
                .clone()
                .unwrap_or_else(|| short_id(&conversation.id));
            return ConversationMetadata {
                name,
                peer_inbox_id,
                identifier: None,
            };
        }
    }

    // Group, or a two-party conversation with no resolvable peer.
    ConversationMetadata {
        name: conversation
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| GROUP_FALLBACK_NAME.to_string()),
        peer_inbox_id: None,
        identifier: None,
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dm(id: &str) -> Conversation {
        Conversation {
            id: id.to_string(),
            kind: ConversationKind::DirectMessage,
            created_at_ns: 100,
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

    #[test]
    fn peer_chain_identifier_is_lowercased() {
        let members = vec![
            member("self-inbox", &["0xSELF"]),
            member("peer-inbox", &["0xABCdef"]),
        ];
        let meta = derive_metadata(&dm("c1"), &members);
        assert_eq!(meta.name, "0xabcdef");
        assert_eq!(meta.identifier.as_deref(), Some("0xabcdef"));
        assert_eq!(meta.peer_inbox_id.as_deref(), Some("peer-inbox"));
    }

    #[test]
    fn network_reported_peer_inbox_id_wins_over_derived() {
        let mut conversation = dm("c1");
        conversation.peer_inbox_id = Some("reported-inbox".to_string());
        let members = vec![member("self-inbox", &[]), member("peer-inbox", &[])];
        let meta = derive_metadata(&conversation, &members);
        assert_eq!(meta.peer_inbox_id.as_deref(), Some("reported-inbox"));
        assert_eq!(meta.name, "reported-inbox");
    }

    #[test]
    fn falls_back_to_peer_inbox_id_without_chain_identifier() {
        let members = vec![member("self-inbox", &[]), member("peer-inbox", &[])];
        let meta = derive_metadata(&dm("c1"), &members);
        assert_eq!(meta.name, "peer-inbox");
        assert_eq!(meta.identifier, None);
        assert_eq!(meta.peer_inbox_id.as_deref(), Some("peer-inbox"));
    }

    #[test]
    fn falls_back_to_conversation_id_prefix_when_peer_is_bare() {
        let members = vec![member("self-inbox", &[]), member("", &[])];
        let meta = derive_metadata(&dm("conversation-1"), &members);
        assert_eq!(meta.name, "conversa");
        assert_eq!(meta.identifier, None);
        assert_eq!(meta.peer_inbox_id, None);
    }

    #[test]
    fn no_resolvable_peer_yields_group_label() {
        // Only "self" present: membership anomaly.
        let members = vec![member("self-inbox", &["0xSELF"])];
        let meta = derive_metadata(&dm("c1"), &members);
        assert_eq!(meta.name, "Group");
        assert_eq!(meta.peer_inbox_id, None);
    }

    #[test]
    fn group_uses_explicit_name_or_label() {
        let mut group = dm("g1");
        group.kind = ConversationKind::Group;
        let members = vec![
            member("self-inbox", &[]),
            member("a", &[]),
            member("b", &[]),
        ];

        assert_eq!(derive_metadata(&group, &members).name, "Group");

        group.name = Some("Rustaceans".to_string());
        assert_eq!(derive_metadata(&group, &members).name, "Rustaceans");
    }

    #[test]
    fn two_member_group_is_treated_as_two_party() {
        let mut group = dm("g1");
        group.kind = ConversationKind::Group;
        let members = vec![member("self-inbox", &[]), member("peer-inbox", &["0xAB"])];
        let meta = derive_metadata(&group, &members);
        assert_eq!(meta.name, "0xab");
    }
}
