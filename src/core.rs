mod config;

use std::sync::{Arc, RwLock};

use flume::Sender;

use crate::client::{ClientError, MessagingClient, Subscription, SubscriptionHandle};
use crate::core::config::{load_inbox_config, InboxConfig};
use crate::state::{
    now_ns, BusyState, ConnectionState, Conversation, ConversationView, InboxState, Message,
};
use crate::store::{HydratedConversation, InboxStore};
use crate::updates::{CoreMsg, InboxUpdate, InternalEvent};
use crate::InboxAction;

const SYNC_FAILED_NOTICE: &str = "Failed to sync";
const SEND_FAILED_NOTICE: &str = "Failed to send";

/// Bookkeeping for the active identity. Dropped (and the store reset)
/// whenever the identity changes, so nothing leaks across accounts.
struct Session {
    inbox_id: String,
    conversation_sub: Option<SubscriptionHandle>,
    message_sub: Option<SubscriptionHandle>,
}

/// Single-threaded actor owning the cache. All mutation funnels through
/// `handle_message` on the actor thread; network work runs in spawned tasks
/// whose results re-enter the mailbox as `InternalEvent`s tagged with the
/// session epoch they were started under.
pub(crate) struct InboxCore {
    state: InboxState,
    store: InboxStore,
    rev: u64,
    /// Bumped on every connect/disconnect; stale task results are dropped.
    epoch: u64,

    update_sender: Sender<InboxUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<InboxState>>,

    client: Arc<dyn MessagingClient>,
    config: InboxConfig,
    runtime: tokio::runtime::Runtime,

    session: Option<Session>,
}

impl InboxCore {
    pub(crate) fn new(
        update_sender: Sender<InboxUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        client: Arc<dyn MessagingClient>,
        shared_state: Arc<RwLock<InboxState>>,
    ) -> Self {
        let config = load_inbox_config(&data_dir);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let this = Self {
            state: InboxState::empty(),
            store: InboxStore::new(config.tie_break()),
            rev: 0,
            epoch: 0,
            update_sender,
            core_sender,
            shared_state,
            client,
            config,
            runtime,
            session: None,
        };

        // Ensure InboxApp::state() has an immediately-available snapshot.
        this.commit_state();
        this
    }

    fn network_enabled(&self) -> bool {
        self.config.disable_network != Some(true)
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn emit(&mut self, update: InboxUpdate) {
        self.commit_state();
        let _ = self.update_sender.send(update);
    }

    fn commit_state(&self) {
        let snapshot = self.state.clone();
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot,
            Err(poison) => *poison.into_inner() = snapshot,
        }
    }

    fn emit_connection(&mut self) {
        let rev = self.next_rev();
        self.emit(InboxUpdate::ConnectionChanged {
            rev,
            connection: self.state.connection.clone(),
        });
    }

    fn emit_busy(&mut self) {
        let rev = self.next_rev();
        self.emit(InboxUpdate::BusyChanged {
            rev,
            busy: self.state.busy.clone(),
        });
    }

    fn emit_conversation_list(&mut self) {
        let rev = self.next_rev();
        self.emit(InboxUpdate::ConversationListChanged {
            rev,
            conversation_list: self.state.conversation_list.clone(),
        });
    }

    fn emit_messages(&mut self, conversation_id: &str) {
        let rev = self.next_rev();
        let messages = self
            .state
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        self.emit(InboxUpdate::MessagesChanged {
            rev,
            conversation_id: conversation_id.to_string(),
            messages,
        });
    }

    fn emit_notice(&mut self) {
        let rev = self.next_rev();
        self.emit(InboxUpdate::NoticeChanged {
            rev,
            notice: self.state.notice.clone(),
        });
    }

    fn notice(&mut self, msg: impl Into<String>) {
        // Kept in state until the UI explicitly clears it, so a snapshot
        // resync still carries it.
        self.state.notice = Some(msg.into());
        self.emit_notice();
    }

    fn set_busy(&mut self, f: impl FnOnce(&mut BusyState)) {
        let mut next = self.state.busy.clone();
        f(&mut next);
        if next != self.state.busy {
            self.state.busy = next;
            self.emit_busy();
        }
    }

    /// Rebuild the UI-facing conversation projection from the store.
    fn refresh_conversation_projection(&mut self) {
        let list: Vec<ConversationView> = self
            .store
            .sorted_conversations()
            .iter()
            .map(|c| self.view_of(c))
            .collect();
        self.state.conversation_list = list;
        self.state.message_count = self.store.message_count();
        self.emit_conversation_list();
    }

    fn view_of(&self, conversation: &Conversation) -> ConversationView {
        let metadata = self.store.metadata(&conversation.id).cloned().unwrap_or_default();
        ConversationView {
            id: conversation.id.clone(),
            kind: conversation.kind,
            created_at_ns: conversation.created_at_ns,
            name: metadata.name,
            identifier: metadata.identifier,
            peer_inbox_id: metadata.peer_inbox_id,
            last_message: self.store.last_message(&conversation.id).cloned(),
        }
    }

    fn refresh_message_projection(&mut self, conversation_id: &str) {
        self.state.messages.insert(
            conversation_id.to_string(),
            self.store.messages(conversation_id).to_vec(),
        );
        self.state.message_count = self.store.message_count();
        self.emit_messages(conversation_id);
    }

    pub(crate) fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: InboxAction) {
        match action {
            InboxAction::Connect { inbox_id } => {
                self.stop_session();
                self.start_session(inbox_id);
            }
            InboxAction::Disconnect => {
                self.stop_session();
            }
            InboxAction::Refresh { from_network } => {
                self.refresh(from_network);
            }
            InboxAction::SyncConversation {
                conversation_id,
                from_network,
            } => {
                self.sync_conversation(&conversation_id, from_network);
            }
            InboxAction::CreateConversation { address } => {
                self.create_conversation(CreateTarget::Address(address));
            }
            InboxAction::CreateConversationWithInbox { peer_inbox_id } => {
                self.create_conversation(CreateTarget::Inbox(peer_inbox_id));
            }
            InboxAction::SendText {
                conversation_id,
                text,
            } => {
                self.send_text(conversation_id, text);
            }
            InboxAction::ClearNotice => {
                if self.state.notice.is_some() {
                    self.state.notice = None;
                    self.emit_notice();
                }
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        // Results produced under a previous identity must never touch the
        // cache of the current one.
        if self.internal_epoch(&internal) != self.epoch {
            tracing::debug!("dropping stale internal event from a previous session");
            return;
        }

        match internal {
            InternalEvent::ConversationPushed { conversation, .. } => {
                self.hydrate_pushed_conversation(conversation);
            }
            InternalEvent::MessagePushed { message, .. } => {
                let conversation_id = message.conversation_id.clone();
                self.store.apply_message(&conversation_id, message);
                self.refresh_message_projection(&conversation_id);
                self.refresh_conversation_projection();
            }
            InternalEvent::StreamEnded { stream, .. } => {
                // No automatic reconnect; the cache keeps its last state and
                // a manual refresh recovers.
                tracing::warn!(stream, "push stream ended");
            }
            InternalEvent::ConversationsHydrated {
                batch,
                synced_at_ns,
                ..
            } => {
                self.store.apply_conversations(batch);
                if let Some(at) = synced_at_ns {
                    self.store.set_last_synced_at(at);
                    self.state.last_synced_at_ns = Some(at);
                    self.set_busy(|b| {
                        b.syncing = false;
                        b.loading = false;
                    });
                }
                self.refresh_conversation_projection();
            }
            InternalEvent::MessagesFetched {
                conversation_id,
                messages,
                ..
            } => {
                self.store.apply_messages(&conversation_id, messages);
                self.set_busy(|b| {
                    b.syncing = false;
                    b.loading = false;
                });
                self.refresh_message_projection(&conversation_id);
                self.refresh_conversation_projection();
            }
            InternalEvent::ConversationCreated { hydrated, .. } => {
                self.store.apply_conversation(hydrated);
                self.set_busy(|b| b.loading = false);
                self.refresh_conversation_projection();
            }
            InternalEvent::RefreshFailed { error, .. } => {
                tracing::warn!(%error, "refresh failed; keeping last-known-good cache");
                self.set_busy(|b| {
                    b.syncing = false;
                    b.loading = false;
                });
                self.notice(SYNC_FAILED_NOTICE);
            }
            InternalEvent::SendCompleted {
                conversation_id,
                error,
                ..
            } => {
                self.set_busy(|b| b.sending = false);
                if let Some(error) = error {
                    tracing::warn!(conversation_id = %conversation_id, %error, "send failed");
                    self.notice(SEND_FAILED_NOTICE);
                }
            }
        }
    }

    fn internal_epoch(&self, internal: &InternalEvent) -> u64 {
        match internal {
            InternalEvent::ConversationPushed { epoch, .. }
            | InternalEvent::MessagePushed { epoch, .. }
            | InternalEvent::StreamEnded { epoch, .. }
            | InternalEvent::ConversationsHydrated { epoch, .. }
            | InternalEvent::MessagesFetched { epoch, .. }
            | InternalEvent::ConversationCreated { epoch, .. }
            | InternalEvent::RefreshFailed { epoch, .. }
            | InternalEvent::SendCompleted { epoch, .. } => *epoch,
        }
    }

    // Session lifecycle

    fn start_session(&mut self, inbox_id: String) {
        self.epoch += 1;
        self.session = Some(Session {
            inbox_id: inbox_id.clone(),
            conversation_sub: None,
            message_sub: None,
        });
        self.state.connection = ConnectionState::Connected { inbox_id };

        // Streams first: once ConnectionChanged is observable, pushes must
        // already be flowing into the mailbox.
        if self.network_enabled() {
            self.start_streams();
        }
        self.emit_connection();
        self.refresh(true);
    }

    fn stop_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        tracing::info!(inbox_id = %session.inbox_id, "stopping session");
        if let Some(handle) = session.conversation_sub {
            handle.stop();
        }
        if let Some(handle) = session.message_sub {
            handle.stop();
        }
        self.epoch += 1;

        self.store.reset();
        self.state.connection = ConnectionState::Disconnected;
        self.state.conversation_list = vec![];
        self.state.messages.clear();
        self.state.message_count = 0;
        self.state.last_synced_at_ns = None;
        self.state.busy = BusyState::idle();
        self.emit_connection();
        self.emit_busy();
        self.emit_conversation_list();
    }

    fn start_streams(&mut self) {
        match self.client.subscribe_conversations() {
            Ok(sub) => {
                let handle = sub.handle.clone();
                self.pump_conversation_stream(sub);
                if let Some(session) = self.session.as_mut() {
                    session.conversation_sub = Some(handle);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "conversation stream unavailable");
                self.notice(SYNC_FAILED_NOTICE);
            }
        }
        match self.client.subscribe_messages() {
            Ok(sub) => {
                let handle = sub.handle.clone();
                self.pump_message_stream(sub);
                if let Some(session) = self.session.as_mut() {
                    session.message_sub = Some(handle);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "message stream unavailable");
                self.notice(SYNC_FAILED_NOTICE);
            }
        }
    }

    fn pump_conversation_stream(&self, sub: Subscription<Conversation>) {
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        let handle = sub.handle.clone();
        let receiver = sub.receiver;
        self.runtime.spawn(async move {
            loop {
                match receiver.recv_async().await {
                    Ok(conversation) => {
                        if handle.is_stopped() {
                            break;
                        }
                        let _ = tx.send(CoreMsg::Internal(Box::new(
                            InternalEvent::ConversationPushed {
                                epoch,
                                conversation,
                            },
                        )));
                    }
                    Err(_) => {
                        let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::StreamEnded {
                            epoch,
                            stream: "conversations",
                        })));
                        break;
                    }
                }
            }
        });
    }

    fn pump_message_stream(&self, sub: Subscription<Message>) {
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        let handle = sub.handle.clone();
        let receiver = sub.receiver;
        self.runtime.spawn(async move {
            loop {
                match receiver.recv_async().await {
                    Ok(message) => {
                        if handle.is_stopped() {
                            break;
                        }
                        let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::MessagePushed {
                            epoch,
                            message,
                        })));
                    }
                    Err(_) => {
                        let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::StreamEnded {
                            epoch,
                            stream: "messages",
                        })));
                        break;
                    }
                }
            }
        });
    }

    // Sync orchestration

    /// Full-sync protocol: optionally force a transport-level sync, fetch the
    /// window strictly after `last_created_at`, hydrate and ingest it. Safe
    /// to invoke repeatedly and concurrently with itself: worst case the same
    /// bounded window is fetched twice and the merge is idempotent.
    fn refresh(&mut self, from_network: bool) {
        if self.session.is_none() {
            tracing::debug!("refresh ignored while disconnected");
            return;
        }
        let from_network = from_network && self.network_enabled();
        self.set_busy(|b| {
            b.syncing = from_network;
            b.loading = true;
        });

        let client = self.client.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        let watermark = self.store.last_created_at();
        self.runtime.spawn(async move {
            let result = async {
                if from_network {
                    client.sync().await?;
                }
                let conversations = client.conversations_created_after(watermark).await?;
                hydrate_conversations(&client, conversations).await
            }
            .await;

            let event = match result {
                Ok(batch) => InternalEvent::ConversationsHydrated {
                    epoch,
                    batch,
                    synced_at_ns: Some(now_ns()),
                },
                Err(e) => InternalEvent::RefreshFailed {
                    epoch,
                    error: e.to_string(),
                },
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(event)));
        });
    }

    /// Incremental message fetch for one conversation, bounded by its
    /// `last_sent_at` watermark.
    fn sync_conversation(&mut self, conversation_id: &str, from_network: bool) {
        if self.session.is_none() {
            tracing::debug!("conversation sync ignored while disconnected");
            return;
        }
        if !self.store.contains_conversation(conversation_id) {
            tracing::debug!(conversation_id = %conversation_id, "sync requested for unknown conversation");
            return;
        }
        let from_network = from_network && self.network_enabled();
        self.set_busy(|b| {
            b.syncing = from_network;
            b.loading = true;
        });

        let client = self.client.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        let conversation_id = conversation_id.to_string();
        let watermark = self.store.last_sent_at(&conversation_id);
        self.runtime.spawn(async move {
            let result = async {
                if from_network {
                    client.sync().await?;
                }
                client
                    .messages_sent_after(&conversation_id, watermark)
                    .await
            }
            .await;

            let event = match result {
                Ok(messages) => InternalEvent::MessagesFetched {
                    epoch,
                    conversation_id,
                    messages,
                },
                Err(e) => InternalEvent::RefreshFailed {
                    epoch,
                    error: e.to_string(),
                },
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(event)));
        });
    }

    fn create_conversation(&mut self, target: CreateTarget) {
        if self.session.is_none() {
            tracing::debug!("create ignored while disconnected");
            return;
        }
        self.set_busy(|b| b.loading = true);

        let client = self.client.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = async {
                let peer_inbox_id = match target {
                    CreateTarget::Inbox(inbox_id) => inbox_id,
                    CreateTarget::Address(address) => client
                        .resolve_inbox_id(&address)
                        .await?
                        .ok_or_else(|| {
                            ClientError::Rejected(format!(
                                "address {address} is not registered on the messaging network"
                            ))
                        })?,
                };
                let conversation = client.create_conversation(&peer_inbox_id).await?;
                hydrate_conversation(&client, conversation).await
            }
            .await;

            let event = match result {
                Ok(hydrated) => InternalEvent::ConversationCreated { epoch, hydrated },
                Err(e) => InternalEvent::RefreshFailed {
                    epoch,
                    error: e.to_string(),
                },
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(event)));
        });
    }

    /// Delegate to the network; the echo arrives through the message stream
    /// or the next sync. No optimistic local insert.
    fn send_text(&mut self, conversation_id: String, text: String) {
        if self.session.is_none() {
            tracing::debug!("send ignored while disconnected");
            return;
        }
        self.set_busy(|b| b.sending = true);

        let client = self.client.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let error = client
                .send_text(&conversation_id, &text)
                .await
                .err()
                .map(|e| e.to_string());
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::SendCompleted {
                epoch,
                conversation_id,
                error,
            })));
        });
    }

    /// Fire-and-forget hydration of a pushed conversation. Failures are
    /// logged and the event is dropped, never retried and never allowed to
    /// take the stream down.
    fn hydrate_pushed_conversation(&self, conversation: Conversation) {
        let client = self.client.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            match hydrate_conversation(&client, conversation).await {
                Ok(hydrated) => {
                    let _ = tx.send(CoreMsg::Internal(Box::new(
                        InternalEvent::ConversationsHydrated {
                            epoch,
                            batch: vec![hydrated],
                            synced_at_ns: None,
                        },
                    )));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping pushed conversation after failed hydration");
                }
            }
        });
    }
}

enum CreateTarget {
    Address(String),
    Inbox(String),
}

/// Fetch membership and the last message for one conversation.
async fn hydrate_conversation(
    client: &Arc<dyn MessagingClient>,
    conversation: Conversation,
) -> Result<HydratedConversation, ClientError> {
    let (members, last_message) = futures_util::future::try_join(
        client.conversation_members(&conversation.id),
        client.last_message(&conversation.id),
    )
    .await?;
    Ok(HydratedConversation {
        conversation,
        members,
        last_message,
    })
}

/// Hydrate a batch concurrently, one fetch pair per conversation.
async fn hydrate_conversations(
    client: &Arc<dyn MessagingClient>,
    conversations: Vec<Conversation>,
) -> Result<Vec<HydratedConversation>, ClientError> {
    let futures = conversations.into_iter().map(|conversation| {
        let client = client.clone();
        async move { hydrate_conversation(&client, conversation).await }
    });
    futures_util::future::try_join_all(futures).await
}
