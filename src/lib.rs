//! Embeddable messaging-client core: a volatile local cache of conversations
//! and messages, kept consistent under full re-sync, incremental sync and
//! live push streams, with sorted projections pushed to the UI.
//!
//! The UI talks to [`InboxApp`]: dispatch [`InboxAction`]s, read
//! [`InboxState`] snapshots, and receive [`InboxUpdate`] deltas through an
//! [`InboxReconciler`]. The messaging network itself is an injected
//! collaborator behind [`MessagingClient`].

mod actions;
mod client;
mod core;
mod logging;
mod metadata;
mod order;
mod state;
mod store;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::InboxAction;
pub use client::{ClientError, MessagingClient, Subscription, SubscriptionHandle};
pub use metadata::derive_metadata;
pub use order::{activity_time_ns, sort_conversations, sort_messages};
pub use state::*;
pub use store::{HydratedConversation, InboxStore, LastMessageTieBreak};
pub use updates::{CoreMsg, InboxUpdate, InternalEvent};

/// Host-side callback receiving every [`InboxUpdate`] in emission order.
pub trait InboxReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: InboxUpdate);
}

/// Public handle around the core actor. Cheap to clone the snapshots out of;
/// all mutation goes through `dispatch`.
pub struct InboxApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<InboxUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<InboxState>>,
}

impl InboxApp {
    pub fn new(data_dir: String, client: Arc<dyn MessagingClient>) -> Arc<Self> {
        logging::init_logging();
        tracing::info!(data_dir = %data_dir, "InboxApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(InboxState::empty()));

        // Actor loop thread (single threaded "inbox actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::spawn(move || {
            let mut core = crate::core::InboxCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                client,
                shared_for_core,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        })
    }

    /// Latest committed snapshot. Always available, even before the first
    /// action is processed.
    pub fn state(&self) -> InboxState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: InboxAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn InboxReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        // Seed the listener with the current snapshot; deltas queued before
        // the listener attached carry a lower rev and can be skipped by it.
        let initial = self.state();
        let rx = self.update_rx.clone();
        thread::spawn(move || {
            reconciler.reconcile(InboxUpdate::FullState(initial));
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }
}
