use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::{
    audio_delivery::ActivePipe,
    config::Config,
    credentials::CredentialPrompt,
    metadata::binding_registry::MetadataRegistry,
    play_queue::PlayQueue,
    prop_tree::{PropNode, PropTree},
    protocol::Notification,
};

/// Login flag shared between the worker and blocking callers.
#[derive(Default)]
pub(crate) struct LoginState {
    logged_in: Mutex<bool>,
    changed: Condvar,
}

impl LoginState {
    pub(crate) fn set(&self, logged_in: bool) {
        *self.logged_in.lock().expect("login state lock poisoned") = logged_in;
        self.changed.notify_all();
    }

    /// Wakes waiters without changing the flag (login cancelled).
    pub(crate) fn wake(&self) {
        self.changed.notify_all();
    }

    pub(crate) fn is_logged_in(&self) -> bool {
        *self.logged_in.lock().expect("login state lock poisoned")
    }

    /// Waits until logged out or the timeout expires. Returns the final flag.
    pub(crate) fn wait_logged_out(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut logged_in = self.logged_in.lock().expect("login state lock poisoned");
        while *logged_in {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            logged_in = self
                .changed
                .wait_timeout(logged_in, deadline - now)
                .expect("login state lock poisoned")
                .0;
        }
        *logged_in
    }
}

/// Tree nodes owned by the bridge and shared with every page.
#[derive(Clone)]
pub(crate) struct SharedNodes {
    pub(crate) tree: Arc<PropTree>,
    /// Human-readable login status text.
    pub(crate) status: PropNode,
    /// Global list of mirrored playlists.
    pub(crate) playlists: PropNode,
    /// 1 while the playlist container is still loading.
    pub(crate) syncing: PropNode,
}

impl SharedNodes {
    pub(crate) fn new(tree: Arc<PropTree>) -> Self {
        let root = tree.create_detached(Some("service"));
        let status = root.create("status");
        status.set_string("Not logged in");
        let playlists = root.create("playlists");
        let syncing = root.create("syncing_playlists");
        syncing.set_int(1);
        Self {
            tree,
            status,
            playlists,
            syncing,
        }
    }
}

/// State shared between the bridge facade and its session worker.
#[derive(Clone)]
pub(crate) struct BridgeContext {
    pub(crate) config: Config,
    pub(crate) nodes: SharedNodes,
    pub(crate) registry: MetadataRegistry,
    pub(crate) active_pipe: ActivePipe,
    pub(crate) login: Arc<LoginState>,
    pub(crate) notifications: broadcast::Sender<Notification>,
    pub(crate) credentials: Arc<dyn CredentialPrompt>,
    pub(crate) play_queue: Arc<dyn PlayQueue>,
}

impl BridgeContext {
    pub(crate) fn notify(&self, notification: Notification) {
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }
}
