//! Play queue boundary receiving tracks opened through the bridge.

use std::sync::Mutex;

use log::info;

use crate::prop_tree::PropNode;

/// Consumer of opened tracks. `metadata` is a live, bound metadata node.
pub trait PlayQueue: Send + Sync {
    fn enqueue(&self, uri: &str, parent: Option<&str>, metadata: PropNode);
}

/// Play queue that only logs and remembers what was enqueued.
#[derive(Debug, Default)]
pub struct LoggingPlayQueue {
    entries: Mutex<Vec<(String, Option<String>, PropNode)>>,
}

impl LoggingPlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uris(&self) -> Vec<String> {
        self.entries
            .lock()
            .expect("play queue lock poisoned")
            .iter()
            .map(|(uri, _, _)| uri.clone())
            .collect()
    }

    pub fn entries(&self) -> Vec<(String, Option<String>, PropNode)> {
        self.entries.lock().expect("play queue lock poisoned").clone()
    }
}

impl PlayQueue for LoggingPlayQueue {
    fn enqueue(&self, uri: &str, parent: Option<&str>, metadata: PropNode) {
        info!("PlayQueue: enqueued {} (parent={:?})", uri, parent);
        self.entries
            .lock()
            .expect("play queue lock poisoned")
            .push((uri.to_string(), parent.map(str::to_string), metadata));
    }
}
