use tokio::sync::broadcast;

/// What caused a view to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedCause {
    Loaded,
    Older,
    Refreshed,
    Pushed,
    Optimistic,
    RolledBack,
    Replaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedChange {
    pub chat_id: i64,
    pub cause: FeedCause,
}

/// Broadcast of view changes, for whatever renders the views.
#[derive(Clone)]
pub struct FeedEvents {
    sender: broadcast::Sender<FeedChange>,
}

impl FeedEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, chat_id: i64, cause: FeedCause) {
        // Ignore error if no receivers
        let _ = self.sender.send(FeedChange { chat_id, cause });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedChange> {
        self.sender.subscribe()
    }
}

impl Default for FeedEvents {
    fn default() -> Self {
        Self::new(256)
    }
}
