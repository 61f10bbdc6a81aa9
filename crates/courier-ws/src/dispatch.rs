use std::sync::Arc;

use courier_core::{HistorySource, PageStore};
use courier_models::{Message, ServerFrame};

/// Receives decoded server frames, one at a time and in arrival order.
pub trait FrameHandler: Send + 'static {
    fn on_messages_update(&mut self, chat_id: i64, messages: Vec<Message>, total: i64);

    /// Something changed server-side while no chat was subscribed.
    fn on_db_changed(&mut self, _timestamp: i64) {}

    fn on_server_error(&mut self, _message: &str) {}
}

/// Decode one text frame and hand it to `handler`. Frames that do not
/// decode, or whose type is unknown, are dropped.
pub fn dispatch_text<F: FrameHandler + ?Sized>(handler: &mut F, text: &str) {
    let frame = match ServerFrame::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, len = text.len(), "dropping malformed frame");
            return;
        }
    };
    match frame {
        ServerFrame::MessagesUpdate {
            chat_id,
            messages,
            total,
            ..
        } => handler.on_messages_update(chat_id, messages, total),
        ServerFrame::DbChanged { timestamp } => handler.on_db_changed(timestamp),
        ServerFrame::Error { message } => {
            tracing::warn!(%message, "server reported an error");
            handler.on_server_error(&message);
        }
        ServerFrame::Unknown => {
            tracing::debug!("dropping frame of unknown type");
        }
    }
}

type DbChangedFn = Box<dyn FnMut(i64) + Send>;
type ErrorFn = Box<dyn FnMut(&str) + Send>;

/// Routes pushed batches into a [`PageStore`] and everything else to
/// optional callbacks.
pub struct StoreDispatcher<H> {
    store: Arc<PageStore<H>>,
    on_db_changed: Option<DbChangedFn>,
    on_error: Option<ErrorFn>,
}

impl<H> StoreDispatcher<H> {
    pub fn new(store: Arc<PageStore<H>>) -> Self {
        Self {
            store,
            on_db_changed: None,
            on_error: None,
        }
    }

    pub fn with_db_changed(mut self, f: impl FnMut(i64) + Send + 'static) -> Self {
        self.on_db_changed = Some(Box::new(f));
        self
    }

    pub fn with_error(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

impl<H: HistorySource + 'static> FrameHandler for StoreDispatcher<H> {
    fn on_messages_update(&mut self, chat_id: i64, messages: Vec<Message>, total: i64) {
        self.store.apply_push(chat_id, messages, total);
    }

    fn on_db_changed(&mut self, timestamp: i64) {
        if let Some(f) = self.on_db_changed.as_mut() {
            f(timestamp);
        }
    }

    fn on_server_error(&mut self, message: &str) {
        if let Some(f) = self.on_error.as_mut() {
            f(message);
        }
    }
}
