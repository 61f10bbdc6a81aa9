use std::sync::Arc;

use courier_models::{Message, SendAttachmentRequest, SendRequest, SendTarget};
use courier_util::tentative_id::TentativeIds;
use courier_util::validation::{
    validate_group_target, validate_handle, validate_message_text, ValidationError,
};
use courier_util::{Clock, SystemClock};

use crate::error::CoreError;
use crate::history::{HistorySource, SendTransport};
use crate::page_store::PageStore;

fn validate_target(target: &SendTarget) -> Result<(), ValidationError> {
    validate_group_target(target.is_group, target.chat_identifier.as_deref())?;
    if !target.is_group {
        validate_handle(&target.handle)?;
    }
    Ok(())
}

/// Carries user sends from the compose box to the server.
///
/// Text sends show a placeholder immediately and rely on the realtime push
/// to confirm it; attachment sends have no placeholder and reload the chat
/// once the server accepts them.
pub struct Outbox<H, T> {
    store: Arc<PageStore<H>>,
    transport: T,
    clock: Arc<dyn Clock>,
    ids: TentativeIds,
}

impl<H: HistorySource, T: SendTransport> Outbox<H, T> {
    pub fn new(store: Arc<PageStore<H>>, transport: T) -> Self {
        Self::with_clock(store, transport, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<PageStore<H>>, transport: T, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            transport,
            clock,
            ids: TentativeIds::new(),
        }
    }

    pub fn store(&self) -> &Arc<PageStore<H>> {
        &self.store
    }

    /// Send a text message. Returns the placeholder's tentative id.
    ///
    /// On failure the placeholder is withdrawn before the error is returned.
    pub async fn send_text(
        &self,
        chat_id: i64,
        target: &SendTarget,
        text: &str,
    ) -> Result<i64, CoreError> {
        validate_message_text(text)?;
        validate_target(target)?;

        let temp_id = self.ids.next(self.clock.as_ref());
        let placeholder = Message::outgoing(temp_id, text, self.clock.now_millis());
        self.store.add_optimistic(chat_id, placeholder)?;

        let request = SendRequest::new(target, text);
        if let Err(e) = self.transport.send_text(&request).await {
            tracing::warn!(chat_id, temp_id, error = %e, "send failed, rolling back");
            self.store.rollback_optimistic(chat_id, temp_id);
            return Err(e);
        }
        tracing::info!(chat_id, temp_id, "message sent");
        Ok(temp_id)
    }

    /// Send a file, optionally followed by text. Resolves to a warning when
    /// the file went out but the text did not.
    pub async fn send_attachment(
        &self,
        chat_id: i64,
        target: &SendTarget,
        file_path: &str,
        text: Option<&str>,
    ) -> Result<Option<String>, CoreError> {
        validate_target(target)?;
        if file_path.trim().is_empty() {
            return Err(ValidationError::Missing("file_path").into());
        }
        let text = text
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned);

        let request = SendAttachmentRequest::new(target, file_path, text);
        let warning = self.transport.send_attachment(&request).await?;
        if let Some(warning) = &warning {
            tracing::warn!(chat_id, %warning, "attachment sent with warning");
        }

        // The push for this chat may lag behind; reload so the file shows up.
        if let Err(e) = self.store.replace_from_history(chat_id).await {
            tracing::warn!(chat_id, error = %e, "reload after attachment send failed");
        }
        Ok(warning)
    }
}
