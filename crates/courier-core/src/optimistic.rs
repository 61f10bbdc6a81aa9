use courier_models::Message;
use courier_util::tentative_id::is_tentative;

use crate::error::CoreError;
use crate::events::FeedCause;
use crate::history::HistorySource;
use crate::page_store::{FeedEntry, PageStore};
use crate::view::{FeedView, PagedFeed};

impl FeedView {
    /// Append a local placeholder ahead of server confirmation.
    pub fn add_optimistic(&mut self, message: Message) -> Result<(), CoreError> {
        if !is_tentative(message.id) {
            return Err(CoreError::State(format!(
                "message {} has a server id and cannot be added optimistically",
                message.id
            )));
        }
        if self.contains(message.id) {
            return Err(CoreError::State(format!(
                "placeholder {} is already pending",
                message.id
            )));
        }
        self.messages.push(message);
        self.total += 1;
        Ok(())
    }

    /// Withdraw a placeholder. Returns false when it is already gone
    /// (superseded by a push or replaced wholesale).
    pub fn rollback_optimistic(&mut self, temp_id: i64) -> bool {
        let Some(pos) = self.messages.iter().position(|m| m.id == temp_id) else {
            return false;
        };
        self.messages.remove(pos);
        self.total = (self.total - 1).max(0);
        true
    }

    /// Pending placeholders, oldest first.
    pub fn optimistic_entries(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| is_tentative(m.id))
    }
}

impl<H: HistorySource> PageStore<H> {
    /// Show an outgoing message immediately. Creates the chat's view if
    /// needed.
    pub fn add_optimistic(&self, chat_id: i64, message: Message) -> Result<PagedFeed, CoreError> {
        let temp_id = message.id;
        let paged = {
            let mut entry = self
                .feeds
                .entry(chat_id)
                .or_insert_with(|| FeedEntry::new(chat_id));
            entry.view.add_optimistic(message)?;
            entry.view.paged(self.page_size())
        };
        tracing::debug!(chat_id, temp_id, "optimistic message added");
        self.events.publish(chat_id, FeedCause::Optimistic);
        Ok(paged)
    }

    /// Withdraw a placeholder after its send failed. No-op (returns `None`)
    /// if the chat or the placeholder is gone.
    pub fn rollback_optimistic(&self, chat_id: i64, temp_id: i64) -> Option<PagedFeed> {
        let paged = {
            let mut entry = self.feeds.get_mut(&chat_id)?;
            if !entry.view.rollback_optimistic(temp_id) {
                return None;
            }
            entry.view.paged(self.page_size())
        };
        tracing::debug!(chat_id, temp_id, "optimistic message rolled back");
        self.events.publish(chat_id, FeedCause::RolledBack);
        Some(paged)
    }

    /// Replace a chat's view wholesale with server data, bypassing the
    /// merge rule. Used when a write's confirmation does not come through
    /// the realtime channel.
    pub fn replace_from_server(
        &self,
        chat_id: i64,
        messages: Vec<Message>,
        total: i64,
        has_more: bool,
    ) -> PagedFeed {
        let paged = {
            let mut entry = self
                .feeds
                .entry(chat_id)
                .or_insert_with(|| FeedEntry::new(chat_id));
            entry.view.replace(messages, total, Some(has_more));
            entry.loaded = true;
            entry.view.paged(self.page_size())
        };
        self.events.publish(chat_id, FeedCause::Replaced);
        paged
    }

    /// Fetch the newest page and install it with [`Self::replace_from_server`].
    pub async fn replace_from_history(&self, chat_id: i64) -> Result<PagedFeed, CoreError> {
        let page = self
            .history()
            .fetch_page(chat_id, self.page_size(), 0)
            .await?;
        Ok(self.replace_from_server(chat_id, page.messages, page.total, page.has_more))
    }
}
