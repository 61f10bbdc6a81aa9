use courier_models::Message;
use dashmap::DashMap;

use crate::error::CoreError;
use crate::events::{FeedCause, FeedEvents};
use crate::history::HistorySource;
use crate::view::{rebuild, FeedView, PagedFeed, DEFAULT_PAGE_SIZE};

pub(crate) struct FeedEntry {
    pub(crate) view: FeedView,
    /// An initial page has been fetched (or the view was replaced
    /// wholesale). A view seeded only by pushes is not loaded.
    pub(crate) loaded: bool,
    pub(crate) loading_older: bool,
}

impl FeedEntry {
    pub(crate) fn new(chat_id: i64) -> Self {
        Self {
            view: FeedView::new(chat_id),
            loaded: false,
            loading_older: false,
        }
    }
}

/// Owns one [`FeedView`] per chat and the fetches that fill them.
///
/// Views are only touched inside short synchronous sections; no map guard is
/// held across an `.await`. Every fetch result is folded into whatever the
/// view holds when the fetch completes, never into a copy taken when it
/// started.
pub struct PageStore<H> {
    history: H,
    page_size: usize,
    pub(crate) feeds: DashMap<i64, FeedEntry>,
    pub(crate) events: FeedEvents,
}

impl<H: HistorySource> PageStore<H> {
    pub fn new(history: H, page_size: usize) -> Self {
        Self {
            history,
            page_size: page_size.max(1),
            feeds: DashMap::new(),
            events: FeedEvents::default(),
        }
    }

    pub fn with_default_page_size(history: H) -> Self {
        Self::new(history, DEFAULT_PAGE_SIZE)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn events(&self) -> &FeedEvents {
        &self.events
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    /// Snapshot of a chat's flat view.
    pub fn view(&self, chat_id: i64) -> Option<FeedView> {
        self.feeds.get(&chat_id).map(|e| e.view.clone())
    }

    /// Snapshot of a chat's view laid out in pages.
    pub fn paged(&self, chat_id: i64) -> Option<PagedFeed> {
        self.feeds
            .get(&chat_id)
            .map(|e| e.view.paged(self.page_size))
    }

    pub fn is_loading_older(&self, chat_id: i64) -> bool {
        self.feeds.get(&chat_id).is_some_and(|e| e.loading_older)
    }

    /// Re-window a flat list with this store's page size.
    pub fn rebuild(
        &self,
        flat: &[Message],
        total: i64,
        has_more_override: Option<bool>,
    ) -> PagedFeed {
        rebuild(flat, total, self.page_size, has_more_override)
    }

    /// Show a chat: fetch its newest page, or reuse the view if it was
    /// already loaded.
    pub async fn load_initial(&self, chat_id: i64) -> Result<PagedFeed, CoreError> {
        if let Some(entry) = self.feeds.get(&chat_id) {
            if entry.loaded {
                return Ok(entry.view.paged(self.page_size));
            }
        }

        let page = self.history.fetch_page(chat_id, self.page_size, 0).await?;
        tracing::debug!(
            chat_id,
            fetched = page.messages.len(),
            total = page.total,
            "initial page loaded"
        );

        let paged = {
            let mut entry = self
                .feeds
                .entry(chat_id)
                .or_insert_with(|| FeedEntry::new(chat_id));
            if entry.view.is_empty() {
                entry
                    .view
                    .replace(page.messages, page.total, Some(page.has_more));
            } else {
                // A push or another load got here first; its contents are
                // at least as new as this page.
                entry.view.backfill_under(page);
            }
            entry.loaded = true;
            entry.view.paged(self.page_size)
        };
        self.events.publish(chat_id, FeedCause::Loaded);
        Ok(paged)
    }

    /// Fetch the page preceding everything loaded and prepend it.
    ///
    /// Returns `Ok(None)` without fetching when there is nothing older or a
    /// load is already in flight for this chat.
    pub async fn load_older(&self, chat_id: i64) -> Result<Option<PagedFeed>, CoreError> {
        let offset = {
            let Some(mut entry) = self.feeds.get_mut(&chat_id) else {
                return Err(CoreError::State(format!("chat {chat_id} is not loaded")));
            };
            if entry.loading_older || !entry.view.has_more() {
                return Ok(None);
            }
            entry.loading_older = true;
            entry.view.confirmed_len()
        };

        let result = self
            .history
            .fetch_page(chat_id, self.page_size, offset)
            .await;

        let paged = {
            let Some(mut entry) = self.feeds.get_mut(&chat_id) else {
                // Forgotten while the page was in flight.
                return Ok(None);
            };
            entry.loading_older = false;
            let page = match result {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(chat_id, offset, error = %e, "failed to load older page");
                    return Err(e);
                }
            };
            tracing::debug!(
                chat_id,
                offset,
                fetched = page.messages.len(),
                has_more = page.has_more,
                "older page loaded"
            );
            entry.view.prepend_older(page);
            entry.view.paged(self.page_size)
        };
        self.events.publish(chat_id, FeedCause::Older);
        Ok(Some(paged))
    }

    /// Re-fetch the newest page and reconcile it into the view, e.g. after
    /// the realtime channel was down for a while.
    pub async fn refresh(&self, chat_id: i64) -> Result<PagedFeed, CoreError> {
        let page = self.history.fetch_page(chat_id, self.page_size, 0).await?;
        let paged = {
            let mut entry = self
                .feeds
                .entry(chat_id)
                .or_insert_with(|| FeedEntry::new(chat_id));
            if entry.view.is_empty() {
                entry
                    .view
                    .replace(page.messages, page.total, Some(page.has_more));
            } else {
                entry.view.reconcile(page.messages, page.total);
            }
            entry.loaded = true;
            entry.view.paged(self.page_size)
        };
        self.events.publish(chat_id, FeedCause::Refreshed);
        Ok(paged)
    }

    /// Fold a pushed batch (the server's newest tail) into a chat's view,
    /// creating the view if the chat has not been shown yet.
    pub fn apply_push(&self, chat_id: i64, messages: Vec<Message>, total: i64) -> PagedFeed {
        let incoming = messages.len();
        let paged = {
            let mut entry = self
                .feeds
                .entry(chat_id)
                .or_insert_with(|| FeedEntry::new(chat_id));
            entry.view.reconcile(messages, total);
            entry.view.paged(self.page_size)
        };
        tracing::debug!(chat_id, incoming, total, "push reconciled");
        self.events.publish(chat_id, FeedCause::Pushed);
        paged
    }

    /// Drop a chat's view; the next `load_initial` fetches again.
    pub fn forget(&self, chat_id: i64) -> bool {
        self.feeds.remove(&chat_id).is_some()
    }

    pub fn loaded_chats(&self) -> Vec<i64> {
        self.feeds.iter().map(|e| *e.key()).collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use courier_models::Page;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    pub(crate) fn msg(id: i64, time: i64) -> Message {
        Message {
            id,
            guid: None,
            text: Some(format!("m{id}")),
            time,
            is_from_me: false,
            sender_handle: None,
            sender_display_name: None,
            reactions: Vec::new(),
            attachments: Vec::new(),
        }
    }

    pub(crate) fn ids(messages: &[Message]) -> Vec<i64> {
        messages.iter().map(|m| m.id).collect()
    }

    /// In-memory history of `total` messages with ids/times 1..=total.
    pub(crate) struct FakeHistory {
        pub(crate) messages: Mutex<Vec<Message>>,
        pub(crate) calls: AtomicUsize,
        pub(crate) offsets: Mutex<Vec<usize>>,
        pub(crate) fail: Mutex<bool>,
        pub(crate) gate: Option<Notify>,
    }

    impl FakeHistory {
        pub(crate) fn with_messages(total: i64) -> Self {
            Self {
                messages: Mutex::new((1..=total).map(|i| msg(i, i * 10)).collect()),
                calls: AtomicUsize::new(0),
                offsets: Mutex::new(Vec::new()),
                fail: Mutex::new(false),
                gate: None,
            }
        }

        pub(crate) fn gated(total: i64) -> Self {
            Self {
                gate: Some(Notify::new()),
                ..Self::with_messages(total)
            }
        }
    }

    impl HistorySource for FakeHistory {
        async fn fetch_page(
            &self,
            _chat_id: i64,
            limit: usize,
            offset: usize,
        ) -> Result<Page, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.offsets.lock().unwrap().push(offset);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if *self.fail.lock().unwrap() {
                return Err(CoreError::Network("connection refused".into()));
            }
            let all = self.messages.lock().unwrap().clone();
            let total = all.len();
            let end = total.saturating_sub(offset);
            let start = end.saturating_sub(limit);
            Ok(Page {
                messages: all[start..end].to_vec(),
                total: total as i64,
                has_more: offset + (end - start) < total,
            })
        }
    }

    #[tokio::test]
    async fn initial_load_fetches_newest_page() {
        let store = PageStore::new(FakeHistory::with_messages(12), 5);
        let feed = store.load_initial(1).await.unwrap();
        assert_eq!(feed.pages.len(), 1);
        assert_eq!(ids(&feed.flatten()), vec![8, 9, 10, 11, 12]);
        assert!(feed.has_more());
        assert_eq!(feed.total(), 12);
    }

    #[tokio::test]
    async fn reselecting_reuses_view() {
        let store = PageStore::new(FakeHistory::with_messages(3), 5);
        store.load_initial(1).await.unwrap();
        store.load_initial(1).await.unwrap();
        assert_eq!(store.history().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn older_pages_are_prepended_until_exhausted() {
        let store = PageStore::new(FakeHistory::with_messages(12), 5);
        store.load_initial(1).await.unwrap();

        let feed = store.load_older(1).await.unwrap().unwrap();
        assert_eq!(feed.pages.len(), 2);
        assert_eq!(ids(&feed.flatten()), (3..=12).collect::<Vec<_>>());
        assert_eq!(feed.cursors, vec![0, 5]);

        let feed = store.load_older(1).await.unwrap().unwrap();
        assert_eq!(ids(&feed.flatten()), (1..=12).collect::<Vec<_>>());
        assert!(!feed.has_more());

        assert!(store.load_older(1).await.unwrap().is_none());
        assert_eq!(*store.history().offsets.lock().unwrap(), vec![0, 5, 10]);
    }

    #[tokio::test]
    async fn failed_older_load_leaves_view_and_rearms() {
        let store = PageStore::new(FakeHistory::with_messages(12), 5);
        store.load_initial(1).await.unwrap();
        let before = store.view(1).unwrap();

        *store.history().fail.lock().unwrap() = true;
        let err = store.load_older(1).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.view(1).unwrap(), before);
        assert!(!store.is_loading_older(1));

        *store.history().fail.lock().unwrap() = false;
        assert!(store.load_older(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_initial_load_creates_nothing() {
        let history = FakeHistory::with_messages(3);
        *history.fail.lock().unwrap() = true;
        let store = PageStore::new(history, 5);
        assert!(store.load_initial(1).await.is_err());
        assert!(store.view(1).is_none());
    }

    #[tokio::test]
    async fn older_load_is_single_flight() {
        let store = std::sync::Arc::new(PageStore::new(FakeHistory::gated(12), 5));
        let loader = store.clone();
        let initial = tokio::spawn(async move { loader.load_initial(1).await });
        tokio::task::yield_now().await;
        store.history().gate.as_ref().unwrap().notify_one();
        initial.await.unwrap().unwrap();

        let loader = store.clone();
        let first = tokio::spawn(async move { loader.load_older(1).await });
        tokio::task::yield_now().await;
        assert!(store.is_loading_older(1));
        // Second request while the first is pending is a no-op.
        assert!(store.load_older(1).await.unwrap().is_none());

        store.history().gate.as_ref().unwrap().notify_one();
        assert!(first.await.unwrap().unwrap().is_some());
        assert_eq!(store.history().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn push_during_older_load_is_not_clobbered() {
        let store = std::sync::Arc::new(PageStore::new(FakeHistory::gated(12), 5));
        let loader = store.clone();
        let initial = tokio::spawn(async move { loader.load_initial(1).await });
        tokio::task::yield_now().await;
        store.history().gate.as_ref().unwrap().notify_one();
        initial.await.unwrap().unwrap();

        let loader = store.clone();
        let older = tokio::spawn(async move { loader.load_older(1).await });
        tokio::task::yield_now().await;

        let mut tail: Vec<Message> = (9..=12).map(|i| msg(i, i * 10)).collect();
        tail.push(msg(13, 130));
        store.apply_push(1, tail, 13);

        store.history().gate.as_ref().unwrap().notify_one();
        older.await.unwrap().unwrap();
        let view = store.view(1).unwrap();
        assert_eq!(ids(view.messages()), (3..=13).collect::<Vec<_>>());
        assert_eq!(view.total(), 13);
    }

    #[tokio::test]
    async fn push_before_initial_load_keeps_newer_tail() {
        let store = std::sync::Arc::new(PageStore::new(FakeHistory::gated(10), 5));
        let loader = store.clone();
        let initial = tokio::spawn(async move { loader.load_initial(1).await });
        tokio::task::yield_now().await;

        // Push arrives carrying a message the in-flight page predates.
        store.apply_push(1, vec![msg(10, 100), msg(11, 110)], 11);
        store.history().gate.as_ref().unwrap().notify_one();
        let feed = initial.await.unwrap().unwrap();
        assert_eq!(ids(&feed.flatten()), vec![6, 7, 8, 9, 10, 11]);
    }

    #[tokio::test]
    async fn send_before_initial_load_keeps_history_reachable() {
        let store = std::sync::Arc::new(PageStore::new(FakeHistory::gated(12), 5));
        let loader = store.clone();
        let initial = tokio::spawn(async move { loader.load_initial(1).await });
        tokio::task::yield_now().await;

        store
            .add_optimistic(1, Message::outgoing(1_700_000_000_500, "hi", 1_700_000_000_500))
            .unwrap();
        store.history().gate.as_ref().unwrap().notify_one();
        let feed = initial.await.unwrap().unwrap();

        let view = store.view(1).unwrap();
        assert_eq!(
            ids(view.messages()),
            vec![8, 9, 10, 11, 12, 1_700_000_000_500]
        );
        assert_eq!(view.total(), 13);
        assert!(view.has_more());
        assert_eq!(feed.total(), 13);

        let loader = store.clone();
        let older = tokio::spawn(async move { loader.load_older(1).await });
        tokio::task::yield_now().await;
        store.history().gate.as_ref().unwrap().notify_one();
        assert!(older.await.unwrap().unwrap().is_some());
        assert_eq!(*store.history().offsets.lock().unwrap(), vec![0, 5]);
        assert_eq!(store.view(1).unwrap().confirmed_len(), 10);
    }

    #[tokio::test]
    async fn forgotten_chat_is_fetched_again() {
        let store = PageStore::new(FakeHistory::with_messages(3), 5);
        store.load_initial(1).await.unwrap();
        assert!(store.forget(1));
        assert!(store.view(1).is_none());
        assert!(!store.forget(1));

        store.load_initial(1).await.unwrap();
        assert_eq!(store.history().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn push_for_unshown_chat_seeds_view() {
        let store = PageStore::new(FakeHistory::with_messages(0), 5);
        let feed = store.apply_push(9, vec![msg(1, 1), msg(2, 2)], 30);
        assert_eq!(feed.len(), 2);
        assert!(feed.has_more());
        assert_eq!(store.loaded_chats(), vec![9]);
    }

    #[tokio::test]
    async fn refresh_reconciles_newest_page() {
        let store = PageStore::new(FakeHistory::with_messages(6), 3);
        store.load_initial(1).await.unwrap();
        store.load_older(1).await.unwrap();
        store
            .history()
            .messages
            .lock()
            .unwrap()
            .push(msg(7, 70));
        let feed = store.refresh(1).await.unwrap();
        assert_eq!(ids(&feed.flatten()), (1..=7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn changes_are_broadcast() {
        let store = PageStore::new(FakeHistory::with_messages(3), 5);
        let mut rx = store.events().subscribe();
        store.load_initial(4).await.unwrap();
        store.apply_push(4, vec![msg(4, 40)], 4);
        assert_eq!(rx.recv().await.unwrap().cause, FeedCause::Loaded);
        let change = rx.recv().await.unwrap();
        assert_eq!(change.chat_id, 4);
        assert_eq!(change.cause, FeedCause::Pushed);
    }
}
