use std::collections::HashSet;

use courier_models::{Message, Page};
use courier_util::tentative_id::is_tentative;

pub const DEFAULT_PAGE_SIZE: usize = 50;

/// The loaded history of one chat: flat, deduplicated, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedView {
    pub(crate) chat_id: i64,
    pub(crate) messages: Vec<Message>,
    pub(crate) total: i64,
    /// Set when a fetched page told us authoritatively whether older
    /// history exists; otherwise derived from `total`.
    pub(crate) has_more: Option<bool>,
}

impl FeedView {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            messages: Vec::new(),
            total: 0,
            has_more: None,
        }
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    pub fn has_more(&self) -> bool {
        self.has_more
            .unwrap_or(self.total > self.messages.len() as i64)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Messages the server knows about, i.e. the offset of the next older
    /// page.
    pub fn confirmed_len(&self) -> usize {
        self.messages.iter().filter(|m| !is_tentative(m.id)).count()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    pub fn paged(&self, page_size: usize) -> PagedFeed {
        rebuild(&self.messages, self.total, page_size, self.has_more)
    }

    pub(crate) fn replace(&mut self, messages: Vec<Message>, total: i64, has_more: Option<bool>) {
        self.messages = messages;
        self.total = total.max(0);
        self.has_more = has_more;
    }

    /// Put an older page in front of everything loaded. Entries already
    /// present (the window shifted while the page was in flight) are
    /// skipped.
    pub(crate) fn prepend_older(&mut self, page: Page) {
        let known: HashSet<i64> = self.messages.iter().map(|m| m.id).collect();
        let mut older: Vec<Message> = page
            .messages
            .into_iter()
            .filter(|m| !known.contains(&m.id))
            .collect();
        older.append(&mut self.messages);
        self.messages = older;
        self.total = self.total.max(page.total);
        self.has_more = Some(page.has_more);
    }
}

/// A view laid out the way a paginated list consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PagedFeed {
    /// Newest page first.
    pub pages: Vec<Page>,
    /// For each page, how many messages precede it from the newest end
    /// (the offset it would be fetched at).
    pub cursors: Vec<usize>,
}

impl PagedFeed {
    /// All messages, oldest first.
    pub fn flatten(&self) -> Vec<Message> {
        self.pages
            .iter()
            .rev()
            .flat_map(|p| p.messages.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|p| p.messages.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether older history exists beyond the oldest page.
    pub fn has_more(&self) -> bool {
        self.pages.last().is_some_and(|p| p.has_more)
    }

    pub fn total(&self) -> i64 {
        self.pages.first().map_or(0, |p| p.total)
    }

    pub fn newest(&self) -> Option<&Message> {
        self.pages.first().and_then(|p| p.messages.last())
    }
}

/// Re-window a flat, ascending message list into `page_size` pages counted
/// back from the newest message.
///
/// Only the oldest page carries a real `has_more`; the newer ones are local
/// groupings and always say `true`. The same input always gives the same
/// layout.
pub fn rebuild(
    flat: &[Message],
    total: i64,
    page_size: usize,
    has_more_override: Option<bool>,
) -> PagedFeed {
    let page_size = page_size.max(1);
    let oldest_has_more = has_more_override.unwrap_or(total > flat.len() as i64);

    if flat.is_empty() {
        return PagedFeed {
            pages: vec![Page {
                messages: Vec::new(),
                total,
                has_more: oldest_has_more,
            }],
            cursors: vec![0],
        };
    }

    let mut pages = Vec::with_capacity(flat.len().div_ceil(page_size));
    let mut cursors = Vec::with_capacity(pages.capacity());
    let mut end = flat.len();
    while end > 0 {
        let start = end.saturating_sub(page_size);
        cursors.push(flat.len() - end);
        pages.push(Page {
            messages: flat[start..end].to_vec(),
            total,
            has_more: true,
        });
        end = start;
    }
    if let Some(oldest) = pages.last_mut() {
        oldest.has_more = oldest_has_more;
    }
    PagedFeed { pages, cursors }
}
