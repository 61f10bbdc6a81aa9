use std::collections::HashSet;

use courier_models::{Message, Page};
use courier_util::tentative_id::is_tentative;

use crate::view::FeedView;

/// Fold an authoritative server batch into a locally held history.
///
/// `incoming` is the server's current newest tail. Every local message that
/// is at least as new as the batch's oldest entry, shares an id with the
/// batch, or is an unconfirmed placeholder is superseded by the batch. What
/// is left of `previous` is kept as the older prefix. A gap between prefix
/// and batch is left as is.
pub fn merge(previous: &[Message], incoming: Vec<Message>) -> Vec<Message> {
    if previous.is_empty() {
        return incoming;
    }
    let Some(cutoff) = incoming.iter().map(|m| m.time).min() else {
        return previous.to_vec();
    };
    let incoming_ids: HashSet<i64> = incoming.iter().map(|m| m.id).collect();

    let mut merged: Vec<Message> = previous
        .iter()
        .filter(|m| m.time < cutoff && !incoming_ids.contains(&m.id) && !is_tentative(m.id))
        .cloned()
        .collect();
    merged.reserve(incoming.len());
    merged.extend(incoming);
    merged
}

impl FeedView {
    /// Apply a pushed batch. The batch's total is authoritative, so any
    /// `has_more` learned from pagination is recomputed from it.
    pub fn reconcile(&mut self, incoming: Vec<Message>, total: i64) {
        self.messages = merge(&self.messages, incoming);
        self.total = total.max(0);
        self.has_more = None;
    }

    /// Fold a page fetched *before* the current contents were written (a
    /// push or an optimistic send overtook it): the local contents stay the
    /// newer tail and the page only contributes what precedes them.
    ///
    /// A pushed total is at least as fresh as the page's, so the larger one
    /// wins. A view holding only placeholders has no server count yet and
    /// takes the page's, plus the placeholders still pending.
    pub fn backfill_under(&mut self, page: Page) {
        let pending = self.messages.iter().filter(|m| is_tentative(m.id)).count() as i64;
        let pushed = self.messages.len() as i64 > pending;

        let current = std::mem::take(&mut self.messages);
        self.messages = merge(&page.messages, current);
        if pushed {
            self.total = self.total.max(page.total);
        } else {
            self.total = page.total.max(0) + pending;
            self.has_more = Some(page.has_more);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: i64, time: i64) -> Message {
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

    fn ids(messages: &[Message]) -> Vec<i64> {
        messages.iter().map(|m| m.id).collect()
    }

    #[test]
    fn empty_previous_takes_incoming() {
        let incoming = vec![msg(1, 1), msg(2, 2)];
        assert_eq!(merge(&[], incoming.clone()), incoming);
    }

    #[test]
    fn empty_incoming_keeps_previous() {
        let previous = vec![msg(1, 1), msg(2, 2)];
        assert_eq!(merge(&previous, Vec::new()), previous);
    }

    #[test]
    fn supersedes_optimistic_entry() {
        let previous = vec![msg(1, 10), msg(1_700_000_000_500, 20)];
        let incoming = vec![msg(1, 10), msg(2, 20)];
        assert_eq!(ids(&merge(&previous, incoming)), vec![1, 2]);
    }

    #[test]
    fn preserves_disjoint_history() {
        let previous = vec![msg(1, 1), msg(2, 2)];
        let incoming = vec![msg(3, 5)];
        assert_eq!(ids(&merge(&previous, incoming)), vec![1, 2, 3]);
    }

    #[test]
    fn dedups_overlap() {
        let previous = vec![msg(1, 1), msg(2, 2)];
        let incoming = vec![msg(2, 2), msg(3, 3)];
        assert_eq!(ids(&merge(&previous, incoming)), vec![1, 2, 3]);
    }

    #[test]
    fn old_placeholder_is_dropped_even_before_cutoff() {
        let previous = vec![msg(1, 1), msg(1_700_000_000_000, 2)];
        let incoming = vec![msg(5, 50)];
        assert_eq!(ids(&merge(&previous, incoming)), vec![1, 5]);
    }

    #[test]
    fn newer_local_entries_are_replaced() {
        // A message deleted server-side disappears once a newer tail arrives.
        let previous = vec![msg(1, 1), msg(2, 5), msg(3, 6)];
        let incoming = vec![msg(2, 5), msg(4, 7)];
        assert_eq!(ids(&merge(&previous, incoming)), vec![1, 2, 4]);
    }

    #[test]
    fn incoming_order_is_preserved() {
        let previous = vec![msg(1, 1)];
        let incoming = vec![msg(9, 9), msg(8, 9)];
        assert_eq!(ids(&merge(&previous, incoming)), vec![1, 9, 8]);
    }

    #[test]
    fn reconcile_takes_pushed_total() {
        let mut view = FeedView::new(7);
        view.replace(vec![msg(1, 1)], 1, Some(false));
        view.reconcile(vec![msg(2, 2)], 40);
        assert_eq!(ids(view.messages()), vec![1, 2]);
        assert_eq!(view.total(), 40);
        assert!(view.has_more());
    }

    #[test]
    fn backfill_keeps_local_tail() {
        let mut view = FeedView::new(7);
        view.replace(vec![msg(3, 3), msg(4, 4)], 4, None);
        view.backfill_under(Page {
            messages: vec![msg(1, 1), msg(2, 2), msg(3, 3)],
            total: 3,
            has_more: false,
        });
        assert_eq!(ids(view.messages()), vec![1, 2, 3, 4]);
        assert_eq!(view.total(), 4);
    }
}
