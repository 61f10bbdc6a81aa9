use std::future::Future;
use std::sync::Arc;

use courier_models::{Page, SendAttachmentRequest, SendRequest};

use crate::error::CoreError;

/// Paginated read access to a chat's history. Offset 0 is the newest page;
/// messages inside a page are oldest first.
pub trait HistorySource: Send + Sync {
    fn fetch_page(
        &self,
        chat_id: i64,
        limit: usize,
        offset: usize,
    ) -> impl Future<Output = Result<Page, CoreError>> + Send;
}

/// The send endpoints.
pub trait SendTransport: Send + Sync {
    fn send_text(&self, request: &SendRequest) -> impl Future<Output = Result<(), CoreError>> + Send;

    /// Resolves to a warning when the attachment went out but a follow-up
    /// part did not.
    fn send_attachment(
        &self,
        request: &SendAttachmentRequest,
    ) -> impl Future<Output = Result<Option<String>, CoreError>> + Send;
}

impl<T: HistorySource> HistorySource for Arc<T> {
    fn fetch_page(
        &self,
        chat_id: i64,
        limit: usize,
        offset: usize,
    ) -> impl Future<Output = Result<Page, CoreError>> + Send {
        (**self).fetch_page(chat_id, limit, offset)
    }
}

impl<T: SendTransport> SendTransport for Arc<T> {
    fn send_text(&self, request: &SendRequest) -> impl Future<Output = Result<(), CoreError>> + Send {
        (**self).send_text(request)
    }

    fn send_attachment(
        &self,
        request: &SendAttachmentRequest,
    ) -> impl Future<Output = Result<Option<String>, CoreError>> + Send {
        (**self).send_attachment(request)
    }
}
