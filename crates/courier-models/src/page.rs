use serde::{Deserialize, Serialize};

use crate::message::Message;

/// One window of a chat's history, as served by `GET /chats/{id}/messages`
/// or reconstructed locally.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Page {
    /// Oldest first.
    pub messages: Vec<Message>,
    /// Server's full-chat message count when the page was produced.
    pub total: i64,
    pub has_more: bool,
}
