use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Frames the client sends over the realtime socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Ask for `messages_update` pushes for one chat. Replaces any previous
    /// subscription on the same connection.
    Subscribe { chat_id: i64 },
    Unsubscribe,
}

impl ClientFrame {
    pub fn encode(&self) -> String {
        // Neither variant holds anything serde_json can fail on.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Frames pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// The authoritative newest tail of the subscribed chat.
    MessagesUpdate {
        chat_id: i64,
        messages: Vec<Message>,
        total: i64,
        timestamp: i64,
    },
    /// Something changed but no chat is subscribed.
    DbChanged { timestamp: i64 },
    Error { message: String },
    /// Any `type` this client does not know about.
    #[serde(other)]
    Unknown,
}

impl ServerFrame {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::MessagesUpdate { .. } => "messages_update",
            ServerFrame::DbChanged { .. } => "db_changed",
            ServerFrame::Error { .. } => "error",
            ServerFrame::Unknown => "unknown",
        }
    }
}
