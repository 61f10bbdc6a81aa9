use chrono::{DateTime, Utc};
use courier_util::tentative_id;
use serde::{Deserialize, Serialize};

use crate::attachment::Attachment;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    #[serde(default)]
    pub guid: Option<String>,
    pub text: Option<String>,
    /// Unix milliseconds.
    pub time: i64,
    pub is_from_me: bool,
    #[serde(rename = "handle", default)]
    pub sender_handle: Option<String>,
    #[serde(rename = "contact_name", default)]
    pub sender_display_name: Option<String>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub is_from_me: bool,
}

impl Message {
    /// A placeholder for an outgoing text, shown until the server confirms it.
    pub fn outgoing(id: i64, text: impl Into<String>, time: i64) -> Self {
        Self {
            id,
            guid: None,
            text: Some(text.into()),
            time,
            is_from_me: true,
            sender_handle: None,
            sender_display_name: None,
            reactions: Vec::new(),
            attachments: Vec::new(),
        }
    }

    /// Local placeholder that the server has not confirmed yet.
    pub fn is_tentative(&self) -> bool {
        tentative_id::is_tentative(self.id)
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.time)
    }

    /// Who to show as the author.
    pub fn sender_label(&self) -> &str {
        if self.is_from_me {
            return "me";
        }
        self.sender_display_name
            .as_deref()
            .or(self.sender_handle.as_deref())
            .unwrap_or("unknown")
    }
}
