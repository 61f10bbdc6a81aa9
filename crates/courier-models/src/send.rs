use serde::{Deserialize, Serialize};

use crate::chat::Chat;

/// Where an outgoing message goes: a single handle, or a group chat
/// addressed by its identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTarget {
    pub handle: String,
    pub is_group: bool,
    pub chat_identifier: Option<String>,
}

impl SendTarget {
    pub fn direct(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            is_group: false,
            chat_identifier: None,
        }
    }

    /// Derive the target from a chat listing entry.
    pub fn for_chat(chat: &Chat) -> Self {
        Self {
            handle: chat.handles.first().cloned().unwrap_or_default(),
            is_group: chat.is_group,
            chat_identifier: chat.chat_identifier.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub handle: String,
    pub text: String,
    #[serde(default)]
    pub is_group: bool,
    pub chat_identifier: Option<String>,
}

impl SendRequest {
    pub fn new(target: &SendTarget, text: impl Into<String>) -> Self {
        Self {
            handle: target.handle.clone(),
            text: text.into(),
            is_group: target.is_group,
            chat_identifier: target.chat_identifier.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendAttachmentRequest {
    pub handle: String,
    pub file_path: String,
    pub text: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    pub chat_identifier: Option<String>,
}

impl SendAttachmentRequest {
    pub fn new(target: &SendTarget, file_path: impl Into<String>, text: Option<String>) -> Self {
        Self {
            handle: target.handle.clone(),
            file_path: file_path.into(),
            text,
            is_group: target.is_group,
            chat_identifier: target.chat_identifier.clone(),
        }
    }
}

/// `ok` with an `error` means the attachment went out but its follow-up
/// text did not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResponse {
    pub ok: bool,
    pub error: Option<String>,
}
