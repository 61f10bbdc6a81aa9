use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub display_name: String,
    pub last_message_text: Option<String>,
    pub last_message_time: Option<i64>,
    pub last_message_is_from_me: Option<bool>,
    pub is_group: bool,
    #[serde(default)]
    pub handles: Vec<String>,
    pub chat_identifier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatsResponse {
    pub chats: Vec<Chat>,
    pub total: i64,
    pub has_more: bool,
}
