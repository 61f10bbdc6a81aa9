pub mod attachment;
pub mod chat;
pub mod gateway;
pub mod message;
pub mod page;
pub mod send;

pub use attachment::Attachment;
pub use chat::{Chat, ChatsResponse};
pub use gateway::{ClientFrame, ServerFrame};
pub use message::{Message, Reaction};
pub use page::Page;
pub use send::{SendAttachmentRequest, SendRequest, SendResponse, SendTarget};
