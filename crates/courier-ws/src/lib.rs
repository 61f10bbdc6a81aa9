//! Client side of the realtime push channel.

pub mod channel;
pub mod dispatch;
pub mod machine;

use std::time::Duration;

pub use channel::{ChannelConfig, RealtimeChannel};
pub use dispatch::{dispatch_text, FrameHandler, StoreDispatcher};
pub use machine::{ChannelAction, ChannelEvent, ConnectionMachine, ConnectionState};

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("realtime channel is shut down")]
    Closed,
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
}
