use std::time::Duration;

use courier_models::ClientFrame;
use courier_util::Backoff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Inputs to the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Start,
    Opened,
    /// The transport closed, failed, or could not be opened.
    Closed,
    BackoffElapsed,
    Subscribe(i64),
    Unsubscribe,
    Shutdown,
}

/// Side effects the driver performs on the machine's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelAction {
    Connect,
    Send(ClientFrame),
    ScheduleReconnect(Duration),
    CancelReconnect,
    CloseTransport,
}

/// Connection lifecycle and subscription bookkeeping, free of I/O.
///
/// The desired subscription survives reconnects and is replayed exactly once
/// every time the transport opens.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    backoff: Backoff,
    subscription: Option<i64>,
    shut_down: bool,
}

impl ConnectionMachine {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            backoff,
            subscription: None,
            shut_down: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn subscription(&self) -> Option<i64> {
        self.subscription
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn handle(&mut self, event: ChannelEvent) -> Vec<ChannelAction> {
        use ChannelAction as A;
        use ConnectionState as S;

        if self.shut_down {
            // An open racing with teardown still needs closing.
            return match event {
                ChannelEvent::Opened => vec![A::CloseTransport],
                _ => Vec::new(),
            };
        }

        match (event, self.state) {
            (ChannelEvent::Start, S::Disconnected) => {
                self.state = S::Connecting;
                vec![A::Connect]
            }
            (ChannelEvent::Opened, S::Connecting) => {
                self.state = S::Connected;
                self.backoff.reset();
                self.subscription
                    .map(|chat_id| A::Send(ClientFrame::Subscribe { chat_id }))
                    .into_iter()
                    .collect()
            }
            (ChannelEvent::Closed, S::Connecting | S::Connected) => {
                self.state = S::Reconnecting;
                vec![A::ScheduleReconnect(self.backoff.next_delay())]
            }
            (ChannelEvent::BackoffElapsed, S::Reconnecting) => {
                self.state = S::Connecting;
                vec![A::Connect]
            }
            (ChannelEvent::Subscribe(chat_id), state) => {
                let previous = self.subscription.replace(chat_id);
                if state == S::Connected && previous != Some(chat_id) {
                    vec![A::Send(ClientFrame::Subscribe { chat_id })]
                } else {
                    Vec::new()
                }
            }
            (ChannelEvent::Unsubscribe, state) => {
                let previous = self.subscription.take();
                if state == S::Connected && previous.is_some() {
                    vec![A::Send(ClientFrame::Unsubscribe)]
                } else {
                    Vec::new()
                }
            }
            (ChannelEvent::Shutdown, _) => {
                self.shut_down = true;
                self.state = S::Disconnected;
                vec![A::CancelReconnect, A::CloseTransport]
            }
            // Stale timer or transport notifications for a state we already
            // left.
            _ => Vec::new(),
        }
    }
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new(Backoff::default())
    }
}
