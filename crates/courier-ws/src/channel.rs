use std::collections::VecDeque;
use std::time::Duration;

use courier_util::backoff::{Backoff, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::dispatch::{dispatch_text, FrameHandler};
use crate::machine::{ChannelAction, ChannelEvent, ConnectionMachine, ConnectionState};
use crate::ChannelError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound on one connect attempt, handshake included.
    pub connect_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            initial_backoff: DEFAULT_INITIAL_DELAY,
            max_backoff: DEFAULT_MAX_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

enum Command {
    Subscribe(i64),
    Unsubscribe,
    Shutdown,
}

/// Handle to the realtime push connection.
///
/// A background task owns the socket, reconnects with backoff, and replays
/// the held subscription after every reconnect. Dropping the handle shuts
/// the task down.
pub struct RealtimeChannel {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl RealtimeChannel {
    /// Start connecting to `url` and feed every inbound frame to `handler`.
    /// Must be called inside a tokio runtime.
    pub fn spawn<F: FrameHandler>(url: Url, config: ChannelConfig, handler: F) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let driver = Driver {
            url,
            connect_timeout: config.connect_timeout,
            machine: ConnectionMachine::new(Backoff::new(
                config.initial_backoff,
                config.max_backoff,
            )),
            handler,
            state_tx,
            commands: command_rx,
            ws: None,
            reconnect_at: None,
            held: Vec::new(),
        };
        let task = tokio::spawn(driver.run());
        Self {
            commands,
            state,
            task,
        }
    }

    /// Ask for pushes for `chat_id`, replacing any previous subscription.
    /// Sent now if connected, otherwise on the next connect.
    pub fn subscribe(&self, chat_id: i64) -> Result<(), ChannelError> {
        self.commands
            .send(Command::Subscribe(chat_id))
            .map_err(|_| ChannelError::Closed)
    }

    pub fn unsubscribe(&self) -> Result<(), ChannelError> {
        self.commands
            .send(Command::Unsubscribe)
            .map_err(|_| ChannelError::Closed)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Close the connection, cancel any pending reconnect, and wait for the
    /// background task to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "realtime channel task failed");
        }
    }
}

struct Driver<F> {
    url: Url,
    connect_timeout: Duration,
    machine: ConnectionMachine,
    handler: F,
    state_tx: watch::Sender<ConnectionState>,
    commands: mpsc::UnboundedReceiver<Command>,
    ws: Option<WsStream>,
    reconnect_at: Option<Instant>,
    /// Commands received while a connect attempt was pending.
    held: Vec<ChannelEvent>,
}

impl<F: FrameHandler> Driver<F> {
    async fn run(mut self) {
        self.apply(ChannelEvent::Start).await;

        while !self.machine.is_shut_down() {
            let reconnect_at = self.reconnect_at;
            tokio::select! {
                command = self.commands.recv() => {
                    self.apply(command_event(command)).await;
                }
                frame = next_frame(&mut self.ws) => {
                    self.on_frame(frame).await;
                }
                () = sleep_until_opt(reconnect_at) => {
                    self.reconnect_at = None;
                    self.apply(ChannelEvent::BackoffElapsed).await;
                }
            }
        }
        tracing::info!(url = %self.url, "realtime channel stopped");
    }

    async fn on_frame(&mut self, frame: Option<Result<WsMessage, tungstenite::Error>>) {
        match frame {
            Some(Ok(WsMessage::Text(text))) => {
                dispatch_text(&mut self.handler, text.as_str());
            }
            Some(Ok(WsMessage::Close(frame))) => {
                tracing::info!(?frame, "server closed realtime connection");
                self.ws = None;
                self.apply(ChannelEvent::Closed).await;
            }
            Some(Ok(WsMessage::Binary(data))) => {
                tracing::debug!(len = data.len(), "ignoring binary frame");
            }
            // Pings are answered by tungstenite.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(error = %e, "realtime connection failed");
                self.ws = None;
                self.apply(ChannelEvent::Closed).await;
            }
            None => {
                tracing::info!("realtime connection ended");
                self.ws = None;
                self.apply(ChannelEvent::Closed).await;
            }
        }
    }

    /// Feed `event` to the machine and carry out the resulting actions,
    /// including whatever follow-up events they produce.
    async fn apply(&mut self, event: ChannelEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            for action in self.machine.handle(event) {
                if let Some(next) = self.execute(action).await {
                    queue.push_back(next);
                }
                queue.extend(self.held.drain(..));
            }
            self.state_tx.send_replace(self.machine.state());
        }
    }

    async fn execute(&mut self, action: ChannelAction) -> Option<ChannelEvent> {
        match action {
            ChannelAction::Connect => {
                // Publish before the attempt so observers see Connecting.
                self.state_tx.send_replace(self.machine.state());
                let attempt = tokio::time::timeout(
                    self.connect_timeout,
                    tokio_tungstenite::connect_async(self.url.as_str()),
                );
                tokio::pin!(attempt);
                // Keep listening for commands so teardown is not held up by
                // a slow handshake.
                let outcome = loop {
                    tokio::select! {
                        result = &mut attempt => break Some(result),
                        command = self.commands.recv() => match command_event(command) {
                            ChannelEvent::Shutdown => break None,
                            event => self.held.push(event),
                        },
                    }
                };
                let Some(result) = outcome else {
                    tracing::info!(url = %self.url, "connect abandoned for shutdown");
                    return Some(ChannelEvent::Shutdown);
                };
                let error = match result {
                    Ok(Ok((ws, _response))) => {
                        tracing::info!(url = %self.url, "realtime channel connected");
                        self.ws = Some(ws);
                        return Some(ChannelEvent::Opened);
                    }
                    Ok(Err(e)) => ChannelError::Connect(e.to_string()),
                    Err(_) => ChannelError::Timeout(self.connect_timeout),
                };
                tracing::warn!(url = %self.url, error = %error, "realtime connect failed");
                Some(ChannelEvent::Closed)
            }
            ChannelAction::Send(frame) => {
                let ws = self.ws.as_mut()?;
                let sent = ws.send(WsMessage::text(frame.encode())).await;
                if let Err(e) = sent {
                    tracing::warn!(error = %e, "failed to send frame");
                    self.ws = None;
                    return Some(ChannelEvent::Closed);
                }
                tracing::debug!(?frame, "frame sent");
                None
            }
            ChannelAction::ScheduleReconnect(delay) => {
                tracing::info!(delay_ms = delay.as_millis() as u64, "reconnecting after backoff");
                self.reconnect_at = Some(Instant::now() + delay);
                None
            }
            ChannelAction::CancelReconnect => {
                self.reconnect_at = None;
                None
            }
            ChannelAction::CloseTransport => {
                if let Some(mut ws) = self.ws.take() {
                    let _ = ws.close(None).await;
                }
                None
            }
        }
    }
}

fn command_event(command: Option<Command>) -> ChannelEvent {
    match command {
        Some(Command::Subscribe(chat_id)) => ChannelEvent::Subscribe(chat_id),
        Some(Command::Unsubscribe) => ChannelEvent::Unsubscribe,
        Some(Command::Shutdown) | None => ChannelEvent::Shutdown,
    }
}

async fn next_frame(
    ws: &mut Option<WsStream>,
) -> Option<Result<WsMessage, tungstenite::Error>> {
    match ws {
        Some(ws) => ws.next().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
