use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use courier_core::{CoreError, HistorySource, PageStore};
use courier_models::Page;
use courier_ws::{ChannelConfig, ConnectionState, RealtimeChannel, StoreDispatcher};
use serde_json::{json, Value};
use url::Url;

struct NoHistory;

impl HistorySource for NoHistory {
    async fn fetch_page(&self, _: i64, _: usize, _: usize) -> Result<Page, CoreError> {
        Ok(Page::default())
    }
}

#[derive(Default)]
struct PushServer {
    connections: AtomicUsize,
    /// (connection index, chat id) for every subscribe received.
    subscribes: Mutex<Vec<(usize, i64)>>,
    unsubscribes: AtomicUsize,
    drop_first_connection: bool,
}

fn message(id: usize) -> Value {
    json!({
        "id": id,
        "text": format!("message {id}"),
        "time": 1_700_000_000_000_i64 + id as i64,
        "is_from_me": false,
        "handle": "+15550001111"
    })
}

async fn upgrade(ws: WebSocketUpgrade, State(server): State<Arc<PushServer>>) -> Response {
    ws.on_upgrade(move |socket| serve(socket, server))
}

async fn serve(mut socket: WebSocket, server: Arc<PushServer>) {
    let conn = server.connections.fetch_add(1, Ordering::SeqCst);
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        if frame["type"] == "unsubscribe" {
            server.unsubscribes.fetch_add(1, Ordering::SeqCst);
            continue;
        }
        if frame["type"] != "subscribe" {
            continue;
        }
        let chat_id = frame["chat_id"].as_i64().unwrap_or_default();
        server.subscribes.lock().unwrap().push((conn, chat_id));

        // Each connection sees one more message than the last.
        let messages: Vec<Value> = (1..=conn + 2).map(message).collect();
        let push = json!({
            "type": "messages_update",
            "chat_id": chat_id,
            "messages": messages,
            "total": conn + 2,
            "timestamp": 1_700_000_000_000_i64,
        });
        let _ = socket.send(Message::Text(push.to_string().into())).await;
        let _ = socket
            .send(Message::Text(r#"{"type":"typing","chat_id":1}"#.into()))
            .await;

        if conn == 0 && server.drop_first_connection {
            return;
        }
    }
}

async fn spawn_server(server: Arc<PushServer>) -> anyhow::Result<SocketAddr> {
    let app = Router::new().route("/ws", get(upgrade)).with_state(server);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(addr)
}

fn fast_config() -> ChannelConfig {
    ChannelConfig {
        initial_backoff: Duration::from_millis(20),
        max_backoff: Duration::from_millis(100),
        connect_timeout: Duration::from_secs(2),
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    Ok(())
}

fn ids(store: &PageStore<NoHistory>, chat_id: i64) -> Vec<i64> {
    store
        .view(chat_id)
        .map(|v| v.messages().iter().map(|m| m.id).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn pushes_reach_the_store() -> anyhow::Result<()> {
    let addr = spawn_server(Arc::new(PushServer::default())).await?;
    let store = Arc::new(PageStore::new(NoHistory, 50));
    let channel = RealtimeChannel::spawn(
        Url::parse(&format!("ws://{addr}/ws"))?,
        fast_config(),
        StoreDispatcher::new(store.clone()),
    );

    channel.subscribe(9)?;
    wait_until(|| ids(&store, 9) == vec![1, 2]).await?;
    assert_eq!(channel.state(), ConnectionState::Connected);

    channel.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn reconnect_resubscribes_once() -> anyhow::Result<()> {
    let server = Arc::new(PushServer {
        drop_first_connection: true,
        ..PushServer::default()
    });
    let addr = spawn_server(server.clone()).await?;
    let store = Arc::new(PageStore::new(NoHistory, 50));
    let channel = RealtimeChannel::spawn(
        Url::parse(&format!("ws://{addr}/ws"))?,
        fast_config(),
        StoreDispatcher::new(store.clone()),
    );

    channel.subscribe(5)?;
    wait_until(|| ids(&store, 5) == vec![1, 2, 3]).await?;

    assert_eq!(*server.subscribes.lock().unwrap(), vec![(0, 5), (1, 5)]);
    assert_eq!(server.connections.load(Ordering::SeqCst), 2);

    channel.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn unsubscribe_reaches_the_server() -> anyhow::Result<()> {
    let server = Arc::new(PushServer::default());
    let addr = spawn_server(server.clone()).await?;
    let store = Arc::new(PageStore::new(NoHistory, 50));
    let channel = RealtimeChannel::spawn(
        Url::parse(&format!("ws://{addr}/ws"))?,
        fast_config(),
        StoreDispatcher::new(store.clone()),
    );

    channel.subscribe(4)?;
    wait_until(|| ids(&store, 4) == vec![1, 2]).await?;
    channel.unsubscribe()?;
    wait_until(|| server.unsubscribes.load(Ordering::SeqCst) == 1).await?;
    // Nothing held, so a second unsubscribe stays local.
    channel.unsubscribe()?;

    channel.shutdown().await;
    assert_eq!(server.unsubscribes.load(Ordering::SeqCst), 1);
    assert_eq!(server.subscribes.lock().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn shutdown_does_not_wait_for_a_stalled_handshake() -> anyhow::Result<()> {
    // Accepts TCP connections but never answers the upgrade request.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let store = Arc::new(PageStore::new(NoHistory, 50));
    let channel = RealtimeChannel::spawn(
        Url::parse(&format!("ws://{addr}/ws"))?,
        ChannelConfig {
            connect_timeout: Duration::from_secs(30),
            ..fast_config()
        },
        StoreDispatcher::new(store),
    );
    let mut state = channel.watch_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Connecting),
    )
    .await??;

    channel.subscribe(2)?;
    tokio::time::timeout(Duration::from_secs(2), channel.shutdown()).await?;
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    drop(listener);
    Ok(())
}

#[tokio::test]
async fn unreachable_server_keeps_retrying_until_shutdown() -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let store = Arc::new(PageStore::new(NoHistory, 50));
    let channel = RealtimeChannel::spawn(
        Url::parse(&format!("ws://{addr}/ws"))?,
        fast_config(),
        StoreDispatcher::new(store),
    );
    let mut state = channel.watch_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Reconnecting),
    )
    .await??;

    // Held while offline; nothing to send it to.
    channel.subscribe(1)?;
    channel.shutdown().await;
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    Ok(())
}
