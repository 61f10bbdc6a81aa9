use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use chrono::Local;
use courier_api::{ApiClient, PhotoCache};
use courier_core::{HistorySource, Outbox, PageStore};
use courier_models::{Chat, Message, SendTarget};
use courier_ws::{RealtimeChannel, StoreDispatcher};
use tokio::sync::broadcast::error::RecvError;

use crate::config::Config;

/// How many recent chats `send` scans to resolve a chat id.
const CHAT_SCAN_LIMIT: usize = 200;

pub async fn chats(client: &ApiClient, limit: usize) -> Result<()> {
    let page = client.fetch_chats(limit, 0).await?;
    for chat in &page.chats {
        println!("{}", chat_line(chat));
    }
    if page.has_more {
        println!("({} of {} chats shown)", page.chats.len(), page.total);
    }
    Ok(())
}

pub async fn tail(client: ApiClient, config: &Config, chat_id: i64, pages: usize) -> Result<()> {
    let url = client.websocket_url()?;
    let store = Arc::new(PageStore::new(client, config.feed.page_size));
    let mut changes = store.events().subscribe();

    store.load_initial(chat_id).await?;
    for _ in 0..pages {
        if store.load_older(chat_id).await?.is_none() {
            break;
        }
    }
    let mut last_printed = print_new(&store, chat_id, None);

    let dispatcher = StoreDispatcher::new(store.clone())
        .with_error(|message| eprintln!("server error: {message}"));
    let channel = RealtimeChannel::spawn(url, config.channel_config(), dispatcher);
    channel.subscribe(chat_id)?;
    let mut state = channel.watch_state();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!();
                tracing::info!("Shutting down (ctrl-c)...");
                break;
            }
            change = changes.recv() => match change {
                Ok(change) if change.chat_id == chat_id => {
                    last_printed = print_new(&store, chat_id, last_printed);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "feed events lagged");
                    last_printed = print_new(&store, chat_id, last_printed);
                }
                Err(RecvError::Closed) => break,
            },
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                tracing::info!(state = ?current, "realtime connection");
            }
        }
    }

    channel.shutdown().await;
    Ok(())
}

pub async fn send(
    client: ApiClient,
    config: &Config,
    chat_id: i64,
    text: Option<String>,
    file: Option<String>,
) -> Result<()> {
    let chat = client
        .find_chat(chat_id, CHAT_SCAN_LIMIT)
        .await?
        .ok_or_else(|| anyhow!("chat {chat_id} not among the {CHAT_SCAN_LIMIT} most recent chats"))?;
    let target = SendTarget::for_chat(&chat);

    let store = Arc::new(PageStore::new(client.clone(), config.feed.page_size));
    let outbox = Outbox::new(store, client);

    match (file, text) {
        (Some(path), caption) => {
            let warning = outbox
                .send_attachment(chat_id, &target, &path, caption.as_deref())
                .await?;
            if let Some(warning) = warning {
                eprintln!("warning: {warning}");
            }
            println!("sent {path} to {}", chat.display_name);
        }
        (None, Some(text)) => {
            outbox.send_text(chat_id, &target, &text).await?;
            println!("sent to {}", chat.display_name);
        }
        (None, None) => bail!("nothing to send: give a text or --file"),
    }
    Ok(())
}

pub async fn photo(client: ApiClient, config: &Config, handle: String, out: Option<&Path>) -> Result<()> {
    let cache = PhotoCache::new(client, config.photo_cache_config());
    let Some(photo) = cache.fetch(&handle).await? else {
        println!("no photo for {handle}");
        return Ok(());
    };
    match out {
        Some(path) => {
            tokio::fs::write(path, &photo.bytes).await?;
            println!("wrote {} bytes ({}) to {}", photo.bytes.len(), photo.content_type, path.display());
        }
        None => println!("{}: {} bytes ({})", handle, photo.bytes.len(), photo.content_type),
    }
    Ok(())
}

/// Print confirmed messages newer than `after`; returns the newest id printed.
fn print_new<H: HistorySource>(store: &PageStore<H>, chat_id: i64, after: Option<i64>) -> Option<i64> {
    let Some(view) = store.view(chat_id) else {
        return after;
    };
    let mut last = after;
    for message in view.messages() {
        if message.is_tentative() || after.is_some_and(|a| message.id <= a) {
            continue;
        }
        println!("{}", message_line(message));
        last = Some(last.map_or(message.id, |l| l.max(message.id)));
    }
    last
}

fn format_time(millis: Option<i64>) -> String {
    millis
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn chat_line(chat: &Chat) -> String {
    let preview = chat.last_message_text.as_deref().unwrap_or("");
    let marker = if chat.is_group { "#" } else { " " };
    format!(
        "{:>6} {marker} {:<24} {}  {}",
        chat.id,
        chat.display_name,
        format_time(chat.last_message_time),
        preview.lines().next().unwrap_or(""),
    )
}

fn message_line(message: &Message) -> String {
    let mut line = format!(
        "[{}] {}: {}",
        format_time(Some(message.time)),
        message.sender_label(),
        message.text.as_deref().unwrap_or(""),
    );
    if !message.attachments.is_empty() {
        let names: Vec<&str> = message
            .attachments
            .iter()
            .map(|a| a.display_name().unwrap_or("attachment"))
            .collect();
        line.push_str(&format!(" [{}]", names.join(", ")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_models::Attachment;

    fn chat(is_group: bool) -> Chat {
        Chat {
            id: 7,
            display_name: "Sam".into(),
            last_message_text: Some("see you\nlater".into()),
            last_message_time: None,
            last_message_is_from_me: Some(false),
            is_group,
            handles: vec!["+15550001111".into()],
            chat_identifier: None,
        }
    }

    #[test]
    fn chat_line_shows_first_preview_line() {
        let line = chat_line(&chat(true));
        assert!(line.contains(" # "));
        assert!(line.contains("see you"));
        assert!(!line.contains("later"));
        assert!(line.contains(" - "));
    }

    #[test]
    fn message_line_names_sender() {
        let mut message = Message::outgoing(3, "hi", 1_700_000_000_000);
        assert!(message_line(&message).ends_with("me: hi"));
        message.is_from_me = false;
        message.sender_handle = Some("+15550001111".into());
        assert!(message_line(&message).ends_with("+15550001111: hi"));
    }

    #[test]
    fn message_line_lists_attachments() {
        let mut message = Message::outgoing(4, "look", 1_700_000_000_000);
        message.attachments = vec![
            Attachment {
                id: 1,
                filename: Some("~/Library/Messages/Attachments/IMG_2.heic".into()),
                mime_type: None,
                transfer_name: None,
                total_bytes: 10,
            },
            Attachment {
                id: 2,
                filename: None,
                mime_type: None,
                transfer_name: None,
                total_bytes: 0,
            },
        ];
        assert!(message_line(&message).ends_with("me: look [IMG_2.heic, attachment]"));
    }
}
