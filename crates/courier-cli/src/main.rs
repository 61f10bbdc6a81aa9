use anyhow::Result;
use clap::Parser;
use courier_api::ApiClient;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;

use cli::Command;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("courier=info"));
    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut config = config::Config::load(&args.config)?;
    // CLI --base-url overrides config file and environment
    if let Some(base_url) = args.base_url {
        config.backend.base_url = base_url;
    }

    let client = ApiClient::with_config(config.api_client_config())?;
    tracing::debug!(base_url = %client.base_url(), "backend client ready");

    match args.command {
        Command::Chats { limit } => commands::chats(&client, limit).await,
        Command::Tail { chat_id, pages } => commands::tail(client, &config, chat_id, pages).await,
        Command::Send {
            chat_id,
            text,
            file,
        } => commands::send(client, &config, chat_id, text, file).await,
        Command::Photo { handle, out } => {
            commands::photo(client, &config, handle, out.as_deref()).await
        }
    }
}
