use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "courier", about = "Terminal client for the Courier messaging backend")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/courier.toml")]
    pub config: String,

    /// Backend base URL (overrides config)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the most recent chats
    Chats {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Print a chat's recent history, then follow it live until ctrl-c
    Tail {
        chat_id: i64,
        /// Extra older pages to load before following
        #[arg(long, default_value_t = 0)]
        pages: usize,
    },
    /// Send a text, or a file with an optional caption
    Send {
        chat_id: i64,
        text: Option<String>,
        /// Absolute path of a file on the backend host
        #[arg(long)]
        file: Option<String>,
    },
    /// Fetch a contact photo
    Photo {
        handle: String,
        /// Where to write the image; prints its size when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}
