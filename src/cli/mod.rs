pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "feedmill")]
#[command(about = "Feed ingestion and enrichment pipeline", long_about = None)]
pub struct Cli {
    /// Number of parallel workers for fetching feeds (overrides the config file)
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Config file to use instead of ~/.config/feedmill/config.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch and merge feeds
    Update {
        /// Only feeds of this user
        #[arg(short, long)]
        user: Option<String>,

        /// Only this feed
        #[arg(short, long)]
        feed: Option<i64>,
    },
    /// Fetch one feed and show what it returns without storing anything
    Fetch {
        feed_id: i64,
    },
    /// Subscribe a user to a feed
    Subscribe {
        /// URL of the feed
        url: String,

        #[arg(short, long)]
        user: String,

        /// Folder to place the feed in
        #[arg(short, long)]
        folder: Option<i64>,
    },
    /// Create a folder
    Folder {
        name: String,

        #[arg(short, long)]
        user: String,

        /// Top-level folder to nest under
        #[arg(short, long)]
        parent: Option<i64>,
    },
    /// List a user's feeds
    Feeds {
        #[arg(short, long)]
        user: String,
    },
    /// List a user's items
    Items {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        feed: Option<i64>,

        /// Include read items
        #[arg(long)]
        all: bool,

        /// Only starred items
        #[arg(long)]
        starred: bool,

        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Keep updating all feeds in the foreground
    Daemon {
        /// Update interval (e.g., "1h", "30m", "6h", "1d")
        #[arg(short, long, default_value = "1h")]
        interval: String,

        /// Skip initial update on start
        #[arg(long)]
        no_initial_update: bool,
    },
}
