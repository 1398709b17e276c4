pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "feedrelay")]
#[command(about = "Feed update and distribution engine", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/feedrelay/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the engine until interrupted
    Run,
    /// Subscribe a user to a feed
    Subscribe {
        /// Chat id of the user
        user: i64,
        /// URL of the feed
        url: String,
    },
    /// Remove a user's subscription
    Unsubscribe {
        /// Chat id of the user
        user: i64,
        /// URL of the feed
        url: String,
    },
    /// List a user's subscriptions
    List {
        /// Chat id of the user
        user: i64,
    },
    /// Run a single update tick
    Tick,
}
