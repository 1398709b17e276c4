//! # feedrelay
//!
//! Polls RSS/Atom feeds and relays new items to chat recipients, webhooks
//! and a remote transfer service, at most once per item, channel and
//! recipient.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler → Fetcher → Normalizer → Identity → Store → Distributor
//! ```
//!
//! - [`scheduler`]: picks due sources each tick and fetches them on a bounded pool
//! - [`fetcher`]: HTTP fetching and payload sanitizing
//! - [`normalizer`]: feed-rs parsing into oldest-first items
//! - [`identity`]: dedup keys and trigger keys
//! - [`store`]: SQLite persistence and the delivery ledger
//! - [`distribution`]: fan-out to the delivery channels
//!
//! ## Quick Start
//!
//! ```bash
//! # Subscribe chat 42 to a feed
//! feedrelay subscribe 42 https://blog.rust-lang.org/feed.xml
//!
//! # Run one update pass
//! feedrelay tick
//!
//! # Run the engine until Ctrl-C
//! feedrelay run
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together the store,
/// fetcher, resolver and channel clients.
pub mod app;

/// Command-line interface using clap.
///
/// - `run` - Start the engine
/// - `subscribe <user> <url>` / `unsubscribe <user> <url>`
/// - `list <user>` - Show a user's subscriptions
/// - `tick` - Run a single update pass
pub mod cli;

/// Configuration loaded from `~/.config/feedrelay/config.toml`.
pub mod config;

/// Background engine owning the tick loop.
pub mod daemon;

/// Multi-channel fan-out gated by the delivery ledger.
///
/// - [`Distributor`](distribution::Distributor): per-batch fan-out
/// - [`ChatSender`](distribution::ChatSender), [`WebhookSender`](distribution::WebhookSender),
///   [`TransferClient`](distribution::TransferClient), [`ArticlePublisher`](distribution::ArticlePublisher):
///   channel collaborators
pub mod distribution;

/// Core domain models.
///
/// - [`Source`](domain::Source): a polled feed URL with its error count
/// - [`Subscription`](domain::Subscription): a user's settings for one source
/// - [`Content`](domain::Content): an item keyed by its dedup hash
pub mod domain;

/// HTTP fetching.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for raw fetches
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
pub mod fetcher;

pub mod identity;

/// Feed parsing and normalization.
///
/// Converts RSS 0.9x/1.0/2.0, Atom 0.3/1.0, and JSON Feed 1.0
/// into [`FeedItem`](domain::FeedItem)s.
pub mod normalizer;

pub mod scheduler;

/// Subscription management behind the chat front end.
pub mod service;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): All repository traits together
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;

/// Torrent enclosure resolution to magnet links.
pub mod torrent;

#[cfg(test)]
mod testing;
