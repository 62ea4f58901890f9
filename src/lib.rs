//! # feedmill
//!
//! Feed ingestion and enrichment: fetches RSS/Atom feeds for many users,
//! cleans and enriches their articles and keeps an item store up to date.
//!
//! ## Architecture
//!
//! ```text
//! Updater → FetcherRegistry → FeedFetcher → Normalizer → Sanitizer → Enhancer → Store
//!                                         ↘ FaviconResolver
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! # Subscribe a user to a feed
//! feedmill subscribe https://blog.rust-lang.org/feed.xml --user alice
//!
//! # Update every feed
//! feedmill update
//!
//! # Keep updating every 30 minutes
//! feedmill daemon --interval 30m
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components:
/// store, HTTP client, fetchers, enhancers, updater and services.
pub mod app;

/// Command-line interface using clap.
pub mod cli;

/// Configuration loaded from `~/.config/feedmill/config.toml`.
pub mod config;

/// Core domain models.
///
/// - [`Feed`](domain::Feed): subscription with cache validators and failure state
/// - [`Item`](domain::Item): article with a SHA-256 fingerprint
/// - [`Folder`](domain::Folder): two-level feed grouping
/// - [`StatusFlag`](domain::StatusFlag): persisted item state bits
pub mod domain;

/// Article body enhancers keyed by URL.
///
/// - [`SelectorEnhancer`](enhancer::SelectorEnhancer): extracts content from the full article page
/// - [`PatternEnhancer`](enhancer::PatternEnhancer): regex rewrites of the body
pub mod enhancer;

/// Fetch strategies and the registry that picks one per URL.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for feed fetching
/// - [`FeedFetcher`](fetcher::feed_fetcher::FeedFetcher): RSS/Atom over HTTP with conditional requests
/// - [`FaviconResolver`](fetcher::favicon::FaviconResolver): cached site icon lookup
pub mod fetcher;

/// Feed parsing and normalization.
///
/// Converts RSS 0.9x/1.0/2.0, Atom 0.3/1.0, and JSON Feed 1.0
/// into unified [`Item`](domain::Item) structs.
pub mod normalizer;

/// Allow-list HTML sanitizer.
pub mod sanitizer;

/// Folder, feed and item business rules.
pub mod service;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;

/// Periodic background sweeps.
pub mod sweep;

/// Scoped, concurrent feed updates.
pub mod updater;
