//! Feed sources, fetching and parsing.
//!
//! - [`sources`] - The ordered feed URL list and its shard partitioning
//! - [`opml`] - Reading feed URLs from an OPML subscription file
//! - [`fetcher`] - Bounded-timeout HTTP retrieval, fanned out over tokio tasks
//! - [`parser`] - Conversion of RSS/Atom/JSON feeds via `feed-rs`

mod fetcher;
mod opml;
mod parser;
mod sources;

pub use fetcher::{
    feed_client, fetch_all, fetch_feed, FeedResult, FetchError, DEFAULT_FEED_TIMEOUT,
};
pub use opml::{parse_feed_urls, read_feed_urls, OpmlError};
pub use parser::{parse_feed, FeedEntry, FetchedFeed};
pub use sources::{validate_feed_url, FeedSources, SourceError};
