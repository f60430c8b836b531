//! SQLite persistence for sites and items.
//!
//! [`Database`] owns the connection pool and the commit boundary for
//! everything the pipeline writes. Items are unique by link; sites are unique
//! by URL and created lazily the first time a feed has something to save.

mod items;
mod schema;
mod sites;
mod types;

pub use schema::{Database, DEFAULT_BATCH_SIZE};
pub use types::{DatabaseError, Item, NewItem, SaveReport, Site, SiteInfo};
