//! Feed harvesting: poll RSS/Atom feeds, move each new item's lead image
//! into S3 as WebP, and record sites and items in SQLite.

pub mod config;
pub mod feed;
pub mod imaging;
pub mod pipeline;
pub mod storage;
pub mod upload;

pub use config::{Config, ConfigError};
pub use pipeline::{Pipeline, RunSummary};
