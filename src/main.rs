use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use rss_harvest::feed::{feed_client, read_feed_urls, FeedSources};
use rss_harvest::imaging::{image_client, WebpTranscoder};
use rss_harvest::storage::Database;
use rss_harvest::upload::S3Uploader;
use rss_harvest::{Config, Pipeline};

#[derive(Parser, Debug)]
#[command(
    name = "rss-harvest",
    version,
    about = "Poll RSS feeds and archive new items with their lead images"
)]
struct Args {
    /// Configuration file
    #[arg(long, value_name = "FILE", default_value = "rss-harvest.toml")]
    config: PathBuf,

    /// OPML file with additional feed subscriptions
    #[arg(long, value_name = "FILE")]
    opml: Option<PathBuf>,

    /// Process only the feeds at positions p where p % shard-count == shard-index
    #[arg(long, requires = "shard_count")]
    shard_index: Option<usize>,

    /// Number of shards the feed list is split into
    #[arg(long, requires = "shard_index")]
    shard_count: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // A missing .env is normal in production
    dotenv::dotenv().ok();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    config.apply_env();
    config.validate().context("Invalid configuration")?;
    tracing::debug!(config = ?config, "Effective configuration");

    let mut sources = FeedSources::new(&config.feeds);
    if let Some(opml) = args.opml.as_ref().or(config.opml.as_ref()) {
        let urls = read_feed_urls(opml)
            .await
            .with_context(|| format!("Failed to read OPML file {}", opml.display()))?;
        sources.extend(urls);
    }
    if let (Some(index), Some(count)) = (args.shard_index, args.shard_count) {
        sources = sources
            .shard(index, count)
            .context("Invalid shard arguments")?;
    }
    if sources.is_empty() {
        tracing::warn!("No feeds configured, nothing to do");
        return Ok(());
    }

    let db = Database::connect(&config.database_url)
        .await
        .context("Failed to open database")?
        .with_batch_size(config.batch_size);

    let uploader = S3Uploader::new(
        config
            .s3
            .settings()
            .context("Object storage is not configured")?,
    );

    let feed_http = feed_client(config.feed_timeout()).context("Failed to build feed HTTP client")?;
    let image_http =
        image_client(config.image_timeout()).context("Failed to build image HTTP client")?;
    let transcoder = WebpTranscoder::new(image_http).with_quality(config.webp_quality);

    tracing::info!(feeds = sources.len(), "Starting harvest");
    let pipeline = Pipeline::new(db, feed_http, transcoder, Arc::new(uploader))
        .with_max_concurrent(config.max_concurrent_fetches);
    pipeline.run(sources).await;

    Ok(())
}
