//! One harvest pass: fetch every feed, keep the entries not seen before,
//! move their lead images into object storage and save the rest.
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::Instrument;

use crate::feed::{fetch_all, FeedEntry, FeedSources, FetchedFeed};
use crate::imaging::{extract_image_url, resolve_image_url, TranscodeError, WebpTranscoder};
use crate::storage::{Database, NewItem};
use crate::upload::{object_key, ObjectStore, UploadError};

/// Default cap on feeds downloaded at the same time.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 16;

/// Counters for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub feeds_total: usize,
    /// Feeds that could not be fetched or parsed, or whose items failed to save
    pub feeds_failed: usize,
    pub items_seen: usize,
    pub items_skipped_existing: usize,
    pub images_uploaded: usize,
    pub image_failures: usize,
    pub items_inserted: usize,
}

/// Why an entry's image did not make it to object storage.
#[derive(Debug, Error)]
enum ImageError {
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl ImageError {
    fn stage(&self) -> &'static str {
        match self {
            ImageError::Transcode(e) => e.stage(),
            ImageError::Upload(_) => "upload",
        }
    }
}

/// An entry that passed the existence check, with its uploaded image (if any).
struct PendingItem {
    entry: FeedEntry,
    link: String,
    image_url: Option<String>,
}

impl PendingItem {
    fn into_new_item(self) -> NewItem {
        let description = self
            .entry
            .description
            .or(self.entry.content)
            .unwrap_or_default();
        NewItem {
            title: self.entry.title,
            link: self.link,
            published: self.entry.published,
            description,
            image_url: self.image_url,
            tags: self.entry.tags,
        }
    }
}

pub struct Pipeline {
    db: Database,
    feed_client: reqwest::Client,
    transcoder: WebpTranscoder,
    store: Arc<dyn ObjectStore>,
    max_concurrent: usize,
}

impl Pipeline {
    pub fn new(
        db: Database,
        feed_client: reqwest::Client,
        transcoder: WebpTranscoder,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            db,
            feed_client,
            transcoder,
            store,
            max_concurrent: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Runs one pass over `sources`.
    ///
    /// Feeds are consumed in the order their fetches complete; entries of a
    /// feed are handled one at a time. Per-feed and per-entry failures are
    /// logged and counted, never returned.
    pub async fn run(&self, sources: FeedSources) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary {
            feeds_total: sources.len(),
            ..RunSummary::default()
        };

        let mut results = fetch_all(
            self.feed_client.clone(),
            sources.into_vec(),
            self.max_concurrent,
        );

        while let Some(fetched) = results.recv().await {
            let span = tracing::info_span!("feed", feed = %fetched.url);
            match fetched.result {
                Ok(feed) => {
                    self.process_feed(feed, &mut summary)
                        .instrument(span)
                        .await;
                }
                Err(e) => {
                    summary.feeds_failed += 1;
                    span.in_scope(|| tracing::warn!(error = %e, "Skipping feed"));
                }
            }
        }

        tracing::info!(
            feeds = summary.feeds_total,
            feeds_failed = summary.feeds_failed,
            items_seen = summary.items_seen,
            skipped_existing = summary.items_skipped_existing,
            images_uploaded = summary.images_uploaded,
            image_failures = summary.image_failures,
            inserted = summary.items_inserted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Harvest finished"
        );
        summary
    }

    /// Handles every entry of one fetched feed, then saves the survivors.
    pub async fn process_feed(&self, feed: FetchedFeed, summary: &mut RunSummary) {
        let site = feed.site();
        let mut pending = Vec::new();

        for entry in feed.entries {
            summary.items_seen += 1;

            let Some(link) = entry.link.clone() else {
                tracing::debug!(title = %entry.title, "Entry has no link, skipping");
                continue;
            };

            match self.db.link_exists(&link).await {
                Ok(true) => {
                    summary.items_skipped_existing += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(link = %link, error = %e, "Existence check failed, skipping entry");
                    continue;
                }
            }

            let image_url = match lead_image_url(&entry, &link) {
                None => None,
                Some(src) => match self.store_image(&src).await {
                    Ok(public_url) => {
                        summary.images_uploaded += 1;
                        Some(public_url)
                    }
                    Err(e) => {
                        // Left unsaved so the next run tries the image again
                        summary.image_failures += 1;
                        tracing::warn!(
                            link = %link,
                            image = %src,
                            stage = e.stage(),
                            error = %e,
                            "Image not stored, skipping entry"
                        );
                        continue;
                    }
                },
            };

            pending.push(PendingItem {
                entry,
                link,
                image_url,
            });
        }

        if pending.is_empty() {
            tracing::debug!("No new entries");
            return;
        }

        let items: Vec<NewItem> = pending.into_iter().map(PendingItem::into_new_item).collect();
        match self.db.save_site_and_items(&site, &items).await {
            Ok(report) => {
                summary.items_inserted += report.inserted;
                tracing::info!(
                    site = %site.url,
                    inserted = report.inserted,
                    batches = report.batches,
                    "Saved items"
                );
            }
            Err(e) => {
                // Images uploaded for these items stay in the bucket unreferenced
                summary.feeds_failed += 1;
                tracing::error!(site = %site.url, error = %e, "Failed to save items");
            }
        }
    }

    async fn store_image(&self, src: &str) -> Result<String, ImageError> {
        let webp = self.transcoder.convert_to_webp(src).await?;
        let key = object_key();
        let public_url = self.store.put(&key, webp).await?;
        tracing::debug!(image = %src, key = %key, "Stored image");
        Ok(public_url)
    }
}

/// First image of the entry body, falling back to its summary, as an
/// absolute URL.
fn lead_image_url(entry: &FeedEntry, link: &str) -> Option<String> {
    let src = entry
        .content
        .as_deref()
        .and_then(extract_image_url)
        .or_else(|| entry.description.as_deref().and_then(extract_image_url))?;

    let resolved = resolve_image_url(&src, Some(link));
    if resolved.is_none() {
        tracing::debug!(src = %src, "Image source is not an HTTP URL, ignoring");
    }
    resolved
}
