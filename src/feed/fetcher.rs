use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use super::parser::{parse_feed, FetchedFeed};

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Per-request timeout for feed downloads.
pub const DEFAULT_FEED_TIMEOUT: Duration = Duration::from_secs(4);

/// Errors that can occur while fetching a single feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[source] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the client timeout
    #[error("Request timed out")]
    Timeout,
    /// Feed XML could not be parsed as RSS, Atom or JSON Feed
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(e)
        }
    }
}

/// Outcome of fetching one feed URL.
///
/// On success every entry already carries its tag string, computed while
/// parsing inside the fetch task.
#[derive(Debug)]
pub struct FeedResult {
    pub url: String,
    pub result: Result<FetchedFeed, FetchError>,
}

/// Builds the HTTP client shared by all feed fetches.
pub fn feed_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("rss-harvest/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Fetches every URL concurrently and streams results in completion order.
///
/// One task is spawned per URL; at most `max_concurrent` of them hold a
/// request open at a time. A supervisor task awaits all of them and then
/// drops the sender, so the returned receiver yields exactly one
/// [`FeedResult`] per URL (minus tasks that panicked) and then `None`.
pub fn fetch_all(
    client: reqwest::Client,
    urls: Vec<String>,
    max_concurrent: usize,
) -> mpsc::Receiver<FeedResult> {
    // Sized to the URL count so the supervisor never waits on the consumer
    let (tx, rx) = mpsc::channel(urls.len().max(1));
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

    let mut tasks = JoinSet::new();
    for url in urls {
        let client = client.clone();
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            // The semaphore is never closed, so acquisition only waits
            let _permit = semaphore.acquire_owned().await.ok();
            let result = fetch_feed(&client, &url).await;
            FeedResult { url, result }
        });
    }

    tokio::spawn(async move {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    if tx.send(result).await.is_err() {
                        tracing::warn!("Feed result receiver dropped, abandoning remaining fetches");
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Feed fetch task panicked");
                }
            }
        }
    });

    rx
}

/// Downloads and parses a single feed. No retries.
pub async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<FetchedFeed, FetchError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
    let feed = parse_feed(url, &bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

    tracing::debug!(
        feed = %url,
        title = %feed.title,
        entries = feed.entries.len(),
        "Fetched feed"
    );
    Ok(feed)
}

pub(crate) async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
