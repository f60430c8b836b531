use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// Errors raised while building or partitioning the feed list.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// A shard count of zero cannot partition anything.
    #[error("Shard count must be at least 1")]
    ZeroShards,
    /// The requested shard does not exist.
    #[error("Shard index {index} out of range for {count} shards")]
    ShardOutOfRange { index: usize, count: usize },
}

/// Checks that a feed URL parses and uses HTTP(S).
pub fn validate_feed_url(url_str: &str) -> Result<Url, SourceError> {
    let url = Url::parse(url_str)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(SourceError::UnsupportedScheme(scheme.to_owned())),
    }
}

/// Ordered, duplicate-free list of feed URLs for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSources {
    urls: Vec<String>,
}

impl FeedSources {
    /// Builds the list from raw strings.
    ///
    /// Blank entries are ignored; invalid URLs are logged and dropped;
    /// repeated URLs keep their first position.
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sources = Self::default();
        sources.extend(urls);
        sources
    }

    /// Appends more URLs with the same filtering as [`FeedSources::new`].
    pub fn extend<I, S>(&mut self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen: HashSet<String> = self.urls.iter().cloned().collect();
        for raw in urls {
            let url = raw.as_ref().trim();
            if url.is_empty() {
                continue;
            }
            if let Err(e) = validate_feed_url(url) {
                tracing::warn!(url = %url, error = %e, "Skipping invalid feed URL");
                continue;
            }
            if seen.insert(url.to_string()) {
                self.urls.push(url.to_string());
            }
        }
    }

    /// Selects every URL whose position `p` satisfies `p % count == index`.
    ///
    /// The partition is deterministic: the same list and shard arguments
    /// always yield the same URLs, and the shards of one list are disjoint
    /// and together cover it.
    pub fn shard(&self, index: usize, count: usize) -> Result<Self, SourceError> {
        if count == 0 {
            return Err(SourceError::ZeroShards);
        }
        if index >= count {
            return Err(SourceError::ShardOutOfRange { index, count });
        }

        let urls = self
            .urls
            .iter()
            .enumerate()
            .filter(|(position, _)| position % count == index)
            .map(|(_, url)| url.clone())
            .collect();
        Ok(Self { urls })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_filters_and_dedupes() {
        let sources = FeedSources::new([
            "https://a.example/rss",
            "  ",
            "file:///etc/passwd",
            "not a url",
            "https://b.example/rss",
            "https://a.example/rss",
        ]);
        assert_eq!(
            sources.urls(),
            &["https://a.example/rss", "https://b.example/rss"]
        );
    }

    #[test]
    fn test_extend_keeps_first_position() {
        let mut sources = FeedSources::new(["https://a.example/rss"]);
        sources.extend(["https://b.example/rss", "https://a.example/rss"]);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources.urls()[0], "https://a.example/rss");
    }

    #[test]
    fn test_shard_selects_every_nth() {
        let sources = FeedSources::new((0..7).map(|i| format!("https://f{i}.example/rss")));

        let shard = sources.shard(1, 3).unwrap();
        assert_eq!(
            shard.urls(),
            &["https://f1.example/rss", "https://f4.example/rss"]
        );
    }

    #[test]
    fn test_shard_rejects_bad_arguments() {
        let sources = FeedSources::new(["https://a.example/rss"]);
        assert!(matches!(sources.shard(0, 0), Err(SourceError::ZeroShards)));
        assert!(matches!(
            sources.shard(2, 2),
            Err(SourceError::ShardOutOfRange { index: 2, count: 2 })
        ));
    }

    #[test]
    fn test_validate_feed_url() {
        assert!(validate_feed_url("http://127.0.0.1:8080/rss").is_ok());
        assert!(matches!(
            validate_feed_url("ftp://a.example/rss"),
            Err(SourceError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            validate_feed_url("::nope"),
            Err(SourceError::InvalidUrl(_))
        ));
    }

    proptest! {
        #[test]
        fn shards_partition_the_list(len in 0usize..60, count in 1usize..8) {
            let sources = FeedSources::new((0..len).map(|i| format!("https://f{i}.example/rss")));

            let mut union = Vec::new();
            for index in 0..count {
                union.extend(sources.shard(index, count).unwrap().into_vec());
            }
            union.sort();
            let mut all = sources.into_vec();
            all.sort();
            prop_assert_eq!(union, all);
        }
    }
}
