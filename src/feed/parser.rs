use chrono::{DateTime, Utc};
use feed_rs::model::Link;
use feed_rs::parser;

use crate::storage::SiteInfo;

/// One entry of a fetched feed.
#[derive(Debug, Clone, Default)]
pub struct FeedEntry {
    pub title: String,
    pub link: Option<String>,
    /// Parsed publication date, falling back to the update date
    pub published: Option<DateTime<Utc>>,
    /// Full HTML body (`content:encoded` / Atom `content`)
    pub content: Option<String>,
    /// Summary HTML (`description` / Atom `summary`)
    pub description: Option<String>,
    pub categories: Vec<String>,
    /// Category terms joined with `", "`, as stored on the item
    pub tags: String,
}

/// A parsed feed together with the URL it was fetched from.
#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub source_url: String,
    pub title: String,
    /// Home page of the publication, or the feed URL when the feed has none
    pub link: String,
    pub entries: Vec<FeedEntry>,
}

impl FetchedFeed {
    pub fn site(&self) -> SiteInfo {
        SiteInfo {
            name: self.title.clone(),
            url: self.link.clone(),
        }
    }
}

pub fn parse_feed(source_url: &str, bytes: &[u8]) -> Result<FetchedFeed, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let link = preferred_link(&feed.links).unwrap_or_else(|| source_url.to_string());
    let title = feed
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| link.clone());

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let categories: Vec<String> = entry
                .categories
                .into_iter()
                .map(|c| c.term)
                .filter(|term| !term.is_empty())
                .collect();
            FeedEntry {
                title: entry
                    .title
                    .map(|t| t.content)
                    .unwrap_or_else(|| "Untitled".to_string()),
                link: preferred_link(&entry.links),
                published: entry.published.or(entry.updated),
                content: entry.content.and_then(|c| c.body),
                description: entry.summary.map(|s| s.content),
                tags: categories.join(", "),
                categories,
            }
        })
        .collect();

    Ok(FetchedFeed {
        source_url: source_url.to_string(),
        title,
        link,
        entries,
    })
}

/// Picks the `alternate` link (or one without a `rel`), then any non-`self` link.
fn preferred_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.iter().find(|l| l.rel.as_deref() != Some("self")))
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty())
}
