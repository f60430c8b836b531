use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;
use thiserror::Error;

use super::sources::validate_feed_url;

/// SEC-003: Maximum allowed nesting depth for OPML outline elements.
/// Prevents stack overflow attacks from maliciously crafted deeply nested OPMLs.
const MAX_OPML_DEPTH: usize = 50;

/// Errors that can occur during OPML parsing.
#[derive(Debug, Error)]
pub enum OpmlError {
    /// SEC-003: OPML nesting depth exceeds safety limit.
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// XML parsing failed.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// File I/O error.
    #[error("Failed to read OPML file: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads an OPML subscription list and returns its feed URLs in document order.
///
/// Any `<outline>` carrying an `xmlUrl` attribute counts as a feed, at any
/// nesting depth. Outlines whose URL is not HTTP(S) are skipped with a warning.
pub async fn read_feed_urls(path: &Path) -> Result<Vec<String>, OpmlError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_feed_urls(&content)
}

/// Parses OPML content into feed URLs.
///
/// SEC-002: quick-xml (0.37) never expands `<!ENTITY>` declarations; custom
/// entities surface as errors from `decode_and_unescape_value()`.
pub fn parse_feed_urls(content: &str) -> Result<Vec<String>, OpmlError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut urls = Vec::new();
    let mut buf = Vec::new();
    let mut depth: usize = 0;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                depth += 1;
                if depth > MAX_OPML_DEPTH {
                    return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH));
                }
                if let Some(url) = outline_feed_url(&e, &reader)? {
                    urls.push(url);
                }
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                if let Some(url) = outline_feed_url(&e, &reader)? {
                    urls.push(url);
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpmlError::XmlParse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(urls)
}

fn outline_feed_url(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<Option<String>, OpmlError> {
    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        if attr.key.as_ref() != b"xmlUrl" {
            continue;
        }

        let url = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|e| OpmlError::XmlParse(e.to_string()))?
            .to_string();
        return match validate_feed_url(&url) {
            Ok(_) => Ok(Some(url)),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Skipping invalid feed URL in OPML");
                Ok(None)
            }
        };
    }
    Ok(None)
}
