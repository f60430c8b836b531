use scraper::{ElementRef, Html};
use url::Url;

/// Returns the `src` of the first `<img>` in `html`, in document order.
///
/// Parsing is permissive: malformed markup never produces an error, and a
/// fragment without any usable `<img>` yields `None`. Images whose `src` is
/// missing or blank are passed over.
pub fn extract_image_url(html: &str) -> Option<String> {
    if html.trim().is_empty() {
        return None;
    }

    let fragment = Html::parse_fragment(html);
    // descendants() is a pre-order walk, i.e. depth-first in document order
    fragment
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "img")
        .filter_map(|el| el.value().attr("src"))
        .map(str::trim)
        .find(|src| !src.is_empty())
        .map(str::to_string)
}

/// Turns an extracted `src` into an absolute HTTP(S) URL.
///
/// Relative and protocol-relative sources are joined onto `base` (the item
/// link). `data:` URIs and other non-HTTP schemes resolve to `None`.
pub fn resolve_image_url(src: &str, base: Option<&str>) -> Option<String> {
    let resolved = match Url::parse(src) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(base?).ok()?;
            base.join(src).ok()?
        }
        Err(_) => return None,
    };

    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}
