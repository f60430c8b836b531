//! Lead-image handling for feed items.
//!
//! [`extract_image_url`] finds the first `<img>` in an item's HTML, and
//! [`WebpTranscoder`] downloads that image and re-encodes it as lossy WebP.

mod extract;
mod transcode;

pub use extract::{extract_image_url, resolve_image_url};
pub use transcode::{
    encode_webp, image_client, TranscodeError, WebpTranscoder, DEFAULT_IMAGE_TIMEOUT, WEBP_QUALITY,
};
