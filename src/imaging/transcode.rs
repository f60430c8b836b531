use futures::StreamExt;
use image::{DynamicImage, ImageFormat};
use std::time::Duration;
use thiserror::Error;

/// Lossy WebP quality on libwebp's 0-100 scale.
pub const WEBP_QUALITY: f32 = 85.0;

/// Per-request timeout for image HEAD/GET requests.
pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_IMAGE_SIZE: usize = 20 * 1024 * 1024; // 20MB

/// libwebp refuses anything larger in either dimension.
const MAX_WEBP_DIMENSION: u32 = 16383;

/// Errors from fetching and re-encoding an image. Each message names the
/// stage that failed.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Image HEAD request failed: {0}")]
    Head(#[source] reqwest::Error),
    #[error("Image request returned non-200 status: {0}")]
    Status(u16),
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("Image download failed: {0}")]
    Fetch(#[source] reqwest::Error),
    #[error("Image too large: exceeds {0} bytes")]
    TooLarge(usize),
    #[error("Image decode failed: {0}")]
    Decode(#[source] image::ImageError),
    #[error("WebP encode failed: {0}")]
    Encode(String),
}

impl TranscodeError {
    /// Short stage label for structured logs.
    pub fn stage(&self) -> &'static str {
        match self {
            TranscodeError::Head(_) | TranscodeError::Status(_) => "probe",
            TranscodeError::UnsupportedFormat(_) => "format",
            TranscodeError::Fetch(_) | TranscodeError::TooLarge(_) => "fetch",
            TranscodeError::Decode(_) => "decode",
            TranscodeError::Encode(_) => "encode",
        }
    }
}

/// Builds the HTTP client shared by all image downloads.
pub fn image_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("rss-harvest/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Downloads images and re-encodes them as lossy WebP.
#[derive(Clone)]
pub struct WebpTranscoder {
    client: reqwest::Client,
    quality: f32,
    max_bytes: usize,
}

impl WebpTranscoder {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            quality: WEBP_QUALITY,
            max_bytes: MAX_IMAGE_SIZE,
        }
    }

    /// Override the download cap (20 MiB by default).
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes.max(1);
        self
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality.clamp(0.0, 100.0);
        self
    }

    /// Fetches `url` and returns it re-encoded as WebP.
    ///
    /// A HEAD probe runs first: a non-200 status or a GIF content type fails
    /// before any image bytes are downloaded. The downloaded bytes are then
    /// format-sniffed, so a GIF served under another content type is still
    /// rejected.
    pub async fn convert_to_webp(&self, url: &str) -> Result<Vec<u8>, TranscodeError> {
        let head = self
            .client
            .head(url)
            .send()
            .await
            .map_err(TranscodeError::Head)?;
        if head.status() != reqwest::StatusCode::OK {
            return Err(TranscodeError::Status(head.status().as_u16()));
        }

        let content_type = head
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if content_type.contains("gif") {
            return Err(TranscodeError::UnsupportedFormat(content_type));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(TranscodeError::Fetch)?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(TranscodeError::Status(response.status().as_u16()));
        }
        let bytes = read_capped(response, self.max_bytes).await?;

        // Decoding and encoding are CPU-bound; keep them off the async workers
        let quality = self.quality;
        tokio::task::spawn_blocking(move || encode_webp(&bytes, quality))
            .await
            .map_err(|e| TranscodeError::Encode(format!("transcode worker failed: {e}")))?
    }
}

/// Streams the body, failing as soon as it grows past `limit` bytes.
async fn read_capped(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, TranscodeError> {
    if response
        .content_length()
        .is_some_and(|len| len > limit as u64)
    {
        return Err(TranscodeError::TooLarge(limit));
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(TranscodeError::Fetch)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(TranscodeError::TooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Sniffs, decodes and re-encodes raw image bytes as lossy WebP.
///
/// JPEG, PNG and WebP input is accepted; GIF is rejected.
pub fn encode_webp(bytes: &[u8], quality: f32) -> Result<Vec<u8>, TranscodeError> {
    let format = image::guess_format(bytes).map_err(TranscodeError::Decode)?;
    if format == ImageFormat::Gif {
        return Err(TranscodeError::UnsupportedFormat("image/gif".to_string()));
    }

    let decoded =
        image::load_from_memory_with_format(bytes, format).map_err(TranscodeError::Decode)?;
    if decoded.width() > MAX_WEBP_DIMENSION || decoded.height() > MAX_WEBP_DIMENSION {
        return Err(TranscodeError::Encode(format!(
            "{}x{} exceeds the WebP limit of {MAX_WEBP_DIMENSION}px",
            decoded.width(),
            decoded.height()
        )));
    }

    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
    let encoder = webp::Encoder::from_image(&rgb)
        .map_err(|e| TranscodeError::Encode(e.to_string()))?;
    let encoded = encoder
        .encode_simple(false, quality)
        .map_err(|e| TranscodeError::Encode(format!("{e:?}")))?;

    Ok(encoded.to_vec())
}
