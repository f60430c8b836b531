//! Configuration for a harvest run.
//!
//! Settings come from an optional TOML file (a missing file yields
//! `Config::default()`), then environment variables override individual
//! keys. `.env` is loaded by the binary before either is read.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::upload::{S3Settings, DEFAULT_REGION};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A required setting has no value in the file or the environment.
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// sqlx SQLite URL. Env: `DATABASE_URL`.
    pub database_url: String,

    /// Feed URLs polled on every run.
    pub feeds: Vec<String>,

    /// Optional OPML file whose feeds are appended to `feeds`.
    pub opml: Option<PathBuf>,

    pub feed_timeout_secs: u64,
    pub image_timeout_secs: u64,

    /// Upper bound on feeds downloaded at the same time.
    pub max_concurrent_fetches: usize,

    /// Lossy WebP quality, 0-100.
    pub webp_quality: f32,

    /// Rows per INSERT when saving items.
    pub batch_size: usize,

    pub s3: S3Config,
}

/// Object storage settings.
///
/// SEC-015: Custom Debug impl masks `secret_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Env: `AWS_ACCESS_KEY_ID`.
    pub access_key: Option<String>,
    /// Env: `AWS_SECRET_ACCESS_KEY`.
    pub secret_key: Option<String>,
    /// Env: `S3_BUCKET`.
    pub bucket: Option<String>,
    /// Env: `S3_REGION`.
    pub region: String,
    /// Env: `CDN_DOMAIN`.
    pub cdn_domain: Option<String>,
    /// Env: `S3_ENDPOINT`.
    pub endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://rss-harvest.db".to_string(),
            feeds: Vec::new(),
            opml: None,
            feed_timeout_secs: 4,
            image_timeout_secs: 5,
            max_concurrent_fetches: 16,
            webp_quality: crate::imaging::WEBP_QUALITY,
            batch_size: crate::storage::DEFAULT_BATCH_SIZE,
            s3: S3Config::default(),
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            access_key: None,
            secret_key: None,
            bucket: None,
            region: DEFAULT_REGION.to_string(),
            cdn_domain: None,
            endpoint: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("feeds", &self.feeds.len())
            .field("opml", &self.opml)
            .field("feed_timeout_secs", &self.feed_timeout_secs)
            .field("image_timeout_secs", &self.image_timeout_secs)
            .field("max_concurrent_fetches", &self.max_concurrent_fetches)
            .field("webp_quality", &self.webp_quality)
            .field("batch_size", &self.batch_size)
            .field("s3", &self.s3)
            .finish()
    }
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("cdn_domain", &self.cdn_domain)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

const KNOWN_KEYS: [&str; 9] = [
    "database_url",
    "feeds",
    "opml",
    "feed_timeout_secs",
    "image_timeout_secs",
    "max_concurrent_fetches",
    "webp_quality",
    "batch_size",
    "s3",
];

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            feeds = config.feeds.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Override file settings with process environment variables.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Override file settings from `lookup`. Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(v) = get("AWS_ACCESS_KEY_ID") {
            self.s3.access_key = Some(v);
        }
        if let Some(v) = get("AWS_SECRET_ACCESS_KEY") {
            self.s3.secret_key = Some(v);
        }
        if let Some(v) = get("S3_BUCKET") {
            self.s3.bucket = Some(v);
        }
        if let Some(v) = get("S3_REGION") {
            self.s3.region = v;
        }
        if let Some(v) = get("CDN_DOMAIN") {
            self.s3.cdn_domain = Some(v);
        }
        if let Some(v) = get("S3_ENDPOINT") {
            self.s3.endpoint = Some(v);
        }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Missing("database_url"));
        }
        if self.feed_timeout_secs == 0 || self.image_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be at least 1 second".to_string(),
            ));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.webp_quality) {
            return Err(ConfigError::Invalid(format!(
                "webp_quality must be within 0-100, got {}",
                self.webp_quality
            )));
        }
        Ok(())
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }
}

impl S3Config {
    /// Credentials and bucket for the uploader. All three must be set.
    pub fn settings(&self) -> Result<S3Settings, ConfigError> {
        let access_key = self
            .access_key
            .clone()
            .ok_or(ConfigError::Missing("AWS_ACCESS_KEY_ID"))?;
        let secret_key = self
            .secret_key
            .clone()
            .ok_or(ConfigError::Missing("AWS_SECRET_ACCESS_KEY"))?;
        let bucket = self
            .bucket
            .clone()
            .ok_or(ConfigError::Missing("S3_BUCKET"))?;

        Ok(S3Settings {
            access_key,
            secret_key: secret_key.into(),
            bucket,
            region: self.region.clone(),
            cdn_domain: self.cdn_domain.clone(),
            endpoint: self.endpoint.clone(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
