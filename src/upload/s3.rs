use async_trait::async_trait;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use secrecy::{ExposeSecret, SecretString};

use super::{ObjectStore, UploadError};

pub const DEFAULT_REGION: &str = "ap-northeast-1";

/// Connection details for the image bucket.
///
/// SEC-015: `secret_key` is a `SecretString`, so `Debug` never prints it.
#[derive(Debug)]
pub struct S3Settings {
    pub access_key: String,
    pub secret_key: SecretString,
    pub bucket: String,
    pub region: String,
    /// CDN host (or base URL) fronting the bucket, used for public URLs
    pub cdn_domain: Option<String>,
    /// Custom S3-compatible endpoint; switches to path-style addressing
    pub endpoint: Option<String>,
}

/// Uploads objects to S3 with static credentials, one `PutObject` per call.
///
/// No multipart upload, no retries, no existence check: the last write to a
/// key wins.
pub struct S3Uploader {
    client: aws_sdk_s3::Client,
    bucket: String,
    region: String,
    cdn_domain: Option<String>,
    endpoint: Option<String>,
}

impl S3Uploader {
    pub fn new(settings: S3Settings) -> Self {
        let credentials = Credentials::new(
            settings.access_key,
            settings.secret_key.expose_secret(),
            None,
            None,
            "rss-harvest-static",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled());
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: settings.bucket,
            region: settings.region,
            cdn_domain: settings.cdn_domain,
            endpoint: settings.endpoint,
        }
    }

    /// Public URL under which `key` is served.
    ///
    /// CDN domain wins, then a custom endpoint (path-style), then the
    /// virtual-hosted S3 URL for the bucket's region.
    pub fn public_url(&self, key: &str) -> String {
        if let Some(cdn) = &self.cdn_domain {
            let cdn = cdn.trim_end_matches('/');
            if cdn.starts_with("http://") || cdn.starts_with("https://") {
                return format!("{cdn}/{key}");
            }
            return format!("https://{cdn}/{key}");
        }
        if let Some(endpoint) = &self.endpoint {
            return format!("{}/{}/{key}", endpoint.trim_end_matches('/'), self.bucket);
        }
        format!(
            "https://{}.s3.{}.amazonaws.com/{key}",
            self.bucket, self.region
        )
    }
}

#[async_trait]
impl ObjectStore for S3Uploader {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<String, UploadError> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("image/webp")
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| UploadError::Put {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        tracing::debug!(bucket = %self.bucket, key = %key, bytes = size, "Uploaded object");
        Ok(self.public_url(key))
    }
}
