//! S3 object storage for reports and proposal attachments.
//!
//! Keys are `[prefix/]<key_prefix>/<uuid hex>_<sanitized filename>`.

use anyhow::{anyhow, Context, Result};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::Settings;

/// Default lifetime of presigned download URLs
pub const PRESIGN_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub filename: String,
}

/// Last path component reduced to `[A-Za-z0-9._-]`, other runs become `_`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.replace('\\', "/");
    let base = base.rsplit('/').next().unwrap_or_default();
    let mut out = String::with_capacity(base.len());
    let mut in_run = false;
    for c in base.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    if out.is_empty() {
        "file".to_string()
    } else {
        out
    }
}

/// Join non-empty parts with `/`, trimming slashes and spaces.
fn make_key(prefix: &str, parts: &[&str]) -> String {
    std::iter::once(prefix)
        .chain(parts.iter().copied())
        .map(|p| p.trim_matches(|c: char| c == '/' || c == ' '))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Clone)]
pub struct ObjectStorage {
    client: Client,
    bucket: String,
    prefix: String,
}

impl ObjectStorage {
    /// None when no bucket is configured.
    pub async fn from_settings(settings: &Settings) -> Option<Self> {
        let bucket = settings.s3_bucket.clone()?;
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &settings.aws_region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;
        info!(bucket = %bucket, prefix = %settings.s3_prefix, "Object storage configured");
        Some(Self {
            client: Client::new(&sdk_config),
            bucket,
            prefix: settings.s3_prefix.clone(),
        })
    }

    #[instrument(skip(self, content), fields(bucket = %self.bucket, size = content.len()))]
    pub async fn upload_bytes(
        &self,
        content: Vec<u8>,
        key_prefix: &str,
        filename: &str,
        content_type: &str,
    ) -> Result<StoredObject> {
        let safe_name = sanitize_filename(filename);
        let object_name = format!("{}_{}", Uuid::new_v4().simple(), safe_name);
        let key = make_key(&self.prefix, &[key_prefix, &object_name]);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(content))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| anyhow!("S3 upload failed: {e}"))?;

        info!(key = %key, "Uploaded object");
        Ok(StoredObject {
            bucket: self.bucket.clone(),
            key,
            filename: safe_name,
        })
    }

    /// Time-limited GET URL; None when presigning fails.
    pub async fn presign_get(&self, key: &str, expires_in: Duration) -> Option<String> {
        let config = match PresigningConfig::expires_in(expires_in) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Invalid presign duration");
                return None;
            }
        };
        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
        {
            Ok(request) => Some(request.uri().to_string()),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to presign download");
                None
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| anyhow!("S3 download failed: {e}"))?;
        let data = object
            .body
            .collect()
            .await
            .context("Failed to read S3 object body")?;
        Ok(data.into_bytes().to_vec())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| anyhow!("S3 delete failed: {e}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\RFP draft (v2).pdf"), "RFP_draft_v2_.pdf");
        assert_eq!(sanitize_filename("résumé.docx"), "r_sum_.docx");
        assert_eq!(sanitize_filename("dir/"), "file");
    }

    #[test]
    fn test_make_key_skips_empty_parts() {
        assert_eq!(make_key("", &["reports", "abc_x.pdf"]), "reports/abc_x.pdf");
        assert_eq!(make_key("/prod/", &[" proposals/p1 ", "a.pdf"]), "prod/proposals/p1/a.pdf");
    }

    #[tokio::test]
    async fn test_storage_disabled_without_bucket() {
        assert!(ObjectStorage::from_settings(&Settings::default()).await.is_none());
    }
}
