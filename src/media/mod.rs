//! Object storage for post images and avatars.
//!
//! Objects stay private; clients only ever see presigned GET URLs, which are
//! recomputed on every read and never written back to the database.

use std::time::Duration;

use aws_sdk_s3::{presigning::PresigningConfig, primitives::ByteStream, Client};
use axum::body::Bytes;

use crate::error::AppError;

pub mod upload;

/// Post images inside feed and explore pages.
pub const FEED_IMAGE_URL_TTL: Duration = Duration::from_secs(60);
/// Single posts and per-user post lists.
pub const POST_IMAGE_URL_TTL: Duration = Duration::from_secs(60 * 10);
/// The viewer's own avatar on `GET /users/me`.
pub const OWN_AVATAR_URL_TTL: Duration = Duration::from_secs(60 * 60 * 24);
/// Avatars embedded anywhere else.
pub const AVATAR_URL_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 7);

#[derive(Clone)]
pub struct MediaStore {
    client: Client,
    bucket: String,
}

impl MediaStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Builds a client from the standard AWS environment (region, credentials).
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let aws_config = aws_config::load_from_env().await;
        Self::new(Client::new(&aws_config), bucket)
    }

    pub async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String, AppError> {
        let presigning_config = PresigningConfig::expires_in(ttl).map_err(|e| {
            tracing::error!("Invalid presigning window {:?}: {}", ttl, e);
            AppError::InternalServerError
        })?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| {
                tracing::error!("Failed to presign {}: {}", key, e);
                AppError::InternalServerError
            })?;

        Ok(request.uri().to_string())
    }

    pub async fn presigned_url_opt(
        &self,
        key: Option<&str>,
        ttl: Duration,
    ) -> Result<Option<String>, AppError> {
        match key {
            Some(key) => Ok(Some(self.presigned_url(key, ttl).await?)),
            None => Ok(None),
        }
    }

    pub async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), AppError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("S3 upload of {} failed: {}", key, e);
                AppError::InternalServerError
            })?;

        Ok(())
    }

    pub async fn delete_object(&self, key: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("S3 delete of {} failed: {}", key, e);
                AppError::InternalServerError
            })?;

        Ok(())
    }

    /// Deletes each key once, logging the ones left behind. Runs after the
    /// owning rows are already gone, so there is nothing to roll back.
    pub async fn delete_orphans<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in keys {
            let key = key.as_ref();
            if self.delete_object(key).await.is_err() {
                tracing::warn!(key, "object left orphaned in bucket");
            }
        }
    }
}
