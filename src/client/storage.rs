//! Object storage access scoped to one bucket.

use super::BackendClient;
use crate::errors::Result;
use tracing::info;

/// Handle to a storage bucket, bound to the client's current session.
pub struct StorageBucket<'a> {
    client: &'a BackendClient,
    bucket: String,
}

impl<'a> StorageBucket<'a> {
    pub(crate) fn new(client: &'a BackendClient, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Bucket name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.bucket
    }

    /// Uploads bytes to `path`; fails if the object already exists.
    pub async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let session = self.client.require_session().await?;
        let platform = self.client.platform()?;
        let size = bytes.len();
        let stored = platform
            .upload(&session, &self.bucket, path, bytes, content_type)
            .await?;
        info!("Uploaded {} bytes to {}/{}", size, self.bucket, stored);
        Ok(stored)
    }

    /// Removes objects; paths that do not exist are ignored.
    pub async fn remove(&self, paths: &[String]) -> Result<()> {
        let session = self.client.require_session().await?;
        let platform = self.client.platform()?;
        platform.remove(&session, &self.bucket, paths).await
    }

    /// Public URL of `path`.
    pub fn public_url(&self, path: &str) -> Result<String> {
        Ok(self.client.platform()?.public_url(&self.bucket, path))
    }
}
