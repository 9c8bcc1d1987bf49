use super::Reconciler;
use crate::constants::IGNITION_OBJECT_KEY;
use crate::error::{self, Result};
use log::{debug, info};
use snafu::ResultExt;
use std::path::Path;

impl Reconciler<'_> {
    /// Ensure the publicly readable bucket exists and holds `file` under the ignition key.
    ///
    /// The object is always uploaded again since its content is generated by every run.
    pub async fn ensure_ignition_bucket(&self, bucket: &str, file: &Path) -> Result<()> {
        if self.cloud.bucket_exists(bucket).await? {
            debug!("Bucket '{}' already exists", bucket);
        } else {
            info!("Creating bucket '{}'", bucket);
            self.cloud.create_bucket(bucket).await?;
        }
        self.cloud
            .tag_bucket(bucket, &[self.owner.clone()])
            .await?;
        let body = tokio::fs::read(file).await.context(error::FileSnafu {
            action: "read",
            path: file,
        })?;
        self.cloud
            .put_object(bucket, IGNITION_OBJECT_KEY, body)
            .await
    }

    /// Delete every object in the bucket, then the bucket itself.
    pub async fn remove_ignition_bucket(&self, bucket: &str) -> Result<()> {
        if !self.cloud.bucket_exists(bucket).await? {
            debug!("Bucket '{}' does not exist", bucket);
            return Ok(());
        }
        let mut continuation_token = None;
        loop {
            let page = self
                .cloud
                .list_objects(bucket, continuation_token.take())
                .await?;
            for key in &page.keys {
                debug!("Deleting object '{}' from bucket '{}'", key, bucket);
                self.cloud.delete_object(bucket, key).await?;
            }
            match page.continuation_token {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }
        self.cloud.delete_bucket(bucket).await
    }
}
