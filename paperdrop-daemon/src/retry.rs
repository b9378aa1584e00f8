//! Retry driver: keeps uploading one stable file until the server accepts it.
//!
//! There is no attempt limit and no backoff growth. The local file is removed
//! only after a successful attempt.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use paperdrop_core::{FileState, StablePath};

use crate::fs::FileSystem;
use crate::metrics::Metrics;
use crate::upload::{Upload, UploadError};

/// Everything a delivery task needs besides the path itself.
#[derive(Clone)]
pub struct Delivery {
    pub uploader: Arc<dyn Upload>,
    pub fs: Arc<dyn FileSystem>,
    pub metrics: Metrics,
    pub retry_delay: Duration,
}

impl Delivery {
    /// Upload `path` until it succeeds, then delete it. Returns the number of
    /// attempts it took.
    pub async fn deliver(&self, path: StablePath) -> u64 {
        let mut attempt = 0u64;
        loop {
            attempt += 1;
            match self.attempt(&path).await {
                Ok(()) => {
                    self.metrics.inc_successful_upload();
                    tracing::info!(
                        path = %path,
                        attempt,
                        state = %FileState::Uploaded,
                        "successfully uploaded",
                    );
                    if let Err(err) = self.remove_local(&path).await {
                        tracing::warn!(
                            path = %path,
                            error = %err,
                            "uploaded but could not delete local file",
                        );
                    }
                    return attempt;
                }
                Err(err) => {
                    self.metrics.inc_failed_upload();
                    if err.is_remote() {
                        self.metrics.inc_upload_retry();
                    }
                    tracing::warn!(
                        path = %path,
                        attempt,
                        error = %err,
                        retry_in_ms = self.retry_delay.as_millis() as u64,
                        "failed to upload, retrying",
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    /// One attempt on the blocking pool, so a slow server never stalls the
    /// runtime.
    async fn attempt(&self, path: &StablePath) -> Result<(), UploadError> {
        let uploader = self.uploader.clone();
        let path = path.clone();
        match tokio::task::spawn_blocking(move || uploader.upload(&path)).await {
            Ok(result) => result,
            Err(join) => Err(UploadError::Interrupted(join.to_string())),
        }
    }

    async fn remove_local(&self, path: &StablePath) -> io::Result<()> {
        let fs = self.fs.clone();
        let path = path.clone();
        tokio::task::spawn_blocking(move || fs.remove(path.as_path()))
            .await
            .unwrap_or_else(|join| Err(io::Error::other(join)))
    }

    /// Spawn the delivery task for one stable file. Nothing joins the handle
    /// outside tests.
    pub fn spawn(&self, path: StablePath) -> JoinHandle<u64> {
        let delivery = self.clone();
        tokio::spawn(async move { delivery.deliver(path).await })
    }
}
