//! Prometheus-backed upload counters.
//!
//! One [`Metrics`] value is created at startup and cloned into every task;
//! clones share the same registry and counters.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};

use crate::error::DaemonError;

#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    successful_uploads: IntCounter,
    failed_uploads: IntCounter,
    upload_retries: IntCounter,
    abandoned_files: IntCounter,
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub successful_uploads: u64,
    pub failed_uploads: u64,
    pub upload_retries: u64,
    pub abandoned_files: u64,
}

impl Metrics {
    /// Build a fresh registry with all counters at zero.
    pub fn new() -> Result<Self, DaemonError> {
        let registry = Registry::new();

        let successful_uploads = IntCounter::with_opts(Opts::new(
            "successful_uploads",
            "Number of successful uploads",
        ))?;
        let failed_uploads =
            IntCounter::with_opts(Opts::new("failed_uploads", "Number of failed uploads"))?;
        let upload_retries =
            IntCounter::with_opts(Opts::new("upload_retries", "Number of upload retries"))?;
        let abandoned_files = IntCounter::with_opts(Opts::new(
            "abandoned_files",
            "Files dropped because they vanished or became unreadable before they were stable",
        ))?;

        registry.register(Box::new(successful_uploads.clone()))?;
        registry.register(Box::new(failed_uploads.clone()))?;
        registry.register(Box::new(upload_retries.clone()))?;
        registry.register(Box::new(abandoned_files.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                successful_uploads,
                failed_uploads,
                upload_retries,
                abandoned_files,
            }),
        })
    }

    pub fn inc_successful_upload(&self) {
        self.inner.successful_uploads.inc();
    }

    pub fn inc_failed_upload(&self) {
        self.inner.failed_uploads.inc();
    }

    pub fn inc_upload_retry(&self) {
        self.inner.upload_retries.inc();
    }

    pub fn inc_abandoned_file(&self) {
        self.inner.abandoned_files.inc();
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            successful_uploads: self.inner.successful_uploads.get(),
            failed_uploads: self.inner.failed_uploads.get(),
            upload_retries: self.inner.upload_retries.get(),
            abandoned_files: self.inner.abandoned_files.get(),
        }
    }

    /// Render every counter in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, DaemonError> {
        let encoder = TextEncoder::new();
        let families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| DaemonError::Task {
            task: "metrics",
            message: format!("metrics output was not valid UTF-8: {err}"),
        })
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
