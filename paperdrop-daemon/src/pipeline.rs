//! Pipeline coordinator: the two hand-off queues and the per-file fan-out.
//!
//! ```text
//! watcher ──candidate──▶ detector ──stable──▶ uploader
//!                        (task per file)      (task per file)
//! ```
//!
//! Both queues are unbounded and there is no cap on concurrent per-file
//! tasks. Per-file tasks are never joined or cancelled; they end at their own
//! terminal state or when the process exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use paperdrop_core::{CandidatePath, Config, StablePath};

use crate::detector::{self, StabilityPolicy};
use crate::fs::FileSystem;
use crate::metrics::Metrics;
use crate::retry::Delivery;
use crate::upload::Upload;

/// Timing knobs shared by every per-file task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub stability_interval: Duration,
    pub stability_count: u32,
    pub retry_delay: Duration,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            stability_interval: config.stability_interval,
            stability_count: config.stability_count,
            retry_delay: config.retry_delay,
        }
    }
}

/// Sending and receiving ends of both queues.
pub struct Queues {
    pub candidate_tx: mpsc::UnboundedSender<CandidatePath>,
    pub candidate_rx: mpsc::UnboundedReceiver<CandidatePath>,
    pub stable_tx: mpsc::UnboundedSender<StablePath>,
    pub stable_rx: mpsc::UnboundedReceiver<StablePath>,
}

impl Queues {
    pub fn new() -> Self {
        let (candidate_tx, candidate_rx) = mpsc::unbounded_channel();
        let (stable_tx, stable_rx) = mpsc::unbounded_channel();
        Self {
            candidate_tx,
            candidate_rx,
            stable_tx,
            stable_rx,
        }
    }
}

impl Default for Queues {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned state handed to every stage: no globals.
#[derive(Clone)]
pub struct Pipeline {
    fs: Arc<dyn FileSystem>,
    metrics: Metrics,
    stability: StabilityPolicy,
    delivery: Delivery,
}

impl Pipeline {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        uploader: Arc<dyn Upload>,
        metrics: Metrics,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            fs: fs.clone(),
            metrics: metrics.clone(),
            stability: StabilityPolicy {
                interval: settings.stability_interval,
                required: settings.stability_count,
            },
            delivery: Delivery {
                uploader,
                fs,
                metrics,
                retry_delay: settings.retry_delay,
            },
        }
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Spawn a stability check for every candidate until shutdown or until
    /// all candidate senders are gone.
    pub async fn run_detector(
        &self,
        mut candidate_rx: mpsc::UnboundedReceiver<CandidatePath>,
        stable_tx: mpsc::UnboundedSender<StablePath>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                candidate = candidate_rx.recv() => {
                    let Some(candidate) = candidate else { break };
                    detector::spawn_check(
                        self.fs.clone(),
                        self.metrics.clone(),
                        self.stability,
                        candidate,
                        stable_tx.clone(),
                    );
                }
            }
        }
    }

    /// Spawn a delivery for every stable file until shutdown or until all
    /// stable senders are gone.
    pub async fn run_uploader(
        &self,
        mut stable_rx: mpsc::UnboundedReceiver<StablePath>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                stable = stable_rx.recv() => {
                    let Some(stable) = stable else { break };
                    self.delivery.spawn(stable);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::time::timeout;

    use crate::fs::MemoryFileSystem;
    use crate::upload::UploadError;

    struct AlwaysOk;

    impl Upload for AlwaysOk {
        fn upload(&self, _path: &StablePath) -> Result<(), UploadError> {
            Ok(())
        }
    }

    fn settings() -> PipelineSettings {
        PipelineSettings {
            stability_interval: Duration::from_millis(10),
            stability_count: 2,
            retry_delay: Duration::from_millis(50),
        }
    }

    #[test]
    fn settings_follow_config() {
        let config = Config::from_lookup(|key| match key {
            "PAPERLESS_BASE_URL" => Some("http://p".into()),
            "PAPERLESS_AUTH_TOKEN" => Some("t".into()),
            "CONSUME_FOLDER" => Some("/consume".into()),
            "FILE_STABILITY_CHECK_COUNT" => Some("3".into()),
            _ => None,
        })
        .expect("config");
        let settings = PipelineSettings::from(&config);
        assert_eq!(settings.stability_count, 3);
        assert_eq!(settings.stability_interval, Duration::from_secs(2));
        assert_eq!(settings.retry_delay, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn detector_dispatch_ends_when_candidates_close() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.insert_file("/consume/a.pdf", "a");
        let pipeline = Pipeline::new(
            fs,
            Arc::new(AlwaysOk),
            Metrics::new().expect("metrics"),
            settings(),
        );
        let Queues {
            candidate_tx,
            candidate_rx,
            stable_tx,
            mut stable_rx,
        } = Queues::new();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        candidate_tx
            .send(CandidatePath::from("/consume/a.pdf"))
            .expect("send");
        drop(candidate_tx);
        pipeline.run_detector(candidate_rx, stable_tx, shutdown_rx).await;

        let stable = timeout(Duration::from_secs(1), stable_rx.recv())
            .await
            .expect("stable in time");
        assert_eq!(stable, Some(StablePath::from("/consume/a.pdf")));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_candidates_each_get_a_check() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.insert_file("/consume/a.pdf", "a");
        let pipeline = Pipeline::new(
            fs,
            Arc::new(AlwaysOk),
            Metrics::new().expect("metrics"),
            settings(),
        );
        let queues = Queues::new();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        queues
            .candidate_tx
            .send(CandidatePath::from("/consume/a.pdf"))
            .expect("send");
        queues
            .candidate_tx
            .send(CandidatePath::from("/consume/a.pdf"))
            .expect("send");
        drop(queues.candidate_tx);
        pipeline
            .run_detector(queues.candidate_rx, queues.stable_tx, shutdown_rx)
            .await;

        let mut stable_rx = queues.stable_rx;
        for _ in 0..2 {
            let stable = timeout(Duration::from_secs(1), stable_rx.recv())
                .await
                .expect("stable in time");
            assert_eq!(stable, Some(StablePath::from("/consume/a.pdf")));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn uploader_dispatch_stops_on_shutdown() {
        let pipeline = Pipeline::new(
            Arc::new(MemoryFileSystem::new()),
            Arc::new(AlwaysOk),
            Metrics::new().expect("metrics"),
            settings(),
        );
        let (_stable_tx, stable_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        shutdown_tx.send(()).expect("shutdown");
        timeout(
            Duration::from_secs(1),
            pipeline.run_uploader(stable_rx, shutdown_rx),
        )
        .await
        .expect("dispatcher should stop");
    }
}
