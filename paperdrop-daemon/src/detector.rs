//! Stability detector: decides when a producer has finished writing a file.
//!
//! Each candidate gets its own task that samples the file size once per
//! interval. The file is stable once `required` consecutive samples match the
//! one before them. The first sample has nothing to compare against and never
//! counts, so an empty file that was only just created is not mistaken for a
//! settled one.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use paperdrop_core::{CandidatePath, FileState, StablePath};

use crate::fs::FileSystem;
use crate::metrics::Metrics;

/// How often to sample and how many matching samples make a file stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityPolicy {
    pub interval: Duration,
    pub required: u32,
}

/// Per-file sampling state, owned by exactly one detector task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StabilityState {
    last_size: Option<u64>,
    consecutive: u32,
}

impl StabilityState {
    /// Record a sample and return the current run of matching readings.
    pub fn observe(&mut self, size: u64) -> u32 {
        if self.last_size == Some(size) {
            self.consecutive += 1;
        } else {
            self.consecutive = 0;
        }
        self.last_size = Some(size);
        self.consecutive
    }

    pub fn last_size(&self) -> Option<u64> {
        self.last_size
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

/// How a candidate left the detector.
#[derive(Debug)]
pub enum Verdict {
    Stable(StablePath),
    /// The size check failed; the file is left alone.
    Abandoned { path: PathBuf, error: io::Error },
}

/// Sample `candidate` until it is stable or can no longer be inspected.
pub async fn await_stable(
    fs: Arc<dyn FileSystem>,
    candidate: CandidatePath,
    policy: StabilityPolicy,
) -> Verdict {
    let mut state = StabilityState::default();
    loop {
        let size = match sample_size(&fs, &candidate).await {
            Ok(size) => size,
            Err(error) => {
                return Verdict::Abandoned {
                    path: candidate.0,
                    error,
                }
            }
        };

        let readings = state.observe(size);
        tracing::debug!(
            path = %candidate,
            size,
            readings,
            required = policy.required,
            "stability sample",
        );
        if readings >= policy.required {
            return Verdict::Stable(candidate.into_stable());
        }

        tokio::time::sleep(policy.interval).await;
    }
}

/// Stat on the blocking pool; a slow mount must not stall the runtime.
async fn sample_size(fs: &Arc<dyn FileSystem>, candidate: &CandidatePath) -> io::Result<u64> {
    let fs = fs.clone();
    let path = candidate.0.clone();
    tokio::task::spawn_blocking(move || fs.file_size(&path))
        .await
        .unwrap_or_else(|join| Err(io::Error::other(join)))
}

/// Spawn the detector task for one candidate.
///
/// Stable files are sent to `stable_tx`. Abandoned files are logged and
/// counted, nothing else. The handle is only useful to tests; the pipeline
/// never joins it.
pub fn spawn_check(
    fs: Arc<dyn FileSystem>,
    metrics: Metrics,
    policy: StabilityPolicy,
    candidate: CandidatePath,
    stable_tx: mpsc::UnboundedSender<StablePath>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match await_stable(fs, candidate, policy).await {
            Verdict::Stable(stable) => {
                tracing::info!(
                    path = %stable,
                    state = %FileState::Stable,
                    "file is stable, queueing upload",
                );
                if stable_tx.send(stable).is_err() {
                    tracing::warn!("upload queue closed; dropping stable file");
                }
            }
            Verdict::Abandoned { path, error } => {
                metrics.inc_abandoned_file();
                tracing::warn!(
                    path = %path.display(),
                    state = %FileState::Abandoned,
                    error = %error,
                    "abandoning file: size check failed",
                );
            }
        }
    })
}
