//! Paperdrop daemon: watch a consume folder, wait for each file to settle,
//! upload it to Paperless and delete it once the server has accepted it.

pub mod detector;
mod error;
pub mod fs;
pub mod health;
pub mod http;
pub mod metrics;
pub mod multipart;
pub mod paths;
pub mod pipeline;
pub mod retry;
mod runtime;
pub mod upload;
pub mod watcher;

pub use error::DaemonError;
pub use metrics::{Metrics, MetricsSnapshot};
pub use runtime::{init_tracing, run, run_with, start_blocking};
pub use upload::{DocumentUploader, Upload, UploadError};
