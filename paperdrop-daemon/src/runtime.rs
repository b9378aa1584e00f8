use std::sync::Arc;

use tokio::sync::broadcast;

use paperdrop_core::Config;

use crate::error::{io_err, DaemonError};
use crate::fs::{FileSystem, OsFileSystem};
use crate::health;
use crate::http::{HttpClient, UreqClient};
use crate::metrics::Metrics;
use crate::pipeline::{Pipeline, PipelineSettings, Queues};
use crate::upload::DocumentUploader;
use crate::watcher::watcher_task;

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: Config) -> Result<(), DaemonError> {
    init_tracing(config.verbose);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the daemon against the real filesystem and network until ctrl-c or a
/// fatal error.
pub async fn run(config: Config) -> Result<(), DaemonError> {
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let client: Arc<dyn HttpClient> = Arc::new(UreqClient::new());
    run_with(config, client, Metrics::new()?, shutdown_tx).await
}

/// Run the daemon with an injected HTTP client and metrics registry.
///
/// Any send on `shutdown_tx` stops the watcher, both dispatchers and the
/// health server. In-flight per-file tasks are not waited for.
pub async fn run_with(
    config: Config,
    client: Arc<dyn HttpClient>,
    metrics: Metrics,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = %config.base_url,
        consume_folder = %config.watch_dir.display(),
        "starting paperdrop",
    );
    for fallback in &config.fallbacks {
        tracing::warn!(
            key = fallback.key,
            value = %fallback.value,
            "invalid value, using default",
        );
    }
    if config.allow_list.is_unrestricted() {
        tracing::info!("no file whitelist configured, accepting every file");
    } else {
        tracing::info!(patterns = ?config.allow_list.patterns(), "file whitelist active");
    }

    let fs: Arc<dyn FileSystem> = Arc::new(OsFileSystem);
    let uploader = Arc::new(DocumentUploader::from_config(fs.clone(), client, &config));
    let pipeline = Pipeline::new(
        fs,
        uploader,
        metrics.clone(),
        PipelineSettings::from(&config),
    );
    let Queues {
        candidate_tx,
        candidate_rx,
        stable_tx,
        stable_rx,
    } = Queues::new();

    // Every receiver exists before the first task runs, so a shutdown sent
    // during startup is seen by all of them.
    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        let fs = pipeline.fs().clone();
        let dir = config.watch_dir.clone();
        let allow = config.allow_list.clone();
        tokio::spawn(async move {
            let result = watcher_task(fs.as_ref(), dir, allow, candidate_tx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let detector_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            pipeline
                .run_detector(candidate_rx, stable_tx, shutdown_rx)
                .await;
            let _ = shutdown.send(());
            Ok::<(), DaemonError>(())
        })
    };

    let uploader_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            pipeline.run_uploader(stable_rx, shutdown_rx).await;
            let _ = shutdown.send(());
            Ok::<(), DaemonError>(())
        })
    };

    let health_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        let addr = config.metrics_addr;
        let metrics = metrics.clone();
        tokio::spawn(async move {
            let result = health::serve(addr, metrics, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Task {
                            task: "signal_handler",
                            message: format!("ctrl-c handler failed: {err}"),
                        }),
                    }
                }
            }
        })
    };

    let (watcher_result, detector_result, uploader_result, health_result, signal_result) = tokio::join!(
        watcher_handle,
        detector_handle,
        uploader_handle,
        health_handle,
        signal_handle
    );

    handle_join("watcher", watcher_result)?;
    handle_join("detector", detector_result)?;
    handle_join("uploader", uploader_result)?;
    handle_join("health_server", health_result)?;
    handle_join("signal_handler", signal_result)?;

    let totals = metrics.snapshot();
    tracing::info!(
        successful_uploads = totals.successful_uploads,
        failed_uploads = totals.failed_uploads,
        upload_retries = totals.upload_retries,
        abandoned_files = totals.abandoned_files,
        "paperdrop stopped",
    );
    Ok(())
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Task {
            task,
            message: format!("join failure: {err}"),
        }),
    }
}

/// Default level, unless `RUST_LOG` says otherwise.
fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
