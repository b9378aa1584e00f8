use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout, Instant};

use paperdrop_core::{CandidatePath, Config, StablePath};
use paperdrop_daemon::fs::MemoryFileSystem;
use paperdrop_daemon::http::{HttpClient, HttpError, HttpRequest, HttpResponse};
use paperdrop_daemon::pipeline::{Pipeline, PipelineSettings, Queues};
use paperdrop_daemon::{run_with, Metrics, Upload, UploadError};

/// Answers 500 to the first request and 200 to every one after it.
#[derive(Default)]
struct FlakyServer {
    calls: AtomicUsize,
    titles: Mutex<Vec<String>>,
}

impl HttpClient for FlakyServer {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let body = String::from_utf8_lossy(&request.body).into_owned();
        if let Some(title) = body
            .split("name=\"title\"\r\n\r\n")
            .nth(1)
            .and_then(|rest| rest.split("\r\n").next())
        {
            self.titles.lock().expect("lock").push(title.to_string());
        }
        let status = if call == 0 { 500 } else { 200 };
        Ok(HttpResponse {
            status,
            body: String::new(),
        })
    }
}

/// Records which files were uploaded.
#[derive(Default)]
struct RecordingUploader {
    uploaded: Mutex<Vec<StablePath>>,
}

impl Upload for RecordingUploader {
    fn upload(&self, path: &StablePath) -> Result<(), UploadError> {
        self.uploaded.lock().expect("lock").push(path.clone());
        Ok(())
    }
}

fn config_for(dir: &Path, extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("PAPERLESS_BASE_URL", "http://paperless.test"),
        ("PAPERLESS_AUTH_TOKEN", "integration-token"),
        ("FILE_CONSUME_WHITELIST", "*.pdf"),
        ("FILE_STABILITY_CHECK_INTERVAL_SECONDS", "0.05"),
        ("FILE_STABILITY_CHECK_COUNT", "2"),
        ("HTTP_UPLOAD_RETRY_DELAY_SECONDS", "0.05"),
        ("METRICS_ADDR", "127.0.0.1:0"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    vars.insert("CONSUME_FOLDER".into(), dir.display().to_string());
    for (key, value) in extra {
        vars.insert(key.to_string(), value.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).expect("config")
}

async fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < deadline {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    check()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn daemon_uploads_existing_and_new_files_then_deletes_them() {
    let dir = TempDir::new().expect("tempdir");
    let root = fs::canonicalize(dir.path()).expect("canonical");
    fs::write(root.join("existing.pdf"), b"already here").expect("write");
    fs::write(root.join("notes.txt"), b"ignored").expect("write");

    let server = Arc::new(FlakyServer::default());
    let metrics = Metrics::new().expect("metrics");
    let (shutdown_tx, _) = broadcast::channel(16);
    let daemon = tokio::spawn(run_with(
        config_for(&root, &[]),
        server.clone(),
        metrics.clone(),
        shutdown_tx.clone(),
    ));

    assert!(
        wait_until(Duration::from_secs(10), || !root.join("existing.pdf").exists()).await,
        "existing file should be uploaded and removed"
    );

    fs::write(root.join("incoming.pdf"), b"new scan").expect("write");
    assert!(
        wait_until(Duration::from_secs(10), || !root.join("incoming.pdf").exists()).await,
        "new file should be uploaded and removed"
    );

    assert!(root.join("notes.txt").exists(), "non-whitelisted file untouched");
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.successful_uploads, 2);
    assert_eq!(snapshot.failed_uploads, 1);
    assert_eq!(snapshot.upload_retries, 1);
    assert_eq!(snapshot.abandoned_files, 0);

    let mut titles = server.titles.lock().expect("lock").clone();
    titles.sort();
    titles.dedup();
    assert_eq!(titles, vec!["existing.pdf", "incoming.pdf"]);

    shutdown_tx.send(()).expect("shutdown");
    timeout(Duration::from_secs(5), daemon)
        .await
        .expect("daemon stops")
        .expect("join")
        .expect("clean exit");
}

#[tokio::test]
async fn missing_consume_folder_is_fatal() {
    let dir = TempDir::new().expect("tempdir");
    let missing = dir.path().join("nowhere");
    let (shutdown_tx, _) = broadcast::channel(16);

    let result = timeout(
        Duration::from_secs(5),
        run_with(
            config_for(&missing, &[]),
            Arc::new(FlakyServer::default()),
            Metrics::new().expect("metrics"),
            shutdown_tx,
        ),
    )
    .await
    .expect("startup failure should stop the daemon");

    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_consume_folder_is_fatal_on_multi_thread_runtime() {
    let dir = TempDir::new().expect("tempdir");
    let missing = dir.path().join("nowhere");

    for _ in 0..20 {
        let (shutdown_tx, _) = broadcast::channel(16);
        let result = timeout(
            Duration::from_secs(5),
            run_with(
                config_for(&missing, &[]),
                Arc::new(FlakyServer::default()),
                Metrics::new().expect("metrics"),
                shutdown_tx,
            ),
        )
        .await
        .expect("every task should see the startup failure");
        assert!(result.is_err());
    }
}

#[tokio::test(start_paused = true)]
async fn settled_file_is_uploaded_while_another_is_still_growing() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.insert_dir("/consume");
    fs.insert_file("/consume/a.pdf", "finished scan");
    fs.insert_file("/consume/b.pdf", "first page");

    let uploader = Arc::new(RecordingUploader::default());
    let settings = PipelineSettings {
        stability_interval: Duration::from_millis(100),
        stability_count: 2,
        retry_delay: Duration::from_millis(100),
    };
    let pipeline = Pipeline::new(
        fs.clone(),
        uploader.clone(),
        Metrics::new().expect("metrics"),
        settings,
    );
    let Queues {
        candidate_tx,
        candidate_rx,
        stable_tx,
        stable_rx,
    } = Queues::new();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // Keep b.pdf growing for a second.
    let writer = {
        let fs = fs.clone();
        tokio::spawn(async move {
            for _ in 0..20 {
                fs.append(Path::new("/consume/b.pdf"), b" more")
                    .expect("append");
                sleep(Duration::from_millis(50)).await;
            }
        })
    };

    candidate_tx
        .send(CandidatePath::from("/consume/a.pdf"))
        .expect("send");
    candidate_tx
        .send(CandidatePath::from("/consume/b.pdf"))
        .expect("send");

    let detector = {
        let pipeline = pipeline.clone();
        let shutdown_rx = shutdown_rx.resubscribe();
        tokio::spawn(async move {
            pipeline
                .run_detector(candidate_rx, stable_tx, shutdown_rx)
                .await
        })
    };
    let dispatcher = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.run_uploader(stable_rx, shutdown_rx).await })
    };

    sleep(Duration::from_millis(500)).await;
    assert!(!fs.exists(Path::new("/consume/a.pdf")), "a.pdf delivered");
    assert!(fs.exists(Path::new("/consume/b.pdf")), "b.pdf still growing");
    assert_eq!(
        *uploader.uploaded.lock().expect("lock"),
        vec![StablePath::from("/consume/a.pdf")]
    );

    writer.await.expect("writer");
    sleep(Duration::from_millis(500)).await;
    assert!(!fs.exists(Path::new("/consume/b.pdf")), "b.pdf delivered");
    assert_eq!(uploader.uploaded.lock().expect("lock").len(), 2);

    drop(candidate_tx);
    detector.await.expect("detector");
    dispatcher.await.expect("dispatcher");
}

#[tokio::test]
async fn stable_channel_sees_each_file_once() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.insert_file("/consume/one.pdf", "1");
    fs.insert_file("/consume/two.pdf", "22");
    let pipeline = Pipeline::new(
        fs,
        Arc::new(RecordingUploader::default()),
        Metrics::new().expect("metrics"),
        PipelineSettings {
            stability_interval: Duration::from_millis(5),
            stability_count: 1,
            retry_delay: Duration::from_millis(5),
        },
    );
    let (candidate_tx, candidate_rx) = mpsc::unbounded_channel();
    let (stable_tx, mut stable_rx) = mpsc::unbounded_channel();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    candidate_tx
        .send(CandidatePath::from("/consume/one.pdf"))
        .expect("send");
    candidate_tx
        .send(CandidatePath::from("/consume/two.pdf"))
        .expect("send");
    drop(candidate_tx);
    pipeline
        .run_detector(candidate_rx, stable_tx, shutdown_rx)
        .await;

    let mut seen = Vec::new();
    while let Some(path) = timeout(Duration::from_secs(2), stable_rx.recv())
        .await
        .expect("stable in time")
    {
        seen.push(path);
    }
    seen.sort_by(|a, b| a.as_path().cmp(b.as_path()));
    assert_eq!(
        seen,
        vec![
            StablePath::from("/consume/one.pdf"),
            StablePath::from("/consume/two.pdf")
        ]
    );
}
