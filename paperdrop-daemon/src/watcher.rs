//! Directory watcher: feeds candidate files into the detector.
//!
//! The watch is registered before the initial listing so a file that lands
//! between the two is reported (possibly twice, which the detector tolerates).

use std::path::{Path, PathBuf};

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use paperdrop_core::{AllowList, CandidatePath, FileState};

use crate::error::{io_err, DaemonError};
use crate::fs::FileSystem;

pub type EventStream = mpsc::UnboundedReceiver<notify::Result<Event>>;

/// Eligible files already present in `dir`. Sub-directories are skipped.
pub fn scan_existing(
    fs: &dyn FileSystem,
    dir: &Path,
    allow: &AllowList,
) -> Result<Vec<CandidatePath>, DaemonError> {
    let entries = fs.read_dir(dir).map_err(|e| io_err(dir, e))?;
    Ok(entries
        .into_iter()
        .filter(|entry| !entry.is_dir && allow.allows(&entry.path))
        .map(|entry| CandidatePath(entry.path))
        .collect())
}

/// Register a non-recursive watch on `dir`. The watcher must be kept alive
/// for as long as events are wanted.
pub fn start_watch(dir: &Path) -> Result<(RecommendedWatcher, EventStream), DaemonError> {
    let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    tracing::debug!(path = %dir.display(), "watching consume directory");
    Ok((watcher, event_rx))
}

/// Candidates carried by a single notify event: files created in the
/// directory or renamed into it.
pub fn candidates_from_event(event: &Event, allow: &AllowList) -> Vec<CandidatePath> {
    arrivals(event)
        .iter()
        .filter(|path| allow.allows(path))
        .cloned()
        .map(CandidatePath)
        .collect()
}

/// Paths that appeared in the directory. A paired rename carries
/// `[from, to]`; only the destination is new.
fn arrivals(event: &Event) -> &[PathBuf] {
    match event.kind {
        EventKind::Create(create) if create != CreateKind::Folder => &event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => &event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.get(1..2).unwrap_or(&[])
        }
        _ => &[],
    }
}

/// Forward arrival events until shutdown or until the event stream ends.
/// Stream errors are logged and skipped.
pub async fn forward_events(
    mut events: EventStream,
    allow: &AllowList,
    candidate_tx: &mpsc::UnboundedSender<CandidatePath>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                for candidate in candidates_from_event(&event, allow) {
                    tracing::info!(
                        path = %candidate,
                        state = %FileState::Discovered,
                        "detected new file, starting stability check",
                    );
                    emit(candidate_tx, candidate)?;
                }
            }
        }
    }
    Ok(())
}

/// Watch `dir`, report what is already there, then report new arrivals.
///
/// Failing to start the watch or to list the directory is returned as an
/// error; the caller treats it as fatal.
pub async fn watcher_task(
    fs: &dyn FileSystem,
    dir: PathBuf,
    allow: AllowList,
    candidate_tx: mpsc::UnboundedSender<CandidatePath>,
    shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let (_watcher, events) = start_watch(&dir)?;

    let existing = scan_existing(fs, &dir, &allow)?;
    tracing::info!(
        path = %dir.display(),
        count = existing.len(),
        "queued files already present in consume directory",
    );
    for candidate in existing {
        tracing::info!(
            path = %candidate,
            state = %FileState::Discovered,
            "found existing file, starting stability check",
        );
        emit(&candidate_tx, candidate)?;
    }

    forward_events(events, &allow, &candidate_tx, shutdown_rx).await
}

fn emit(
    candidate_tx: &mpsc::UnboundedSender<CandidatePath>,
    candidate: CandidatePath,
) -> Result<(), DaemonError> {
    candidate_tx
        .send(candidate)
        .map_err(|_| DaemonError::ChannelClosed("candidate queue"))
}
