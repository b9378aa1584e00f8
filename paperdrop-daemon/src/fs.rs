//! Filesystem seam used by the watcher, detector and uploader.
//!
//! [`OsFileSystem`] talks to the real disk. [`MemoryFileSystem`] keeps files in
//! memory so pipeline behaviour can be driven without touching the disk.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Cursor, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One entry directly inside a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// The four operations the pipeline needs from a filesystem.
pub trait FileSystem: Send + Sync {
    /// Entries directly inside `dir` (non-recursive).
    fn read_dir(&self, dir: &Path) -> io::Result<Vec<DirEntry>>;

    /// Current size of the file in bytes.
    fn file_size(&self, path: &Path) -> io::Result<u64>;

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    fn remove(&self, path: &Path) -> io::Result<()>;
}

// ---------------------------------------------------------------------------
// Real filesystem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read_dir(&self, dir: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let is_dir = entry.file_type()?.is_dir();
            entries.push(DirEntry {
                path: entry.path(),
                is_dir,
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::File::open(path)?))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

// ---------------------------------------------------------------------------
// In-memory filesystem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
}

#[derive(Debug, Default)]
struct MemoryState {
    nodes: BTreeMap<PathBuf, Node>,
    removed: Vec<PathBuf>,
    size_checks: usize,
}

/// Thread-safe in-memory filesystem that also records removals and stat calls.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    state: Mutex<MemoryState>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a file.
    pub fn insert_file(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.lock()
            .nodes
            .insert(path.into(), Node::File(contents.into()));
    }

    pub fn insert_dir(&self, path: impl Into<PathBuf>) {
        self.lock().nodes.insert(path.into(), Node::Dir);
    }

    /// Append bytes to an existing file, as a producer still writing would.
    pub fn append(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        match self.lock().nodes.get_mut(path) {
            Some(Node::File(contents)) => {
                contents.extend_from_slice(bytes);
                Ok(())
            }
            _ => Err(not_found(path)),
        }
    }

    /// Delete a file without recording it as a pipeline removal.
    pub fn delete_externally(&self, path: &Path) {
        self.lock().nodes.remove(path);
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.lock().nodes.contains_key(path)
    }

    /// Every path removed through [`FileSystem::remove`], in order.
    pub fn removed(&self) -> Vec<PathBuf> {
        self.lock().removed.clone()
    }

    /// Number of [`FileSystem::file_size`] calls so far.
    pub fn size_checks(&self) -> usize {
        self.lock().size_checks
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_dir(&self, dir: &Path) -> io::Result<Vec<DirEntry>> {
        let state = self.lock();
        if dir.parent().is_some() && !matches!(state.nodes.get(dir), Some(Node::Dir)) {
            return Err(not_found(dir));
        }
        Ok(state
            .nodes
            .iter()
            .filter(|(path, _)| path.parent() == Some(dir))
            .map(|(path, node)| DirEntry {
                path: path.clone(),
                is_dir: matches!(node, Node::Dir),
            })
            .collect())
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        let mut state = self.lock();
        state.size_checks += 1;
        match state.nodes.get(path) {
            Some(Node::File(contents)) => Ok(contents.len() as u64),
            Some(Node::Dir) => Ok(0),
            None => Err(not_found(path)),
        }
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        match self.lock().nodes.get(path) {
            Some(Node::File(contents)) => Ok(Box::new(Cursor::new(contents.clone()))),
            Some(Node::Dir) => Err(io::Error::new(
                ErrorKind::Other,
                format!("{} is a directory", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        match state.nodes.remove(path) {
            Some(_) => {
                state.removed.push(path.to_path_buf());
                Ok(())
            }
            None => Err(not_found(path)),
        }
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        ErrorKind::NotFound,
        format!("no such file: {}", path.display()),
    )
}
