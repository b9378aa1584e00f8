//! Domain types passed between pipeline stages.
//!
//! Paths are always `PathBuf`; a path is the only thing a stage hands to the
//! next one.

use std::fmt;
use std::path::{Path, PathBuf};


// ---------------------------------------------------------------------------
// Stage messages
// ---------------------------------------------------------------------------

/// A file observed by the watcher that has not yet been confirmed stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidatePath(pub PathBuf);

impl CandidatePath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Promote the candidate once its size has settled.
    pub fn into_stable(self) -> StablePath {
        StablePath(self.0)
    }
}

impl From<PathBuf> for CandidatePath {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl From<&str> for CandidatePath {
    fn from(s: &str) -> Self {
        Self(PathBuf::from(s))
    }
}

impl fmt::Display for CandidatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}

/// A file whose size stayed unchanged for the configured number of samples.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StablePath(pub PathBuf);

impl StablePath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Base name used as both the multipart filename and the document title.
    pub fn file_name(&self) -> String {
        self.0
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl From<PathBuf> for StablePath {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl From<&str> for StablePath {
    fn from(s: &str) -> Self {
        Self(PathBuf::from(s))
    }
}

impl fmt::Display for StablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Where a single file is in its journey through the pipeline.
///
/// `Uploaded` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Discovered,
    Stable,
    Uploaded,
    Abandoned,
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileState::Discovered => "discovered",
            FileState::Stable => "stable",
            FileState::Uploaded => "uploaded",
            FileState::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}
