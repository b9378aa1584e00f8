//! Extension allow-list.
//!
//! Patterns are globs matched against the lowercase extension of a file name,
//! leading dot included, so `*.pdf` matches `scan.PDF` through `.pdf`. A
//! pattern that names more than an extension (`report*.pdf`) never matches.

use std::fmt;
use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::ConfigError;

#[derive(Clone)]
pub struct AllowList {
    patterns: Vec<String>,
    set: Option<GlobSet>,
}

impl AllowList {
    /// An allow-list that lets every file through.
    pub fn allow_all() -> Self {
        Self {
            patterns: Vec::new(),
            set: None,
        }
    }

    /// Parse a comma-separated list such as `*.pdf, *.TXT`.
    ///
    /// Blank entries are skipped; a list with no entries allows everything.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let patterns: Vec<String> = raw
            .split(',')
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        if patterns.is_empty() {
            return Ok(Self::allow_all());
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| ConfigError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|source| ConfigError::Pattern {
            pattern: patterns.join(","),
            source,
        })?;

        Ok(Self {
            patterns,
            set: Some(set),
        })
    }

    pub fn is_unrestricted(&self) -> bool {
        self.set.is_none()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether a file with this path or name is eligible for upload.
    pub fn allows(&self, path: &Path) -> bool {
        let Some(set) = &self.set else {
            return true;
        };
        set.is_match(extension_of(path))
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl fmt::Debug for AllowList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllowList")
            .field("patterns", &self.patterns)
            .finish()
    }
}

/// Lowercase extension with its leading dot, or an empty string.
fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}
