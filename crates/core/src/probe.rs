//! Filesystem capabilities consumed by the pipeline.
//!
//! The executor and batch converter only see the [`FileMetadataProbe`] and
//! [`DirectoryLister`] traits, so tests can substitute in-memory doubles.

use crate::error::{ConversionError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Metadata for a single path. A missing path is `exists: false`, never an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileMetadata {
    pub exists: bool,
    pub size: u64,
    pub is_file: bool,
    pub is_dir: bool,
}

impl FileMetadata {
    /// Metadata for a regular file of `size` bytes.
    pub fn file(size: u64) -> Self {
        Self {
            exists: true,
            size,
            is_file: true,
            is_dir: false,
        }
    }

    /// Metadata for an existing directory.
    pub fn dir() -> Self {
        Self {
            exists: true,
            size: 0,
            is_file: false,
            is_dir: true,
        }
    }

    pub fn missing() -> Self {
        Self::default()
    }
}

/// Existence/size/type lookup.
pub trait FileMetadataProbe: Send + Sync {
    fn metadata(&self, path: &Path) -> FileMetadata;
}

/// Probe backed by `std::fs::metadata`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl FileMetadataProbe for FsProbe {
    fn metadata(&self, path: &Path) -> FileMetadata {
        match std::fs::metadata(path) {
            Ok(meta) => FileMetadata {
                exists: true,
                size: meta.len(),
                is_file: meta.is_file(),
                is_dir: meta.is_dir(),
            },
            Err(e) => {
                debug!("No metadata for {:?}: {}", path, e);
                FileMetadata::missing()
            }
        }
    }
}

/// Ordered listing of files matching a glob pattern.
pub trait DirectoryLister: Send + Sync {
    fn list(&self, dir: &Path, pattern: &str, recursive: bool) -> Result<Vec<PathBuf>>;
}

/// Lister backed by `walkdir`, sorted by file name for a stable discovery order.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkDirLister;

impl DirectoryLister for WalkDirLister {
    fn list(&self, dir: &Path, pattern: &str, recursive: bool) -> Result<Vec<PathBuf>> {
        let matcher = GlobPattern::new(pattern)?;
        let max_depth = if recursive { usize::MAX } else { 1 };

        let mut files = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if e.depth() == 0 {
                        return Err(e
                            .into_io_error()
                            .map(ConversionError::Io)
                            .unwrap_or_else(|| ConversionError::InputNotFound(dir.to_path_buf())));
                    }
                    warn!("Skipping unreadable entry under {:?}: {}", dir, e);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if matcher.matches(&name) {
                files.push(entry.into_path());
            }
        }

        Ok(files)
    }
}

/// Shell-style file name pattern: `*`, `?` and `[...]` classes.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    regex: Regex,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');

        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                '[' => {
                    let mut class = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        if inner == ']' {
                            closed = true;
                            break;
                        }
                        class.push(inner);
                    }
                    if !closed || class.is_empty() {
                        return Err(ConversionError::InvalidConfig(format!(
                            "unterminated character class in pattern '{}'",
                            pattern
                        )));
                    }
                    let class = match class.strip_prefix('!') {
                        Some(rest) => format!("^{}", rest),
                        None => class,
                    };
                    expr.push('[');
                    expr.push_str(&class.replace('\\', "\\\\"));
                    expr.push(']');
                }
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| {
            ConversionError::InvalidConfig(format!("invalid pattern '{}': {}", pattern, e))
        })?;

        Ok(Self { regex })
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }
}

/// Create `dir` and its parents. Succeeds if it already exists.
pub fn ensure_output_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|e| ConversionError::OutputDirError {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })
}
