//! In-memory filesystem capabilities.

use super::lock;
use crate::error::{ConversionError, Result};
use crate::probe::{DirectoryLister, FileMetadata, FileMetadataProbe};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Mock implementation of [`FileMetadataProbe`]. Unknown paths are missing.
#[derive(Debug, Default)]
pub struct MockProbe {
    entries: Mutex<HashMap<PathBuf, FileMetadata>>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, path: impl AsRef<Path>, metadata: FileMetadata) {
        lock(&self.entries).insert(path.as_ref().to_path_buf(), metadata);
    }
}

impl FileMetadataProbe for MockProbe {
    fn metadata(&self, path: &Path) -> FileMetadata {
        lock(&self.entries)
            .get(path)
            .copied()
            .unwrap_or_else(FileMetadata::missing)
    }
}

/// Mock implementation of [`DirectoryLister`] returning a fixed listing.
#[derive(Debug, Default)]
pub struct MockLister {
    files: Mutex<Option<Vec<PathBuf>>>,
    requests: Mutex<Vec<(PathBuf, String, bool)>>,
}

impl MockLister {
    /// Lists `files` for any directory.
    pub fn with_files(files: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            files: Mutex::new(Some(files.into_iter().map(Into::into).collect())),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every listing fails as if the directory did not exist.
    pub fn missing_dir() -> Self {
        Self::default()
    }

    /// `(dir, pattern, recursive)` for each call.
    pub fn requests(&self) -> Vec<(PathBuf, String, bool)> {
        lock(&self.requests).clone()
    }
}

impl DirectoryLister for MockLister {
    fn list(&self, dir: &Path, pattern: &str, recursive: bool) -> Result<Vec<PathBuf>> {
        lock(&self.requests).push((dir.to_path_buf(), pattern.to_string(), recursive));
        lock(&self.files)
            .clone()
            .ok_or_else(|| ConversionError::InputDirNotFound(dir.to_path_buf()))
    }
}
