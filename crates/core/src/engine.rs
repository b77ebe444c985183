//! Conversion engine adapter.
//!
//! The pipeline treats the engine as an opaque capability: it converts one
//! input into one output and reports success or a (transient) failure.
//! [`PandocEngine`] shells out to the `pandoc` binary.

use crate::error::{ConversionError, Result};
use crate::format::ConversionDirection;
use async_process::Command;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info};

/// One engine invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub direction: ConversionDirection,
    /// Ordered tool arguments; later entries win on conflict.
    pub args: Vec<String>,
}

/// The external tool that performs the byte-level conversion.
#[async_trait]
pub trait ConversionEngine: Send + Sync {
    /// Returns the name of this engine implementation.
    fn name(&self) -> &str;

    /// Check the engine is usable and return its version string.
    async fn verify(&self) -> Result<String>;

    /// Run one conversion. Any error is treated as transient by the caller.
    async fn convert(&self, request: &EngineRequest) -> Result<()>;
}

/// Settings for locating and running pandoc.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Path to the pandoc binary. If None, searches well-known locations and PATH.
    pub pandoc_path: Option<PathBuf>,

    /// Per-call timeout in seconds. None means no timeout.
    pub timeout_secs: Option<u64>,
}

impl EngineSettings {
    /// Set the pandoc binary path.
    pub fn pandoc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.pandoc_path = Some(path.into());
        self
    }

    /// Set the per-call timeout.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

/// Engine backed by the `pandoc` command-line tool.
#[derive(Debug, Clone, Default)]
pub struct PandocEngine {
    settings: EngineSettings,
}

impl PandocEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    /// Find the pandoc binary.
    fn find_pandoc(settings: &EngineSettings) -> Result<PathBuf> {
        if let Some(ref path) = settings.pandoc_path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(ConversionError::EngineNotFound);
        }

        let candidates = [
            // Homebrew
            "/opt/homebrew/bin/pandoc",
            "/usr/local/bin/pandoc",
            // Linux packages
            "/usr/bin/pandoc",
        ];

        for candidate in candidates {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Ok(path);
            }
        }

        which::which("pandoc").map_err(|_| ConversionError::EngineNotFound)
    }

    /// First line of `pandoc --version`, e.g. `pandoc 3.1.11`.
    fn parse_version(stdout: &str) -> Option<String> {
        stdout
            .lines()
            .next()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
    }

    fn command_args(request: &EngineRequest, temp_output: &Path) -> Vec<String> {
        let mut args = vec![
            format!("--from={}", request.direction.source.pandoc_name()),
            format!("--to={}", request.direction.target.pandoc_name()),
        ];
        args.extend(request.args.iter().cloned());
        args.push(format!("--output={}", temp_output.display()));
        args.push(request.input.display().to_string());
        args
    }
}

#[async_trait]
impl ConversionEngine for PandocEngine {
    fn name(&self) -> &str {
        "pandoc"
    }

    async fn verify(&self) -> Result<String> {
        let pandoc = Self::find_pandoc(&self.settings)?;
        debug!("Found pandoc at: {:?}", pandoc);

        let output = Command::new(&pandoc).arg("--version").output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConversionError::EngineUnavailable(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = Self::parse_version(&stdout).ok_or_else(|| {
            ConversionError::EngineUnavailable("empty version output".to_string())
        })?;
        info!("Using {}", version);
        Ok(version)
    }

    async fn convert(&self, request: &EngineRequest) -> Result<()> {
        let start = Instant::now();
        let pandoc = Self::find_pandoc(&self.settings)?;

        let output_dir = request
            .output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let suffix = format!(".{}", request.direction.target.extension());

        // Written next to the destination so the final rename stays on one filesystem.
        let temp_output = tempfile::Builder::new()
            .prefix(".docconv-")
            .suffix(&suffix)
            .tempfile_in(output_dir)?;

        let mut cmd = Command::new(&pandoc);
        cmd.args(Self::command_args(request, temp_output.path()));

        let output = match self.settings.timeout_secs {
            Some(secs) => timeout(Duration::from_secs(secs), cmd.output())
                .await
                .map_err(|_| ConversionError::Timeout {
                    path: request.input.clone(),
                    timeout_secs: secs,
                })??,
            None => cmd.output().await?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Pandoc conversion failed for {:?}: {}", request.input, stderr);
            return Err(ConversionError::EngineFailure {
                path: request.input.clone(),
                message: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        temp_output
            .persist(&request.output)
            .map_err(|e| ConversionError::Io(e.error))?;

        debug!(
            "Pandoc converted {:?} ({}) in {:?}",
            request.input.file_name(),
            request.direction,
            start.elapsed()
        );
        Ok(())
    }
}
