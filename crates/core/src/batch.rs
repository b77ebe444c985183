//! Directory conversion: discover, build tasks, run them through the executor.

use crate::config::{BatchOutcome, ConversionOutcome, ConversionTask};
use crate::error::{ConversionError, Result};
use crate::executor::ConversionTaskExecutor;
use crate::format::DocumentFormat;
use crate::metrics::MetricsCollector;
use crate::probe::DirectoryLister;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A request to convert every matching file in a directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub input_dir: PathBuf,
    pub target_format: DocumentFormat,
    /// Inferred from the target when omitted.
    pub source_format: Option<DocumentFormat>,
    /// Falls back to the configured output directory.
    pub output_dir: Option<PathBuf>,
    /// Shell-style file name pattern. Defaults to `*.<source extension>`.
    pub pattern: Option<String>,
    /// Descend into sub-directories and mirror their layout in the output.
    pub recursive: bool,
}

impl BatchRequest {
    pub fn new(input_dir: impl AsRef<Path>, target_format: DocumentFormat) -> Self {
        Self {
            input_dir: input_dir.as_ref().to_path_buf(),
            target_format,
            source_format: None,
            output_dir: None,
            pattern: None,
            recursive: false,
        }
    }

    pub fn source_format(mut self, format: DocumentFormat) -> Self {
        self.source_format = Some(format);
        self
    }

    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Explicit source format, or the default for the target.
    pub fn resolved_source(&self) -> DocumentFormat {
        self.source_format
            .unwrap_or_else(|| DocumentFormat::default_source_for(self.target_format))
    }

    /// Explicit pattern, or `*.<ext>` for the resolved source.
    pub fn resolved_pattern(&self) -> String {
        self.pattern
            .clone()
            .unwrap_or_else(|| self.resolved_source().default_pattern())
    }
}

/// Converts directories of documents.
#[derive(Clone)]
pub struct BatchConverter {
    executor: ConversionTaskExecutor,
    lister: Arc<dyn DirectoryLister>,
}

impl std::fmt::Debug for BatchConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchConverter")
            .field("executor", &self.executor)
            .finish()
    }
}

impl BatchConverter {
    pub fn new(executor: ConversionTaskExecutor, lister: Arc<dyn DirectoryLister>) -> Self {
        Self { executor, lister }
    }

    pub fn executor(&self) -> &ConversionTaskExecutor {
        &self.executor
    }

    /// Build one task per discovered file, in discovery order.
    pub fn plan(&self, request: &BatchRequest) -> Result<Vec<ConversionTask>> {
        let dir = self.executor.probe().metadata(&request.input_dir);
        if !dir.exists || !dir.is_dir {
            return Err(ConversionError::InputDirNotFound(request.input_dir.clone()));
        }

        let pattern = request.resolved_pattern();
        let files = self
            .lister
            .list(&request.input_dir, &pattern, request.recursive)?;
        if files.is_empty() {
            return Err(ConversionError::NoMatchingFiles {
                dir: request.input_dir.clone(),
                pattern,
            });
        }

        let source = request.resolved_source();
        let output_root = request
            .output_dir
            .clone()
            .unwrap_or_else(|| self.executor.config().output_dir.clone());

        Ok(files
            .into_iter()
            .map(|file| {
                let output = output_path_for(
                    &file,
                    &request.input_dir,
                    &output_root,
                    request.target_format,
                );
                let file_source = DocumentFormat::from_path(&file).unwrap_or(source);
                ConversionTask::new(file, file_source, output, request.target_format)
            })
            .collect())
    }

    /// Convert every matching file. One file's failure never aborts the batch.
    pub async fn convert_directory(
        &self,
        request: &BatchRequest,
        metrics: &mut MetricsCollector,
    ) -> BatchOutcome {
        let start = Instant::now();

        let tasks = match self.plan(request) {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!("Batch over {:?} not started: {}", request.input_dir, err);
                let mut outcome = BatchOutcome::failed(&err);
                outcome.elapsed_seconds = start.elapsed().as_secs_f64();
                return outcome;
            }
        };

        let total = tasks.len();
        let concurrency = self.executor.config().batch.effective_concurrency();
        info!(
            "Converting {} file(s) from {:?} to {} (concurrency {})",
            total, request.input_dir, request.target_format, concurrency
        );

        let results = if concurrency > 1 {
            self.run_buffered(&tasks, concurrency, metrics).await
        } else {
            self.run_sequential(&tasks, metrics).await
        };

        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = total - succeeded;
        let message = if succeeded == 0 {
            format!(
                "All {} conversion(s) failed in {}",
                total,
                request.input_dir.display()
            )
        } else if failed > 0 {
            format!(
                "Converted {}/{} files from {} ({} failed)",
                succeeded,
                total,
                request.input_dir.display(),
                failed
            )
        } else {
            format!(
                "Converted {}/{} files from {}",
                succeeded,
                total,
                request.input_dir.display()
            )
        };

        let elapsed = start.elapsed().as_secs_f64();
        info!("{} in {:.2}s", message, elapsed);

        BatchOutcome {
            results,
            total_matches: total,
            success: succeeded > 0,
            message,
            elapsed_seconds: elapsed,
            failure: None,
        }
    }

    async fn run_sequential(
        &self,
        tasks: &[ConversionTask],
        metrics: &mut MetricsCollector,
    ) -> Vec<ConversionOutcome> {
        let mut results = Vec::with_capacity(tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            debug!("File {}/{}: {:?}", index + 1, tasks.len(), task.input_path);
            results.push(self.executor.execute(task, Some(&mut *metrics)).await);
        }
        results
    }

    /// Up to `concurrency` tasks in flight. `buffered` yields in input order,
    /// so private collectors merge in discovery order.
    async fn run_buffered(
        &self,
        tasks: &[ConversionTask],
        concurrency: usize,
        metrics: &mut MetricsCollector,
    ) -> Vec<ConversionOutcome> {
        let executor = &self.executor;
        let toggles = metrics.toggles();

        let finished: Vec<(ConversionOutcome, MetricsCollector)> = stream::iter(tasks)
            .map(|task| async move {
                let mut local = MetricsCollector::new(toggles);
                let outcome = executor.execute(task, Some(&mut local)).await;
                (outcome, local)
            })
            .buffered(concurrency)
            .collect()
            .await;

        finished
            .into_iter()
            .map(|(outcome, local)| {
                metrics.merge(local);
                outcome
            })
            .collect()
    }
}

/// `<output_root>/<parent relative to input_dir>/<stem>.<target ext>`.
fn output_path_for(
    file: &Path,
    input_dir: &Path,
    output_root: &Path,
    target: DocumentFormat,
) -> PathBuf {
    let relative_parent = file
        .strip_prefix(input_dir)
        .ok()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new(""));
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());

    let mut path = output_root.to_path_buf();
    if !relative_parent.as_os_str().is_empty() {
        path.push(relative_parent);
    }
    path.push(format!("{}.{}", stem, target.extension()));
    path
}
