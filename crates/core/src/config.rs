//! Configuration and task/outcome types for document conversion.

use crate::error::{ConversionError, FailureKind, Result};
use crate::format::{ConversionDirection, DocumentFormat};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Line wrapping mode passed to pandoc's `--wrap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapMode {
    Auto,
    #[default]
    None,
    Preserve,
}

impl WrapMode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::None => "none",
            Self::Preserve => "preserve",
        }
    }
}

/// Heading style for Markdown output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingStyle {
    #[default]
    Atx,
    Setext,
}

impl HeadingStyle {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Atx => "atx",
            Self::Setext => "setext",
        }
    }
}

/// Options translated into base pandoc flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOptions {
    /// Default: none.
    pub wrap: WrapMode,

    /// Produce a standalone document with header/footer.
    /// Default: true.
    pub standalone: bool,

    /// Only applies when writing Markdown.
    /// Default: atx.
    pub markdown_headings: HeadingStyle,

    /// Emit reference-style links when writing Markdown.
    /// Default: false.
    pub reference_links: bool,

    /// Extra directories pandoc searches for images and other resources.
    pub resource_paths: Vec<PathBuf>,

    /// Style reference document for DOCX/ODT output.
    pub reference_doc: Option<PathBuf>,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            wrap: WrapMode::None,
            standalone: true,
            markdown_headings: HeadingStyle::Atx,
            reference_links: false,
            resource_paths: Vec::new(),
            reference_doc: None,
        }
    }
}

impl ToolOptions {
    /// Base flags for one conversion direction.
    pub fn base_args(&self, direction: ConversionDirection) -> Vec<String> {
        let mut args = vec![format!("--wrap={}", self.wrap.as_str())];

        if self.standalone {
            args.push("--standalone".to_string());
        }

        if direction.target == DocumentFormat::Markdown {
            args.push(format!(
                "--markdown-headings={}",
                self.markdown_headings.as_str()
            ));
            if self.reference_links {
                args.push("--reference-links".to_string());
            }
        }

        if !self.resource_paths.is_empty() {
            let separator = if cfg!(windows) { ";" } else { ":" };
            let joined = self
                .resource_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(separator);
            args.push(format!("--resource-path={}", joined));
        }

        if matches!(direction.target, DocumentFormat::Docx | DocumentFormat::Odt) {
            if let Some(ref doc) = self.reference_doc {
                args.push(format!("--reference-doc={}", doc.display()));
            }
        }

        args
    }
}

/// Thresholds used by the validation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationThresholds {
    /// Run the format-specific structural validator when one exists.
    /// Default: true.
    pub verify_structure: bool,

    /// Minimum accepted output size in bytes. 0 disables the check.
    /// Default: 50.
    pub min_file_size: u64,

    /// Minimum output/input size ratio, in (0, 1].
    /// Default: 0.1.
    pub conversion_ratio_threshold: f64,

    /// Ask structural validators to check internal links.
    /// Default: false.
    pub check_links: bool,
}

impl Default for ValidationThresholds {
    fn default() -> Self {
        Self {
            verify_structure: true,
            min_file_size: 50,
            conversion_ratio_threshold: 0.1,
            check_links: false,
        }
    }
}

/// Fixed-delay retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    /// Default: 3.
    pub max_attempts: u32,

    /// Delay between attempts in seconds.
    /// Default: 1.0.
    pub delay_seconds: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_seconds: 1.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay_seconds: f64) -> Self {
        Self {
            max_attempts,
            delay_seconds,
        }
    }

    /// Delay as a `Duration`. Invalid values collapse to zero.
    pub fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay_seconds).unwrap_or(Duration::ZERO)
    }
}

/// Which metrics the collector records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsToggles {
    /// Default: true.
    pub track_time: bool,
    /// Default: true.
    pub track_sizes: bool,
}

impl Default for MetricsToggles {
    fn default() -> Self {
        Self {
            track_time: true,
            track_sizes: true,
        }
    }
}

/// Batch scheduling settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Files converted at once. 1 runs sequentially, 0 uses one slot per CPU.
    /// Default: 1.
    pub concurrency: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

impl BatchSettings {
    /// Concurrency with the `0 = per CPU` rule resolved.
    pub fn effective_concurrency(&self) -> usize {
        if self.concurrency == 0 {
            num_cpus::get()
        } else {
            self.concurrency
        }
    }
}

/// Immutable configuration for a conversion service.
///
/// Built once and shared behind an `Arc`. Reloading produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionConfig {
    pub tool: ToolOptions,

    /// Extra pandoc arguments keyed by direction (`"markdown->docx"`).
    pub extra_args: HashMap<String, Vec<String>>,

    pub validation: ValidationThresholds,

    pub retry: RetryPolicy,

    pub metrics: MetricsToggles,

    /// Directory for outputs when a request names none.
    /// Default: `output`.
    pub output_dir: PathBuf,

    pub batch: BatchSettings,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            tool: ToolOptions::default(),
            extra_args: HashMap::new(),
            validation: ValidationThresholds::default(),
            retry: RetryPolicy::default(),
            metrics: MetricsToggles::default(),
            output_dir: PathBuf::from("output"),
            batch: BatchSettings::default(),
        }
    }
}

impl ConversionConfig {
    /// Load from a TOML file, with `DOCCONV_`-prefixed environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConversionError::InvalidConfig(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        let file: ConfigFile = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("DOCCONV_"))
            .extract()?;

        let config = Self::from(file);
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let file: ConfigFile = Figment::from(Toml::string(toml)).extract()?;
        let config = Self::from(file);
        config.validate()?;
        Ok(config)
    }

    /// Set the retry policy.
    pub fn retry(mut self, max_attempts: u32, delay_seconds: f64) -> Self {
        self.retry = RetryPolicy::new(max_attempts, delay_seconds);
        self
    }

    /// Set the validation thresholds.
    pub fn validation(mut self, validation: ValidationThresholds) -> Self {
        self.validation = validation;
        self
    }

    /// Set the default output directory.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Append extra arguments for one direction.
    pub fn extra_args_for(
        mut self,
        direction: ConversionDirection,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.extra_args
            .entry(direction.key())
            .or_default()
            .extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the batch concurrency.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.batch.concurrency = concurrency;
        self
    }

    /// Full argument list: base flags, then direction extras, then overrides.
    pub fn build_args(&self, direction: ConversionDirection, overrides: &[String]) -> Vec<String> {
        let mut args = self.tool.base_args(direction);
        if let Some(extra) = self.extra_args.get(&direction.key()) {
            args.extend(extra.iter().cloned());
        }
        args.extend(overrides.iter().cloned());
        args
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(ConversionError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.retry.delay_seconds.is_finite() || self.retry.delay_seconds < 0.0 {
            return Err(ConversionError::InvalidConfig(
                "retry_delay must be a non-negative number of seconds".to_string(),
            ));
        }
        let threshold = self.validation.conversion_ratio_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConversionError::InvalidConfig(format!(
                "conversion_ratio_threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConversionError::InvalidConfig(
                "output_dir must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Flat on-disk layout of the configuration. Unknown keys are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub wrap: WrapMode,
    pub standalone: bool,
    pub markdown_headings: HeadingStyle,
    pub reference_links: bool,
    pub resource_paths: Vec<PathBuf>,
    pub reference_doc: Option<PathBuf>,
    pub verify_structure: bool,
    pub min_file_size: u64,
    pub conversion_ratio_threshold: f64,
    pub check_links: bool,
    pub max_attempts: u32,
    pub retry_delay: f64,
    pub track_conversion_time: bool,
    pub track_file_sizes: bool,
    pub output_dir: PathBuf,
    pub concurrency: usize,
    pub extra_args: HashMap<String, Vec<String>>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::from(&ConversionConfig::default())
    }
}

impl From<&ConversionConfig> for ConfigFile {
    fn from(config: &ConversionConfig) -> Self {
        Self {
            wrap: config.tool.wrap,
            standalone: config.tool.standalone,
            markdown_headings: config.tool.markdown_headings,
            reference_links: config.tool.reference_links,
            resource_paths: config.tool.resource_paths.clone(),
            reference_doc: config.tool.reference_doc.clone(),
            verify_structure: config.validation.verify_structure,
            min_file_size: config.validation.min_file_size,
            conversion_ratio_threshold: config.validation.conversion_ratio_threshold,
            check_links: config.validation.check_links,
            max_attempts: config.retry.max_attempts,
            retry_delay: config.retry.delay_seconds,
            track_conversion_time: config.metrics.track_time,
            track_file_sizes: config.metrics.track_sizes,
            output_dir: config.output_dir.clone(),
            concurrency: config.batch.concurrency,
            extra_args: config.extra_args.clone(),
        }
    }
}

impl From<ConfigFile> for ConversionConfig {
    fn from(file: ConfigFile) -> Self {
        Self {
            tool: ToolOptions {
                wrap: file.wrap,
                standalone: file.standalone,
                markdown_headings: file.markdown_headings,
                reference_links: file.reference_links,
                resource_paths: file.resource_paths,
                reference_doc: file.reference_doc,
            },
            extra_args: file.extra_args,
            validation: ValidationThresholds {
                verify_structure: file.verify_structure,
                min_file_size: file.min_file_size,
                conversion_ratio_threshold: file.conversion_ratio_threshold,
                check_links: file.check_links,
            },
            retry: RetryPolicy::new(file.max_attempts, file.retry_delay),
            metrics: MetricsToggles {
                track_time: file.track_conversion_time,
                track_sizes: file.track_file_sizes,
            },
            output_dir: file.output_dir,
            batch: BatchSettings {
                concurrency: file.concurrency,
            },
        }
    }
}

/// A single file conversion unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionTask {
    pub input_path: PathBuf,
    pub source_format: DocumentFormat,
    pub output_path: PathBuf,
    pub target_format: DocumentFormat,
    /// Appended after configured arguments, so these win on conflict.
    pub override_args: Vec<String>,
}

impl ConversionTask {
    pub fn new(
        input_path: impl Into<PathBuf>,
        source_format: DocumentFormat,
        output_path: impl Into<PathBuf>,
        target_format: DocumentFormat,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            source_format,
            output_path: output_path.into(),
            target_format,
            override_args: Vec::new(),
        }
    }

    /// Add caller-supplied arguments.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.override_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn direction(&self) -> ConversionDirection {
        ConversionDirection::new(self.source_format, self.target_format)
    }

    /// Key used for per-file metrics entries.
    pub fn file_name(&self) -> String {
        self.input_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input_path.display().to_string())
    }
}

/// Result of converting a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutcome {
    pub success: bool,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub source_format: Option<DocumentFormat>,
    pub target_format: DocumentFormat,
    pub elapsed_seconds: f64,
    pub output_size: u64,
    pub input_size: u64,
    /// Engine invocations made for this file.
    pub attempts: u32,
    pub message: String,
    pub errors: Vec<String>,
    pub failure: Option<FailureKind>,
}

impl ConversionOutcome {
    /// Failure before any task could be built.
    pub fn rejected(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        target_format: DocumentFormat,
        error: &ConversionError,
    ) -> Self {
        let message = error.to_string();
        Self {
            success: false,
            input_path: input_path.into(),
            output_path: output_path.into(),
            source_format: None,
            target_format,
            elapsed_seconds: 0.0,
            output_size: 0,
            input_size: 0,
            attempts: 0,
            errors: vec![message.clone()],
            message,
            failure: Some(error.kind()),
        }
    }
}

/// Result of a directory conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Per-file outcomes in discovery order.
    pub results: Vec<ConversionOutcome>,
    pub total_matches: usize,
    /// True iff at least one file converted.
    pub success: bool,
    pub message: String,
    pub elapsed_seconds: f64,
    /// Set when the batch failed as a whole (missing dir, no matches).
    pub failure: Option<FailureKind>,
}

impl BatchOutcome {
    /// A batch that failed before converting anything.
    pub fn failed(error: &ConversionError) -> Self {
        Self {
            results: Vec::new(),
            total_matches: 0,
            success: false,
            message: error.to_string(),
            elapsed_seconds: 0.0,
            failure: Some(error.kind()),
        }
    }

    pub fn successes(&self) -> impl Iterator<Item = &ConversionOutcome> {
        self.results.iter().filter(|r| r.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ConversionOutcome> {
        self.results.iter().filter(|r| !r.success)
    }

    /// True when some, but not all, files failed.
    pub fn is_partial_failure(&self) -> bool {
        self.success && self.failures().next().is_some()
    }

    /// Pretty JSON report.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Result of `ConversionService::initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeOutcome {
    pub success: bool,
    pub version: Option<String>,
    pub error: Option<String>,
}
