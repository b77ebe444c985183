//! High-level conversion service.
//!
//! Owns the engine, filesystem capabilities, validators and metrics for one
//! run, and gates every conversion on a successful [`ConversionService::initialize`].

use crate::batch::{BatchConverter, BatchRequest};
use crate::config::{BatchOutcome, ConversionConfig, ConversionOutcome, ConversionTask, InitializeOutcome};
use crate::engine::{ConversionEngine, EngineSettings, PandocEngine};
use crate::error::{ConversionError, Result};
use crate::executor::{CancellationFlag, ConversionTaskExecutor};
use crate::format::DocumentFormat;
use crate::metrics::MetricsCollector;
use crate::probe::{DirectoryLister, FileMetadataProbe, FsProbe, WalkDirLister};
use crate::structure::StructureValidators;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Service lifecycle. `Ready` and `InitializationFailed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    Uninitialized,
    Initializing,
    Ready,
    InitializationFailed,
}

/// Document conversion service.
///
/// This is the primary interface for converting documents. Call
/// [`initialize`](Self::initialize) once; until it succeeds every conversion
/// returns a `NotInitialized` outcome.
pub struct ConversionService {
    /// Current configuration. Replaced wholesale on reload.
    config: Arc<ConversionConfig>,
    /// External conversion tool.
    engine: Arc<dyn ConversionEngine>,
    /// File existence and size lookups.
    probe: Arc<dyn FileMetadataProbe>,
    /// Batch file discovery.
    lister: Arc<dyn DirectoryLister>,
    /// Structural checks keyed by target format.
    validators: Arc<StructureValidators>,
    /// Shared with every executor this service builds.
    cancellation: CancellationFlag,
    /// Metrics for the current run.
    metrics: MetricsCollector,
    state: ServiceState,
    /// Terminal result of `initialize`, returned on repeat calls.
    init_outcome: Option<InitializeOutcome>,
    /// Bound once the service is ready.
    converter: Option<BatchConverter>,
}

impl std::fmt::Debug for ConversionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionService")
            .field("engine", &self.engine.name())
            .field("state", &self.state)
            .field("run_id", &self.metrics.run_id())
            .finish()
    }
}

impl ConversionService {
    /// Create a pandoc-backed service. Fails only on an invalid configuration.
    pub fn new(config: ConversionConfig) -> Result<Self> {
        config.validate()?;
        let metrics = MetricsCollector::new(config.metrics);

        Ok(Self {
            config: Arc::new(config),
            engine: Arc::new(PandocEngine::default()),
            probe: Arc::new(FsProbe),
            lister: Arc::new(WalkDirLister),
            validators: Arc::new(StructureValidators::with_defaults()),
            cancellation: CancellationFlag::new(),
            metrics,
            state: ServiceState::Uninitialized,
            init_outcome: None,
            converter: None,
        })
    }

    /// Load the configuration from a TOML file and create a service.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(ConversionConfig::load(path.as_ref())?)
    }

    /// Use pandoc with explicit settings.
    pub fn with_engine_settings(self, settings: EngineSettings) -> Self {
        self.with_engine(Arc::new(PandocEngine::new(settings)))
    }

    pub fn with_engine(mut self, engine: Arc<dyn ConversionEngine>) -> Self {
        self.engine = engine;
        self.rebind();
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn FileMetadataProbe>) -> Self {
        self.probe = probe;
        self.rebind();
        self
    }

    pub fn with_lister(mut self, lister: Arc<dyn DirectoryLister>) -> Self {
        self.lister = lister;
        self.rebind();
        self
    }

    pub fn with_validators(mut self, validators: StructureValidators) -> Self {
        self.validators = Arc::new(validators);
        self.rebind();
        self
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Hand back the current metrics and start a fresh run.
    pub fn take_metrics(&mut self) -> MetricsCollector {
        std::mem::replace(&mut self.metrics, MetricsCollector::new(self.config.metrics))
    }

    /// Flag that stops in-flight conversions before their next attempt.
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    pub fn cancel(&self) {
        info!("Cancellation requested");
        self.cancellation.cancel();
    }

    /// Verify the configuration and engine. Runs at most once; later calls
    /// return the cached outcome.
    pub async fn initialize(&mut self) -> InitializeOutcome {
        if let Some(ref outcome) = self.init_outcome {
            return outcome.clone();
        }

        self.state = ServiceState::Initializing;
        info!("Initializing conversion service ({} engine)", self.engine.name());

        let verified = match self.config.validate() {
            Ok(()) => self.engine.verify().await,
            Err(e) => Err(e),
        };

        let outcome = match verified {
            Ok(version) => {
                info!("Conversion service ready: {}", version);
                self.state = ServiceState::Ready;
                self.converter = Some(self.build_converter());
                InitializeOutcome {
                    success: true,
                    version: Some(version),
                    error: None,
                }
            }
            Err(e) => {
                error!("Conversion service initialization failed: {}", e);
                self.state = ServiceState::InitializationFailed;
                InitializeOutcome {
                    success: false,
                    version: None,
                    error: Some(e.to_string()),
                }
            }
        };

        self.init_outcome = Some(outcome.clone());
        outcome
    }

    /// Replace the configuration. The old one stays in place if the new one is invalid.
    pub fn reload(&mut self, config: ConversionConfig) -> Result<()> {
        config.validate()?;
        self.config = Arc::new(config);
        self.metrics.set_toggles(self.config.metrics);
        self.rebind();
        info!("Configuration reloaded");
        Ok(())
    }

    /// Rebuild a bound converter so it sees the current config and capabilities.
    fn rebind(&mut self) {
        if self.converter.is_some() {
            self.converter = Some(self.build_converter());
        }
    }

    fn build_converter(&self) -> BatchConverter {
        let executor = ConversionTaskExecutor::new(
            self.config.clone(),
            self.engine.clone(),
            self.probe.clone(),
            self.validators.clone(),
        )
        .with_cancellation(self.cancellation.clone());
        BatchConverter::new(executor, self.lister.clone())
    }

    fn default_output(&self, input: &Path, target: DocumentFormat) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        self.config
            .output_dir
            .join(format!("{}.{}", stem, target.extension()))
    }

    /// Convert one file, inferring the source format from its extension.
    ///
    /// Without `output`, writes `<output_dir>/<stem>.<target ext>`.
    pub async fn convert_one(
        &mut self,
        input: impl AsRef<Path>,
        target: DocumentFormat,
        output: Option<&Path>,
    ) -> ConversionOutcome {
        self.convert_as(input.as_ref(), None, target, output).await
    }

    async fn convert_as(
        &mut self,
        input: &Path,
        source: Option<DocumentFormat>,
        target: DocumentFormat,
        output: Option<&Path>,
    ) -> ConversionOutcome {
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_output(input, target));

        let Some(converter) = self.converter.as_ref() else {
            warn!("Rejecting {:?}: service not initialized", input);
            return ConversionOutcome::rejected(input, output, target, &ConversionError::NotInitialized);
        };

        let Some(source) = source.or_else(|| DocumentFormat::from_path(input)) else {
            let ext = input
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default();
            let err = ConversionError::UnsupportedFormat(format!(
                "cannot infer source format of '{}' (extension '{}')",
                input.display(),
                ext
            ));
            warn!("{}", err);
            return ConversionOutcome::rejected(input, output, target, &err);
        };

        let task = ConversionTask::new(input, source, output, target);
        converter
            .executor()
            .execute(&task, Some(&mut self.metrics))
            .await
    }

    /// Convert every matching file in a directory.
    pub async fn convert_directory(&mut self, request: BatchRequest) -> BatchOutcome {
        let Some(converter) = self.converter.as_ref() else {
            warn!("Rejecting batch over {:?}: service not initialized", request.input_dir);
            return BatchOutcome::failed(&ConversionError::NotInitialized);
        };

        let outcome = converter.convert_directory(&request, &mut self.metrics).await;
        self.metrics.log_summary();
        outcome
    }

    pub async fn markdown_to_docx(
        &mut self,
        input: impl AsRef<Path>,
        output: Option<&Path>,
    ) -> ConversionOutcome {
        self.convert_as(
            input.as_ref(),
            Some(DocumentFormat::Markdown),
            DocumentFormat::Docx,
            output,
        )
        .await
    }

    pub async fn docx_to_markdown(
        &mut self,
        input: impl AsRef<Path>,
        output: Option<&Path>,
    ) -> ConversionOutcome {
        self.convert_as(
            input.as_ref(),
            Some(DocumentFormat::Docx),
            DocumentFormat::Markdown,
            output,
        )
        .await
    }

    pub async fn html_to_markdown(
        &mut self,
        input: impl AsRef<Path>,
        output: Option<&Path>,
    ) -> ConversionOutcome {
        self.convert_as(
            input.as_ref(),
            Some(DocumentFormat::Html),
            DocumentFormat::Markdown,
            output,
        )
        .await
    }

    pub async fn html_to_docx(
        &mut self,
        input: impl AsRef<Path>,
        output: Option<&Path>,
    ) -> ConversionOutcome {
        self.convert_as(
            input.as_ref(),
            Some(DocumentFormat::Html),
            DocumentFormat::Docx,
            output,
        )
        .await
    }

    pub async fn markdown_to_html(
        &mut self,
        input: impl AsRef<Path>,
        output: Option<&Path>,
    ) -> ConversionOutcome {
        self.convert_as(
            input.as_ref(),
            Some(DocumentFormat::Markdown),
            DocumentFormat::Html,
            output,
        )
        .await
    }

    /// Live engine probe; works in any state.
    pub async fn is_pandoc_available(&self) -> bool {
        self.engine.verify().await.is_ok()
    }

    /// Live engine version; works in any state.
    pub async fn get_pandoc_version(&self) -> Option<String> {
        self.engine.verify().await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetricsToggles;
    use crate::error::FailureKind;
    use crate::testing::{fixtures, MockEngine};

    fn service(engine: &Arc<MockEngine>, output_dir: &Path) -> ConversionService {
        let config = ConversionConfig::default()
            .retry(1, 0.0)
            .output_dir(output_dir);
        ConversionService::new(config)
            .unwrap()
            .with_engine(engine.clone())
            .with_validators(StructureValidators::empty())
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = ConversionService::new(ConversionConfig::default().retry(0, 1.0));
        assert!(matches!(result, Err(ConversionError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_initialize_success() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new());
        let mut service = service(&engine, dir.path());
        assert_eq!(service.state(), ServiceState::Uninitialized);

        let outcome = service.initialize().await;
        assert!(outcome.success);
        assert_eq!(outcome.version.as_deref(), Some("pandoc 3.1.11"));
        assert_eq!(service.state(), ServiceState::Ready);
    }

    #[tokio::test]
    async fn test_initialize_failure_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::missing());
        let mut service = service(&engine, dir.path());

        let first = service.initialize().await;
        assert!(!first.success);
        assert!(first.error.unwrap().contains("Pandoc not found"));
        assert_eq!(service.state(), ServiceState::InitializationFailed);

        engine.set_version(Some("pandoc 3.2".to_string()));
        let second = service.initialize().await;
        assert!(!second.success);
        assert_eq!(engine.verify_count(), 1);
    }

    #[tokio::test]
    async fn test_not_initialized_rejects_work() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new());
        let mut service = service(&engine, dir.path());

        let outcome = service
            .convert_one(dir.path().join("a.md"), DocumentFormat::Docx, None)
            .await;
        assert_eq!(outcome.failure, Some(FailureKind::NotInitialized));

        let batch = service
            .convert_directory(BatchRequest::new(dir.path(), DocumentFormat::Docx))
            .await;
        assert_eq!(batch.failure, Some(FailureKind::NotInitialized));
        assert_eq!(engine.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_extension_is_invalid_request() {
        let dir = tempfile::tempdir().unwrap();
        let input = fixtures::write_file(dir.path(), "data.xyz", "whatever");
        let engine = Arc::new(MockEngine::new());
        let mut service = service(&engine, dir.path());
        service.initialize().await;

        let outcome = service.convert_one(&input, DocumentFormat::Docx, None).await;
        assert_eq!(outcome.failure, Some(FailureKind::InvalidRequest));
        assert!(outcome.message.contains("xyz"));
        assert_eq!(engine.call_count(), 0);
    }

    #[tokio::test]
    async fn test_convert_one_default_output_path() {
        let input_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        let input = fixtures::write_file(input_dir.path(), "notes.md", fixtures::markdown("Notes", 3));
        let engine = Arc::new(MockEngine::writing(vec![b'x'; 120]));
        let mut service = service(&engine, output_dir.path());
        service.initialize().await;

        let outcome = service.convert_one(&input, DocumentFormat::Html, None).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.output_path, output_dir.path().join("notes.html"));
        assert_eq!(outcome.source_format, Some(DocumentFormat::Markdown));
        assert_eq!(service.metrics().successful_conversions, 1);
    }

    #[tokio::test]
    async fn test_convenience_forces_source_format() {
        let dir = tempfile::tempdir().unwrap();
        let input = fixtures::write_file(dir.path(), "readme.txt", fixtures::markdown("Readme", 3));
        let engine = Arc::new(MockEngine::writing(vec![b'x'; 120]));
        let mut service = service(&engine, dir.path());
        service.initialize().await;

        let outcome = service.markdown_to_docx(&input, None).await;
        assert!(outcome.success, "{}", outcome.message);
        let call = &engine.calls()[0];
        assert_eq!(call.direction.source, DocumentFormat::Markdown);
        assert_eq!(call.direction.target, DocumentFormat::Docx);
    }

    #[tokio::test]
    async fn test_cancel_stops_conversions() {
        let dir = tempfile::tempdir().unwrap();
        let input = fixtures::write_file(dir.path(), "a.md", fixtures::markdown("A", 3));
        let engine = Arc::new(MockEngine::writing(vec![b'x'; 120]));
        let mut service = service(&engine, dir.path());
        service.initialize().await;

        service.cancel();
        let outcome = service.convert_one(&input, DocumentFormat::Html, None).await;
        assert_eq!(outcome.failure, Some(FailureKind::Cancelled));

        service.cancellation_flag().reset();
        let outcome = service.convert_one(&input, DocumentFormat::Html, None).await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_take_metrics_starts_new_run() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new());
        let mut service = service(&engine, dir.path());
        service.initialize().await;
        service
            .convert_one(dir.path().join("missing.md"), DocumentFormat::Docx, None)
            .await;

        let first_run = service.metrics().run_id();
        let taken = service.take_metrics();
        assert_eq!(taken.run_id(), first_run);
        assert_eq!(taken.failed_conversions, 1);
        assert_ne!(service.metrics().run_id(), first_run);
        assert_eq!(service.metrics().processed(), 0);
    }

    #[tokio::test]
    async fn test_reload_validates_and_swaps() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new());
        let mut service = service(&engine, dir.path());
        service.initialize().await;

        assert!(service
            .reload(ConversionConfig::default().retry(0, 0.0))
            .is_err());
        assert_eq!(service.config().retry.max_attempts, 1);

        service
            .reload(ConversionConfig::default().retry(5, 0.0))
            .unwrap();
        assert_eq!(service.config().retry.max_attempts, 5);
        assert_eq!(service.state(), ServiceState::Ready);
    }

    #[tokio::test]
    async fn test_reload_applies_metrics_toggles() {
        let dir = tempfile::tempdir().unwrap();
        let input = fixtures::write_file(dir.path(), "a.md", fixtures::markdown("A", 3));
        let engine = Arc::new(MockEngine::writing(vec![b'x'; 120]));
        let mut service = service(&engine, dir.path());
        service.initialize().await;

        let mut config = service.config().clone();
        config.metrics = MetricsToggles {
            track_time: false,
            track_sizes: false,
        };
        service.reload(config).unwrap();

        let outcome = service.convert_one(&input, DocumentFormat::Html, None).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(service.metrics().successful_conversions, 1);
        assert!(service.metrics().operation_times.is_empty());
        assert!(service.metrics().conversion_times.is_empty());
        assert!(service.metrics().file_sizes.is_empty());
    }

    #[tokio::test]
    async fn test_builders_rebind_after_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let input = fixtures::write_file(dir.path(), "a.md", fixtures::markdown("A", 3));
        let first = Arc::new(MockEngine::writing(vec![b'x'; 120]));
        let mut service = service(&first, dir.path());
        service.initialize().await;

        let second = Arc::new(MockEngine::writing(vec![b'y'; 120]));
        let mut service = service.with_engine(second.clone());
        let outcome = service.convert_one(&input, DocumentFormat::Html, None).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(first.call_count(), 0);
        assert_eq!(second.call_count(), 1);
    }

    #[tokio::test]
    async fn test_engine_probes_work_before_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new());
        let service = service(&engine, dir.path());
        assert!(service.is_pandoc_available().await);
        assert_eq!(
            service.get_pandoc_version().await.as_deref(),
            Some("pandoc 3.1.11")
        );
        assert_eq!(service.state(), ServiceState::Uninitialized);

        let missing = ConversionService::new(ConversionConfig::default())
            .unwrap()
            .with_engine(Arc::new(MockEngine::missing()));
        assert!(!missing.is_pandoc_available().await);
        assert_eq!(missing.get_pandoc_version().await, None);
    }
}
