//! Single-file conversion: probe -> invoke -> validate -> retry-or-finish.

use crate::config::{ConversionConfig, ConversionOutcome, ConversionTask};
use crate::engine::{ConversionEngine, EngineRequest};
use crate::error::{ConversionError, FailureKind, Result};
use crate::metrics::MetricsCollector;
use crate::probe::{ensure_output_dir, FileMetadataProbe};
use crate::retry::{AttemptFailure, AttemptState, RetryStateMachine};
use crate::structure::StructureValidators;
use crate::validation::ValidationPolicy;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Shared flag checked between attempts.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear a previous cancellation so new work can start.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs one [`ConversionTask`] to a terminal [`ConversionOutcome`].
///
/// Missing input fails immediately. Engine errors, unreadable outputs and
/// rejected outputs each consume one attempt; the whole conversion is re-run
/// after `retry.delay_seconds` until `retry.max_attempts` is spent.
#[derive(Clone)]
pub struct ConversionTaskExecutor {
    config: Arc<ConversionConfig>,
    engine: Arc<dyn ConversionEngine>,
    probe: Arc<dyn FileMetadataProbe>,
    validators: Arc<StructureValidators>,
    policy: ValidationPolicy,
    cancellation: Option<CancellationFlag>,
}

impl std::fmt::Debug for ConversionTaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionTaskExecutor")
            .field("engine", &self.engine.name())
            .field("retry", &self.config.retry)
            .field("validators", &self.validators)
            .finish()
    }
}

impl ConversionTaskExecutor {
    pub fn new(
        config: Arc<ConversionConfig>,
        engine: Arc<dyn ConversionEngine>,
        probe: Arc<dyn FileMetadataProbe>,
        validators: Arc<StructureValidators>,
    ) -> Self {
        let policy = ValidationPolicy::new(config.validation.clone());
        Self {
            config,
            engine,
            probe,
            validators,
            policy,
            cancellation: None,
        }
    }

    /// Check `flag` before every attempt.
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = Some(flag);
        self
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn probe(&self) -> &dyn FileMetadataProbe {
        self.probe.as_ref()
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(CancellationFlag::is_cancelled)
            .unwrap_or(false)
    }

    /// Convert one file. Never panics; every failure becomes an outcome.
    pub async fn execute(
        &self,
        task: &ConversionTask,
        mut metrics: Option<&mut MetricsCollector>,
    ) -> ConversionOutcome {
        let start = Instant::now();
        let started_at = Utc::now();
        let file_name = task.file_name();

        info!("Converting {:?} ({})", task.input_path, task.direction());

        let input = self.probe.metadata(&task.input_path);
        if !input.exists || !input.is_file {
            let err = ConversionError::InputNotFound(task.input_path.clone());
            error!("{}", err);
            if let Some(m) = metrics.as_deref_mut() {
                m.record_failure(&file_name, err.to_string());
            }
            return ConversionOutcome {
                success: false,
                input_path: task.input_path.clone(),
                output_path: task.output_path.clone(),
                source_format: Some(task.source_format),
                target_format: task.target_format,
                elapsed_seconds: start.elapsed().as_secs_f64(),
                output_size: 0,
                input_size: 0,
                attempts: 0,
                message: err.to_string(),
                errors: vec![err.to_string()],
                failure: Some(FailureKind::InputNotFound),
            };
        }
        let original_size = input.size;

        let args = self
            .config
            .build_args(task.direction(), &task.override_args);
        let delay = self.config.retry.delay();
        let mut machine = RetryStateMachine::new(self.config.retry.max_attempts);
        let mut output_size = 0;

        loop {
            if self.is_cancelled() {
                machine.cancel();
                break;
            }
            let Some(attempt) = machine.begin_attempt() else {
                break;
            };
            debug!(
                "Attempt {}/{} for {:?}",
                attempt,
                machine.max_attempts(),
                task.input_path
            );

            let result = match self.attempt(task, &args).await {
                Ok(size) => {
                    output_size = size;
                    let verdict = self.policy.evaluate(
                        size,
                        original_size,
                        &task.output_path,
                        self.validators.get(task.target_format),
                    );
                    if verdict.is_valid {
                        Ok(())
                    } else {
                        Err(ConversionError::ValidationFailure {
                            errors: verdict.errors,
                        })
                    }
                }
                Err(err) => Err(err),
            };

            match result {
                Ok(()) => {
                    machine.succeed();
                    break;
                }
                Err(err) => {
                    warn!(
                        "Attempt {}/{} for {:?} failed: {}",
                        attempt,
                        machine.max_attempts(),
                        task.input_path,
                        err
                    );
                    if let AttemptState::Retrying { .. } = machine.fail(AttemptFailure::from(err)) {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    } else {
                        break;
                    }
                }
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        let mut outcome = ConversionOutcome {
            success: false,
            input_path: task.input_path.clone(),
            output_path: task.output_path.clone(),
            source_format: Some(task.source_format),
            target_format: task.target_format,
            elapsed_seconds: elapsed,
            output_size,
            input_size: original_size,
            attempts: machine.attempts(),
            message: String::new(),
            errors: Vec::new(),
            failure: None,
        };

        match machine.state() {
            AttemptState::Succeeded { attempts } => {
                outcome.success = true;
                outcome.message = format!(
                    "Converted {} to {} ({} bytes)",
                    task.input_path.display(),
                    task.output_path.display(),
                    output_size
                );
                info!(
                    "{} in {:.2}s after {} attempt(s)",
                    outcome.message, elapsed, attempts
                );
                if let Some(m) = metrics.as_deref_mut() {
                    m.add_input_size(original_size);
                    m.add_output_size(output_size);
                    m.record_operation_time(elapsed);
                    m.record_conversion_window(&file_name, started_at, Utc::now());
                    m.record_file_sizes(&file_name, original_size, output_size);
                    m.record_success();
                }
            }
            AttemptState::Failed { attempts, failure } => {
                outcome.message = match failure.kind() {
                    FailureKind::Cancelled => {
                        format!("Conversion cancelled after {} attempt(s)", attempts)
                    }
                    FailureKind::ValidationFailure => format!(
                        "Validation failed after {} attempt(s): {}",
                        attempts,
                        failure.message()
                    ),
                    _ => format!(
                        "Conversion failed after {} attempt(s): {}",
                        attempts,
                        failure.message()
                    ),
                };
                outcome.errors = failure.errors().to_vec();
                outcome.failure = Some(failure.kind());
                error!("{:?}: {}", task.input_path, outcome.message);
                if let Some(m) = metrics.as_deref_mut() {
                    m.record_failure(&file_name, outcome.message.clone());
                }
            }
            // The loop only exits on a terminal state.
            state => {
                outcome.message = format!("Conversion stopped in state {:?}", state);
                outcome.errors = vec![outcome.message.clone()];
                outcome.failure = Some(FailureKind::EngineFailure);
                if let Some(m) = metrics.as_deref_mut() {
                    m.record_failure(&file_name, outcome.message.clone());
                }
            }
        }

        outcome
    }

    /// One engine invocation. Returns the output size on success.
    async fn attempt(&self, task: &ConversionTask, args: &[String]) -> Result<u64> {
        if let Some(parent) = task
            .output_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            ensure_output_dir(parent)?;
        }

        let request = EngineRequest {
            input: task.input_path.clone(),
            output: task.output_path.clone(),
            direction: task.direction(),
            args: args.to_vec(),
        };
        // Engine errors are transient whatever their cause.
        self.engine
            .convert(&request)
            .await
            .map_err(|e| match e {
                e @ (ConversionError::EngineFailure { .. } | ConversionError::Timeout { .. }) => e,
                other => ConversionError::EngineFailure {
                    path: task.input_path.clone(),
                    message: other.to_string(),
                },
            })?;

        let output = self.probe.metadata(&task.output_path);
        if !output.exists || !output.is_file {
            return Err(ConversionError::OutputUnreadable {
                path: task.output_path.clone(),
            });
        }
        Ok(output.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationThresholds;
    use crate::format::DocumentFormat;
    use crate::probe::FileMetadata;
    use crate::testing::{MockEngine, MockProbe};
    use crate::validation::ValidationOutcome;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        engine: Arc<MockEngine>,
        probe: Arc<MockProbe>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                engine: Arc::new(MockEngine::new()),
                probe: Arc::new(MockProbe::new()),
            }
        }

        fn input(&self) -> PathBuf {
            self.dir.path().join("report.md")
        }

        fn output(&self) -> PathBuf {
            self.dir.path().join("out").join("report.docx")
        }

        fn task(&self) -> ConversionTask {
            ConversionTask::new(
                self.input(),
                DocumentFormat::Markdown,
                self.output(),
                DocumentFormat::Docx,
            )
        }

        fn executor(
            &self,
            config: ConversionConfig,
            validators: StructureValidators,
        ) -> ConversionTaskExecutor {
            ConversionTaskExecutor::new(
                Arc::new(config),
                self.engine.clone(),
                self.probe.clone(),
                Arc::new(validators),
            )
        }
    }

    fn config(max_attempts: u32) -> ConversionConfig {
        ConversionConfig::default()
            .retry(max_attempts, 0.0)
            .validation(ValidationThresholds {
                verify_structure: true,
                min_file_size: 50,
                conversion_ratio_threshold: 0.1,
                check_links: false,
            })
    }

    struct Passing;
    impl crate::structure::StructureValidator for Passing {
        fn validate(&self, _: &Path, _: bool) -> ValidationOutcome {
            ValidationOutcome::valid()
        }
    }

    #[tokio::test]
    async fn test_missing_input_is_permanent() {
        let fx = Fixture::new();
        let exec = fx.executor(config(3), StructureValidators::empty());
        let mut metrics = MetricsCollector::default();

        let outcome = exec.execute(&fx.task(), Some(&mut metrics)).await;
        assert!(!outcome.success);
        assert_eq!(outcome.failure, Some(FailureKind::InputNotFound));
        assert_eq!(outcome.attempts, 0);
        assert_eq!(fx.engine.call_count(), 0);
        assert_eq!(metrics.failed_conversions, 1);
        assert!(metrics.errors["report.md"].contains("Input file not found"));
    }

    #[tokio::test]
    async fn test_success_first_attempt_records_metrics() {
        let fx = Fixture::new();
        fx.probe.set(fx.input(), FileMetadata::file(100));
        fx.probe.set(fx.output(), FileMetadata::file(80));
        let exec = fx.executor(
            config(1),
            StructureValidators::empty().register(DocumentFormat::Docx, Passing),
        );
        let mut metrics = MetricsCollector::default();

        let outcome = exec.execute(&fx.task(), Some(&mut metrics)).await;
        assert!(outcome.success, "{}", outcome.message);
        assert!(outcome.message.contains("80 bytes"));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.output_size, 80);
        assert_eq!(outcome.input_size, 100);
        assert!(fx.output().parent().unwrap().is_dir());
        assert_eq!(metrics.successful_conversions, 1);
        assert_eq!(metrics.total_size_input, 100);
        assert_eq!(metrics.total_size_output, 80);
        assert_eq!(metrics.file_sizes["report.md"].ratio, 0.8);
        assert_eq!(metrics.operation_times.len(), 1);
        assert!(metrics.conversion_times.contains_key("report.md"));
    }

    #[tokio::test]
    async fn test_persistent_engine_failure_uses_every_attempt() {
        let fx = Fixture::new();
        fx.engine.fail_always("pandoc exited with 1");
        fx.probe.set(fx.input(), FileMetadata::file(100));
        let exec = fx.executor(config(4), StructureValidators::empty());
        let mut metrics = MetricsCollector::default();

        let outcome = exec.execute(&fx.task(), Some(&mut metrics)).await;
        assert!(!outcome.success);
        assert_eq!(fx.engine.call_count(), 4);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.failure, Some(FailureKind::EngineFailure));
        assert!(outcome.message.contains("after 4 attempt(s)"));
        assert!(outcome.message.contains("pandoc exited with 1"));
        assert_eq!(metrics.failed_conversions, 1);
        assert_eq!(metrics.successful_conversions, 0);
    }

    #[tokio::test]
    async fn test_validation_failure_retries_whole_conversion() {
        let fx = Fixture::new();
        fx.probe.set(fx.input(), FileMetadata::file(100));
        fx.probe.set(fx.output(), FileMetadata::file(5));
        let exec = fx.executor(config(2), StructureValidators::empty());

        let outcome = exec.execute(&fx.task(), None).await;
        assert!(!outcome.success);
        assert_eq!(fx.engine.call_count(), 2);
        assert_eq!(outcome.failure, Some(FailureKind::ValidationFailure));
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome
            .message
            .starts_with("Validation failed after 2 attempt(s)"));
    }

    #[tokio::test]
    async fn test_missing_output_after_engine_success() {
        let fx = Fixture::new();
        fx.probe.set(fx.input(), FileMetadata::file(100));
        let exec = fx.executor(config(2), StructureValidators::empty());

        let outcome = exec.execute(&fx.task(), None).await;
        assert!(!outcome.success);
        assert_eq!(fx.engine.call_count(), 2);
        assert!(outcome.errors[0].contains("missing or unreadable"));
    }

    #[tokio::test]
    async fn test_zero_byte_output_fails_validation() {
        let fx = Fixture::new();
        fx.probe.set(fx.input(), FileMetadata::file(100));
        fx.probe.set(fx.output(), FileMetadata::file(0));
        let exec = fx.executor(config(1), StructureValidators::empty());

        let outcome = exec.execute(&fx.task(), None).await;
        assert_eq!(outcome.failure, Some(FailureKind::ValidationFailure));
    }

    #[tokio::test]
    async fn test_override_args_come_last() {
        let fx = Fixture::new();
        fx.probe.set(fx.input(), FileMetadata::file(100));
        fx.probe.set(fx.output(), FileMetadata::file(80));
        let config = config(1).extra_args_for(fx.task().direction(), ["--toc"]);
        let exec = fx.executor(config, StructureValidators::empty());

        exec.execute(&fx.task().with_args(["--wrap=auto"]), None)
            .await;
        let calls = fx.engine.calls();
        assert_eq!(
            calls[0].args,
            vec!["--wrap=none", "--standalone", "--toc", "--wrap=auto"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let fx = Fixture::new();
        fx.probe.set(fx.input(), FileMetadata::file(100));
        let flag = CancellationFlag::new();
        flag.cancel();
        let exec = fx
            .executor(config(3), StructureValidators::empty())
            .with_cancellation(flag);
        let mut metrics = MetricsCollector::default();

        let outcome = exec.execute(&fx.task(), Some(&mut metrics)).await;
        assert!(!outcome.success);
        assert_eq!(outcome.failure, Some(FailureKind::Cancelled));
        assert_eq!(fx.engine.call_count(), 0);
        assert_eq!(metrics.failed_conversions, 1);
    }

    /// Fails every call with a non-retryable error, optionally raising a
    /// cancellation flag from inside the call.
    struct UnavailableEngine {
        cancel: Option<CancellationFlag>,
        calls: std::sync::atomic::AtomicU32,
    }

    impl UnavailableEngine {
        fn new(cancel: Option<CancellationFlag>) -> Self {
            Self {
                cancel,
                calls: std::sync::atomic::AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ConversionEngine for UnavailableEngine {
        fn name(&self) -> &str {
            "unavailable"
        }

        async fn verify(&self) -> Result<String> {
            Ok("unavailable 1.0".to_string())
        }

        async fn convert(&self, _request: &EngineRequest) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(flag) = &self.cancel {
                flag.cancel();
            }
            Err(ConversionError::EngineUnavailable("binary vanished".to_string()))
        }
    }

    #[tokio::test]
    async fn test_cancelled_during_attempt_stops_before_retry() {
        let fx = Fixture::new();
        fx.probe.set(fx.input(), FileMetadata::file(100));
        let flag = CancellationFlag::new();
        let engine = Arc::new(UnavailableEngine::new(Some(flag.clone())));
        let exec = ConversionTaskExecutor::new(
            Arc::new(config(3)),
            engine.clone(),
            fx.probe.clone(),
            Arc::new(StructureValidators::empty()),
        )
        .with_cancellation(flag);
        let mut metrics = MetricsCollector::default();

        let outcome = exec.execute(&fx.task(), Some(&mut metrics)).await;
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.failure, Some(FailureKind::Cancelled));
        assert_eq!(outcome.message, "Conversion cancelled after 1 attempt(s)");
        assert_eq!(engine.calls(), 1);
        assert_eq!(metrics.failed_conversions, 1);
    }

    #[tokio::test]
    async fn test_any_engine_error_is_retried() {
        let fx = Fixture::new();
        fx.probe.set(fx.input(), FileMetadata::file(100));
        let engine = Arc::new(UnavailableEngine::new(None));
        let exec = ConversionTaskExecutor::new(
            Arc::new(config(3)),
            engine.clone(),
            fx.probe.clone(),
            Arc::new(StructureValidators::empty()),
        );

        let outcome = exec.execute(&fx.task(), None).await;
        assert_eq!(outcome.attempts, 3);
        assert_eq!(engine.calls(), 3);
        assert_eq!(outcome.failure, Some(FailureKind::EngineFailure));
        assert!(outcome.message.contains("binary vanished"));
    }

    #[test]
    fn test_cancellation_flag_shared() {
        let flag = CancellationFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
        clone.reset();
        assert!(!flag.is_cancelled());
    }
}
