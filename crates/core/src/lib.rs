//! # docconv-core
//!
//! Retrying, validating document conversion built on pandoc.
//!
//! Every conversion goes through the same pipeline:
//!
//! - **probe** the input (a missing input fails immediately)
//! - **convert** with pandoc, writing through a temp file
//! - **validate** the output size, size ratio and structure
//! - **retry** the whole conversion on failure, up to `max_attempts`
//!
//! and every outcome is recorded in a per-run [`MetricsCollector`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docconv_core::{ConversionConfig, ConversionService, DocumentFormat};
//!
//! #[tokio::main]
//! async fn main() -> docconv_core::Result<()> {
//!     let mut service = ConversionService::new(ConversionConfig::default())?;
//!
//!     let init = service.initialize().await;
//!     if !init.success {
//!         eprintln!("pandoc unavailable: {:?}", init.error);
//!         return Ok(());
//!     }
//!
//!     let outcome = service
//!         .convert_one("README.md", DocumentFormat::Docx, None)
//!         .await;
//!     println!("{}", outcome.message);
//!     Ok(())
//! }
//! ```
//!
//! ## Batch Conversion
//!
//! ```rust,no_run
//! use docconv_core::{BatchRequest, ConversionConfig, ConversionService, DocumentFormat};
//!
//! #[tokio::main]
//! async fn main() -> docconv_core::Result<()> {
//!     let config = ConversionConfig::default().retry(2, 0.5).concurrency(4);
//!     let mut service = ConversionService::new(config)?;
//!     service.initialize().await;
//!
//!     // Every *.md under ./docs, mirrored into ./build
//!     let request = BatchRequest::new("./docs", DocumentFormat::Html)
//!         .output_dir("./build")
//!         .recursive(true);
//!     let outcome = service.convert_directory(request).await;
//!
//!     println!("{}", outcome.message);
//!     for failed in outcome.failures() {
//!         println!("  {:?}: {}", failed.input_path, failed.message);
//!     }
//!     println!("{}", serde_json::to_string_pretty(&service.metrics().summary()).unwrap());
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod format;
pub mod metrics;
pub mod probe;
pub mod retry;
pub mod service;
pub mod structure;
pub mod validation;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types for convenience
pub use batch::{BatchConverter, BatchRequest};
pub use config::{
    BatchOutcome, ConversionConfig, ConversionOutcome, ConversionTask, InitializeOutcome,
    RetryPolicy, ToolOptions, ValidationThresholds,
};
pub use engine::{ConversionEngine, EngineRequest, EngineSettings, PandocEngine};
pub use error::{ConversionError, FailureKind, Result};
pub use executor::{CancellationFlag, ConversionTaskExecutor};
pub use format::{ConversionDirection, DocumentFormat};
pub use metrics::{MetricsCollector, MetricsSummary};
pub use probe::{DirectoryLister, FileMetadata, FileMetadataProbe, FsProbe, WalkDirLister};
pub use service::{ConversionService, ServiceState};
pub use structure::{StructureValidator, StructureValidators};
pub use validation::{ValidationOutcome, ValidationPolicy};

/// Check if a file extension maps to a supported format.
pub fn is_supported_extension(ext: &str) -> bool {
    DocumentFormat::from_extension(ext).is_some()
}

/// Initialize the library's logging.
/// Call this once at application startup if you want to see logs.
pub fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();
}
