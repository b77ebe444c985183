//! Scriptable conversion engine.

use super::lock;
use crate::engine::{ConversionEngine, EngineRequest};
use crate::error::{ConversionError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// What the mock does on one `convert` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockStep {
    /// Report success without touching the filesystem.
    Succeed,
    /// Write these bytes to the request's output path.
    Write(Vec<u8>),
    /// Return an engine failure with this message.
    Fail(String),
}

/// Mock implementation of [`ConversionEngine`].
///
/// Queued steps are consumed one per call; once the queue is empty every
/// call uses the default step.
///
/// ```rust,ignore
/// let engine = MockEngine::writing(b"converted".repeat(10));
/// engine.push_step(MockStep::Fail("exit 1".into()));
/// engine.push_step(MockStep::Fail("exit 1".into()));
/// // Third call writes 90 bytes.
/// ```
#[derive(Debug)]
pub struct MockEngine {
    steps: Mutex<VecDeque<MockStep>>,
    default_step: Mutex<MockStep>,
    calls: Mutex<Vec<EngineRequest>>,
    version: Mutex<Option<String>>,
    verify_calls: Mutex<usize>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Succeeds without writing and reports version `pandoc 3.1.11`.
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            default_step: Mutex::new(MockStep::Succeed),
            calls: Mutex::new(Vec::new()),
            version: Mutex::new(Some("pandoc 3.1.11".to_string())),
            verify_calls: Mutex::new(0),
        }
    }

    /// Writes `bytes` to every output by default.
    pub fn writing(bytes: impl Into<Vec<u8>>) -> Self {
        let engine = Self::new();
        engine.set_default(MockStep::Write(bytes.into()));
        engine
    }

    /// Behaves as if pandoc is not installed.
    pub fn missing() -> Self {
        let engine = Self::new();
        engine.set_version(None);
        engine
    }

    pub fn set_default(&self, step: MockStep) {
        *lock(&self.default_step) = step;
    }

    /// Queue a step for the next unscripted call.
    pub fn push_step(&self, step: MockStep) {
        lock(&self.steps).push_back(step);
    }

    /// Every call fails with `message`.
    pub fn fail_always(&self, message: impl Into<String>) {
        lock(&self.steps).clear();
        self.set_default(MockStep::Fail(message.into()));
    }

    /// `None` makes `verify` fail with `EngineNotFound`.
    pub fn set_version(&self, version: Option<String>) {
        *lock(&self.version) = version;
    }

    /// Number of `convert` calls.
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Recorded `convert` requests in call order.
    pub fn calls(&self) -> Vec<EngineRequest> {
        lock(&self.calls).clone()
    }

    pub fn verify_count(&self) -> usize {
        *lock(&self.verify_calls)
    }

    fn next_step(&self) -> MockStep {
        lock(&self.steps)
            .pop_front()
            .unwrap_or_else(|| lock(&self.default_step).clone())
    }
}

#[async_trait]
impl ConversionEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn verify(&self) -> Result<String> {
        *lock(&self.verify_calls) += 1;
        lock(&self.version)
            .clone()
            .ok_or(ConversionError::EngineNotFound)
    }

    async fn convert(&self, request: &EngineRequest) -> Result<()> {
        lock(&self.calls).push(request.clone());

        match self.next_step() {
            MockStep::Succeed => Ok(()),
            MockStep::Write(bytes) => {
                std::fs::write(&request.output, bytes)?;
                Ok(())
            }
            MockStep::Fail(message) => Err(ConversionError::EngineFailure {
                path: request.input.clone(),
                message,
            }),
        }
    }
}
