//! Per-run conversion metrics.
//!
//! Observability only: nothing here feeds back into conversion decisions.
//! Per-file entries are keyed by file name, so converting two files with the
//! same name into one collector keeps only the latest entry. Use
//! [`MetricsCollector::run_id`] to tell runs apart.

use crate::config::MetricsToggles;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// Start and end of one file's conversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConversionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ConversionWindow {
    pub fn seconds(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }
}

/// Sizes recorded for one file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FileSizes {
    pub original: u64,
    pub converted: u64,
    pub ratio: f64,
}

/// Accumulated metrics for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsCollector {
    run_id: Uuid,
    toggles: MetricsToggles,
    pub total_size_input: u64,
    pub total_size_output: u64,
    pub successful_conversions: u64,
    pub failed_conversions: u64,
    pub operation_times: Vec<f64>,
    pub conversion_times: HashMap<String, ConversionWindow>,
    pub file_sizes: HashMap<String, FileSizes>,
    pub errors: HashMap<String, String>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(MetricsToggles::default())
    }
}

impl MetricsCollector {
    pub fn new(toggles: MetricsToggles) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            toggles,
            total_size_input: 0,
            total_size_output: 0,
            successful_conversions: 0,
            failed_conversions: 0,
            operation_times: Vec::new(),
            conversion_times: HashMap::new(),
            file_sizes: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    /// Unique identifier of this run.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn toggles(&self) -> MetricsToggles {
        self.toggles
    }

    /// Change what gets tracked from now on. Already recorded entries stay.
    pub fn set_toggles(&mut self, toggles: MetricsToggles) {
        self.toggles = toggles;
    }

    pub fn add_input_size(&mut self, bytes: u64) {
        self.total_size_input += bytes;
    }

    pub fn add_output_size(&mut self, bytes: u64) {
        self.total_size_output += bytes;
    }

    pub fn record_success(&mut self) {
        self.successful_conversions += 1;
    }

    /// Count a failure and remember its message under `filename`.
    pub fn record_failure(&mut self, filename: impl Into<String>, message: impl Into<String>) {
        self.failed_conversions += 1;
        self.errors.insert(filename.into(), message.into());
    }

    /// Ignored unless time tracking is on.
    pub fn record_operation_time(&mut self, seconds: f64) {
        if self.toggles.track_time {
            self.operation_times.push(seconds);
        }
    }

    /// Ignored unless time tracking is on.
    pub fn record_conversion_window(
        &mut self,
        filename: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) {
        if self.toggles.track_time {
            self.conversion_times
                .insert(filename.into(), ConversionWindow { start, end });
        }
    }

    /// Ignored unless size tracking is on. The ratio is 0 for an empty original.
    pub fn record_file_sizes(&mut self, filename: impl Into<String>, original: u64, converted: u64) {
        if !self.toggles.track_sizes {
            return;
        }
        let ratio = if original == 0 {
            0.0
        } else {
            converted as f64 / original as f64
        };
        self.file_sizes.insert(
            filename.into(),
            FileSizes {
                original,
                converted,
                ratio,
            },
        );
    }

    /// Files that reached a terminal outcome.
    pub fn processed(&self) -> u64 {
        self.successful_conversions + self.failed_conversions
    }

    /// Fold another collector into this one. Entries from `other` win on key collisions.
    pub fn merge(&mut self, other: MetricsCollector) {
        self.total_size_input += other.total_size_input;
        self.total_size_output += other.total_size_output;
        self.successful_conversions += other.successful_conversions;
        self.failed_conversions += other.failed_conversions;
        self.operation_times.extend(other.operation_times);
        self.conversion_times.extend(other.conversion_times);
        self.file_sizes.extend(other.file_sizes);
        self.errors.extend(other.errors);
    }

    pub fn summary(&self) -> MetricsSummary {
        let processed = self.processed();
        let times = &self.operation_times;
        let total_time: f64 = times.iter().sum();

        MetricsSummary {
            run_id: self.run_id,
            processed,
            successful: self.successful_conversions,
            failed: self.failed_conversions,
            success_rate: if processed == 0 {
                0.0
            } else {
                self.successful_conversions as f64 / processed as f64
            },
            total_size_input: self.total_size_input,
            total_size_output: self.total_size_output,
            overall_ratio: if self.total_size_input == 0 {
                0.0
            } else {
                self.total_size_output as f64 / self.total_size_input as f64
            },
            total_time_seconds: total_time,
            average_time_seconds: if times.is_empty() {
                None
            } else {
                Some(total_time / times.len() as f64)
            },
            min_time_seconds: times.iter().copied().reduce(f64::min),
            max_time_seconds: times.iter().copied().reduce(f64::max),
        }
    }

    pub fn log_summary(&self) {
        let s = self.summary();
        info!(
            run_id = %s.run_id,
            processed = s.processed,
            successful = s.successful,
            failed = s.failed,
            "Conversion run: {:.0}% succeeded, {} -> {} bytes (ratio {:.2}), {:.2}s total",
            s.success_rate * 100.0,
            s.total_size_input,
            s.total_size_output,
            s.overall_ratio,
            s.total_time_seconds
        );
        for (file, message) in &self.errors {
            info!(run_id = %s.run_id, "  failed {}: {}", file, message);
        }
    }
}

/// Serializable roll-up of a collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub run_id: Uuid,
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub total_size_input: u64,
    pub total_size_output: u64,
    pub overall_ratio: f64,
    pub total_time_seconds: f64,
    pub average_time_seconds: Option<f64>,
    pub min_time_seconds: Option<f64>,
    pub max_time_seconds: Option<f64>,
}
