//! Metrics collection for pipeline runs

use crate::client::BatchExtraction;
use std::time::Duration;

/// Counters collected while a pipeline runs
///
/// Only counts work done by the current process: batches restored from a
/// checkpoint are reported separately as `resumed_batches`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineMetrics {
    /// Batches already committed by an earlier run
    pub resumed_batches: usize,

    /// Batches committed with records in this run
    pub committed_batches: usize,

    /// Batches committed as skipped after a terminal failure
    pub skipped_batches: usize,

    /// Records that passed validation
    pub accepted_records: usize,

    /// Records dropped by validation
    pub rejected_records: usize,

    /// Service calls that failed, whether or not the batch later succeeded
    pub failed_attempts: usize,

    /// Time spent waiting between attempts
    pub total_backoff: Duration,

    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl PipelineMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a batch restored from a checkpoint
    pub fn record_resumed(&mut self, batches: usize) {
        self.resumed_batches += batches;
    }

    /// Record a successfully extracted and committed batch
    pub fn record_extraction(&mut self, extraction: &BatchExtraction) {
        self.committed_batches += 1;
        self.accepted_records += extraction.records.len();
        self.rejected_records += extraction.rejected.len();
        self.failed_attempts += extraction.failed_attempts.len();
        self.total_backoff += extraction
            .failed_attempts
            .iter()
            .map(|attempt| attempt.delay)
            .sum::<Duration>();
    }

    /// Record a batch that failed terminally after `attempts` failed calls
    pub fn record_failure(&mut self, attempts: u32, backoff: Duration) {
        self.failed_attempts += attempts as usize;
        self.total_backoff += backoff;
    }

    /// Record a batch committed as skipped
    pub fn record_skip(&mut self) {
        self.skipped_batches += 1;
    }

    /// Batches processed by this run, committed or skipped
    pub fn processed_batches(&self) -> usize {
        self.committed_batches + self.skipped_batches
    }

    /// Generate a summary report of metrics
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Pipeline Metrics Summary".to_string(),
            "========================".to_string(),
            format!("Batches committed: {}", self.committed_batches),
        ];

        if self.resumed_batches > 0 {
            lines.push(format!("Batches resumed: {}", self.resumed_batches));
        }
        if self.skipped_batches > 0 {
            lines.push(format!("Batches skipped: {}", self.skipped_batches));
        }

        lines.push(format!("Records accepted: {}", self.accepted_records));
        lines.push(format!("Records rejected: {}", self.rejected_records));

        if self.failed_attempts > 0 {
            lines.push(format!(
                "Failed attempts: {} ({:.1?} backoff)",
                self.failed_attempts, self.total_backoff
            ));
        }

        lines.push(format!("Elapsed: {:.1?}", self.elapsed));
        lines.join("\n")
    }
}
