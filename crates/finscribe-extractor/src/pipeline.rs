//! Pipeline orchestrator: drives batches through extraction into the result set

use crate::accumulator::{BatchCommit, ResultSink};
use crate::batcher::Batcher;
use crate::client::{ExtractionClient, RecordRejection};
use crate::config::{FailurePolicy, PipelineSettings};
use crate::error::ExtractorError;
use crate::links::SourceLinks;
use crate::metrics::PipelineMetrics;
use finscribe_domain::{GenerationProvider, SourceText, TransactionRecord};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where the orchestrator is in a run.
///
/// `Failed` and `Cancelled` carry the index of the batch that was in flight;
/// every batch before it is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Not started
    Idle,
    /// Partitioning the input
    Batching,
    /// Waiting on the service for a batch
    Extracting(usize),
    /// Committing a batch's records
    Accumulating(usize),
    /// Every batch committed
    Done,
    /// Stopped on a terminal failure of a batch
    Failed(usize),
    /// Stopped on request before committing a batch
    Cancelled(usize),
}

impl PipelineState {
    /// True once the run can make no further progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_) | Self::Cancelled(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Batching => write!(f, "batching"),
            Self::Extracting(b) => write!(f, "extracting batch {}", b),
            Self::Accumulating(b) => write!(f, "accumulating batch {}", b),
            Self::Done => write!(f, "done"),
            Self::Failed(b) => write!(f, "failed at batch {}", b),
            Self::Cancelled(b) => write!(f, "cancelled before batch {}", b),
        }
    }
}

/// A batch committed without records after a terminal failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedBatch {
    /// Batch index
    pub index: usize,
    /// Source files whose transactions are missing from the result set
    pub files: Vec<String>,
    /// Failure that caused the skip
    pub reason: String,
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Batches in the input
    pub batch_count: usize,
    /// Batches that were already committed when the run started
    pub resumed_batches: usize,
    /// Batches skipped by the failure policy during this run
    pub skipped: Vec<SkippedBatch>,
    /// Records dropped by validation during this run
    pub rejected: Vec<RecordRejection>,
    /// Counters for this run
    pub metrics: PipelineMetrics,
}

/// Sequential batch orchestrator.
///
/// Batches are processed strictly in order, one service call at a time. A
/// batch is committed to the [`ResultSink`] exactly once, after a successful
/// extraction; nothing is committed for a batch that fails or is cancelled.
pub struct Pipeline<P>
where
    P: GenerationProvider,
{
    client: ExtractionClient<P>,
    settings: PipelineSettings,
    links: Option<SourceLinks>,
    state: PipelineState,
    metrics: PipelineMetrics,
}

impl<P> Pipeline<P>
where
    P: GenerationProvider,
{
    /// Create a pipeline from resolved settings
    pub fn new(provider: P, settings: PipelineSettings) -> Self {
        Self::with_shared_provider(Arc::new(provider), settings)
    }

    /// Create a pipeline around a provider that is shared elsewhere
    pub fn with_shared_provider(provider: Arc<P>, settings: PipelineSettings) -> Self {
        Self {
            client: ExtractionClient::with_shared_provider(provider, &settings),
            settings,
            links: None,
            state: PipelineState::Idle,
            metrics: PipelineMetrics::new(),
        }
    }

    /// Tag every committed record with its source document's link
    pub fn with_links(mut self, links: SourceLinks) -> Self {
        self.links = Some(links);
        self
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Metrics for the current or last run
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// The extraction client
    pub fn client(&self) -> &ExtractionClient<P> {
        &self.client
    }

    /// Run every batch not yet committed to `sink`.
    ///
    /// Resumes after the last batch committed to `sink`, provided those
    /// batches were built from the same input and batch size.
    ///
    /// # Errors
    ///
    /// - [`ExtractorError::Config`] for duplicate file identifiers or a sink
    ///   whose committed batches do not match the input.
    /// - [`ExtractorError::BatchFailed`] when a batch fails terminally and
    ///   the failure policy is abort. The state becomes `Failed(b)`.
    /// - [`ExtractorError::Cancelled`] when `cancel` fires. The state becomes
    ///   `Cancelled(b)`.
    /// - [`ExtractorError::Persistence`] when a commit cannot be written.
    ///
    /// Metrics, including elapsed time, are kept for failed runs too.
    pub async fn run<S>(
        &mut self,
        sources: &[SourceText],
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<RunReport, ExtractorError>
    where
        S: ResultSink,
    {
        let started = Instant::now();
        self.metrics = PipelineMetrics::new();
        let result = self.run_batches(sources, sink, cancel).await;
        self.metrics.elapsed = started.elapsed();

        match result {
            Ok(mut report) => {
                report.metrics = self.metrics.clone();
                info!("Pipeline finished. Final metrics:\n{}", self.metrics.summary());
                Ok(report)
            }
            Err(e) => {
                debug!("Pipeline stopped in state {}. Metrics:\n{}", self.state, self.metrics.summary());
                Err(e)
            }
        }
    }

    async fn run_batches<S>(
        &mut self,
        sources: &[SourceText],
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<RunReport, ExtractorError>
    where
        S: ResultSink,
    {
        self.state = PipelineState::Batching;

        let batcher = match self.prepare(sources, sink) {
            Ok(batcher) => batcher,
            Err(e) => {
                self.state = PipelineState::Idle;
                return Err(e);
            }
        };
        let batch_count = batcher.batch_count();
        let resume_from = sink.committed().len();
        self.metrics.record_resumed(resume_from);

        if resume_from > 0 {
            info!(
                "Resuming after {} committed batch(es) of {}",
                resume_from, batch_count
            );
        }
        info!(
            "Extracting {} source file(s) in {} batch(es) of up to {} using {}",
            sources.len(),
            batch_count,
            batcher.batch_size(),
            self.client.provider().model_name()
        );

        let mut skipped = Vec::new();
        let mut rejected = Vec::new();

        for batch in batcher.batches().skip(resume_from) {
            let index = batch.index;
            let files = batch.file_identifiers();

            if cancel.is_cancelled() {
                self.state = PipelineState::Cancelled(index);
                info!("Cancelled before batch {}; {} batch(es) committed", index, index);
                return Err(ExtractorError::Cancelled);
            }

            self.state = PipelineState::Extracting(index);
            info!(
                "Processing batch {}/{} ({})",
                index + 1,
                batch_count,
                files.join(", ")
            );

            let commit = match self.client.extract(&batch, cancel).await {
                Ok(extraction) => {
                    self.state = PipelineState::Accumulating(index);
                    self.metrics.record_extraction(&extraction);
                    rejected.extend(extraction.rejected);
                    BatchCommit {
                        index,
                        batch_size: batcher.batch_size(),
                        files,
                        records: self.enrich(extraction.records),
                        skipped: false,
                    }
                }
                Err(ExtractorError::Cancelled) => {
                    self.state = PipelineState::Cancelled(index);
                    info!("Cancelled during batch {}; {} batch(es) committed", index, index);
                    return Err(ExtractorError::Cancelled);
                }
                Err(ExtractorError::BatchFailed {
                    attempts,
                    backoff,
                    reason,
                    ..
                }) if self.settings.failure_policy == FailurePolicy::Skip => {
                    self.state = PipelineState::Accumulating(index);
                    self.metrics.record_failure(attempts, backoff);
                    warn!(
                        "Skipping batch {} (files: {}): {}",
                        index,
                        files.join(", "),
                        reason
                    );
                    self.metrics.record_skip();
                    skipped.push(SkippedBatch {
                        index,
                        files: files.clone(),
                        reason,
                    });
                    BatchCommit {
                        index,
                        batch_size: batcher.batch_size(),
                        files,
                        records: Vec::new(),
                        skipped: true,
                    }
                }
                Err(e) => {
                    self.state = PipelineState::Failed(index);
                    if let ExtractorError::BatchFailed {
                        attempts, backoff, ..
                    } = &e
                    {
                        self.metrics.record_failure(*attempts, *backoff);
                    }
                    error!(
                        "Batch {} failed (files: {}): {}. Halting with {} batch(es) committed",
                        index,
                        files.join(", "),
                        e,
                        index
                    );
                    return Err(e);
                }
            };

            if let Err(e) = sink.append(commit) {
                self.state = PipelineState::Failed(index);
                error!("Failed to commit batch {}: {}", index, e);
                return Err(e);
            }
        }

        self.state = PipelineState::Done;

        Ok(RunReport {
            batch_count,
            resumed_batches: resume_from,
            skipped,
            rejected,
            metrics: self.metrics.clone(),
        })
    }

    /// Partition the input and check it against what the sink already holds
    fn prepare<'a, S>(&self, sources: &'a [SourceText], sink: &S) -> Result<Batcher<'a>, ExtractorError>
    where
        S: ResultSink,
    {
        let mut seen = HashSet::new();
        for source in sources {
            if !seen.insert(source.file_identifier.as_str()) {
                return Err(ExtractorError::Config(format!(
                    "duplicate file identifier '{}' in input",
                    source.file_identifier
                )));
            }
        }

        let batcher = Batcher::new(sources, self.settings.batch_size)?;
        let committed = sink.committed();
        if committed.is_empty() {
            return Ok(batcher);
        }

        if let Some(batch_size) = sink.batch_size() {
            if batch_size != batcher.batch_size() {
                return Err(ExtractorError::Config(format!(
                    "existing results were produced with combination_count = {}, current value is {}",
                    batch_size,
                    batcher.batch_size()
                )));
            }
        }
        if committed.len() > batcher.batch_count() {
            return Err(ExtractorError::Config(format!(
                "existing results hold {} batches but the input only makes {}",
                committed.len(),
                batcher.batch_count()
            )));
        }
        for done in committed {
            let matches = batcher
                .batch(done.index)
                .map(|batch| batch.file_identifiers() == done.files)
                .unwrap_or(false);
            if !matches {
                return Err(ExtractorError::Config(format!(
                    "input changed since batch {} was committed (files: {})",
                    done.index,
                    done.files.join(", ")
                )));
            }
        }

        Ok(batcher)
    }

    fn enrich(&self, mut records: Vec<TransactionRecord>) -> Vec<TransactionRecord> {
        if let Some(links) = &self.links {
            let field = self.settings.file_identifier_field.as_str();
            for record in &mut records {
                let link = links.link_value(record.source(field).unwrap_or_default());
                record.set(self.settings.link_field.clone(), link);
            }
        }
        records
    }
}
