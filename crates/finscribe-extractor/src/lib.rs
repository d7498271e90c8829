//! Finscribe Extractor
//!
//! Turns the plain text of financial documents into a durable JSON array of
//! transaction records, using a schema-constrained generation service.
//!
//! # Overview
//!
//! Source texts are grouped into fixed-size batches. Each batch is rendered
//! into one prompt, sent to the service with the record schema, and the
//! returned records are validated one by one. Accepted records are appended
//! to the result set, which is persisted after every batch so that a crash
//! or a failed batch never loses work already committed.
//!
//! # Architecture
//!
//! ```text
//! SourceText → Batcher → ExtractionClient → GenerationProvider
//!                               ↓
//!                 validated records → ResultAccumulator → X.json
//! ```
//!
//! # Key Features
//!
//! - **Retry with backoff**: transient service failures are retried with a
//!   doubling delay that cancellation can interrupt
//! - **Per-record validation**: bad records are dropped and logged, the batch survives
//! - **Provenance**: every record names the source file it came from
//! - **Resume**: a checkpoint next to the output lets an interrupted run continue
//!
//! # Example Usage
//!
//! ```no_run
//! use finscribe_domain::SourceText;
//! use finscribe_extractor::{Pipeline, PipelineConfig, ResultAccumulator};
//! use finscribe_llm::MockProvider;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = PipelineConfig::from_file("finscribe.toml")?.resolve()?;
//! let sources = vec![SourceText::new("receipt.pdf", "Coffee 3.50 EUR")];
//!
//! let mut results = ResultAccumulator::load("transactions.json")?;
//! let mut pipeline = Pipeline::new(MockProvider::new("[]"), settings);
//! let report = pipeline
//!     .run(&sources, &mut results, &CancellationToken::new())
//!     .await?;
//!
//! println!("{}", report.metrics.summary());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod accumulator;
mod batcher;
mod client;
mod config;
mod error;
mod links;
mod metrics;
mod parser;
mod pipeline;
mod prompt;
mod retry;


pub use accumulator::{
    BatchCommit, Checkpoint, CommittedBatch, ResultAccumulator, ResultSink, CHECKPOINT_SUFFIX,
};
pub use batcher::{Batch, Batcher, Batches};
pub use client::{BatchExtraction, ExtractionClient, FailedAttempt, RecordRejection};
pub use config::{FailurePolicy, PipelineConfig, PipelineSettings, RawSchema};
pub use error::ExtractorError;
pub use links::{SourceLinks, LINK_NOT_AVAILABLE, LINK_NOT_FOUND};
pub use metrics::PipelineMetrics;
pub use parser::parse_service_response;
pub use pipeline::{Pipeline, PipelineState, RunReport, SkippedBatch};
pub use prompt::{render_batch_content, PromptTemplate, DEFAULT_EXTRACTION_PROMPT};
pub use retry::RetryPolicy;
