//! Run command implementation.

use crate::cli::RunArgs;
use crate::error::Result;
use crate::input::load_sources;
use crate::output::Formatter;
use finscribe_domain::GenerationProvider;
use finscribe_extractor::{
    ExtractorError, Pipeline, PipelineConfig, ResultAccumulator, RunReport, SourceLinks,
};
use finscribe_llm::GeminiProvider;
use tokio_util::sync::CancellationToken;

/// Execute the run command against the configured Gemini model.
pub async fn execute_run(
    args: RunArgs,
    config: &PipelineConfig,
    formatter: &Formatter,
    cancel: CancellationToken,
) -> Result<()> {
    // Validate everything before any network activity
    config.resolve()?;

    let provider = GeminiProvider::new(config.api_key(), config.model_name.trim())?
        .with_endpoint(config.api_base.as_str())
        .with_timeout(config.request_timeout())?;

    run_with_provider(args, config, provider, formatter, cancel).await?;
    Ok(())
}

/// Run the pipeline with any generation provider.
pub async fn run_with_provider<P>(
    args: RunArgs,
    config: &PipelineConfig,
    provider: P,
    formatter: &Formatter,
    cancel: CancellationToken,
) -> Result<RunReport>
where
    P: GenerationProvider,
{
    let settings = config.resolve()?;
    let sources = load_sources(&args.input)?;

    let mut pipeline = Pipeline::new(provider, settings);
    if let Some(metadata) = &args.metadata {
        let links = SourceLinks::from_file(metadata)?;
        println!("{}", formatter.info(&format!("Loaded links for {} files", links.len())));
        pipeline = pipeline.with_links(links);
    }

    let mut results = if args.fresh {
        ResultAccumulator::create(&args.output)?
    } else {
        ResultAccumulator::load(&args.output)?
    };
    if !results.checkpoint().batches.is_empty() {
        println!(
            "{}",
            formatter.info(&format!(
                "Resuming {} after {} committed batch(es)",
                args.output.display(),
                results.checkpoint().batches.len()
            ))
        );
    }

    println!(
        "{}",
        formatter.info(&format!(
            "Processing {} source file(s) from {}",
            sources.len(),
            args.input.display()
        ))
    );

    match pipeline.run(&sources, &mut results, &cancel).await {
        Ok(report) => {
            println!("{}", formatter.format_report(&report));
            println!(
                "{}",
                formatter.success(&format!(
                    "Wrote {} transaction(s) to {}",
                    results.records().len(),
                    args.output.display()
                ))
            );
            Ok(report)
        }
        Err(e) => {
            match &e {
                ExtractorError::BatchFailed { batch_index, .. } => {
                    eprintln!(
                        "{}",
                        formatter.warning(&format!(
                            "{} record(s) from {} batch(es) are saved in {}. Run the same command again to resume at batch {}",
                            results.records().len(),
                            results.checkpoint().batches.len(),
                            args.output.display(),
                            batch_index
                        ))
                    );
                }
                ExtractorError::Cancelled => {
                    eprintln!(
                        "{}",
                        formatter.warning(&format!(
                            "Cancelled. {} record(s) from {} batch(es) are saved in {}",
                            results.records().len(),
                            results.checkpoint().batches.len(),
                            args.output.display()
                        ))
                    );
                }
                _ => {}
            }
            Err(e.into())
        }
    }
}
