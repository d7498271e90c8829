//! Status command implementation.

use crate::cli::StatusArgs;
use crate::error::Result;
use crate::output::Formatter;
use finscribe_extractor::ResultAccumulator;

/// Execute the status command.
pub fn execute_status(args: StatusArgs, formatter: &Formatter) -> Result<()> {
    let results = ResultAccumulator::load(&args.output)?;

    if results.checkpoint().batches.is_empty() {
        println!(
            "{}",
            formatter.info(&format!("No results at {}", args.output.display()))
        );
        return Ok(());
    }

    println!("{}", formatter.format_checkpoint(results.checkpoint()));

    let skipped: Vec<String> = results
        .checkpoint()
        .skipped()
        .map(|b| format!("{} ({})", b.index, b.files.join(", ")))
        .collect();
    if !skipped.is_empty() {
        println!(
            "{}",
            formatter.warning(&format!(
                "Skipped batches: {}. Use --fresh to process them again",
                skipped.join("; ")
            ))
        );
    }

    Ok(())
}
