//! Fields command implementation.

use crate::error::Result;
use crate::output::Formatter;
use finscribe_domain::SchemaDescriptor;
use finscribe_extractor::PipelineConfig;

/// Execute the fields command.
pub fn execute_fields(config: &PipelineConfig, formatter: &Formatter) -> Result<()> {
    let schema = SchemaDescriptor::parse(&config.response_schema.to_value()?)
        .map_err(finscribe_extractor::ExtractorError::from)?;

    println!(
        "{}",
        formatter.format_fields(&schema, &config.file_identifier_field)
    );
    if schema.field(&config.file_identifier_field).is_none() {
        println!(
            "{}",
            formatter.warning(&format!(
                "'{}' is not declared in the schema; it is added to every record",
                config.file_identifier_field
            ))
        );
    }
    Ok(())
}
