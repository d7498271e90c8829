//! Output formatting for the CLI.

use colored::*;
use finscribe_domain::SchemaDescriptor;
use finscribe_extractor::{Checkpoint, RunReport};
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

/// Output formatter.
pub struct Formatter {
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(color_enabled: bool) -> Self {
        Self { color_enabled }
    }

    /// Format the committed batches of a checkpoint as a table.
    pub fn format_checkpoint(&self, checkpoint: &Checkpoint) -> String {
        if checkpoint.batches.is_empty() {
            return self.colorize("No batches committed.", "yellow");
        }

        let mut builder = Builder::default();
        builder.push_record(["Batch", "Files", "Records", "Status"]);

        for batch in &checkpoint.batches {
            let status = if batch.skipped {
                self.colorize("skipped", "yellow")
            } else {
                self.colorize("committed", "green")
            };
            builder.push_record([
                batch.index.to_string(),
                batch.files.join("\n"),
                batch.records.to_string(),
                status,
            ]);
        }

        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));

        format!(
            "Run {} (combination_count = {})\n{}\n{} record(s) in {} batch(es)",
            checkpoint.run_id,
            checkpoint.batch_size,
            table,
            checkpoint.record_count(),
            checkpoint.batches.len()
        )
    }

    /// Format the schema's declared fields as a table.
    pub fn format_fields(&self, schema: &SchemaDescriptor, file_identifier_field: &str) -> String {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Type", "Required", "Description"]);

        for field in schema.fields() {
            let required = if field.required { "yes" } else { "" };
            let mut name = field.name.clone();
            if field.name == file_identifier_field {
                name.push_str(" *");
            }
            builder.push_record([
                name.as_str(),
                field.kind.as_str(),
                required,
                field.description.as_deref().unwrap_or(""),
            ]);
        }

        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));

        format!(
            "{}\nPrompt field list: {}",
            table,
            schema.field_list()
        )
    }

    /// Format the outcome of a completed run.
    pub fn format_report(&self, report: &RunReport) -> String {
        let mut lines = vec![report.metrics.summary()];

        for skipped in &report.skipped {
            lines.push(self.warning(&format!(
                "Batch {} skipped (files: {}): {}",
                skipped.index,
                skipped.files.join(", "),
                skipped.reason
            )));
        }

        if !report.rejected.is_empty() {
            let mut builder = Builder::default();
            builder.push_record(["Batch", "Position", "Files", "Reason"]);
            for rejection in &report.rejected {
                builder.push_record([
                    rejection.batch_index.to_string(),
                    rejection.position.to_string(),
                    rejection.files.join(", "),
                    rejection.reason.clone(),
                ]);
            }
            let mut table = builder.build();
            table.with(Style::rounded());
            lines.push(self.warning(&format!(
                "{} record(s) dropped by validation:",
                report.rejected.len()
            )));
            lines.push(table.to_string());
        }

        lines.join("\n")
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an error message.
    pub fn error(&self, message: &str) -> String {
        self.colorize(&format!("✗ {}", message), "red")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "red" => text.red().to_string(),
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            _ => text.to_string(),
        }
    }
}
