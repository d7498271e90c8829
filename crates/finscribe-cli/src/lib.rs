//! Finscribe CLI library.
//!
//! This library provides the core functionality for the `finscribe` command-line
//! interface: configuration loading, reading the text-extraction output,
//! command execution and output formatting.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod input;
pub mod output;

pub use cli::{Cli, Command};
pub use error::{CliError, Result};
pub use output::Formatter;
