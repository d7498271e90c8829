//! Finscribe CLI - Extract financial transactions from document text.

use clap::Parser;
use finscribe_cli::commands;
use finscribe_cli::{config, Cli, Command, Formatter};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing (log to stderr, RUST_LOG wins over -v)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .init();

    let formatter = Formatter::new(!cli.no_color);
    if let Err(e) = run(cli, &formatter).await {
        eprintln!("{}", formatter.error(&e.to_string()));
        std::process::exit(1);
    }
}

async fn run(cli: Cli, formatter: &Formatter) -> finscribe_cli::Result<()> {
    match cli.command {
        Command::Run(args) => {
            let config = config::load(&cli.config)?;

            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Shutdown signal received, cancelling run");
                    trigger.cancel();
                }
            });

            commands::execute_run(args, &config, formatter, cancel).await?;
        }
        Command::Status(args) => {
            commands::execute_status(args, formatter)?;
        }
        Command::Fields => {
            let config = config::load(&cli.config)?;
            commands::execute_fields(&config, formatter)?;
        }
    }

    Ok(())
}
