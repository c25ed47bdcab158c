mod commands;
mod extract;
mod layout;
mod llm;
mod ocr;
mod processing;
mod rag;
mod state;
mod store;

use clap::Parser;
use tracing::{error, Level};

use commands::{Command, PipelineArgs};

/// Income-statement extraction from financial filings
#[derive(Debug, Parser)]
#[command(name = "fin-scraper", version)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load env before clap reads env-backed arguments
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = commands::run(cli.command, cli.pipeline.into()).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}
