mod ask;
mod blobs;
mod layout;
mod process;
mod unindex;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::llm::LlmClient;
use crate::ocr::{CachedAnalyzer, DocIntelClient};
use crate::state::{AppState, PipelineConfig};
use crate::store::{JsonIndex, LocalObjectStore};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Extract and aggregate income statements from stored documents
    Process {
        /// Blob names, in the order their periods should be aggregated
        #[arg(required = true)]
        blobs: Vec<String>,
    },
    /// Print the reading-ordered segments of a saved layout-analysis result
    Layout {
        /// Path to an analyzeResult JSON file
        path: PathBuf,
        /// Print whole segments instead of their first line
        #[arg(long)]
        full: bool,
    },
    /// Store a local file in the object store
    Upload {
        file: PathBuf,
        /// Blob name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// List stored blobs
    List {
        #[arg(long)]
        suffix: Option<String>,
    },
    /// Print a signed read URL for a blob
    Url {
        name: String,
        #[arg(long, default_value_t = 24)]
        ttl_hours: i64,
    },
    /// Download a blob through a signed read URL
    Fetch {
        url: String,
        /// Destination file (defaults to the blob name)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Drop a blob's segments from the search index
    Unindex { blob: String },
    /// Answer a question from indexed document segments
    Ask {
        question: String,
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
}

/// Retry budgets, overridable per run.
#[derive(Debug, Clone, Args)]
pub struct PipelineArgs {
    #[arg(long, env = "CLASSIFY_ATTEMPTS", default_value_t = 3)]
    pub classify_attempts: u32,
    /// Base of the exponential backoff between classification retries
    #[arg(long, env = "CLASSIFY_BACKOFF_SECS", default_value_t = 1)]
    pub classify_backoff_secs: u64,
    #[arg(long, env = "STAGE_ATTEMPTS", default_value_t = 3)]
    pub stage_attempts: u32,
    /// Concurrent classification calls (defaults to available parallelism)
    #[arg(long, env = "CLASSIFY_WORKERS")]
    pub workers: Option<usize>,
}

impl From<PipelineArgs> for PipelineConfig {
    fn from(args: PipelineArgs) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            classify_attempts: args.classify_attempts.max(1),
            classify_backoff: Duration::from_secs(args.classify_backoff_secs),
            stage_attempts: args.stage_attempts.max(1),
            workers: args.workers.unwrap_or(defaults.workers).max(1),
        }
    }
}

async fn build_state(config: PipelineConfig) -> Result<AppState> {
    let data_dir = PathBuf::from(dotenv::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()));
    Ok(AppState {
        oracle: Arc::new(LlmClient::from_env()?),
        analyzer: Arc::new(CachedAnalyzer::new(
            DocIntelClient::from_env()?,
            data_dir.join("layout"),
        )),
        store: Arc::new(LocalObjectStore::from_env()?),
        index: Arc::new(JsonIndex::from_env().await?),
        config,
    })
}

pub async fn run(command: Command, config: PipelineConfig) -> Result<()> {
    match command {
        Command::Process { blobs } => {
            let state = build_state(config).await?;
            process::process(&state, &blobs).await
        }
        Command::Layout { path, full } => layout::layout(&path, full).await,
        Command::Upload { file, name } => {
            blobs::upload(&LocalObjectStore::from_env()?, &file, name.as_deref()).await
        }
        Command::List { suffix } => blobs::list(&LocalObjectStore::from_env()?, suffix.as_deref()).await,
        Command::Url { name, ttl_hours } => {
            blobs::url(&LocalObjectStore::from_env()?, &name, ttl_hours).await
        }
        Command::Fetch { url, out } => {
            blobs::fetch(&LocalObjectStore::from_env()?, &url, out.as_deref()).await
        }
        Command::Unindex { blob } => unindex::unindex(&JsonIndex::from_env().await?, &blob).await,
        Command::Ask { question, top } => {
            let oracle = LlmClient::from_env()?;
            let index = JsonIndex::from_env().await?;
            ask::ask(&oracle, &index, &question, top).await
        }
    }
}
