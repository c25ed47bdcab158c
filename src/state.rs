use std::sync::Arc;
use std::time::Duration;

use crate::extract::classify::default_workers;
use crate::extract::RetryPolicy;
use crate::llm::Oracle;
use crate::ocr::LayoutAnalyzer;
use crate::store::{ObjectStore, SearchIndex};

/// Retry budgets and concurrency for the extraction pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub classify_attempts: u32,
    /// Classification and unit-scale retries wait `backoff * 2^attempt`.
    pub classify_backoff: Duration,
    pub stage_attempts: u32,
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classify_attempts: 3,
            classify_backoff: Duration::from_secs(1),
            stage_attempts: 3,
            workers: default_workers(),
        }
    }
}

impl PipelineConfig {
    pub fn response_policy(&self) -> RetryPolicy {
        RetryPolicy::response(self.classify_attempts, self.classify_backoff)
    }

    pub fn stage_policy(&self) -> RetryPolicy {
        RetryPolicy::stage(self.stage_attempts)
    }
}

/// Collaborators shared by every command.
pub struct AppState {
    pub oracle: Arc<dyn Oracle>,
    pub analyzer: Arc<dyn LayoutAnalyzer>,
    pub store: Arc<dyn ObjectStore>,
    pub index: Arc<dyn SearchIndex>,
    pub config: PipelineConfig,
}
