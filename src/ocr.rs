use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::layout::AnalyzeResult;

/// Layout-analysis collaborator: document bytes in, paragraphs and tables out.
#[async_trait]
pub trait LayoutAnalyzer: Send + Sync {
    async fn analyze(&self, name: &str, bytes: &[u8]) -> Result<AnalyzeResult>;
}

/// Client for a Document Intelligence style layout service.
pub struct DocIntelClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    api_version: String,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Debug, PartialEq)]
enum PollState {
    Running,
    Succeeded(Box<AnalyzeResult>),
}

impl DocIntelClient {
    pub fn from_env() -> Result<Self> {
        let endpoint = dotenv::var("DOC_INTEL_ENDPOINT").context("DOC_INTEL_ENDPOINT required")?;
        let api_key = dotenv::var("DOC_INTEL_API_KEY").context("DOC_INTEL_API_KEY required")?;
        let model = dotenv::var("DOC_INTEL_MODEL").unwrap_or_else(|_| "prebuilt-layout".to_string());
        let api_version =
            dotenv::var("DOC_INTEL_API_VERSION").unwrap_or_else(|_| "2024-11-30".to_string());
        let poll_secs = dotenv::var("DOC_INTEL_POLL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(2);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            model,
            api_version,
            poll_interval: Duration::from_secs(poll_secs),
            max_polls: 300,
        })
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/documentintelligence/documentModels/{}:analyze",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }

    async fn submit(&self, bytes: &[u8]) -> Result<String> {
        let resp = self
            .client
            .post(self.analyze_url())
            .query(&[("api-version", self.api_version.as_str())])
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("Content-Type", "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await
            .context("Layout analysis request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Layout service returned {}: {}", status, text);
        }

        resp.headers()
            .get("Operation-Location")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("Layout service response has no Operation-Location header"))
    }

    async fn poll(&self, operation: &str) -> Result<PollState> {
        let resp = self
            .client
            .get(operation)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .send()
            .await
            .context("Layout poll request failed")?;
        let status = resp.status();
        let text = resp.text().await.context("Failed to read layout poll response")?;
        if !status.is_success() {
            bail!("Layout poll returned {}: {}", status, text);
        }
        let json: serde_json::Value =
            serde_json::from_str(&text).context("Failed to parse layout poll JSON")?;
        poll_state(json)
    }
}

fn poll_state(mut json: serde_json::Value) -> Result<PollState> {
    let status = json["status"].as_str().unwrap_or("").to_string();
    match status.as_str() {
        "notStarted" | "running" => Ok(PollState::Running),
        "succeeded" => {
            let result: AnalyzeResult = serde_json::from_value(json["analyzeResult"].take())
                .context("Failed to decode analyzeResult")?;
            Ok(PollState::Succeeded(Box::new(result)))
        }
        "failed" => bail!("Layout analysis failed: {}", json["error"]),
        other => bail!("Unexpected layout analysis status `{}`", other),
    }
}

#[async_trait]
impl LayoutAnalyzer for DocIntelClient {
    async fn analyze(&self, name: &str, bytes: &[u8]) -> Result<AnalyzeResult> {
        let operation = self.submit(bytes).await?;
        debug!(blob = name, operation = %operation, "Layout analysis submitted");

        for attempt in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            if let PollState::Succeeded(result) = self.poll(&operation).await? {
                info!(
                    blob = name,
                    polls = attempt + 1,
                    paragraphs = result.paragraphs.len(),
                    tables = result.tables.len(),
                    "Layout analysis complete"
                );
                return Ok(*result);
            }
        }
        bail!("Layout analysis of {} did not finish after {} polls", name, self.max_polls)
    }
}

/// Reuses a stored result per blob name instead of analyzing again.
pub struct CachedAnalyzer<A> {
    inner: A,
    cache_dir: PathBuf,
}

impl<A: LayoutAnalyzer> CachedAnalyzer<A> {
    pub fn new(inner: A, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            cache_dir: cache_dir.into(),
        }
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", name.replace(['/', '\\'], "_")))
    }
}

#[async_trait]
impl<A: LayoutAnalyzer> LayoutAnalyzer for CachedAnalyzer<A> {
    async fn analyze(&self, name: &str, bytes: &[u8]) -> Result<AnalyzeResult> {
        let path = self.cache_path(name);
        if let Ok(cached) = tokio::fs::read(&path).await {
            match serde_json::from_slice(&cached) {
                Ok(result) => {
                    debug!(blob = name, path = %path.display(), "Layout result cache hit");
                    return Ok(result);
                }
                Err(e) => debug!(blob = name, error = %e, "Ignoring unreadable cached layout result"),
            }
        }

        let result = self.inner.analyze(name, bytes).await?;

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.cache_dir.display()))?;
        let json = serde_json::to_vec(&result).context("serialize AnalyzeResult")?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    struct CountingAnalyzer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LayoutAnalyzer for CountingAnalyzer {
        async fn analyze(&self, _name: &str, _bytes: &[u8]) -> Result<AnalyzeResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::from_value(json!({
                "paragraphs": [{
                    "content": "Acme Corp",
                    "spans": [{"offset": 0, "length": 9}],
                    "boundingRegions": [{"pageNumber": 1, "polygon": [0, 0, 1, 0, 1, 1, 0, 1]}],
                    "role": "title"
                }]
            }))?)
        }
    }

    #[test]
    fn running_and_succeeded_states() {
        assert_eq!(
            poll_state(json!({"status": "running"})).unwrap(),
            PollState::Running
        );
        let done = poll_state(json!({
            "status": "succeeded",
            "analyzeResult": {"paragraphs": [], "tables": []}
        }))
        .unwrap();
        assert_eq!(done, PollState::Succeeded(Box::default()));
    }

    #[test]
    fn failed_status_is_an_error() {
        let err = poll_state(json!({"status": "failed", "error": {"code": "InvalidContent"}}))
            .unwrap_err();
        assert!(err.to_string().contains("InvalidContent"));
    }

    #[tokio::test]
    async fn second_analysis_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cached = CachedAnalyzer::new(
            CountingAnalyzer {
                calls: AtomicUsize::new(0),
            },
            dir.path().join("layout"),
        );

        let first = cached.analyze("reports/10k.pdf", b"%PDF").await.unwrap();
        let second = cached.analyze("reports/10k.pdf", b"%PDF").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.paragraphs[0].role.as_deref(), Some("title"));
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("layout/reports_10k.pdf.json").exists());
    }
}
