use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::types::{IndexRecord, RecordFilter, SearchHit};

/// Keyword-searchable store of document segments.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn query(&self, text: &str, filter: &RecordFilter, top: usize) -> Result<Vec<SearchHit>>;
    /// Insert or replace records by id.
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<()>;
    /// Drop every record of a blob, returning how many were removed.
    async fn delete_blob(&self, blob_name: &str) -> Result<usize>;
    async fn max_id(&self) -> Result<Option<u64>>;
    async fn contains_blob(&self, blob_name: &str) -> Result<bool>;
}

/// All records in memory keyed by id, persisted as one JSON array after every write.
pub struct JsonIndex {
    path: PathBuf,
    records: RwLock<BTreeMap<u64, IndexRecord>>,
}

impl JsonIndex {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let records: Vec<IndexRecord> = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse index {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        Ok(Self {
            path: path.to_path_buf(),
            records: RwLock::new(records.into_iter().map(|r| (r.id, r)).collect()),
        })
    }

    pub async fn from_env() -> Result<Self> {
        let data_dir = dotenv::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());
        Self::open(&Path::new(&data_dir).join("index.json")).await
    }

    async fn persist(&self, records: &BTreeMap<u64, IndexRecord>) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        let rows: Vec<&IndexRecord> = records.values().collect();
        let json = serde_json::to_vec(&rows).context("serialize index")?;
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

/// Lowercased query words of two or more characters, each kept once.
fn keywords(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| w.len() >= 2 && seen.insert(w.clone()))
        .collect()
}

#[async_trait]
impl SearchIndex for JsonIndex {
    /// OR-match on keywords; records containing more of them rank first.
    async fn query(&self, text: &str, filter: &RecordFilter, top: usize) -> Result<Vec<SearchHit>> {
        let keywords = keywords(text);
        if keywords.is_empty() {
            return Ok(vec![]);
        }

        let records = self.records.read().await;
        let mut hits: Vec<SearchHit> = records
            .values()
            .filter(|r| filter.matches(r))
            .filter_map(|r| {
                let lower = r.text.to_lowercase();
                let match_count = keywords.iter().filter(|k| lower.contains(k.as_str())).count();
                (match_count > 0).then(|| SearchHit {
                    record: r.clone(),
                    match_count,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.match_count
                .cmp(&a.match_count)
                .then(a.record.id.cmp(&b.record.id))
        });
        hits.truncate(top);
        debug!(query = text, hits = hits.len(), "index queried");
        Ok(hits)
    }

    async fn upsert(&self, new: Vec<IndexRecord>) -> Result<()> {
        let mut records = self.records.write().await;
        let count = new.len();
        for record in new {
            records.insert(record.id, record);
        }
        self.persist(&records).await?;
        debug!(count, total = records.len(), "index records upserted");
        Ok(())
    }

    async fn delete_blob(&self, blob_name: &str) -> Result<usize> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.blob_name != blob_name);
        let removed = before - records.len();
        if removed > 0 {
            self.persist(&records).await?;
        }
        debug!(blob = blob_name, removed, "index records deleted");
        Ok(removed)
    }

    async fn max_id(&self) -> Result<Option<u64>> {
        Ok(self.records.read().await.keys().next_back().copied())
    }

    async fn contains_blob(&self, blob_name: &str) -> Result<bool> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .any(|r| r.blob_name == blob_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, text: &str, blob: &str, is_table: bool) -> IndexRecord {
        IndexRecord {
            id,
            text: text.to_string(),
            document_group_id: "g".into(),
            document_id: format!("d{id}"),
            bounding_regions: "[]".into(),
            blob_name: blob.to_string(),
            is_table,
            company_name: "Acme Corp".into(),
            fiscal_year: Some("2023".into()),
            quarter: None,
        }
    }

    async fn seeded(dir: &Path) -> JsonIndex {
        let index = JsonIndex::open(&dir.join("index.json")).await.unwrap();
        index
            .upsert(vec![
                record(1, "Total revenue grew 10% year over year.", "a.pdf", false),
                record(2, "Net income and total revenue by segment", "a.pdf", true),
                record(3, "Risk factors include competition.", "b.pdf", false),
            ])
            .await
            .unwrap();
        index
    }

    #[test]
    fn keywords_are_deduplicated_and_trimmed() {
        assert_eq!(keywords("Revenue, revenue? a Net"), vec!["revenue", "net"]);
    }

    #[tokio::test]
    async fn ranks_by_matched_keywords() {
        let dir = tempfile::tempdir().unwrap();
        let index = seeded(dir.path()).await;

        let hits = index
            .query("net revenue", &RecordFilter::default(), 10)
            .await
            .unwrap();
        let ids: Vec<u64> = hits.iter().map(|h| h.record.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(hits[0].match_count, 2);
    }

    #[tokio::test]
    async fn filters_are_exact() {
        let dir = tempfile::tempdir().unwrap();
        let index = seeded(dir.path()).await;
        let filter = RecordFilter {
            is_table: Some(false),
            ..Default::default()
        };
        let hits = index.query("revenue", &filter, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, 1);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = seeded(dir.path()).await;
            index
                .upsert(vec![record(3, "Replaced text", "b.pdf", false)])
                .await
                .unwrap();
            assert_eq!(index.delete_blob("a.pdf").await.unwrap(), 2);
            assert_eq!(index.delete_blob("a.pdf").await.unwrap(), 0);
        }

        let reopened = JsonIndex::open(&dir.path().join("index.json")).await.unwrap();
        assert_eq!(reopened.max_id().await.unwrap(), Some(3));
        assert!(reopened.contains_blob("b.pdf").await.unwrap());
        assert!(!reopened.contains_blob("a.pdf").await.unwrap());
        let hits = reopened
            .query("replaced", &RecordFilter::default(), 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(reopened
            .query("growth grew", &RecordFilter::default(), 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn large_batches_replace_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let index = JsonIndex::open(&dir.path().join("index.json")).await.unwrap();
        let batch: Vec<IndexRecord> = (0..5_000)
            .map(|id| record(id, "segment text", "big.pdf", false))
            .collect();
        index.upsert(batch).await.unwrap();

        let replacements: Vec<IndexRecord> = (0..5_000)
            .step_by(2)
            .map(|id| record(id, "restated amounts", "big.pdf", true))
            .collect();
        index.upsert(replacements).await.unwrap();

        let reopened = JsonIndex::open(&dir.path().join("index.json")).await.unwrap();
        assert_eq!(reopened.max_id().await.unwrap(), Some(4_999));
        let restated = reopened
            .query("restated", &RecordFilter::default(), 10_000)
            .await
            .unwrap();
        assert_eq!(restated.len(), 2_500);
        assert!(restated.iter().all(|h| h.record.id % 2 == 0 && h.record.is_table));
        let total = reopened
            .query("segment restated", &RecordFilter::default(), 10_000)
            .await
            .unwrap();
        assert_eq!(total.len(), 5_000);
    }

    #[tokio::test]
    async fn empty_index_has_no_max_id() {
        let dir = tempfile::tempdir().unwrap();
        let index = JsonIndex::open(&dir.path().join("nested/index.json")).await.unwrap();
        assert_eq!(index.max_id().await.unwrap(), None);
        assert!(!index.contains_blob("a.pdf").await.unwrap());
    }
}
