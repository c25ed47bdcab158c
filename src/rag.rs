use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info};

use crate::extract::prompts;
use crate::layout::StructuredDocument;
use crate::llm::Oracle;
use crate::store::{IndexRecord, RecordFilter, SearchIndex};

const NO_CONTEXT: &str = "No relevant information found.";

/// Document-level fields stamped on every indexed segment.
#[derive(Debug, Clone, Default)]
pub struct DocumentLabels {
    pub blob_name: String,
    pub company_name: String,
    pub fiscal_year: Option<String>,
}

fn batch_id(blob_name: &str, salt: &str) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let hash = blake3::hash(format!("{}:{}:{}", blob_name, salt, nanos).as_bytes());
    hash.to_hex().as_str()[..16].to_string()
}

/// Upload every segment of `doc` to the index. Returns the number of records
/// written, or 0 when the blob was indexed before.
pub async fn index_segments(
    index: &dyn SearchIndex,
    doc: &StructuredDocument,
    labels: &DocumentLabels,
) -> Result<usize> {
    if index.contains_blob(&labels.blob_name).await? {
        info!(blob = %labels.blob_name, "Blob already indexed, skipping upload");
        return Ok(0);
    }

    let next_id = index.max_id().await?.map_or(1, |max| max + 1);
    let document_group_id = batch_id(&labels.blob_name, "group");
    let document_id = batch_id(&labels.blob_name, "document");

    let records = doc
        .segments
        .iter()
        .zip(doc.table_indicator())
        .enumerate()
        .map(|(i, (segment, is_table))| {
            Ok(IndexRecord {
                id: next_id + i as u64,
                text: segment.content().to_string(),
                document_group_id: document_group_id.clone(),
                document_id: document_id.clone(),
                bounding_regions: segment
                    .source_json()
                    .context("serialize segment sources")?,
                blob_name: labels.blob_name.clone(),
                is_table,
                company_name: labels.company_name.clone(),
                fiscal_year: labels.fiscal_year.clone(),
                quarter: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let count = records.len();
    index.upsert(records).await.context("Failed to upload segments")?;
    info!(blob = %labels.blob_name, count, first_id = next_id, "Segments indexed");
    Ok(count)
}

/// Remove a blob's segments so the next run indexes it afresh.
pub async fn forget_blob(index: &dyn SearchIndex, blob_name: &str) -> Result<usize> {
    let removed = index
        .delete_blob(blob_name)
        .await
        .with_context(|| format!("Failed to remove {} from the index", blob_name))?;
    if removed == 0 {
        debug!(blob = blob_name, "Blob was not indexed");
    } else {
        info!(blob = blob_name, removed, "Segments removed");
    }
    Ok(removed)
}

/// Answer from the top `top` matching segments.
pub async fn answer_question(
    oracle: &dyn Oracle,
    index: &dyn SearchIndex,
    question: &str,
    top: usize,
) -> Result<String> {
    let hits = index.query(question, &RecordFilter::default(), top).await?;

    let mut texts: Vec<&str> = Vec::new();
    for hit in &hits {
        if !texts.contains(&hit.record.text.as_str()) {
            texts.push(&hit.record.text);
        }
    }
    debug!(hits = hits.len(), unique = texts.len(), "Retrieved context");

    let context = if texts.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        texts.join("\n\n")
    };

    oracle
        .query(
            prompts::RAG_SYSTEM_PROMPT,
            &prompts::rag_user_prompt(question, &context),
        )
        .await
        .context("Failed to answer question")
}
