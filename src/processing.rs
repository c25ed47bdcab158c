use anyhow::{Context, Result};
use chrono::Duration;
use tracing::{info, warn};

use crate::extract::metadata::{extract_company_name, extract_fiscal_year_end, extract_unit_scale};
use crate::extract::{
    aggregate_periods, classify_tables, run_period, ExtractError, PeriodInputs,
    PipelinePeriodResult, Stage, StatementKind,
};
use crate::layout::reconstruct;
use crate::rag::{index_segments, DocumentLabels};
use crate::state::AppState;

pub const OUTPUT_NAME: &str = "aggregated_income_statement.csv";
const OUTPUT_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    /// Signed read URL of the aggregated statement.
    pub url: String,
    pub periods: Vec<String>,
    /// Blobs without any income-statement table.
    pub skipped: Vec<String>,
}

/// Extract one blob's income statement. `None` when no table classifies as one.
pub async fn process_document(state: &AppState, blob: &str) -> Result<Option<PipelinePeriodResult>> {
    let oracle = state.oracle.as_ref();

    let bytes = state
        .store
        .get(blob)
        .await
        .with_context(|| format!("Failed to fetch {}", blob))?;
    let analyzed = state
        .analyzer
        .analyze(blob, &bytes)
        .await
        .with_context(|| format!("Layout analysis failed for {}", blob))?;
    let doc = reconstruct(&analyzed).with_context(|| format!("Failed to reconstruct {}", blob))?;

    let texts = doc.items();
    let fiscal_year = extract_fiscal_year_end(oracle, &texts).await;
    let company_name = extract_company_name(oracle, &texts).await;
    info!(blob, segments = texts.len(), company = %company_name, fiscal_year = ?fiscal_year, "Document reconstructed");

    let labels = DocumentLabels {
        blob_name: blob.to_string(),
        company_name,
        fiscal_year: fiscal_year.clone(),
    };
    index_segments(state.index.as_ref(), &doc, &labels)
        .await
        .with_context(|| format!("Failed to index {}", blob))?;

    let tables = doc.table_texts();
    let kinds = classify_tables(
        oracle,
        &tables,
        state.config.workers,
        &state.config.response_policy(),
    )
    .await;
    let income: Vec<String> = tables
        .iter()
        .zip(&kinds)
        .filter(|(_, kind)| **kind == Some(StatementKind::IncomeStatement))
        .map(|(table, _)| table.to_string())
        .collect();

    if income.is_empty() {
        warn!(blob, tables = tables.len(), "No income statement tables, skipping document");
        return Ok(None);
    }

    let unit_scale = extract_unit_scale(oracle, &income, &state.config.response_policy())
        .await
        .with_context(|| format!("Unit scale extraction failed for {}", blob))?;

    let inputs = PeriodInputs {
        fiscal_period: fiscal_year.unwrap_or_else(|| blob.to_string()),
        unit_scale,
        tables: income,
    };
    let period = run_period(oracle, &inputs, &state.config.stage_policy())
        .await
        .with_context(|| format!("Income statement extraction failed for {}", blob))?;
    info!(
        blob,
        period = %period.fiscal_period,
        revenue = ?period.amount(Stage::Revenue),
        net_income = ?period.amount(Stage::NetIncome),
        "Income statement extracted"
    );
    Ok(Some(period))
}

/// Run every blob through extraction, aggregate the periods and publish the
/// consolidated statement as CSV.
pub async fn process_documents(state: &AppState, blobs: &[String]) -> Result<ProcessOutcome> {
    let mut periods = Vec::new();
    let mut skipped = Vec::new();

    for blob in blobs {
        match process_document(state, blob).await? {
            Some(period) => periods.push(period),
            None => skipped.push(blob.clone()),
        }
    }

    if periods.is_empty() {
        warn!(documents = blobs.len(), "No income statement in any document");
        return Err(ExtractError::NoIncomeStatement.into());
    }

    let table = aggregate_periods(state.oracle.as_ref(), &periods, &state.config.stage_policy())
        .await
        .context("Failed to aggregate periods")?;
    let csv = table.to_csv()?;

    state
        .store
        .put(OUTPUT_NAME, csv.as_bytes(), "text/csv")
        .await
        .context("Failed to store aggregated statement")?;
    let url = state
        .store
        .signed_read_url(OUTPUT_NAME, Duration::hours(OUTPUT_TTL_HOURS))
        .await?;

    info!(periods = periods.len(), skipped = skipped.len(), "Aggregated statement published");
    Ok(ProcessOutcome {
        url,
        periods: periods.into_iter().map(|p| p.fiscal_period).collect(),
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::extract::income::fixtures::STAGE_RESPONSES;
    use crate::layout::AnalyzeResult;
    use crate::llm::testing::ScriptedOracle;
    use crate::llm::Oracle;
    use crate::ocr::LayoutAnalyzer;
    use crate::state::PipelineConfig;
    use crate::store::{JsonIndex, LocalObjectStore, ObjectStore, RecordFilter, SearchIndex};

    struct StaticAnalyzer(AnalyzeResult);

    #[async_trait]
    impl LayoutAnalyzer for StaticAnalyzer {
        async fn analyze(&self, _name: &str, _bytes: &[u8]) -> Result<AnalyzeResult> {
            Ok(self.0.clone())
        }
    }

    fn region(y: f64) -> serde_json::Value {
        json!([{"pageNumber": 1, "polygon": [0.0, y, 4.0, y, 4.0, y + 0.5, 0.0, y + 0.5]}])
    }

    fn annual_report() -> AnalyzeResult {
        serde_json::from_value(json!({
            "paragraphs": [
                {"content": "Acme Corp Annual Report", "spans": [{"offset": 0, "length": 23}],
                 "boundingRegions": region(0.0), "role": "title"},
                {"content": "Consolidated Statements of Operations", "spans": [{"offset": 24, "length": 37}],
                 "boundingRegions": region(1.0), "role": "sectionHeading"},
                {"content": "Revenue", "spans": [{"offset": 62, "length": 7}],
                 "boundingRegions": region(2.0)}
            ],
            "tables": [{
                "rowCount": 2,
                "columnCount": 2,
                "spans": [{"offset": 62, "length": 20}],
                "cells": [
                    {"rowIndex": 0, "columnIndex": 0, "content": "Revenue", "boundingRegions": region(2.0)},
                    {"rowIndex": 0, "columnIndex": 1, "content": "3,000", "boundingRegions": region(2.0)},
                    {"rowIndex": 1, "columnIndex": 0, "content": "Net income", "boundingRegions": region(3.0)},
                    {"rowIndex": 1, "columnIndex": 1, "content": "700", "boundingRegions": region(3.0)}
                ]
            }]
        }))
        .unwrap()
    }

    async fn state(dir: &Path, oracle: Arc<dyn Oracle>) -> AppState {
        let store = LocalObjectStore::new(&dir.join("blobs"), "http://localhost/blobs", "k").unwrap();
        store.put("acme-2023.pdf", b"%PDF", "application/pdf").await.unwrap();
        AppState {
            oracle,
            analyzer: Arc::new(StaticAnalyzer(annual_report())),
            store: Arc::new(store),
            index: Arc::new(JsonIndex::open(&dir.join("index.json")).await.unwrap()),
            config: PipelineConfig {
                classify_backoff: StdDuration::ZERO,
                workers: 2,
                ..PipelineConfig::default()
            },
        }
    }

    #[tokio::test]
    async fn publishes_aggregated_statement() {
        let dir = tempfile::tempdir().unwrap();
        let mut script = vec![
            "December 31, 2023",
            "Acme Corp",
            "[Income Statement] revenues and expenses",
            "millions",
        ];
        script.extend(STAGE_RESPONSES);
        script.push("| | December 31, 2023 |\n|---|---|\n| Total Revenue | 3,000,000 |\n| Net Income | 700,000 |");
        let oracle = Arc::new(ScriptedOracle::new(script));
        let state = state(dir.path(), oracle.clone()).await;

        let outcome = process_documents(&state, &["acme-2023.pdf".to_string()])
            .await
            .unwrap();

        assert_eq!(outcome.periods, vec!["December 31, 2023"]);
        assert!(outcome.skipped.is_empty());
        assert!(outcome.url.contains(OUTPUT_NAME));
        assert!(outcome.url.contains("sig="));

        let csv = String::from_utf8(state.store.get(OUTPUT_NAME).await.unwrap()).unwrap();
        assert_eq!(
            csv,
            ",\"December 31, 2023\"\nTotal Revenue,3000000\nNet Income,700000\n"
        );

        let indexed = state
            .index
            .query("acme", &RecordFilter::default(), 10)
            .await
            .unwrap();
        assert!(indexed.iter().all(|h| h.record.company_name == "Acme Corp"));
        assert!(!indexed.is_empty());
        assert_eq!(oracle.call_count(), 10);
    }

    #[tokio::test]
    async fn documents_without_income_statement_yield_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), Arc::new(ScriptedOracle::default())).await;

        let err = process_documents(&state, &["acme-2023.pdf".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExtractError>(),
            Some(ExtractError::NoIncomeStatement)
        ));
        assert!(state.store.get(OUTPUT_NAME).await.is_err());
    }

    #[tokio::test]
    async fn missing_blob_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), Arc::new(ScriptedOracle::default())).await;
        let err = process_documents(&state, &["missing.pdf".to_string()])
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("missing.pdf"));
    }
}
