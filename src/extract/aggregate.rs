use anyhow::Result;
use tracing::info;

use super::error::{ExtractError, FailureKind};
use super::income::PipelinePeriodResult;
use super::markdown::parse_markdown_table;
use super::prompts;
use super::retry::{retry, RetryPolicy};
use crate::layout::Table;
use crate::llm::Oracle;

/// Every period's stage tables and subtotals, as handed to the oracle.
pub fn aggregation_prompt(periods: &[PipelinePeriodResult]) -> Result<String> {
    let mut prompt =
        String::from("Below are the income statement tables for multiple fiscal years:\n\n");

    for period in periods {
        prompt.push_str(&format!("Year: {}\n", period.fiscal_period));
        for result in &period.stages {
            let metric = result.stage.metric_name();
            prompt.push_str(&format!("{metric} table:\n"));
            prompt.push_str(&result.table.to_csv()?);
            prompt.push_str("\n\n");
            prompt.push_str(&format!(
                "Amount associated with {metric}: {}\n\n",
                result.amount
            ));
        }
    }

    prompt.push_str(prompts::AGGREGATE_CLOSING);
    Ok(prompt)
}

/// Merge all periods into one consolidated statement table.
pub async fn aggregate_periods(
    oracle: &dyn Oracle,
    periods: &[PipelinePeriodResult],
    policy: &RetryPolicy,
) -> Result<Table, ExtractError> {
    let user = aggregation_prompt(periods)
        .map_err(|e| ExtractError::Render(format!("{e:#}")))?;

    let table = retry(policy, "aggregation", |_| {
        let user = user.as_str();
        async move {
            let response = oracle
                .query(prompts::AGGREGATE_SYSTEM_PROMPT, user)
                .await
                .map_err(|e| FailureKind::oracle(&e))?;
            Ok::<_, FailureKind>(parse_markdown_table(&response)?)
        }
    })
    .await
    .map_err(|e| ExtractError::Aggregation(e.last))?;

    info!(
        periods = periods.len(),
        rows = table.rows.len(),
        columns = table.columns.len(),
        "Aggregated income statement"
    );
    Ok(table)
}
