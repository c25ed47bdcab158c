use std::fmt;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use super::error::{FailureKind, ParseFailure};
use super::prompts;
use super::retry::{retry, RetryPolicy};
use crate::llm::Oracle;

/// Which financial statement a table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    IncomeStatement,
    BalanceSheet,
    StockholdersEquity,
    CashFlow,
    /// Recognised answer meaning "not a financial statement".
    NotAStatement,
}

/// Lowercased bracket labels accepted from the oracle.
const LABELS: &[(&str, StatementKind)] = &[
    ("income statement", StatementKind::IncomeStatement),
    ("balance sheet", StatementKind::BalanceSheet),
    ("stockholders equity statement", StatementKind::StockholdersEquity),
    ("stockholder's equity statement", StatementKind::StockholdersEquity),
    ("stockholders' equity statement", StatementKind::StockholdersEquity),
    ("cash flow statement", StatementKind::CashFlow),
    ("none", StatementKind::NotAStatement),
];

impl StatementKind {
    pub fn label(&self) -> &'static str {
        match self {
            StatementKind::IncomeStatement => "Income Statement",
            StatementKind::BalanceSheet => "Balance Sheet",
            StatementKind::StockholdersEquity => "Stockholder's Equity Statement",
            StatementKind::CashFlow => "Cash Flow Statement",
            StatementKind::NotAStatement => "None",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let key = label.trim().to_lowercase();
        LABELS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, kind)| *kind)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Read the first `[label]` token of a classification answer; the rationale
/// after it is ignored.
pub fn parse_classification(response: &str) -> Result<StatementKind, ParseFailure> {
    let open = response.find('[').ok_or(ParseFailure::MissingLabel)?;
    let rest = &response[open + 1..];
    let close = rest.find(']').ok_or(ParseFailure::MissingLabel)?;
    let label = &rest[..close];

    StatementKind::from_label(label).ok_or_else(|| ParseFailure::UnknownLabel {
        label: label.trim().to_string(),
    })
}

/// Classify one table. `None` when every attempt failed; such a table must
/// not be treated as any statement.
pub async fn classify_table(
    oracle: &dyn Oracle,
    table: &str,
    policy: &RetryPolicy,
) -> Option<StatementKind> {
    let user = prompts::classify_user_prompt(table);
    let result = retry(policy, "classification", |_| {
        let user = user.as_str();
        async move {
            let response = oracle
                .query(prompts::CLASSIFY_SYSTEM_PROMPT, user)
                .await
                .map_err(|e| FailureKind::oracle(&e))?;
            Ok::<_, FailureKind>(parse_classification(&response)?)
        }
    })
    .await;

    match result {
        Ok(kind) => Some(kind),
        Err(e) => {
            warn!(attempts = e.attempts, error = %e.last, "Table classification exhausted");
            None
        }
    }
}

/// Classify every table concurrently with at most `workers` calls in flight.
/// Slot `i` of the result always belongs to `tables[i]`.
pub async fn classify_tables(
    oracle: &dyn Oracle,
    tables: &[&str],
    workers: usize,
    policy: &RetryPolicy,
) -> Vec<Option<StatementKind>> {
    let mut slots: Vec<Option<StatementKind>> = vec![None; tables.len()];

    let mut results = stream::iter(tables.iter().enumerate())
        .map(|(i, table)| async move { (i, classify_table(oracle, table, policy).await) })
        .buffer_unordered(workers.max(1));

    while let Some((i, kind)) = results.next().await {
        debug!(table = i, kind = ?kind, "Table classified");
        slots[i] = kind;
    }

    slots
}

/// Number of concurrent classification calls when none is configured.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
