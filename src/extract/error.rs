use std::fmt;

use thiserror::Error;

use super::income::Stage;

/// An oracle response did not match the expected table or label grammar.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseFailure {
    #[error("no table starting with `{header}` in response")]
    MissingTable { header: String },
    #[error("table has no data rows")]
    EmptyTable,
    #[error("row {line} does not match the expected columns: `{row}`")]
    MalformedRow { line: usize, row: String },
    #[error("`{value}` is not a number")]
    InvalidNumber { value: String },
    #[error("no bracketed label in response")]
    MissingLabel,
    #[error("unrecognized label `{label}`")]
    UnknownLabel { label: String },
    #[error("unrecognized unit scale `{value}`")]
    UnknownUnitScale { value: String },
    #[error("no markdown table in response")]
    NoTable,
}

/// A well-formed table lacks the row a stage derives its subtotal from.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("no `{marker}` row in table")]
pub struct ValidationFailure {
    pub marker: String,
}

/// Why one attempt at an oracle-backed step failed. Retry loops branch on this.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureKind {
    Oracle(String),
    Parse(ParseFailure),
    Validation(ValidationFailure),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Oracle(msg) => write!(f, "oracle call failed: {msg}"),
            FailureKind::Parse(e) => write!(f, "parse failure: {e}"),
            FailureKind::Validation(e) => write!(f, "validation failure: {e}"),
        }
    }
}

impl From<ParseFailure> for FailureKind {
    fn from(e: ParseFailure) -> Self {
        FailureKind::Parse(e)
    }
}

impl From<ValidationFailure> for FailureKind {
    fn from(e: ValidationFailure) -> Self {
        FailureKind::Validation(e)
    }
}

impl FailureKind {
    pub fn oracle(err: &anyhow::Error) -> Self {
        FailureKind::Oracle(format!("{err:#}"))
    }

    /// Malformed responses are worth asking again; transport failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Parse(_) | FailureKind::Validation(_))
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{stage} stage for `{period}` failed after {attempts} attempts: {last}")]
    StageExhausted {
        period: String,
        stage: Stage,
        attempts: u32,
        last: FailureKind,
    },
    #[error("unit scale could not be determined after {attempts} attempts: {last}")]
    UnitScaleExhausted { attempts: u32, last: FailureKind },
    #[error("no income statement tables found")]
    NoIncomeStatement,
    #[error("aggregation failed: {0}")]
    Aggregation(FailureKind),
    #[error("failed to render stage tables: {0}")]
    Render(String),
}
