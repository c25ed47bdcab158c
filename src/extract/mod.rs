//! Oracle-backed extraction of income-statement figures.

pub mod aggregate;
pub mod classify;
pub mod error;
pub mod income;
pub mod markdown;
pub mod metadata;
pub mod prompts;
pub mod retry;

pub use aggregate::aggregate_periods;
pub use classify::{classify_tables, StatementKind};
pub use error::ExtractError;
pub use income::{run_period, PeriodInputs, PipelinePeriodResult, Stage};
pub use retry::RetryPolicy;
