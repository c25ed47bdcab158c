//! Five dependent stages that walk an income statement from revenue down to
//! net income, each validated before the next one starts.

use std::fmt;

use tracing::{info, warn};

use super::error::{ExtractError, FailureKind, ParseFailure, ValidationFailure};
use super::markdown::{extract_rows, LineItemTable, NumberGrammar};
use super::metadata::UnitScale;
use super::prompts;
use super::retry::{retry, RetryPolicy};
use crate::llm::Oracle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Revenue,
    GrossProfit,
    OperatingIncome,
    PreTaxIncome,
    NetIncome,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Revenue,
        Stage::GrossProfit,
        Stage::OperatingIncome,
        Stage::PreTaxIncome,
        Stage::NetIncome,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Revenue => "Revenue",
            Stage::GrossProfit => "Gross Profit",
            Stage::OperatingIncome => "Operating Income",
            Stage::PreTaxIncome => "Pre-Tax Income",
            Stage::NetIncome => "Net Income",
        }
    }

    /// Label used when the stage table is handed on for aggregation.
    pub fn metric_name(&self) -> &'static str {
        match self {
            Stage::Revenue => "Revenue Breakdown",
            other => other.name(),
        }
    }

    /// Row whose value becomes the stage subtotal.
    pub fn marker(&self) -> &'static str {
        match self {
            Stage::Revenue => "Total Revenue",
            other => other.name(),
        }
    }

    /// `(label column, value column)` of the stage table.
    pub fn columns(&self) -> (&'static str, &'static str) {
        match self {
            Stage::Revenue => ("Segment", "Revenue"),
            _ => ("Item", "Value"),
        }
    }

    pub fn grammar(&self) -> NumberGrammar {
        match self {
            Stage::Revenue => NumberGrammar::Unsigned,
            Stage::PreTaxIncome => NumberGrammar::SignedOrDash,
            _ => NumberGrammar::Signed,
        }
    }

    pub fn parse(&self, response: &str) -> Result<LineItemTable, ParseFailure> {
        let (label, value) = self.columns();
        extract_rows(response, label, value, self.grammar())
    }

    pub fn validate(&self, table: &LineItemTable) -> Result<f64, ValidationFailure> {
        match self {
            Stage::Revenue => extract_total_revenue(table),
            Stage::GrossProfit => calculate_gross_profit(table),
            Stage::OperatingIncome => calculate_operating_income(table),
            Stage::PreTaxIncome => calculate_pre_tax_income(table),
            Stage::NetIncome => calculate_net_income(table),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn subtotal(table: &LineItemTable, marker: &str) -> Result<f64, ValidationFailure> {
    table
        .find(marker)
        .map(|item| item.value)
        .ok_or_else(|| ValidationFailure {
            marker: marker.to_string(),
        })
}

pub fn extract_total_revenue(table: &LineItemTable) -> Result<f64, ValidationFailure> {
    subtotal(table, Stage::Revenue.marker())
}

pub fn calculate_gross_profit(table: &LineItemTable) -> Result<f64, ValidationFailure> {
    subtotal(table, Stage::GrossProfit.marker())
}

pub fn calculate_operating_income(table: &LineItemTable) -> Result<f64, ValidationFailure> {
    subtotal(table, Stage::OperatingIncome.marker())
}

pub fn calculate_pre_tax_income(table: &LineItemTable) -> Result<f64, ValidationFailure> {
    subtotal(table, Stage::PreTaxIncome.marker())
}

pub fn calculate_net_income(table: &LineItemTable) -> Result<f64, ValidationFailure> {
    subtotal(table, Stage::NetIncome.marker())
}

/// What every stage of one fiscal period is computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodInputs {
    pub fiscal_period: String,
    pub unit_scale: UnitScale,
    /// Combined text of the tables classified as income statement.
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    pub stage: Stage,
    pub table: LineItemTable,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelinePeriodResult {
    pub fiscal_period: String,
    /// One result per stage, in [`Stage::ALL`] order.
    pub stages: Vec<StageResult>,
}

impl PipelinePeriodResult {
    pub fn amount(&self, stage: Stage) -> Option<f64> {
        self.stages
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| r.amount)
    }
}

/// Query, parse and validate one stage as a unit. Any failure reruns the
/// whole stage; running out of attempts is fatal for the period.
pub async fn run_stage(
    oracle: &dyn Oracle,
    stage: Stage,
    inputs: &PeriodInputs,
    carried: Option<f64>,
    policy: &RetryPolicy,
) -> Result<StageResult, ExtractError> {
    let system = prompts::stage_system_prompt(stage, inputs, carried);
    let user = prompts::stage_user_prompt(&inputs.tables);

    let result = retry(policy, stage.name(), |attempt| {
        let (system, user) = (system.as_str(), user.as_str());
        async move {
            let response = oracle
                .query(system, user)
                .await
                .map_err(|e| FailureKind::oracle(&e))?;
            let table = stage.parse(&response)?;
            let amount = stage.validate(&table)?;
            if attempt > 0 {
                info!(%stage, attempt = attempt + 1, "Stage succeeded after retry");
            }
            Ok::<_, FailureKind>(StageResult {
                stage,
                table,
                amount,
            })
        }
    })
    .await;

    result.map_err(|e| {
        warn!(%stage, period = %inputs.fiscal_period, "Stage exhausted");
        ExtractError::StageExhausted {
            period: inputs.fiscal_period.clone(),
            stage,
            attempts: e.attempts,
            last: e.last,
        }
    })
}

/// Run all five stages in order, each fed the previous subtotal.
pub async fn run_period(
    oracle: &dyn Oracle,
    inputs: &PeriodInputs,
    policy: &RetryPolicy,
) -> Result<PipelinePeriodResult, ExtractError> {
    let mut stages = Vec::with_capacity(Stage::ALL.len());
    let mut carried = None;

    for stage in Stage::ALL {
        let result = run_stage(oracle, stage, inputs, carried, policy).await?;
        info!(period = %inputs.fiscal_period, %stage, amount = result.amount, "Stage complete");
        carried = Some(result.amount);
        stages.push(result);
    }

    Ok(PipelinePeriodResult {
        fiscal_period: inputs.fiscal_period.clone(),
        stages,
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::STAGE_RESPONSES;
    use super::*;
    use crate::extract::markdown::LineItem;
    use crate::llm::testing::ScriptedOracle;

    fn inputs() -> PeriodInputs {
        PeriodInputs {
            fiscal_period: "December 31, 2023".into(),
            unit_scale: UnitScale::Millions,
            tables: vec!["Context:\nIncome\n\nTable:\n| Item | 2023 |".into()],
        }
    }

    fn item_table(rows: &[(&str, f64)]) -> LineItemTable {
        LineItemTable {
            label_column: "Item".into(),
            value_column: "Value".into(),
            items: rows
                .iter()
                .map(|(label, value)| LineItem {
                    label: label.to_string(),
                    value: *value,
                })
                .collect(),
        }
    }

    #[test]
    fn gross_profit_from_mocked_table() {
        let table = item_table(&[
            ("Total Revenue", 3000000.0),
            ("Cost of Goods Sold", -1500000.0),
            ("Gross Profit", 1500000.0),
        ]);
        assert_eq!(calculate_gross_profit(&table), Ok(1500000.0));

        let missing = item_table(&[("Total Revenue", 3000000.0)]);
        assert_eq!(
            calculate_gross_profit(&missing),
            Err(ValidationFailure {
                marker: "Gross Profit".into()
            })
        );
    }

    #[test]
    fn total_revenue_end_to_end() {
        let response = "Sure:\n\n| Segment | Revenue |\n|---------|---------|\n| Cloud | 1,250,000 |\n| Devices | 750,000 |\n| Total Revenue | 2,000,000 |\n";
        let table = Stage::Revenue.parse(response).unwrap();
        assert_eq!(table.items.len(), 3);
        assert_eq!(extract_total_revenue(&table), Ok(2000000.0));
    }

    #[test]
    fn pre_tax_accepts_em_dash() {
        let table = Stage::PreTaxIncome.parse(STAGE_RESPONSES[3]).unwrap();
        assert_eq!(table.find("Other Items").unwrap().value, 0.0);
        assert_eq!(calculate_pre_tax_income(&table), Ok(900000.0));
        assert!(Stage::NetIncome.parse(STAGE_RESPONSES[3]).is_err());
    }

    #[tokio::test]
    async fn stage_succeeds_on_third_attempt() {
        let oracle = ScriptedOracle::new([
            "I could not find a table.",
            "| Item | Value |\n|---|---|\n| Total Revenue | 3,000,000 |",
            STAGE_RESPONSES[1],
        ]);
        let result = run_stage(
            &oracle,
            Stage::GrossProfit,
            &inputs(),
            Some(3000000.0),
            &RetryPolicy::stage(3),
        )
        .await
        .unwrap();
        assert_eq!(result.amount, 1500000.0);
        assert_eq!(oracle.call_count(), 3);
        // every attempt reruns the whole stage with the same prompt
        let systems = oracle.system_prompts();
        assert!(systems.iter().all(|s| s == &systems[0]));
    }

    #[tokio::test]
    async fn stage_exhaustion_names_period_and_stage() {
        let oracle = ScriptedOracle::new(["nope", "nope", "nope"]);
        let err = run_stage(
            &oracle,
            Stage::NetIncome,
            &inputs(),
            Some(1.0),
            &RetryPolicy::stage(3),
        )
        .await
        .unwrap_err();
        match err {
            ExtractError::StageExhausted {
                period,
                stage,
                attempts,
                last,
            } => {
                assert_eq!(period, "December 31, 2023");
                assert_eq!(stage, Stage::NetIncome);
                assert_eq!(attempts, 3);
                assert!(matches!(last, FailureKind::Parse(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn oracle_errors_also_rerun_the_stage() {
        let oracle = ScriptedOracle::default();
        oracle.push_error("timeout");
        let err = run_stage(&oracle, Stage::Revenue, &inputs(), None, &RetryPolicy::stage(3))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractError::StageExhausted { attempts: 3, .. }
        ));
        assert_eq!(oracle.call_count(), 3);
    }

    #[tokio::test]
    async fn period_runs_all_stages_in_order() {
        let oracle = ScriptedOracle::new(STAGE_RESPONSES);
        let result = run_period(&oracle, &inputs(), &RetryPolicy::stage(3))
            .await
            .unwrap();

        let amounts: Vec<f64> = result.stages.iter().map(|s| s.amount).collect();
        assert_eq!(
            amounts,
            vec![3000000.0, 1500000.0, 1000000.0, 900000.0, 700000.0]
        );
        assert_eq!(result.amount(Stage::NetIncome), Some(700000.0));

        let systems = oracle.system_prompts();
        assert!(systems[1].contains("The total revenue for the year is 3,000,000.00 (millions)"));
        assert!(systems[4].contains("The pre-tax income for the year is 900,000.00 (millions)"));
        assert!(oracle.user_prompts()[0].starts_with("Provided tables:\nContext:"));
    }

    #[tokio::test]
    async fn failed_stage_stops_the_period() {
        let oracle = ScriptedOracle::new([STAGE_RESPONSES[0], "x", "y", "z"]);
        let err = run_period(&oracle, &inputs(), &RetryPolicy::stage(3))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractError::StageExhausted {
                stage: Stage::GrossProfit,
                ..
            }
        ));
        assert_eq!(oracle.call_count(), 4);
    }
}
