//! Instructions sent to the oracle by each extraction step.

use super::income::{PeriodInputs, Stage};

pub const CLASSIFY_SYSTEM_PROMPT: &str = "You are given a markdown table taken from the 10-K or 10-Q filing of a company. \
Please identify if the table belongs to the income statement, balance sheet, stockholder's equity statement, \
or cash flow statement, or none of them at all. \
If the table contains information on the revenue breakdown that counts as part of the [Income Statement]. \
If the table does not belong to any of the statements, return [None]. \
Return the name of which statement the table belongs to in brackets \
then provide a very brief explanation of how you determined the answer.
Example Output:
[Income Statement]
This table shows the revenues and expenses of the company.
";

pub fn classify_user_prompt(table: &str) -> String {
    format!("Given markdown table:\n{}", table)
}

pub const UNIT_SCALE_SYSTEM_PROMPT: &str = "You are given all the tables from the 10-K or 10-Q filing of a company. \
Please identify the unit scale (e.g., millions, thousands, billions, etc.) used in the tables. \
If the tables use different unit scales, choose the one that appears the most frequently. \
Provide your answer as a single string, such as 'millions', 'thousands', or 'billions'. \
Ensure the output is strictly in this format and does not contain additional text.";

pub const FISCAL_YEAR_END_SYSTEM_PROMPT: &str = "You are an expert document analyzer. Your task is to precisely extract \
the fiscal year end date from the given context. Please follow these guidelines:
1. Look for phrases like 'Fiscal Year Ended', 'Year End', 'As of'
2. Provide ONLY the exact date in the format 'Month Day, Year'
3. If no clear fiscal year end date is found, respond with 'Not Found'
4. Use ONLY the information from the provided context";

pub fn fiscal_year_end_user_prompt(context: &str) -> String {
    format!(
        "Extract the fiscal year end date from the following context:\n\n{}",
        context
    )
}

pub const COMPANY_NAME_SYSTEM_PROMPT: &str = "You are an expert document analyzer. Your task is to precisely extract \
the official company name from the given context. Please follow these guidelines:
1. Look for the full legal name of the company
2. Prioritize names found in headers, title pages, or official statements
3. Provide ONLY the exact company name
4. If multiple variations exist, choose the most formal, complete version
5. If no clear company name is found, respond with 'Not Found'
6. Use ONLY the information from the provided context";

pub fn company_name_user_prompt(context: &str) -> String {
    format!(
        "Extract the official company name from the following context:\n\n{}",
        context
    )
}

const STAGE_PREAMBLE: &str = "Based on the provided tables related to the income statement, ";

const NEGATIVES: &str = "If values are negative make sure to format them with parentheses (e.g., (500,000)). ";

const UNSIGNED_REVENUE: &str = "List only positive revenue amounts as plain numbers without parentheses or minus signs. \
Leave out eliminations, adjustments or any other negative rows. ";

const ACCOUNTING_RULES: &str = "The output should follow professional accounting standards. \
Do not include 'Less' or 'Add' in the item descriptions. ";

const FOLLOW_EXAMPLE: &str = "Please follow this example format exactly.";

/// System prompt for one stage. `carried` is the previous stage's subtotal.
pub fn stage_system_prompt(stage: Stage, inputs: &PeriodInputs, carried: Option<f64>) -> String {
    let period = &inputs.fiscal_period;
    let scale = inputs.unit_scale.as_str();
    let use_scale = format!("Use the unit scale '{scale}' for all values in your response! ");

    match stage {
        Stage::Revenue => format!(
            "{STAGE_PREAMBLE}please provide the total revenue for the year ended {period} \
and the revenue breakdown by segment. The unit scale for all values is '{scale}'. \
{use_scale}{UNSIGNED_REVENUE}\
The output should be formatted as a table with only 2 columns: Segment and Revenue. \
Ensure that the sum of all segment revenues matches the total revenue exactly. \
Prioritize that segment revenues sum up to the total revenue and check your math! \
Make sure all revenues are converted to the same unit scale, which is explicitly stated as '{scale}'. \
The table should follow this exact format:\n\n\
| Segment        | Revenue       |\n\
|----------------|---------------|\n\
| Segment A      | 1,000,000     |\n\
| Segment B      | 2,000,000     |\n\
| Segment C      | 3,000,000     |\n\
| Total Revenue  | 6,000,000     |\n\n\
1,000,000 + 2,000,000 + 3,000,000 = 6,000,000\n\n\
{FOLLOW_EXAMPLE}"
        ),
        Stage::GrossProfit => format!(
            "{STAGE_PREAMBLE}please provide the detailed breakdown of how the total revenue transitions \
to gross profit for the year ended {period}. \
The total revenue for the year is {carried} ({scale}). \
{use_scale}{NEGATIVES}{ACCOUNTING_RULES}\
The first row should be 'Total Revenue', followed by specific items contributing to the calculation \
of gross profit, ending with the 'Gross Profit' as the last row. \
Exclude any expense numbers or items that are part of the calculation from gross profit to operating income, \
as operating income will be calculated separately. \
Ensure that all rows above 'Gross Profit' sum to exactly match the 'Gross Profit' value. \
The table should be formatted as follows:\n\n\
| Item                  | Value         |\n\
|-----------------------|---------------|\n\
| Total Revenue         | 10,000,000    |\n\
| Cost of Goods Sold    | (6,000,000)   |\n\
| Discounts             | (500,000)     |\n\
| Gross Profit          | 3,500,000     |\n\n\
10,000,000 - 6,000,000 - 500,000 = 3,500,000\n\n\
{FOLLOW_EXAMPLE}",
            carried = with_thousands(carried.unwrap_or_default()),
        ),
        Stage::OperatingIncome => format!(
            "{STAGE_PREAMBLE}please provide the detailed breakdown of how the gross profit transitions \
to operating income for the year ended {period}. \
The gross profit for the year is {carried} ({scale}). \
{use_scale}{NEGATIVES}{ACCOUNTING_RULES}\
The first row should be 'Gross Profit', followed by specific items contributing to the calculation \
of operating income, ending with the 'Operating Income' as the last row. \
Exclude any expense or item that transitions operating income to pre-tax income, \
as pre-tax income will be calculated separately. \
Ensure that all rows above 'Operating Income' sum to exactly match the 'Operating Income' value. \
The table should be formatted as follows:\n\n\
| Item                    | Value         |\n\
|-------------------------|---------------|\n\
| Gross Profit            | 3,500,000     |\n\
| Selling Expenses        | (1,000,000)   |\n\
| Administrative Expenses | (500,000)     |\n\
| Restructuring Costs     | 200,000       |\n\
| Operating Income        | 2,200,000     |\n\n\
3,500,000 - 1,000,000 - 500,000 + 200,000 = 2,200,000\n\n\
{FOLLOW_EXAMPLE}",
            carried = with_thousands(carried.unwrap_or_default()),
        ),
        Stage::PreTaxIncome => format!(
            "{STAGE_PREAMBLE}please provide the detailed breakdown of how the operating income transitions \
to pre-tax income for the year ended {period}. \
The operating income for the year is {carried} ({scale}). \
{use_scale}{NEGATIVES}{ACCOUNTING_RULES}\
The first row should be 'Operating Income', followed by specific items contributing to the calculation \
of pre-tax income, ending with the 'Pre-Tax Income' as the last row. \
Exclude any expense or item that transitions pre-tax income to net income, \
as net income will be calculated separately. \
Ensure that all rows above 'Pre-Tax Income' sum to exactly match the 'Pre-Tax Income' value. \
The table should be formatted as follows:\n\n\
| Item                      | Value         |\n\
|---------------------------|---------------|\n\
| Operating Income          | 1,800,000     |\n\
| Interest Expense          | (100,000)     |\n\
| Interest Income           | 50,000        |\n\
| Other Non-Operating Items | (50,000)      |\n\
| Pre-Tax Income            | 1,700,000     |\n\n\
1,800,000 - 100,000 + 50,000 - 50,000 = 1,700,000\n\n\
{FOLLOW_EXAMPLE}",
            carried = with_thousands(carried.unwrap_or_default()),
        ),
        Stage::NetIncome => format!(
            "{STAGE_PREAMBLE}please provide the detailed breakdown of how the pre-tax income transitions \
to net income for the year ended {period}. \
The pre-tax income for the year is {carried} ({scale}). \
{use_scale}{NEGATIVES}{ACCOUNTING_RULES}\
The first row should be 'Pre-Tax Income', followed by specific items contributing to the calculation \
of net income, ending with the 'Net Income' as the last row. \
Ensure that all rows above 'Net Income' sum to exactly match the 'Net Income' value. \
The table should be formatted as follows:\n\n\
| Item                  | Value         |\n\
|-----------------------|---------------|\n\
| Pre-Tax Income        | 1,700,000     |\n\
| Income Tax Expense    | (500,000)     |\n\
| Net Income            | 1,200,000     |\n\n\
1,700,000 - 500,000 = 1,200,000\n\n\
{FOLLOW_EXAMPLE}",
            carried = with_thousands(carried.unwrap_or_default()),
        ),
    }
}

/// The classified income-statement tables every stage reads from.
pub fn stage_user_prompt(tables: &[String]) -> String {
    format!("Provided tables:\n{}", tables.join("\n\n"))
}

pub const AGGREGATE_SYSTEM_PROMPT: &str = "You are a financial assistant acting as a professional accountant. \
You are given data from multiple fiscal years' income statements.
Aggregate them into a single clean table, following these rules:

Formatting:
- The table should have a header row with fiscal years as column headers (e.g., 'FY 2023', 'FY 2024').
- The first column header (row 1, col 0) should be blank.
- Preserve the original order of rows from the first year processed for all identical or equivalent line items.
- If new line items appear in subsequent years, place them in the most logically appropriate category according to standard income statement sequencing.
- Use your best professional judgment as an accountant to merge line items that represent the same concept, even if phrased slightly differently (e.g., adding or removing words like 'and', 'Expenses', etc.).
- Do not include unnecessary rows like 'Income Statement' or 'Revenue' as section headers.
- Negative values should be displayed in parentheses.
- Keep a consistent unit scale.
- The final output should be a clean table without bold formatting or extra section headers.

Logical Arithmetic Flow (Standard Income Statement Ordering):
1. All revenue line items (segment revenues) and then Total Revenue.
2. Cost of Goods Sold (COGS).
3. Gross Profit.
4. Operating Expenses (e.g., Selling, General & Administrative).
5. Operating Income.
6. Interest-related items (e.g., Interest Expense, Other Interest Expense, Interest Income), Other Non-Operating Items.
7. Pre-Tax Income.
8. Income Tax Expense.
9. Net Income.

Ensure that items like 'Interest Expense on Long-Term Debt' and 'Other Interest Expense' appear after Operating Income \
and before Pre-Tax Income. If new items appear in later years that fit into the interest/other non-operating category, \
place them in that category.

Do not provide any explanation outside of the final table. Just provide the aggregated table.";

pub const AGGREGATE_CLOSING: &str = "Please aggregate all the years' data into a single table following the rules above.
Remember to merge line items representing the same concept, using your best judgment as a professional accountant.
";

pub const RAG_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that provides detailed and factual answers based on the provided context.";

pub fn rag_user_prompt(question: &str, context: &str) -> String {
    format!(
        "Below is the user query:\n\n{question}\n\n\
Below is the relevant context retrieved from the documents:\n\n{context}\n\n\
Based on the above context, please answer the user's query as accurately and comprehensively as possible."
    )
}

/// `1234567.891` -> `1,234,567.89`
pub fn with_thousands(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{frac}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::metadata::UnitScale;

    fn inputs() -> PeriodInputs {
        PeriodInputs {
            fiscal_period: "December 31, 2023".into(),
            unit_scale: UnitScale::Millions,
            tables: vec!["T1".into(), "T2".into()],
        }
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(with_thousands(1234567.891), "1,234,567.89");
        assert_eq!(with_thousands(-1500000.0), "-1,500,000.00");
        assert_eq!(with_thousands(999.0), "999.00");
        assert_eq!(with_thousands(0.0), "0.00");
    }

    #[test]
    fn stage_prompts_carry_period_scale_and_subtotal() {
        let prompt = stage_system_prompt(Stage::GrossProfit, &inputs(), Some(3000000.0));
        assert!(prompt.contains("for the year ended December 31, 2023"));
        assert!(prompt.contains("The total revenue for the year is 3,000,000.00 (millions)"));
        assert!(prompt.contains("Use the unit scale 'millions'"));
        assert!(!prompt.contains("{unit_scale}"));

        let revenue = stage_system_prompt(Stage::Revenue, &inputs(), None);
        assert!(revenue.contains("| Segment        | Revenue       |"));
    }

    #[test]
    fn revenue_prompt_asks_for_unsigned_rows() {
        let revenue = stage_system_prompt(Stage::Revenue, &inputs(), None);
        assert!(revenue.contains(UNSIGNED_REVENUE));
        assert!(!revenue.contains(NEGATIVES));
        assert!(!revenue.contains("(500,000)"));

        let gross = stage_system_prompt(Stage::GrossProfit, &inputs(), Some(1.0));
        assert!(gross.contains(NEGATIVES));
    }

    #[test]
    fn stage_user_prompt_lists_tables() {
        assert_eq!(
            stage_user_prompt(&inputs().tables),
            "Provided tables:\nT1\n\nT2"
        );
    }
}
