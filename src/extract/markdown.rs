//! Strict readers for the markdown tables the oracle answers with.
//!
//! Reading is two-phase: locate the table block by its header, then split
//! every row into exactly the expected cells. A row that does not fit is a
//! parse failure rather than something to skip.

use anyhow::Result;

use super::error::ParseFailure;
use crate::layout::Table;

/// Accepted spellings of a value cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberGrammar {
    /// `1,000` or `1000.5`
    Unsigned,
    /// Also `-500` and `(500)`.
    Signed,
    /// Signed, plus an em-dash meaning zero.
    SignedOrDash,
}

const EM_DASH: &str = "\u{2014}";

impl NumberGrammar {
    pub fn parse(self, raw: &str) -> Result<f64, ParseFailure> {
        let invalid = || ParseFailure::InvalidNumber {
            value: raw.to_string(),
        };

        let token = raw.trim();
        if self == NumberGrammar::SignedOrDash && token == EM_DASH {
            return Ok(0.0);
        }

        let cleaned: String = token.chars().filter(|c| *c != ',').collect();
        let (negative, digits) = match self {
            NumberGrammar::Unsigned => (false, cleaned.as_str()),
            NumberGrammar::Signed | NumberGrammar::SignedOrDash => {
                if let Some(inner) = cleaned
                    .strip_prefix('(')
                    .and_then(|s| s.strip_suffix(')'))
                {
                    (true, inner)
                } else if let Some(rest) = cleaned.strip_prefix('-') {
                    (true, rest)
                } else {
                    (false, cleaned.as_str())
                }
            }
        };

        if !is_decimal(digits) {
            return Err(invalid());
        }
        let value: f64 = digits.parse().map_err(|_| invalid())?;
        Ok(if negative { -value } else { value })
    }
}

/// Digits with at most one decimal point and at least one digit.
fn is_decimal(s: &str) -> bool {
    let mut dots = 0;
    let mut digits = 0;
    for c in s.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return false,
        }
    }
    digits > 0 && dots <= 1
}

/// Split `| a | b |` into trimmed cells. `None` if the line is not a pipe row.
fn split_row(line: &str) -> Option<Vec<String>> {
    let inner = line.trim().strip_prefix('|')?;
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    Some(inner.split('|').map(|c| c.trim().to_string()).collect())
}

fn is_separator(cells: &[String]) -> bool {
    !cells.is_empty()
        && cells.iter().all(|c| {
            !c.is_empty() && c.chars().all(|ch| ch == '-' || ch == ':') && c.contains('-')
        })
}

/// One `label | amount` row.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub label: String,
    pub value: f64,
}

/// A parsed two-column stage table such as `Item | Value`.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItemTable {
    pub label_column: String,
    pub value_column: String,
    pub items: Vec<LineItem>,
}

impl LineItemTable {
    /// First row whose label contains `marker`, ignoring case.
    pub fn find(&self, marker: &str) -> Option<&LineItem> {
        let marker = marker.to_lowercase();
        self.items
            .iter()
            .find(|item| item.label.to_lowercase().contains(&marker))
    }

    pub fn to_table(&self) -> Table {
        Table {
            columns: vec![self.label_column.clone(), self.value_column.clone()],
            rows: self
                .items
                .iter()
                .map(|item| vec![item.label.clone(), item.value.to_string()])
                .collect(),
        }
    }

    pub fn to_csv(&self) -> Result<String> {
        self.to_table().to_csv()
    }
}

/// Read the two-column table whose header row starts with `label_column`.
pub fn extract_rows(
    response: &str,
    label_column: &str,
    value_column: &str,
    grammar: NumberGrammar,
) -> Result<LineItemTable, ParseFailure> {
    let missing = || ParseFailure::MissingTable {
        header: format!("| {label_column}"),
    };

    // Phase 1: table bounds.
    let lines: Vec<&str> = response.lines().collect();
    let start = lines
        .iter()
        .position(|line| {
            split_row(line)
                .and_then(|cells| cells.into_iter().next())
                .is_some_and(|first| first.eq_ignore_ascii_case(label_column))
        })
        .ok_or_else(missing)?;
    let block: Vec<(usize, &str)> = lines[start..]
        .iter()
        .enumerate()
        .take_while(|(_, line)| line.trim_start().starts_with('|'))
        .map(|(i, line)| (start + i + 1, *line))
        .collect();

    // Phase 2: fixed-width rows.
    let mut rows = block.iter().skip(1).peekable();
    if let Some((_, line)) = rows.peek() {
        if split_row(line).is_some_and(|cells| is_separator(&cells)) {
            rows.next();
        }
    }

    let mut items = Vec::new();
    for (line_no, line) in rows {
        let cells = split_row(line).unwrap_or_default();
        let [label, value] = cells.as_slice() else {
            return Err(ParseFailure::MalformedRow {
                line: *line_no,
                row: line.trim().to_string(),
            });
        };
        if label.is_empty() {
            return Err(ParseFailure::MalformedRow {
                line: *line_no,
                row: line.trim().to_string(),
            });
        }
        items.push(LineItem {
            label: label.clone(),
            value: grammar.parse(value)?,
        });
    }

    if items.is_empty() {
        return Err(ParseFailure::EmptyTable);
    }

    Ok(LineItemTable {
        label_column: label_column.to_string(),
        value_column: value_column.to_string(),
        items,
    })
}

/// Read an arbitrary-width markdown table, such as the consolidated statement.
///
/// The first pipe row is the header and a dash-only second row is dropped.
/// Every column after the first is numeric; cells that do not read as a
/// number are left blank.
pub fn parse_markdown_table(response: &str) -> Result<Table, ParseFailure> {
    let rows: Vec<(usize, Vec<String>)> = response
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let t = line.trim();
            t.len() > 1 && t.starts_with('|') && t.ends_with('|')
        })
        .filter_map(|(i, line)| split_row(line).map(|cells| (i + 1, cells)))
        .collect();

    if rows.len() < 2 {
        return Err(ParseFailure::NoTable);
    }

    let mut iter = rows.into_iter();
    let Some((_, columns)) = iter.next() else {
        return Err(ParseFailure::NoTable);
    };
    let mut data: Vec<(usize, Vec<String>)> = iter.collect();
    if data.first().is_some_and(|(_, cells)| is_separator(cells)) {
        data.remove(0);
    }

    let width = columns.len();
    let mut table = Table {
        columns,
        rows: Vec::with_capacity(data.len()),
    };
    for (line, cells) in data {
        if cells.len() != width {
            return Err(ParseFailure::MalformedRow {
                line,
                row: format!("| {} |", cells.join(" | ")),
            });
        }
        let row = cells
            .into_iter()
            .enumerate()
            .map(|(i, cell)| {
                if i == 0 {
                    return cell;
                }
                NumberGrammar::SignedOrDash
                    .parse(&cell)
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            })
            .collect();
        table.rows.push(row);
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_grammar() {
        assert_eq!(NumberGrammar::Signed.parse("(500,000)"), Ok(-500000.0));
        assert_eq!(NumberGrammar::Unsigned.parse("1,000,000"), Ok(1000000.0));
        assert_eq!(NumberGrammar::SignedOrDash.parse("\u{2014}"), Ok(0.0));
        assert_eq!(NumberGrammar::Signed.parse(" -12.5 "), Ok(-12.5));
    }

    #[test]
    fn number_grammar_rejects_junk() {
        for raw in ["", "abc", "1.2.3", "inf", "1e5", "(", "()", "$100"] {
            assert!(NumberGrammar::Signed.parse(raw).is_err(), "{raw}");
        }
        assert!(NumberGrammar::Unsigned.parse("(5)").is_err());
        assert!(NumberGrammar::Unsigned.parse("-5").is_err());
        assert!(NumberGrammar::Signed.parse("\u{2014}").is_err());
    }

    #[test]
    fn extracts_revenue_rows() {
        let response = "Here is the breakdown:\n\n\
            | Segment        | Revenue       |\n\
            |----------------|---------------|\n\
            | Segment A      | 1,000,000     |\n\
            | Segment B      | 2,000,000     |\n\
            | Total Revenue  | 3,000,000     |\n\n\
            1,000,000 + 2,000,000 = 3,000,000";
        let table = extract_rows(response, "Segment", "Revenue", NumberGrammar::Unsigned).unwrap();
        assert_eq!(table.items.len(), 3);
        assert_eq!(table.find("total revenue").unwrap().value, 3000000.0);
        assert_eq!(table.items[0].label, "Segment A");
    }

    #[test]
    fn missing_header_is_a_parse_failure() {
        let err = extract_rows("no table here", "Item", "Value", NumberGrammar::Signed).unwrap_err();
        assert_eq!(
            err,
            ParseFailure::MissingTable {
                header: "| Item".into()
            }
        );
    }

    #[test]
    fn wrong_width_row_is_rejected() {
        let response = "| Item | Value |\n|---|---|\n| Revenue | 10 | extra |\n";
        let err = extract_rows(response, "Item", "Value", NumberGrammar::Signed).unwrap_err();
        assert!(matches!(err, ParseFailure::MalformedRow { line: 3, .. }));
    }

    #[test]
    fn bad_value_is_rejected_not_zeroed() {
        let response = "| Item | Value |\n|---|---|\n| Revenue | n/a |\n";
        let err = extract_rows(response, "Item", "Value", NumberGrammar::Signed).unwrap_err();
        assert_eq!(
            err,
            ParseFailure::InvalidNumber {
                value: "n/a".into()
            }
        );
    }

    #[test]
    fn header_only_is_empty() {
        let response = "| Item | Value |\n|---|---|\n\nNothing to report.";
        let err = extract_rows(response, "Item", "Value", NumberGrammar::Signed).unwrap_err();
        assert_eq!(err, ParseFailure::EmptyTable);
    }

    #[test]
    fn line_items_render_as_csv() {
        let response = "| Item | Value |\n|---|---|\n| Net Income, adjusted | (5) |\n";
        let table = extract_rows(response, "Item", "Value", NumberGrammar::Signed).unwrap();
        assert_eq!(table.to_csv().unwrap(), "Item,Value\n\"Net Income, adjusted\",-5\n");
    }

    #[test]
    fn consolidated_table_drops_separator() {
        let response = "| | FY 2023 | FY 2024 |\n\
            |---|---|---|\n\
            | Total Revenue | 1,000 | 1,200 |\n\
            | Net Income | (50) | n/a |\n";
        let table = parse_markdown_table(response).unwrap();
        assert_eq!(table.columns, vec!["", "FY 2023", "FY 2024"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["Total Revenue".to_string(), "1000".into(), "1200".into()],
                vec!["Net Income".to_string(), "-50".into(), String::new()],
            ]
        );
    }

    #[test]
    fn consolidated_table_requires_rows() {
        assert_eq!(parse_markdown_table("just text"), Err(ParseFailure::NoTable));
        let ragged = "| a | b |\n| 1 |\n";
        assert!(matches!(
            parse_markdown_table(ragged),
            Err(ParseFailure::MalformedRow { line: 2, .. })
        ));
    }
}
