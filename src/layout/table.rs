use anyhow::{Context, Result};
use serde::Serialize;

use super::types::{BoundingRegion, SourceGrid, TableRecord};

/// Rectangular table: column labels plus rows of equal width.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.width() == 0
    }

    pub fn width(&self) -> usize {
        self.columns
            .len()
            .max(self.rows.first().map(Vec::len).unwrap_or(0))
    }

    /// GitHub-style pipe table with padded columns. Empty tables render as "".
    pub fn to_markdown(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let width = self.width();
        let header: Vec<String> = (0..width)
            .map(|i| escape_cell(self.columns.get(i).map(String::as_str).unwrap_or("")))
            .collect();
        let body: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                (0..width)
                    .map(|i| escape_cell(row.get(i).map(String::as_str).unwrap_or("")))
                    .collect()
            })
            .collect();

        // Separator needs at least three dashes.
        let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count().max(3)).collect();
        for row in &body {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let mut out = String::new();
        push_row(&mut out, &header, &widths);
        let dashes: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        push_row(&mut out, &dashes, &widths);
        for row in &body {
            push_row(&mut out, row, &widths);
        }
        out.truncate(out.trim_end().len());
        out
    }

    /// Header row then data rows, quoted where needed.
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.columns)
            .context("Failed to write CSV header")?;
        for row in &self.rows {
            writer.write_record(row).context("Failed to write CSV row")?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e))?;
        String::from_utf8(bytes).context("CSV output was not UTF-8")
    }
}

fn escape_cell(cell: &str) -> String {
    cell.replace(['\n', '\r'], " ").replace('|', "\\|")
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    out.push('|');
    for (cell, width) in cells.iter().zip(widths) {
        let pad = width.saturating_sub(cell.chars().count());
        out.push(' ');
        out.push_str(cell);
        out.push_str(&" ".repeat(pad));
        out.push_str(" |");
    }
    out.push('\n');
}

/// A table record turned into a container plus its per-cell source regions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterializedTable {
    pub table: Table,
    pub sources: SourceGrid,
}

impl MaterializedTable {
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Lay the record's cells out on a `row_count x column_count` grid.
///
/// Header cells only label columns. Rows left entirely empty are dropped and
/// the remaining rows (and their source rows) stay contiguous. Degenerate
/// records come back empty; that is a valid outcome, not an error.
pub fn materialize(record: &TableRecord) -> MaterializedTable {
    let (rows, cols) = (record.row_count, record.column_count);
    if rows == 0 || cols == 0 {
        return MaterializedTable::default();
    }

    let mut grid = vec![vec![String::new(); cols]; rows];
    let mut sources: SourceGrid = vec![vec![None; cols]; rows];
    // Unlabelled columns stay blank, including header cells without text.
    let mut columns = vec![String::new(); cols];

    for cell in &record.cells {
        let (r, c) = (cell.row_index, cell.column_index);
        if r >= rows || c >= cols {
            continue;
        }
        if cell.is_column_header() {
            columns[c] = cell.content.trim().to_string();
            continue;
        }
        if cell.content.is_empty() {
            continue;
        }
        grid[r][c] = cell.content.trim().to_string();
        sources[r][c] = cell.bounding_regions.first().cloned();
    }

    let (kept_rows, kept_sources): (Vec<Vec<String>>, Vec<Vec<Option<BoundingRegion>>>) = grid
        .into_iter()
        .zip(sources)
        .filter(|(row, _)| row.iter().any(|cell| !cell.is_empty()))
        .unzip();

    if kept_rows.is_empty() {
        return MaterializedTable::default();
    }

    MaterializedTable {
        table: Table {
            columns,
            rows: kept_rows,
        },
        sources: kept_sources,
    }
}
