use tracing::debug;

use super::context::select_context;
use super::error::LayoutError;
use super::geometry::{collect_table_polygons, page_bounding_boxes};
use super::table::{materialize, MaterializedTable};
use super::types::{AnalyzeResult, BoundingRegion, Paragraph, Segment, SourceGrid, Span};

/// A document rebuilt into reading order.
#[derive(Debug, Clone, Default)]
pub struct StructuredDocument {
    /// Text and table segments ordered by originating offset.
    pub segments: Vec<Segment>,
    /// Every materialized table, indexed by `Segment::Table::table_index`.
    pub tables: Vec<MaterializedTable>,
}

impl StructuredDocument {
    pub fn items(&self) -> Vec<&str> {
        self.segments.iter().map(Segment::content).collect()
    }

    pub fn table_indicator(&self) -> Vec<bool> {
        self.segments.iter().map(Segment::is_table).collect()
    }

    /// Per-cell source grid behind each segment; empty for text segments.
    pub fn related_sources(&self) -> Vec<&[Vec<Option<BoundingRegion>>]> {
        self.segments
            .iter()
            .map(|seg| -> &[Vec<Option<BoundingRegion>>] {
                match seg {
                    Segment::Table { table_index, .. } => self
                        .table_sources(*table_index)
                        .map(Vec::as_slice)
                        .unwrap_or_default(),
                    Segment::Text { .. } => &[],
                }
            })
            .collect()
    }

    pub fn table_sources(&self, table_index: usize) -> Option<&SourceGrid> {
        self.tables.get(table_index).map(|t| &t.sources)
    }

    /// Combined text of every table segment, in reading order.
    pub fn table_texts(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter(|s| s.is_table())
            .map(Segment::content)
            .collect()
    }
}

/// Merge paragraphs and tables into a single reading-ordered segment list.
///
/// Paragraphs overlapping any table span are dropped. Context paragraphs are
/// not removed from the text stream, so their content can appear both on
/// their own and inside a table block.
pub fn reconstruct(result: &AnalyzeResult) -> Result<StructuredDocument, LayoutError> {
    let mut tables = Vec::with_capacity(result.tables.len());
    let mut keyed: Vec<(usize, Segment)> = Vec::new();

    for paragraph in standalone_paragraphs(result) {
        let Some(span) = paragraph.span() else {
            continue;
        };
        keyed.push((
            span.offset,
            Segment::Text {
                offset: span.offset,
                content: paragraph.content.clone(),
                source: paragraph.clone(),
            },
        ));
    }

    for record in &result.tables {
        let materialized = materialize(record);
        let offset = record.start_offset();
        let context = select_context(&result.paragraphs, offset);

        let mut content = format!(
            "Context:\n{}\n\nTable:\n{}",
            context.joined(),
            materialized.table.to_markdown()
        );
        let footnotes: Vec<&str> = record
            .footnotes
            .iter()
            .map(|f| f.content.trim())
            .filter(|c| !c.is_empty())
            .collect();
        if !footnotes.is_empty() {
            content.push_str("\n\nFootnotes:\n");
            content.push_str(&footnotes.join("\n"));
        }

        let polygons =
            collect_table_polygons(&context.polygons, &materialized.sources, &record.footnotes);
        let sources = page_bounding_boxes(&polygons)?;

        let table_index = tables.len();
        tables.push(materialized);
        keyed.push((
            offset.unwrap_or(usize::MAX),
            Segment::Table {
                offset,
                content,
                sources,
                table_index,
            },
        ));
    }

    // Stable: equal offsets keep paragraph-then-table insertion order.
    keyed.sort_by_key(|(offset, _)| *offset);

    debug!(
        paragraphs = result.paragraphs.len(),
        tables = tables.len(),
        segments = keyed.len(),
        "Reconstructed document layout"
    );

    Ok(StructuredDocument {
        segments: keyed.into_iter().map(|(_, seg)| seg).collect(),
        tables,
    })
}

fn overlaps_any(paragraph: Span, table_spans: &[Span]) -> bool {
    table_spans
        .iter()
        .any(|t| t.offset <= paragraph.end() && paragraph.offset <= t.end())
}

/// Paragraphs with a span that overlaps no table span, in document order.
pub fn standalone_paragraphs<'a>(result: &'a AnalyzeResult) -> Vec<&'a Paragraph> {
    let table_spans: Vec<Span> = result
        .tables
        .iter()
        .flat_map(|t| t.spans.iter().copied())
        .collect();
    result
        .paragraphs
        .iter()
        .filter(|p| p.span().is_some_and(|s| !overlaps_any(s, &table_spans)))
        .collect()
}
