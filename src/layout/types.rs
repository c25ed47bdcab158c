use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Polygons grouped by page number. Ordered so page aggregation is deterministic.
pub type PolygonsByPage = BTreeMap<u32, Vec<Vec<f64>>>;

/// Row-major grid of per-cell source regions (`None` where the cell was empty).
pub type SourceGrid = Vec<Vec<Option<BoundingRegion>>>;

/// A character range in the analyzed document's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub offset: usize,
    #[serde(default)]
    pub length: usize,
}

impl Span {
    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.length)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingRegion {
    pub page_number: u32,
    /// Flat `x0, y0, x1, y1, ...` vertex list in drawing order.
    #[serde(default)]
    pub polygon: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
    pub content: String,
    #[serde(default)]
    pub spans: Vec<Span>,
    #[serde(default)]
    pub bounding_regions: Vec<BoundingRegion>,
    /// e.g. "title", "sectionHeading", "pageHeader"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Paragraph {
    /// First span; the one used for ordering and overlap checks.
    pub fn span(&self) -> Option<Span> {
        self.spans.first().copied()
    }

    pub fn is_heading(&self) -> bool {
        matches!(self.role.as_deref(), Some("sectionHeading") | Some("title"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub row_index: usize,
    pub column_index: usize,
    /// "columnHeader" for header cells; absent for data cells.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub bounding_regions: Vec<BoundingRegion>,
}

impl Cell {
    pub fn is_column_header(&self) -> bool {
        self.kind.as_deref() == Some("columnHeader")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Footnote {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub bounding_regions: Vec<BoundingRegion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRecord {
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub column_count: usize,
    #[serde(default)]
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub spans: Vec<Span>,
    #[serde(default)]
    pub footnotes: Vec<Footnote>,
}

impl TableRecord {
    pub fn start_offset(&self) -> Option<usize> {
        self.spans.first().map(|s| s.offset)
    }
}

/// Layout-analysis output consumed by the reconstruction engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResult {
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
    #[serde(default)]
    pub tables: Vec<TableRecord>,
}

/// Axis-aligned box for one page: `[minX,minY, maxX,minY, maxX,maxY, minX,maxY]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBox {
    pub page_number: u32,
    pub bounding_box: [f64; 8],
}

/// One reading-ordered unit of the reconstructed document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Segment {
    Text {
        offset: usize,
        content: String,
        source: Paragraph,
    },
    Table {
        offset: Option<usize>,
        /// Context, markdown table and footnotes in one block.
        content: String,
        sources: Vec<PageBox>,
        table_index: usize,
    },
}

impl Segment {
    pub fn content(&self) -> &str {
        match self {
            Segment::Text { content, .. } | Segment::Table { content, .. } => content,
        }
    }

    pub fn offset(&self) -> Option<usize> {
        match self {
            Segment::Text { offset, .. } => Some(*offset),
            Segment::Table { offset, .. } => *offset,
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Segment::Table { .. })
    }

    /// Source metadata as stored alongside the segment in the search index.
    pub fn source_json(&self) -> serde_json::Result<String> {
        match self {
            Segment::Text { source, .. } => serde_json::to_string(source),
            Segment::Table { sources, .. } => serde_json::to_string(sources),
        }
    }
}
