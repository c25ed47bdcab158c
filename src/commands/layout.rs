use std::path::Path;

use anyhow::{Context, Result};

use crate::layout::{reconstruct, AnalyzeResult, Segment, StructuredDocument};

pub async fn layout(path: &Path, full: bool) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let result: AnalyzeResult = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not an analyze result", path.display()))?;
    let doc = reconstruct(&result)?;
    print!("{}", render_segments(&doc, full));
    Ok(())
}

/// One line per segment; table segments get a second line with their grid
/// size and how many cells trace back to a page region.
fn render_segments(doc: &StructuredDocument, full: bool) -> String {
    let mut out = String::new();
    let related = doc.related_sources();
    for (i, segment) in doc.segments.iter().enumerate() {
        let kind = match segment {
            Segment::Text { .. } => "text",
            Segment::Table { .. } => "table",
        };
        let offset = segment
            .offset()
            .map_or_else(|| "-".to_string(), |o| o.to_string());
        let body = if full {
            segment.content()
        } else {
            segment.content().lines().next().unwrap_or("")
        };
        out.push_str(&format!("[{i}] {kind} @{offset}: {body}\n"));

        if let Segment::Table { table_index, .. } = segment {
            match doc.tables.get(*table_index) {
                Some(t) if !t.is_empty() => {
                    let located = related[i].iter().flatten().filter(|s| s.is_some()).count();
                    out.push_str(&format!(
                        "    {} rows x {} columns, {} cells located\n",
                        t.table.rows.len(),
                        t.table.width(),
                        located
                    ));
                }
                _ => out.push_str("    empty table\n"),
            }
        }
    }
    out
}
