use super::types::{Paragraph, PolygonsByPage};

/// How many preceding paragraphs are considered as table context.
pub const CONTEXT_WINDOW: usize = 3;

/// Paragraphs attached to a table to help interpret it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableContext {
    pub texts: Vec<String>,
    pub polygons: PolygonsByPage,
    /// Positions of the kept paragraphs in the document's paragraph list.
    pub paragraph_indices: Vec<usize>,
}

impl TableContext {
    pub fn joined(&self) -> String {
        self.texts.join("\n")
    }
}

/// Pick the context paragraphs for a table starting at `table_offset`.
///
/// Looks at the last [`CONTEXT_WINDOW`] paragraphs that end at or before the
/// table. From the first heading in that window onward everything is kept;
/// without a heading only the closest paragraph is.
pub fn select_context(paragraphs: &[Paragraph], table_offset: Option<usize>) -> TableContext {
    let Some(table_offset) = table_offset else {
        return TableContext::default();
    };

    let preceding: Vec<usize> = paragraphs
        .iter()
        .enumerate()
        .filter(|(_, p)| p.span().is_some_and(|s| s.end() <= table_offset))
        .map(|(i, _)| i)
        .collect();
    let window = &preceding[preceding.len().saturating_sub(CONTEXT_WINDOW)..];

    let kept = match window.iter().position(|&i| paragraphs[i].is_heading()) {
        Some(start) => &window[start..],
        None => &window[window.len().saturating_sub(1)..],
    };

    let mut context = TableContext::default();
    for &i in kept {
        let paragraph = &paragraphs[i];
        context.texts.push(paragraph.content.clone());
        for region in paragraph.bounding_regions.iter().filter(|r| !r.polygon.is_empty()) {
            context
                .polygons
                .entry(region.page_number)
                .or_default()
                .push(region.polygon.clone());
        }
        context.paragraph_indices.push(i);
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::types::{BoundingRegion, Span};

    fn para(content: &str, offset: usize, role: Option<&str>) -> Paragraph {
        Paragraph {
            content: content.into(),
            spans: vec![Span {
                offset,
                length: content.len(),
            }],
            bounding_regions: vec![BoundingRegion {
                page_number: 1,
                polygon: vec![0.0, offset as f64, 1.0, offset as f64 + 1.0],
            }],
            role: role.map(str::to_string),
        }
    }

    #[test]
    fn missing_offset_gives_nothing() {
        let paragraphs = vec![para("a", 0, None)];
        assert_eq!(select_context(&paragraphs, None), TableContext::default());
    }

    #[test]
    fn keeps_from_heading_onward() {
        let paragraphs = vec![
            para("intro", 0, None),
            para("Income", 10, Some("sectionHeading")),
            para("in millions", 20, None),
            para("after table", 100, None),
        ];
        let ctx = select_context(&paragraphs, Some(50));
        assert_eq!(ctx.texts, vec!["Income", "in millions"]);
        assert_eq!(ctx.paragraph_indices, vec![1, 2]);
        assert_eq!(ctx.polygons[&1].len(), 2);
        assert_eq!(ctx.joined(), "Income\nin millions");
    }

    #[test]
    fn without_heading_keeps_last_only() {
        let paragraphs = vec![
            para("one", 0, None),
            para("two", 10, None),
            para("three", 20, None),
        ];
        let ctx = select_context(&paragraphs, Some(30));
        assert_eq!(ctx.texts, vec!["three"]);
        assert_eq!(ctx.paragraph_indices, vec![2]);
    }

    #[test]
    fn window_is_at_most_three_and_ends_before_table() {
        let paragraphs = vec![
            para("Title", 0, Some("title")),
            para("b", 10, Some("sectionHeading")),
            para("c", 20, None),
            para("d", 30, None),
            para("straddles", 38, None),
        ];
        let ctx = select_context(&paragraphs, Some(40));
        assert!(ctx.paragraph_indices.len() <= CONTEXT_WINDOW);
        assert_eq!(ctx.paragraph_indices, vec![1, 2, 3]);
        for &i in &ctx.paragraph_indices {
            assert!(paragraphs[i].span().unwrap().end() <= 40);
        }
    }

    #[test]
    fn nothing_precedes_table() {
        let paragraphs = vec![para("later", 50, None)];
        let ctx = select_context(&paragraphs, Some(10));
        assert!(ctx.texts.is_empty());
        assert!(ctx.polygons.is_empty());
    }
}
