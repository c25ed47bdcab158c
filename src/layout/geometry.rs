//! Page-level bounding-box aggregation for table segments.

use super::error::LayoutError;
use super::types::{Footnote, PageBox, PolygonsByPage, SourceGrid};

/// Collapse every polygon on each page into one axis-aligned box.
///
/// Pages are emitted in ascending page-number order. A page with no vertices
/// is a caller bug and is reported as [`LayoutError::EmptyPage`].
pub fn page_bounding_boxes(polygons: &PolygonsByPage) -> Result<Vec<PageBox>, LayoutError> {
    polygons
        .iter()
        .map(|(&page, page_polygons)| {
            let bounding_box =
                enclosing_box(page_polygons).ok_or(LayoutError::EmptyPage { page })?;
            Ok(PageBox {
                page_number: page,
                bounding_box,
            })
        })
        .collect()
}

/// Component-wise extrema over every `(x, y)` vertex, as an 8-value polygon.
fn enclosing_box(polygons: &[Vec<f64>]) -> Option<[f64; 8]> {
    let mut vertices = polygons
        .iter()
        .flat_map(|polygon| polygon.chunks_exact(2))
        .map(|pair| (pair[0], pair[1]));

    let (x0, y0) = vertices.next()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (x0, y0, x0, y0);
    for (x, y) in vertices {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    Some([min_x, min_y, max_x, min_y, max_x, max_y, min_x, max_y])
}

/// Gather the context, cell and footnote polygons belonging to one table.
pub fn collect_table_polygons(
    context: &PolygonsByPage,
    sources: &SourceGrid,
    footnotes: &[Footnote],
) -> PolygonsByPage {
    let mut all = context.clone();

    let cells = sources.iter().flatten().flatten();
    let notes = footnotes.iter().flat_map(|f| &f.bounding_regions);
    for region in cells.chain(notes) {
        if region.polygon.is_empty() {
            continue;
        }
        all.entry(region.page_number)
            .or_default()
            .push(region.polygon.clone());
    }

    all
}
