use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    /// A page was listed for aggregation without a single vertex.
    #[error("page {page} has no polygon vertices to aggregate")]
    EmptyPage { page: u32 },
}
