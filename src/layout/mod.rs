//! Layout reconstruction: turns OCR paragraphs and tables into one
//! reading-ordered list of text and table segments with page geometry.

pub mod context;
pub mod error;
pub mod geometry;
pub mod merge;
pub mod table;
pub mod types;

pub use merge::{reconstruct, StructuredDocument};
pub use table::Table;
pub use types::{AnalyzeResult, Segment};
