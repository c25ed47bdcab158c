//! Object storage for documents and outputs, plus the segment search index.

pub mod blob;
pub mod index;
pub mod types;

pub use blob::{LocalObjectStore, ObjectStore};
pub use index::{JsonIndex, SearchIndex};
pub use types::{IndexRecord, RecordFilter};
