use serde::{Deserialize, Serialize};

/// Object-store entry metadata, kept beside the blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobMeta {
    pub name: String,
    pub content_type: String,
    pub size: usize,
    /// blake3 hex of the content.
    pub hash: String,
    pub stored_at: i64,
}

/// One searchable segment of an indexed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: u64,
    pub text: String,
    /// Shared by every record uploaded in the same batch.
    pub document_group_id: String,
    pub document_id: String,
    /// JSON of the segment's source regions.
    pub bounding_regions: String,
    pub blob_name: String,
    pub is_table: bool,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub fiscal_year: Option<String>,
    #[serde(default)]
    pub quarter: Option<String>,
}

/// Exact-match constraints for index queries. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub blob_name: Option<String>,
    pub company_name: Option<String>,
    pub fiscal_year: Option<String>,
    pub is_table: Option<bool>,
}

impl RecordFilter {
    pub fn matches(&self, record: &IndexRecord) -> bool {
        self.blob_name.as_ref().map_or(true, |b| *b == record.blob_name)
            && self
                .company_name
                .as_ref()
                .map_or(true, |c| *c == record.company_name)
            && self
                .fiscal_year
                .as_ref()
                .map_or(true, |y| record.fiscal_year.as_ref() == Some(y))
            && self.is_table.map_or(true, |t| t == record.is_table)
    }
}

/// A query hit with the number of distinct keywords it contains.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub record: IndexRecord,
    pub match_count: usize,
}
