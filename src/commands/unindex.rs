use anyhow::Result;
use tracing::info;

use crate::rag::forget_blob;
use crate::store::SearchIndex;

pub async fn unindex(index: &dyn SearchIndex, blob: &str) -> Result<()> {
    info!(blob, "Removing blob from the index");
    let removed = forget_blob(index, blob).await?;
    println!("removed {} segments of {}", removed, blob);
    Ok(())
}
