use anyhow::Result;
use tracing::info;

use crate::processing::process_documents;
use crate::state::AppState;

pub async fn process(state: &AppState, blobs: &[String]) -> Result<()> {
    info!(count = blobs.len(), "Processing started");

    let outcome = process_documents(state, blobs).await?;

    for blob in &outcome.skipped {
        println!("skipped {} (no income statement)", blob);
    }
    println!("periods: {}", outcome.periods.join(", "));
    println!("{}", outcome.url);
    Ok(())
}
