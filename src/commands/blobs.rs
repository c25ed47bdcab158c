use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::store::{LocalObjectStore, ObjectStore};

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("tif") | Some("tiff") => "image/tiff",
        _ => "application/octet-stream",
    }
}

pub async fn upload(store: &dyn ObjectStore, file: &Path, name: Option<&str>) -> Result<()> {
    let name = match name {
        Some(n) => n.to_string(),
        None => file
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_string())
            .ok_or_else(|| anyhow!("{} has no file name", file.display()))?,
    };
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let meta = store.put(&name, &bytes, content_type_for(file)).await?;
    info!(blob = %meta.name, size = meta.size, "Blob uploaded");
    println!("{} ({} bytes, {})", meta.name, meta.size, meta.hash);
    Ok(())
}

pub async fn list(store: &dyn ObjectStore, suffix: Option<&str>) -> Result<()> {
    let blobs = store.list(suffix).await?;
    if blobs.is_empty() {
        println!("No blobs stored.");
        return Ok(());
    }
    for meta in blobs {
        let stored = DateTime::from_timestamp(meta.stored_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{:<40} {:>10}  {:<24} {}",
            meta.name, meta.size, meta.content_type, stored
        );
    }
    Ok(())
}

pub async fn url(store: &dyn ObjectStore, name: &str, ttl_hours: i64) -> Result<()> {
    let ttl = Duration::try_hours(ttl_hours).ok_or_else(|| anyhow!("ttl out of range"))?;
    println!("{}", store.signed_read_url(name, ttl).await?);
    Ok(())
}

/// Download the blob behind a signed read URL into `out` (defaults to the
/// blob name in the working directory).
pub async fn fetch(store: &LocalObjectStore, link: &str, out: Option<&Path>) -> Result<()> {
    let name = store.resolve_signed_url(link, Utc::now())?;
    let bytes = store.get(&name).await?;
    let target = out.map_or_else(|| Path::new(&name).to_path_buf(), Path::to_path_buf);
    tokio::fs::write(&target, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", target.display()))?;
    info!(blob = %name, size = bytes.len(), "Blob fetched");
    println!("{} ({} bytes)", target.display(), bytes.len());
    Ok(())
}
