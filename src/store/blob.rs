use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tracing::{debug, warn};

use super::types::BlobMeta;

const META_DIR: &str = ".meta";
const SIGNING_CONTEXT: &str = "fin-scraper object store read url v1";

/// Named binary objects with time-limited read links.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, name: &str, bytes: &[u8], content_type: &str) -> Result<BlobMeta>;
    async fn get(&self, name: &str) -> Result<Vec<u8>>;
    /// Stored objects whose name ends with `suffix`, sorted by name.
    async fn list(&self, suffix: Option<&str>) -> Result<Vec<BlobMeta>>;
    async fn signed_read_url(&self, name: &str, ttl: Duration) -> Result<String>;
}

/// Filesystem-backed store: `<root>/<name>` plus `<root>/.meta/<name>.json`.
pub struct LocalObjectStore {
    root: PathBuf,
    public_url: String,
    signing_key: [u8; 32],
}

impl LocalObjectStore {
    pub fn new(root: &Path, public_url: &str, secret: &str) -> Result<Self> {
        std::fs::create_dir_all(root.join(META_DIR))
            .with_context(|| format!("Failed to create object store at {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
            public_url: public_url.trim_end_matches('/').to_string(),
            signing_key: blake3::derive_key(SIGNING_CONTEXT, secret.as_bytes()),
        })
    }

    pub fn from_env() -> Result<Self> {
        let data_dir = dotenv::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());
        let public_url = dotenv::var("OBJECT_STORE_PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:8080/blobs".to_string());
        let secret = dotenv::var("OBJECT_STORE_SIGNING_KEY").unwrap_or_else(|_| {
            warn!("OBJECT_STORE_SIGNING_KEY not set, signing read URLs with a development key");
            "development-signing-key".to_string()
        });
        Self::new(&Path::new(&data_dir).join("blobs"), &public_url, &secret)
    }

    fn blob_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    fn meta_path(&self, name: &str) -> PathBuf {
        self.root.join(META_DIR).join(format!("{}.json", name))
    }

    fn signature(&self, name: &str, expires: &str) -> String {
        let message = format!("{}\n{}", name, expires);
        blake3::keyed_hash(&self.signing_key, message.as_bytes())
            .to_hex()
            .to_string()
    }

    /// Check a `signed_read_url` signature against `now`.
    pub fn verify_signature(
        &self,
        name: &str,
        expires: &str,
        signature: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let Ok(expiry) = DateTime::parse_from_rfc3339(expires) else {
            return false;
        };
        if expiry.with_timezone(&Utc) < now {
            return false;
        }
        let Ok(given) = blake3::Hash::from_hex(signature) else {
            return false;
        };
        // Hash equality is constant-time.
        blake3::keyed_hash(&self.signing_key, format!("{}\n{}", name, expires).as_bytes()) == given
    }

    /// Blob name behind a `signed_read_url` link, once its signature and
    /// expiry check out at `now`.
    pub fn resolve_signed_url(&self, link: &str, now: DateTime<Utc>) -> Result<String> {
        let url = reqwest::Url::parse(link).with_context(|| format!("Invalid URL `{}`", link))?;
        let base = reqwest::Url::parse(&self.public_url)
            .with_context(|| format!("Invalid object store public URL `{}`", self.public_url))?;
        if url.origin() != base.origin() {
            bail!("{} is not served by this object store", link);
        }
        let segment = url
            .path()
            .strip_prefix(base.path().trim_end_matches('/'))
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .ok_or_else(|| anyhow!("{} is not under {}", link, self.public_url))?;
        let name = decode_path_segment(segment)?;
        validate_name(&name)?;

        let param = |key: &str| {
            url.query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        };
        let (Some(expires), Some(sig)) = (param("expires"), param("sig")) else {
            bail!("{} is not a signed URL", link);
        };
        if !self.verify_signature(&name, &expires, &sig, now) {
            bail!("signature for {} is invalid or expired", name);
        }
        Ok(name)
    }

    fn signed_url_at(&self, name: &str, expiry: DateTime<Utc>) -> Result<String> {
        let expires = expiry.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut url = reqwest::Url::parse(&self.public_url)
            .with_context(|| format!("Invalid object store public URL `{}`", self.public_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Object store public URL cannot take a path"))?
            .push(name);
        url.query_pairs_mut()
            .append_pair("expires", &expires)
            .append_pair("sig", &self.signature(name, &expires));
        Ok(url.to_string())
    }
}

/// Percent-decode one path segment by reading it back as a query value.
fn decode_path_segment(segment: &str) -> Result<String> {
    // '+' and '&' are literal in paths but separators in query strings.
    let escaped = segment.replace('+', "%2B").replace('&', "%26");
    let mut scratch = reqwest::Url::parse("http://localhost/")?;
    scratch.set_query(Some(&format!("v={}", escaped)));
    scratch
        .query_pairs()
        .next()
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| anyhow!("empty path segment"))
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.contains("..")
    {
        bail!("invalid object name `{}`", name);
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, name: &str, bytes: &[u8], content_type: &str) -> Result<BlobMeta> {
        let path = self.blob_path(name)?;
        let meta = BlobMeta {
            name: name.to_string(),
            content_type: content_type.to_string(),
            size: bytes.len(),
            hash: blake3::hash(bytes).to_hex().to_string(),
            stored_at: Utc::now().timestamp(),
        };

        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write blob {}", name))?;
        tokio::fs::write(
            self.meta_path(name),
            serde_json::to_vec(&meta).context("serialize blob meta")?,
        )
        .await
        .with_context(|| format!("Failed to write metadata for {}", name))?;

        debug!(blob = name, size = bytes.len(), content_type, "blob stored");
        Ok(meta)
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(name)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("blob not found: {}", name))
    }

    async fn list(&self, suffix: Option<&str>) -> Result<Vec<BlobMeta>> {
        let mut entries = tokio::fs::read_dir(self.root.join(META_DIR))
            .await
            .context("Failed to read object store metadata")?;
        let mut results = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let bytes = match tokio::fs::read(entry.path()).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Error reading blob meta {:?}: {}", entry.path(), e);
                    continue;
                }
            };
            if let Ok(meta) = serde_json::from_slice::<BlobMeta>(&bytes) {
                if suffix.map_or(true, |s| meta.name.ends_with(s)) {
                    results.push(meta);
                }
            }
        }

        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    async fn signed_read_url(&self, name: &str, ttl: Duration) -> Result<String> {
        validate_name(name)?;
        if !tokio::fs::try_exists(self.meta_path(name)).await.unwrap_or(false) {
            bail!("blob not found: {}", name);
        }
        self.signed_url_at(name, Utc::now() + ttl)
    }
}
