//! Upstream corpus access: catalog discovery and file download.
//!
//! The corpus contract is deliberately thin: a catalog endpoint that
//! returns a recursive file listing, and a per-path raw download that
//! yields an XZ byte stream. Everything else (mirrors, quotas, storage
//! back ends) stays on the other side of these two URLs.

use anyhow::{Context, Result, bail};
use futures::TryStreamExt;
use locmap_core::config::UpstreamConfig;
use locmap_store::ScanStore;
use serde::Deserialize;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::io::StreamReader;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

const USER_AGENT: &str = concat!("locmap/", env!("CARGO_PKG_VERSION"));

/// Catalog listing response.
#[derive(Debug, Deserialize)]
struct CatalogTree {
    tree: Vec<CatalogEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: i64,
}

/// A corpus file found in the catalog.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub filename: String,
    pub url: String,
    pub size_bytes: i64,
}

/// HTTP client for the upstream corpus.
#[derive(Clone)]
pub struct CorpusClient {
    http: reqwest::Client,
    catalog_url: String,
    download_base_url: String,
    token: Option<String>,
}

impl CorpusClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("build upstream http client")?;
        Ok(Self {
            http,
            catalog_url: config.catalog_url.clone(),
            download_base_url: config.download_base_url.clone(),
            token: config.token.clone(),
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Fetch the catalog and return every compressed domain-list file.
    pub async fn list_files(&self) -> Result<Vec<DiscoveredFile>> {
        let response = self
            .authorize(self.http.get(&self.catalog_url))
            .send()
            .await
            .context("fetch catalog")?;
        if !response.status().is_success() {
            bail!("catalog: status {}", response.status());
        }

        let tree: CatalogTree = response.json().await.context("decode catalog")?;
        if tree.truncated {
            tracing::warn!("Catalog response was truncated, some files may be missing");
        }

        let files = tree
            .tree
            .into_iter()
            .filter(|entry| {
                entry.kind == "blob"
                    && entry.path.starts_with("data/")
                    && entry.path.ends_with(".txt.xz")
            })
            .map(|entry| DiscoveredFile {
                url: format!("{}{}", self.download_base_url, entry.path),
                filename: entry.path,
                size_bytes: entry.size,
            })
            .collect();

        Ok(files)
    }

    /// Stream one corpus file. The returned reader yields the raw
    /// (still compressed) bytes and aborts promptly when `cancel` fires,
    /// even mid-read of a multi-GB body.
    pub async fn download(
        &self,
        path: &str,
        cancel: CancellationToken,
    ) -> Result<CancellableReader<impl AsyncRead + Send + Unpin + use<>>> {
        let url = format!("{}{}", self.download_base_url, path);
        let response = self
            .authorize(self.http.get(&url))
            .header("Accept", "application/octet-stream")
            .send()
            .await
            .with_context(|| format!("download {path}"))?;

        if !response.status().is_success() {
            bail!("download {path}: status {}", response.status());
        }

        // Box::pin keeps the reader Unpin regardless of the body
        // stream's own pinned-ness.
        let stream = Box::pin(response.bytes_stream().map_err(io::Error::other));
        Ok(CancellableReader::new(StreamReader::new(stream), cancel))
    }
}

/// An `AsyncRead` wrapper that fails with `Interrupted` once the token
/// is cancelled, waking the task if cancellation arrives mid-read.
pub struct CancellableReader<R> {
    inner: R,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl<R> CancellableReader<R> {
    pub fn new(inner: R, cancel: CancellationToken) -> Self {
        Self {
            inner,
            cancelled: Box::pin(cancel.cancelled_owned()),
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CancellableReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.cancelled.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "download cancelled",
            )));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

/// Fetch the catalog and upsert every file into the store. Returns the
/// number of files now known.
pub async fn discover_files(client: &CorpusClient, store: &dyn ScanStore) -> Result<usize> {
    let files = client.list_files().await?;

    let mut count = 0usize;
    for file in &files {
        if let Err(e) = store
            .upsert_file(&file.filename, &file.url, file.size_bytes)
            .await
        {
            tracing::warn!(filename = %file.filename, error = %e, "Failed to upsert file");
            continue;
        }
        count += 1;
    }

    tracing::info!(count, "Discovery complete");
    Ok(count)
}
