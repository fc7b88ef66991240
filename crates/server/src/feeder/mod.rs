//! The feeder: turns upstream corpus files into scan batches.
//!
//! Single-flight per coordinator instance: one file is streamed,
//! decompressed, and chopped into fixed-size batches at a time. The
//! resume cursor (`processed_lines`) only ever advances inside the
//! same transaction that inserts a batch, so a crash or upstream
//! failure resumes exactly past the last committed batch.

pub mod upstream;

use crate::metrics::Metrics;
use anyhow::{Context, Result, bail};
use async_compression::tokio::bufread::XzDecoder;
use locmap_core::config::FeederConfig;
use locmap_store::models::DomainFileRow;
use locmap_store::ScanStore;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use upstream::CorpusClient;

/// Lines longer than this abort the file; domain lists are one FQDN
/// per line, so anything near the cap is corruption, not data.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Read buffer in front of the decompressor.
const READ_BUF_BYTES: usize = 64 * 1024;

/// Batch producer.
pub struct Feeder {
    store: Arc<dyn ScanStore>,
    config: FeederConfig,
    client: CorpusClient,
    metrics: Arc<Metrics>,
}

impl Feeder {
    pub fn new(
        store: Arc<dyn ScanStore>,
        config: FeederConfig,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let client = CorpusClient::new(&config.upstream)?;
        Ok(Self {
            store,
            config,
            client,
            metrics,
        })
    }

    /// Run the feed loop until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            batch_size = self.config.batch_size,
            max_pending = self.config.max_pending_batches,
            "Feeder started"
        );

        loop {
            if cancel.is_cancelled() {
                tracing::info!("Feeder stopped");
                return;
            }

            let file = match self.store.next_file_to_feed(OffsetDateTime::now_utc()).await {
                Ok(Some(file)) => file,
                Ok(None) => {
                    self.idle(&cancel).await;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Feeder: failed to pick next file");
                    self.idle(&cancel).await;
                    continue;
                }
            };

            tracing::info!(
                filename = %file.filename,
                resume_line = file.processed_lines,
                "Feeder: processing file"
            );

            if let Err(e) = self.process_file(&file, &cancel).await {
                if cancel.is_cancelled() {
                    tracing::info!("Feeder stopped");
                    return;
                }
                // The file stays in 'processing' with its cursor at the
                // last committed batch; the next loop iteration retries.
                tracing::warn!(filename = %file.filename, error = %e, "Feeder: file failed");
                self.idle(&cancel).await;
            }
        }
    }

    async fn idle(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(self.config.poll_interval()) => {}
        }
    }

    /// Stream, decompress, and batch a single file.
    async fn process_file(&self, file: &DomainFileRow, cancel: &CancellationToken) -> Result<()> {
        let body = self
            .client
            .download(&file.filename, cancel.clone())
            .await?;
        let decoder = XzDecoder::new(BufReader::with_capacity(READ_BUF_BYTES, body));
        let mut reader = BufReader::with_capacity(READ_BUF_BYTES, decoder);

        let mut raw_line = Vec::new();
        let mut line_num: i64 = 0;
        let mut batch: Vec<String> = Vec::new();
        let mut batch_start: i64 = 0;
        let mut batch_count: i64 = 0;

        loop {
            raw_line.clear();
            let n = reader
                .read_until(b'\n', &mut raw_line)
                .await
                .context("read line")?;
            if n == 0 {
                break;
            }
            if n > MAX_LINE_BYTES {
                bail!("line {} exceeds {} bytes", line_num + 1, MAX_LINE_BYTES);
            }

            line_num += 1;
            if line_num <= file.processed_lines {
                continue;
            }

            let line = String::from_utf8_lossy(&raw_line);
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if batch.is_empty() {
                batch_start = line_num;
            }
            batch.push(trimmed.to_string());

            if batch.len() >= self.config.batch_size {
                self.insert_batch(file.id, batch_start, line_num, &batch, cancel)
                    .await?;
                batch.clear();
                batch_count += 1;
                if batch_count % 100 == 0 {
                    tracing::info!(
                        filename = %file.filename,
                        batches = batch_count,
                        line = line_num,
                        "Feeder progress"
                    );
                }
            }
        }

        // Flush the partial final batch before latching feeding_complete.
        if !batch.is_empty() {
            self.insert_batch(file.id, batch_start, line_num, &batch, cancel)
                .await?;
            batch_count += 1;
        }

        tracing::info!(filename = %file.filename, batches = batch_count, "Feeder: feeding done");

        self.store
            .mark_feeding_complete(file.id)
            .await
            .context("mark feeding complete")?;

        match self
            .store
            .try_close_file(file.id, OffsetDateTime::now_utc())
            .await
        {
            Ok(true) => {
                tracing::info!(filename = %file.filename, "File complete (all batches done)");
            }
            Ok(false) if batch_count > 0 => {
                tracing::info!(
                    filename = %file.filename,
                    "File fed; batches still draining, moving on"
                );
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(filename = %file.filename, error = %e, "File close check failed");
            }
        }

        Ok(())
    }

    /// Block until the queue has capacity, then insert the batch and
    /// advance the file cursor in one transaction.
    async fn insert_batch(
        &self,
        file_id: i64,
        line_start: i64,
        line_end: i64,
        domains: &[String],
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                bail!("cancelled");
            }
            let pending = self
                .store
                .pending_batch_count()
                .await
                .context("pending count")?;
            if pending < self.config.max_pending_batches {
                break;
            }
            self.metrics.batches_pending.set(pending);
            tokio::select! {
                _ = cancel.cancelled() => bail!("cancelled"),
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        self.store
            .create_batch_and_advance(file_id, line_start, line_end, &domains.join("\n"))
            .await
            .context("insert batch")?;
        Ok(())
    }
}
