//! The worker loop: claim, look up, parse, submit.

use crate::client::{Batch, CoordinatorClient};
use crate::dns::{LocLookup, ResolverPool};
use crate::metrics::ScannerMetrics;
use futures::future::join_all;
use locmap_core::api::LocRecord;
use locmap_core::config::ScannerConfig;
use locmap_core::parse_loc_lenient;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How many times a submission is attempted before the work is
/// declared lost (the reaper will eventually requeue the batch).
const SUBMIT_ATTEMPTS: u32 = 3;

/// Base delay between submit attempts; attempt n waits n times this.
const SUBMIT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// One of N identical worker loops inside a scanner process.
pub struct Worker {
    id: usize,
    config: Arc<ScannerConfig>,
    client: Arc<CoordinatorClient>,
    pool: Arc<ResolverPool>,
    metrics: Arc<ScannerMetrics>,
    /// Set on graceful shutdown: finish the current batch, then exit.
    shutdown: CancellationToken,
    consecutive_errors: u32,
}

impl Worker {
    pub fn new(
        id: usize,
        config: Arc<ScannerConfig>,
        client: Arc<CoordinatorClient>,
        pool: Arc<ResolverPool>,
        metrics: Arc<ScannerMetrics>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            config,
            client,
            pool,
            metrics,
            shutdown,
            consecutive_errors: 0,
        }
    }

    /// Circuit-breaker delay for the current error streak.
    fn backoff_delay(&self) -> Option<Duration> {
        backoff_delay(
            self.consecutive_errors,
            self.config.retry_base(),
            self.config.max_backoff(),
        )
    }

    /// Count an error; true on the 0 -> 1 transition, which is the only
    /// one that gets logged (the rest back off silently).
    fn record_error(&mut self) -> bool {
        self.consecutive_errors += 1;
        self.consecutive_errors == 1
    }

    /// Clear the streak, returning its previous length.
    fn reset_errors(&mut self) -> u32 {
        std::mem::take(&mut self.consecutive_errors)
    }

    /// Run until shutdown or hard cancellation.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(worker = self.id, "Worker started");

        loop {
            if self.shutdown.is_cancelled() || cancel.is_cancelled() {
                tracing::info!(worker = self.id, "Worker stopped");
                return;
            }

            if let Some(delay) = self.backoff_delay() {
                tracing::debug!(
                    worker = self.id,
                    errors = self.consecutive_errors,
                    delay_secs = delay.as_secs(),
                    "Backing off"
                );
                tokio::select! {
                    _ = self.shutdown.cancelled() => continue,
                    _ = cancel.cancelled() => continue,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let batch = match self.client.get_batch().await {
                Ok(batch) => batch,
                Err(e) => {
                    if self.record_error() {
                        tracing::warn!(worker = self.id, error = %e, "Claim failed, entering backoff");
                    }
                    continue;
                }
            };

            let Some(batch) = batch else {
                if let prev @ 1.. = self.reset_errors() {
                    tracing::info!(worker = self.id, errors = prev, "Connection recovered");
                }
                let delay = jittered(self.config.empty_queue_delay());
                tracing::debug!(worker = self.id, delay_ms = delay.as_millis() as u64, "Queue empty");
                tokio::select! {
                    _ = self.shutdown.cancelled() => {}
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
                continue;
            };

            if let prev @ 1.. = self.reset_errors() {
                tracing::info!(worker = self.id, errors = prev, "Connection recovered");
            }
            self.metrics.batches_claimed.inc();

            // Finish this batch even if graceful shutdown arrives now;
            // only hard cancellation abandons it.
            self.process_batch(batch, &cancel).await;
        }
    }

    async fn process_batch(&mut self, batch: Batch, cancel: &CancellationToken) {
        let batch_id = batch.id;
        let domains_checked = batch.domains.len() as i64;
        tracing::info!(
            worker = self.id,
            batch_id,
            domains = domains_checked,
            "Processing batch"
        );

        // The pool bounds concurrency, so all lookups can be dispatched
        // at once.
        let lookups = join_all(
            batch
                .domains
                .iter()
                .map(|fqdn| async { (fqdn.as_str(), self.pool.lookup_loc(fqdn, cancel).await) }),
        )
        .await;

        let mut records: Vec<LocRecord> = Vec::new();
        for (fqdn, outcome) in lookups {
            match outcome {
                LocLookup::Found(raw) => {
                    tracing::info!(worker = self.id, fqdn, raw = %raw, "Found LOC record");
                    match parse_loc_lenient(fqdn, &raw) {
                        Ok(record) => records.push(record),
                        Err(e) => {
                            self.metrics.parse_failures.inc();
                            tracing::warn!(worker = self.id, fqdn, error = %e, "Unparseable LOC record");
                        }
                    }
                }
                LocLookup::NotFound => {}
                LocLookup::Failed(reason) => {
                    self.metrics.lookup_errors.inc();
                    tracing::debug!(worker = self.id, fqdn, reason = %reason, "Lookup failed");
                }
            }
        }

        self.metrics.domains_checked.inc_by(domains_checked as u64);
        self.metrics.loc_records_found.inc_by(records.len() as u64);
        let record_count = records.len();

        // Submit with retries; losing a batch is expensive for the
        // fleet (it sits in_flight until the reaper notices).
        let mut submitted = false;
        for attempt in 1..=SUBMIT_ATTEMPTS {
            match self
                .client
                .submit_batch(batch_id, domains_checked, records.clone())
                .await
            {
                Ok(accepted) => {
                    if let prev @ 1.. = self.reset_errors() {
                        tracing::info!(worker = self.id, errors = prev, "Connection recovered");
                    }
                    tracing::info!(
                        worker = self.id,
                        batch_id,
                        accepted,
                        records = record_count,
                        "Batch submitted"
                    );
                    submitted = true;
                    break;
                }
                Err(e) if attempt < SUBMIT_ATTEMPTS => {
                    let delay = SUBMIT_RETRY_DELAY * attempt;
                    tracing::warn!(
                        worker = self.id,
                        batch_id,
                        attempt,
                        error = %e,
                        retry_secs = delay.as_secs(),
                        "Submit failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    if self.record_error() {
                        tracing::warn!(worker = self.id, batch_id, error = %e, "Submit failed, entering backoff");
                    }
                }
            }
        }

        if !submitted {
            self.metrics.submit_failures.inc();
            tracing::warn!(
                worker = self.id,
                batch_id,
                records = record_count,
                "Lost batch results after {SUBMIT_ATTEMPTS} submit attempts"
            );
        }
    }
}

/// `base * 2^(errors-1)`, capped. Zero errors means no delay.
fn backoff_delay(errors: u32, base: Duration, max: Duration) -> Option<Duration> {
    if errors == 0 {
        return None;
    }
    let factor = 2f64.powi(errors.saturating_sub(1).min(16) as i32);
    Some(base.mul_f64(factor).min(max))
}

/// Spread a delay over 0.5x..1.5x to avoid a thundering herd against
/// an empty queue.
fn jittered(base: Duration) -> Duration {
    let factor = rand::rng().random_range(0.5..1.5);
    base.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);

        assert_eq!(backoff_delay(0, base, max), None);
        assert_eq!(backoff_delay(1, base, max), Some(Duration::from_secs(5)));
        assert_eq!(backoff_delay(2, base, max), Some(Duration::from_secs(10)));
        assert_eq!(backoff_delay(4, base, max), Some(Duration::from_secs(40)));
        assert_eq!(backoff_delay(10, base, max), Some(max));
        // Deep streaks must not overflow.
        assert_eq!(backoff_delay(u32::MAX, base, max), Some(max));
    }

    #[test]
    fn jitter_stays_within_half_to_one_and_a_half() {
        let base = Duration::from_secs(30);
        for _ in 0..1000 {
            let d = jittered(base);
            assert!(d >= Duration::from_secs(15), "{d:?}");
            assert!(d < Duration::from_secs(45), "{d:?}");
        }
    }
}
