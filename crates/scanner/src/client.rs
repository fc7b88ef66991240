//! HTTP client for the coordinator API.

use anyhow::{Context, Result, bail};
use locmap_core::api::{
    GetBatchRequest, GetBatchResponse, HeartbeatRequest, HeartbeatResponse, LocRecord,
    SubmitBatchRequest, SubmitBatchResponse,
};
use reqwest::Url;
use std::time::Duration;
use uuid::Uuid;

/// Default timeout for claim and heartbeat calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Submissions carry whole result sets and get a longer budget.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);

/// A batch of FQDNs handed out by the coordinator.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: i64,
    pub domains: Vec<String>,
}

/// Coordinator API client. One instance per scanner process; the
/// session id minted here identifies this process incarnation to the
/// coordinator for liveness tracking and batch reclaim.
pub struct CoordinatorClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    session_id: String,
}

impl CoordinatorClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid coordinator URL")?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            base_url,
            token: token.to_string(),
            session_id: Uuid::new_v4().to_string(),
        })
    }

    /// The process-unique session id.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("failed to build API URL")
    }

    /// Claim a batch. `None` means the queue is empty.
    pub async fn get_batch(&self) -> Result<Option<Batch>> {
        let url = self.url("/api/scanner/jobs")?;
        let req = GetBatchRequest {
            session_id: self.session_id.clone(),
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&req)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("get batch failed: {status} {body}");
        }

        let body: GetBatchResponse = response.json().await?;
        match body.batch_id {
            Some(id) if id > 0 => Ok(Some(Batch {
                id,
                domains: body.domains,
            })),
            _ => Ok(None),
        }
    }

    /// Send a keepalive for this session.
    pub async fn heartbeat(&self) -> Result<()> {
        let url = self.url("/api/scanner/heartbeat")?;
        let req = HeartbeatRequest {
            session_id: self.session_id.clone(),
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&req)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("heartbeat failed: {status} {body}");
        }

        let body: HeartbeatResponse = response.json().await?;
        if !body.ok {
            bail!("heartbeat rejected");
        }
        Ok(())
    }

    /// Submit batch results.
    pub async fn submit_batch(
        &self,
        batch_id: i64,
        domains_checked: i64,
        loc_records: Vec<LocRecord>,
    ) -> Result<usize> {
        let url = self.url("/api/scanner/results")?;
        let req = SubmitBatchRequest {
            batch_id,
            domains_checked,
            loc_records,
        };

        let response = self
            .http
            .post(url)
            .timeout(SUBMIT_TIMEOUT)
            .bearer_auth(&self.token)
            .json(&req)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("submit batch failed: {status} {body}");
        }

        let body: SubmitBatchResponse = response.json().await?;
        Ok(body.accepted)
    }
}
