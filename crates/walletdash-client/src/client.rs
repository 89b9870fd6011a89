//! Dashboard endpoint client.

use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::{debug, info};
use walletdash_core::{Address, BoxFuture, DashboardSnapshot};

use crate::error::{FetchError, FetchResult};

/// Default timeout for dashboard requests. The backend aggregates several
/// upstream sources per call, so this is generous.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest error body kept in [`FetchError::Status`].
const MAX_ERROR_BODY: usize = 256;

/// Source of dashboard snapshots.
///
/// Implemented by [`DashboardClient`]; tests substitute scripted fetchers.
pub trait DashboardFetcher: Send + Sync {
    /// Fetch the current snapshot for `address`.
    fn fetch(&self, address: Address) -> BoxFuture<'_, FetchResult<DashboardSnapshot>>;
}

/// Client for the dashboard aggregation backend.
#[derive(Debug, Clone)]
pub struct DashboardClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl DashboardClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - Backend root (e.g., "http://localhost:8080")
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn dashboard_url(&self, address: &Address) -> String {
        format!("{}/dashboard/{}", self.base_url, address)
    }

    fn map_send_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(e.to_string())
        }
    }

    /// Fetch the dashboard document for `address`.
    ///
    /// A 2xx document that only carries a top-level `error` is reported as
    /// [`FetchError::Backend`].
    pub async fn fetch_dashboard(&self, address: &Address) -> FetchResult<DashboardSnapshot> {
        let url = self.dashboard_url(address);
        let started = Instant::now();

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(
                body.char_indices()
                    .nth(MAX_ERROR_BODY)
                    .map_or(body.len(), |(i, _)| i),
            );
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        let snapshot: DashboardSnapshot =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;

        if snapshot.is_backend_error() {
            let message = snapshot.error.unwrap_or_default();
            return Err(FetchError::Backend(message));
        }

        debug!(
            address = %address.short(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = body.len(),
            timestamp = snapshot.timestamp,
            "Fetched dashboard snapshot"
        );
        Ok(snapshot)
    }

    /// Liveness probe against `GET {base}/health`.
    pub async fn health(&self) -> FetchResult<()> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status.is_success() {
            info!(url = %url, "Dashboard backend is healthy");
            Ok(())
        } else {
            Err(FetchError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

impl DashboardFetcher for DashboardClient {
    fn fetch(&self, address: Address) -> BoxFuture<'_, FetchResult<DashboardSnapshot>> {
        Box::pin(async move { self.fetch_dashboard(&address).await })
    }
}
