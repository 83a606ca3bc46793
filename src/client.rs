// HTTP client for the backend API and the client half of an enrichment run
//
// EnrichmentSession follows the progress stream and issues the enrichment request
// concurrently. The two are independent: the stream only feeds the progress bar,
// the fetch response is the data that replaces the store.

use futures::StreamExt;
use reqwest::{Client, Response};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::error::CoreError;
use crate::models::{Listing, ProgressState, StatisticsSummary};
use crate::progress::{self, ProgressTracker, SseDecoder};
use crate::store::{self, ListingStore, LoadOutcome};

#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Arc<Client>,
    base_url: String,
}

impl BackendClient {
    pub fn new(http: Arc<Client>, base_url: impl Into<String>) -> Self {
        BackendClient {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_settings(http: Arc<Client>, settings: &Settings) -> Self {
        Self::new(http, settings.backend_url.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Result<Response, CoreError> {
        let response = self.http.get(self.url(path)).send().await?;
        ensure_success(response).await
    }

    async fn get_listings(&self, path: &str) -> Result<Vec<Listing>, CoreError> {
        let bytes = self.get(path).await?.bytes().await?;
        let listings = store::parse_listings(&bytes)?;
        tracing::debug!(path, count = listings.len(), "Fetched listings");
        Ok(listings)
    }

    pub async fn fetch_listings(&self) -> Result<Vec<Listing>, CoreError> {
        self.get_listings("/api/data/bikes").await
    }

    pub async fn fetch_enriched(&self) -> Result<Vec<Listing>, CoreError> {
        self.get_listings("/api/data/enriched-bikes").await
    }

    pub async fn fetch_statistics(&self) -> Result<StatisticsSummary, CoreError> {
        let value: serde_json::Value = self.get("/api/data/statistics").await?.json().await?;
        if !value.is_object() {
            return Err(CoreError::MalformedInput(
                "expected a statistics object".to_string(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    // Blocks until the backend has enriched every listing
    pub async fn request_enrichment(&self) -> Result<Vec<Listing>, CoreError> {
        self.get_listings("/api/ai-analyze").await
    }

    pub async fn open_progress(&self) -> Result<Response, CoreError> {
        self.get("/api/ai-analyze/progress").await
    }

    // Initial load: prefer enriched listings when the backend has them
    pub async fn load_into(&self, store: &mut ListingStore) -> Result<LoadOutcome, CoreError> {
        let mut listings = self.fetch_enriched().await?;
        if listings.is_empty() {
            listings = self.fetch_listings().await?;
        }
        Ok(store.replace(listings))
    }
}

// Non-2xx responses become TransportFailure carrying the backend's `detail`
async fn ensure_success(response: Response) -> Result<Response, CoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
        .unwrap_or(body);
    Err(CoreError::TransportFailure(format!("{}: {}", status, detail)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressOutcome {
    Completed,
    Failed(String),
    // The fetch resolved first and the stream was closed
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentReport {
    pub listings: LoadOutcome,
    pub progress: ProgressOutcome,
}

pub struct EnrichmentSession {
    client: BackendClient,
    state_tx: watch::Sender<ProgressState>,
}

impl EnrichmentSession {
    pub fn new(client: BackendClient) -> Self {
        let (state_tx, _) = watch::channel(ProgressState::default());
        EnrichmentSession { client, state_tx }
    }

    // Progress snapshots for whoever draws the progress bar.
    pub fn progress(&self) -> watch::Receiver<ProgressState> {
        self.state_tx.subscribe()
    }

    // Runs one enrichment. On success the store's contents are swapped for the
    // enriched collection in one step; on failure the store is left untouched.
    pub async fn run(&self, store: &mut ListingStore) -> Result<EnrichmentReport, CoreError> {
        let cancel = CancellationToken::new();
        let follower = tokio::spawn(follow_progress(
            self.client.clone(),
            self.state_tx.clone(),
            cancel.clone(),
        ));

        let fetched = self.client.request_enrichment().await;
        cancel.cancel();

        let progress = match follower.await {
            Ok(outcome) => outcome,
            Err(e) => ProgressOutcome::Failed(format!("progress task aborted: {}", e)),
        };
        if let ProgressOutcome::Failed(reason) = &progress {
            tracing::warn!(reason = %reason, "Progress stream failed");
        }

        let listings = fetched?;
        let outcome = store.replace(listings);
        Ok(EnrichmentReport {
            listings: outcome,
            progress,
        })
    }
}

// Owns one tracker and one subscription. Returning drops the response body,
// which closes the connection from this side.
async fn follow_progress(
    client: BackendClient,
    state_tx: watch::Sender<ProgressState>,
    cancel: CancellationToken,
) -> ProgressOutcome {
    let mut tracker = ProgressTracker::new();
    tracker.start("Connecting...");
    state_tx.send_replace(tracker.state().clone());

    let opened = tokio::select! {
        _ = cancel.cancelled() => return ProgressOutcome::Cancelled,
        opened = client.open_progress() => opened,
    };
    let response = match opened {
        Ok(response) => response,
        Err(e) => return ProgressOutcome::Failed(e.to_string()),
    };

    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::new();
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return ProgressOutcome::Cancelled,
            chunk = body.next() => chunk,
        };
        let bytes = match chunk {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => return ProgressOutcome::Failed(CoreError::from(e).to_string()),
            None => return ProgressOutcome::Failed("progress stream closed before completion".to_string()),
        };

        for payload in decoder.push(&bytes) {
            let event = match progress::parse_event(&payload) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, payload = %payload, "Skipping unreadable progress frame");
                    continue;
                }
            };
            let completed = tracker.apply(&event);
            state_tx.send_replace(tracker.state().clone());
            if completed {
                return ProgressOutcome::Completed;
            }
        }
    }
}
