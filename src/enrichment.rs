// AI enrichment of listings through a local Ollama model, plus the progress
// fan-out the dashboard subscribes to while a run is in flight

use axum::async_trait;
use cached::{Cached, TimedSizedCache};
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::time::{Duration, sleep};

use crate::error::CoreError;
use crate::models::{AiAnalysis, Analyzed, Category, Listing, ParsedDetails, ProgressEvent, ValueReport};
use crate::repository::DataRepository;

const MAX_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY_MS: u64 = 1000;
const REQUEST_TIMEOUT_SECS: u64 = 60;
const CACHE_SIZE: usize = 200;
const CACHE_TTL_SECS: u64 = 600;
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

// Produces an `AiAnalysis` for one listing. Failures are reported inside the
// analysis as error markers, so one bad listing never aborts a run.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn analyze(&self, listing: &Listing) -> AiAnalysis;
}

pub struct OllamaEnricher {
    http: Client,
    base_url: String,
    model: String,
    cache: Mutex<TimedSizedCache<u64, AiAnalysis>>,
}

impl OllamaEnricher {
    pub fn new(http: Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        OllamaEnricher {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            cache: Mutex::new(TimedSizedCache::with_size_and_lifespan(CACHE_SIZE, CACHE_TTL_SECS)),
        }
    }

    fn cached(&self, key: u64) -> Option<AiAnalysis> {
        let mut cache = self.cache.lock().ok()?;
        cache.cache_get(&key).cloned()
    }

    fn remember(&self, key: u64, analysis: &AiAnalysis) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.cache_set(key, analysis.clone());
        }
    }

    // One /api/generate call with retries and exponential backoff
    async fn generate(&self, prompt: &str) -> Result<Value, CoreError> {
        let url = format!("{}/api/generate", self.base_url);
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "format": "json",
        });
        let mut retry_delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS);
        let mut last_error = CoreError::TransportFailure("no attempt made".to_string());

        for attempt in 0..MAX_RETRIES {
            tracing::debug!(attempt, model = %self.model, "Ollama generate attempt {}/{}", attempt + 1, MAX_RETRIES);
            let result = self
                .http
                .post(&url)
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .json(&payload)
                .send()
                .await
                .and_then(|r| r.error_for_status());

            match result {
                Ok(response) => match response.json::<GenerateResponse>().await {
                    Ok(body) => match extract_json(&body.response) {
                        Some(value) => return Ok(value),
                        None => {
                            tracing::warn!(attempt, "Model reply was not JSON. Retrying...");
                            last_error = CoreError::MalformedInput("model reply was not JSON".to_string());
                        }
                    },
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, "Unreadable Ollama response. Retrying...");
                        last_error = e.into();
                    }
                },
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Ollama request failed. Retrying...");
                    last_error = e.into();
                }
            }

            if attempt + 1 < MAX_RETRIES {
                sleep(retry_delay).await;
                retry_delay *= 2;
            }
        }
        Err(last_error)
    }

    async fn ask<T: DeserializeOwned>(&self, prompt: &str, failure: &str) -> Analyzed<T> {
        match self.generate(prompt).await {
            Ok(value) => match serde_json::from_value(value) {
                Ok(parsed) => Analyzed::Ready(parsed),
                Err(e) => {
                    tracing::warn!(error = %e, "Model reply did not match the expected shape");
                    failed(failure)
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "{}", failure);
                failed(failure)
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

fn failed<T>(message: &str) -> Analyzed<T> {
    Analyzed::Failed {
        error: message.to_string(),
    }
}

fn cache_key(listing: &Listing, description: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    listing.title.hash(&mut hasher);
    description.hash(&mut hasher);
    listing.price.map(f64::to_bits).hash(&mut hasher);
    hasher.finish()
}

#[async_trait]
impl Enricher for OllamaEnricher {
    async fn analyze(&self, listing: &Listing) -> AiAnalysis {
        let Some(description) = listing.description.as_deref().filter(|d| !d.trim().is_empty()) else {
            tracing::warn!(title = %listing.title, "No description available");
            return AiAnalysis::failed("No description available");
        };

        let key = cache_key(listing, description);
        if let Some(hit) = self.cached(key) {
            tracing::debug!(title = %listing.title, "Using cached analysis");
            return hit;
        }

        tracing::info!(title = %listing.title, "Enriching listing");
        let parsed: Analyzed<ParsedDetails> = self
            .ask(&details_prompt(description), "Failed to parse bike description")
            .await;
        let analysis = match parsed {
            Analyzed::Ready(details) => {
                let category: Analyzed<Category> = self
                    .ask(&category_prompt(&listing.title, description), "Failed to categorize bike")
                    .await;
                let value: Analyzed<ValueReport> = match &category {
                    Analyzed::Ready(category) => {
                        self.ask(&value_prompt(listing, &details, category), "Failed to analyze bike value")
                            .await
                    }
                    Analyzed::Failed { .. } => failed("Could not analyze value due to categorization error"),
                };
                AiAnalysis {
                    error: None,
                    parsed_details: Some(Analyzed::Ready(details)),
                    category: Some(category),
                    value: Some(value),
                }
            }
            Analyzed::Failed { error } => AiAnalysis {
                error: None,
                parsed_details: Some(Analyzed::Failed { error }),
                category: Some(failed("Could not categorize due to parsing error")),
                value: Some(failed("Could not analyze value due to parsing error")),
            },
        };

        if analysis.details().is_some() {
            self.remember(key, &analysis);
        }
        analysis
    }
}

// Models sometimes wrap JSON in prose or a ```json fence
pub fn extract_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return Some(value);
    }
    if let Some(start) = text.find("```json") {
        let body = &text[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            if let Ok(value) = serde_json::from_str(body[..end].trim()) {
                return Some(value);
            }
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn details_prompt(description: &str) -> String {
    format!(
        r#"=== BICYCLE LISTING PARSING REQUEST ===
=== TEXT DESCRIPTION ===
{description}
=== TASK ===
Extract structured information about the bicycle from the description above.
=== REQUIRED JSON FORMAT ===
{{
  "bicycle_type": string or null,
  "brand": string or null,
  "model": string or null,
  "frame_size": string or null,
  "frame_material": string or null,
  "wheel_size": string or null,
  "groupset": string or null,
  "year": number or null,
  "condition": string or null (e.g. "nowy", "używany"),
  "accessories": [string]
}}
Format your entire response as valid JSON only. If you're unsure about any field, use null."#
    )
}

fn category_prompt(title: &str, description: &str) -> String {
    format!(
        r#"=== BICYCLE CATEGORIZATION REQUEST ===
Title: {title}
Description: {description}
=== REQUIRED JSON FORMAT ===
{{
  "primary_category": string (e.g. "road", "gravel", "mtb", "city", "trekking", "other"),
  "subcategory": string,
  "intended_use": string,
  "price_category": string (e.g. "budget", "mid-range", "high-end", "premium")
}}
Format your response as valid JSON only."#
    )
}

#[derive(Serialize)]
struct ValueInput<'a> {
    title: &'a str,
    price: Option<f64>,
    #[serde(flatten)]
    details: &'a ParsedDetails,
    #[serde(flatten)]
    category: &'a Category,
}

fn value_prompt(listing: &Listing, details: &ParsedDetails, category: &Category) -> String {
    let input = ValueInput {
        title: &listing.title,
        price: listing.known_price(),
        details,
        category,
    };
    let bike = serde_json::to_string(&input).unwrap_or_default();
    format!(
        r#"=== BICYCLE VALUE ANALYSIS REQUEST ===
=== BIKE DATA ===
{bike}
=== TASK ===
Estimate the fair market value, list selling points and concerns, and judge the listed price.
=== REQUIRED JSON FORMAT ===
{{
  "value_analysis": {{
    "estimated_value_range": {{ "low": number, "high": number, "currency": string }},
    "value_assessment": "fair" | "overpriced" | "underpriced"
  }},
  "selling_points": [string],
  "concerns": [string],
  "overall_recommendation": string
}}
Format your response as valid JSON only."#
    )
}

// Latest progress plus a broadcast channel for live subscribers.
//
// At most one run holds the hub at a time; `ProgressHub::try_begin` hands out
// a `RunGuard` that releases it on drop, panics included.
pub struct ProgressHub {
    latest: RwLock<ProgressEvent>,
    tx: broadcast::Sender<ProgressEvent>,
    running: AtomicBool,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        ProgressHub {
            latest: RwLock::new(ProgressEvent::new(0, 0, "Not started")),
            tx,
            running: AtomicBool::new(false),
        }
    }

    pub fn try_begin(self: &Arc<Self>) -> Option<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.publish(ProgressEvent::new(0, 0, "Initializing analysis..."));
        Some(RunGuard { hub: Arc::clone(self) })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn publish(&self, event: ProgressEvent) {
        if let Ok(mut latest) = self.latest.write() {
            *latest = event.clone();
        }
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn snapshot(&self) -> ProgressEvent {
        self.latest
            .read()
            .map(|latest| latest.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    // Receiver first, then snapshot, so nothing published in between is lost.
    // Outside a run the snapshot carries status only: a stale final event from
    // the previous run must not complete a fresh subscriber.
    pub fn subscribe(&self) -> (ProgressEvent, broadcast::Receiver<ProgressEvent>) {
        let rx = self.tx.subscribe();
        let mut snapshot = self.snapshot();
        if !self.is_running() {
            snapshot.current = 0;
            snapshot.total = 0;
        }
        (snapshot, rx)
    }
}

pub struct RunGuard {
    hub: Arc<ProgressHub>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.hub.running.store(false, Ordering::Release);
    }
}

fn short_title(title: &str) -> String {
    title.chars().take(30).collect()
}

// Enriches every listing in order, publishing `(i, total)` before each one and
// `(total, total)` at the end, then persists the enriched collection.
pub async fn run_enrichment(
    enricher: &dyn Enricher,
    hub: &ProgressHub,
    repository: &DataRepository,
    listings: Vec<Listing>,
) -> anyhow::Result<Vec<Listing>> {
    let total = listings.len() as u64;
    tracing::info!(total, "Starting enrichment run");
    hub.publish(ProgressEvent::new(0, total, "Preparing analysis..."));

    let mut enriched = Vec::with_capacity(listings.len());
    for (i, mut listing) in listings.into_iter().enumerate() {
        let i = i as u64;
        hub.publish(ProgressEvent::new(
            i,
            total,
            format!("Analyzing bike {}/{}: {}...", i + 1, total, short_title(&listing.title)),
        ));
        listing.ai_analysis = Some(enricher.analyze(&listing).await);
        enriched.push(listing);
    }

    if let Err(e) = repository.save_enriched(&enriched).await {
        hub.publish(ProgressEvent::new(0, 0, format!("Analysis failed: {}", e)));
        return Err(e);
    }

    hub.publish(ProgressEvent::new(total, total, "Analysis complete"));
    tracing::info!(total, "Enrichment run finished");
    Ok(enriched)
}
