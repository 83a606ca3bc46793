// Handlers for backend API endpoints

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    AppState,
    enrichment,
    error::{AppError, AppResult},
    filter::FilterOptions,
    histogram::Histogram,
    models::{FilterCriteria, Listing, SortCriteria, SortDirection},
    statistics::{self, Projection},
    store::ListingStore,
};

// --- Request / response shapes ---

// Query string of /api/view and the dashboard page. Everything arrives as text
// because HTML forms submit empty fields as `price_min=`.
#[derive(Deserialize, Debug, Default)]
pub struct ViewQuery {
    pub brand: Option<String>,
    pub size: Option<String>,
    pub price_min: Option<String>,
    pub price_max: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<SortDirection>,
}

fn parse_price(name: &str, raw: Option<&str>) -> AppResult<Option<f64>> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse::<f64>()
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("{} must be a number, got '{}'", name, v))),
    }
}

impl ViewQuery {
    pub fn criteria(&self) -> AppResult<(FilterCriteria, SortCriteria)> {
        let filter = FilterCriteria {
            brand: self.brand.clone().filter(|b| !b.is_empty()),
            size: self.size.clone().filter(|s| !s.is_empty()),
            price_min: parse_price("price_min", self.price_min.as_deref())?,
            price_max: parse_price("price_max", self.price_max.as_deref())?,
        };
        let mut sort = SortCriteria::default();
        if let Some(field) = self.sort.as_deref().filter(|f| !f.is_empty()) {
            sort.field = field.to_string();
        }
        if let Some(direction) = self.direction {
            sort.direction = direction;
        }
        Ok((filter, sort))
    }
}

// Everything the dashboard draws for one filter/sort selection
#[derive(Serialize, Debug)]
pub struct DashboardView {
    pub listings: Vec<Listing>,
    pub total: usize,
    pub options: FilterOptions,
    pub filter: FilterCriteria,
    pub sort: SortCriteria,
    pub histogram: Histogram,
    pub statistics: Projection,
}

pub(crate) async fn build_view(app_state: &AppState, query: &ViewQuery) -> AppResult<DashboardView> {
    let (filter, sort) = query.criteria()?;

    let mut listings = app_state.repository.load_enriched().await?;
    if listings.is_empty() {
        listings = app_state.repository.load_listings().await?;
    }

    let mut store = ListingStore::new();
    store.replace(listings);
    store.apply_filter(filter);
    store.set_sort(sort);

    let summary = app_state.repository.statistics().await?;
    let histogram = store.histogram(app_state.settings.histogram_buckets);

    Ok(DashboardView {
        total: store.all().len(),
        options: store.options(),
        filter: store.filter().clone(),
        sort: store.sort().clone(),
        listings: store.view().to_vec(),
        histogram,
        statistics: statistics::project(&summary),
    })
}

// --- API Handlers ---

pub async fn get_bikes(State(app_state): State<AppState>) -> AppResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /api/data/bikes - Request received.");
    let listings = app_state.repository.load_listings().await?;
    Ok(Json(listings))
}

pub async fn get_enriched_bikes(State(app_state): State<AppState>) -> AppResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /api/data/enriched-bikes - Request received.");
    let listings = app_state.repository.load_enriched().await?;
    Ok(Json(listings))
}

pub async fn get_statistics(State(app_state): State<AppState>) -> AppResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /api/data/statistics - Request received.");
    let summary = app_state.repository.statistics().await?;
    Ok(Json(summary))
}

pub async fn export_csv(State(app_state): State<AppState>) -> AppResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /api/data/bikes.csv - Request received.");
    let body = app_state.repository.export_csv().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"gravel_bikes.csv\""),
        ],
        body,
    ))
}

// Runs enrichment to completion and answers with the enriched collection. The
// run lives in its own task so a dropped request does not abort it halfway.
pub async fn analyze_bikes(State(app_state): State<AppState>) -> AppResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /api/ai-analyze - Request received.");

    if !app_state.repository.has_listings() {
        return Err(AppError::NotFound(
            "No listings to analyze. Scrape some data first.".to_string(),
        ));
    }
    let Some(run) = app_state.hub.try_begin() else {
        return Err(AppError::Conflict("Analysis already running".to_string()));
    };

    let listings = app_state.repository.load_listings().await?;
    if listings.is_empty() {
        return Err(AppError::NotFound("No listings to analyze.".to_string()));
    }

    let enricher = Arc::clone(&app_state.enricher);
    let hub = Arc::clone(&app_state.hub);
    let repository = Arc::clone(&app_state.repository);
    let task = tokio::spawn(async move {
        let _run = run;
        enrichment::run_enrichment(enricher.as_ref(), &hub, &repository, listings).await
    });

    let enriched = task.await.context("Enrichment task panicked")??;
    tracing::info!("[HANDLER] /api/ai-analyze - Returning {} enriched listings.", enriched.len());
    Ok(Json(enriched))
}

pub async fn get_view(
    State(app_state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> AppResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /api/view - Request received: {:?}", query);
    let view = build_view(&app_state, &query).await?;
    Ok(Json(view))
}
