// Listing analytics for scraped bicycle marketplace data: filter/sort/statistics
// core, AI enrichment with progress streaming, and the axum API serving them

use axum::{Router, extract::FromRef};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

pub mod aggregate;
pub mod client;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod fields;
pub mod filter;
pub mod histogram;
pub mod models;
pub mod progress;
pub mod repository;
pub mod routes;
pub mod sort;
pub mod statistics;
pub mod store;

use config::Settings;
use enrichment::{Enricher, ProgressHub};
use repository::DataRepository;

// Shared application state handed to every handler
#[derive(Clone, FromRef)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub repository: Arc<DataRepository>,
    pub hub: Arc<ProgressHub>,
    pub enricher: Arc<dyn Enricher>,
}

impl AppState {
    pub fn new(settings: Settings, enricher: Arc<dyn Enricher>) -> Self {
        let repository = DataRepository::new(&settings.data_dir);
        AppState {
            settings: Arc::new(settings),
            repository: Arc::new(repository),
            hub: Arc::new(ProgressHub::new()),
            enricher,
        }
    }
}

// Full application: API and pages, static assets, request tracing
pub fn build_app(app_state: AppState) -> Router {
    let static_dir = app_state.settings.static_dir.clone();
    routes::create_router(app_state)
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
}
