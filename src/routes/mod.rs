// Route definitions

use axum::{Router, routing::get};

use crate::AppState;

mod api;
mod progress;
mod static_pages;

pub use api::{DashboardView, ViewQuery};

// Returns a stateless Router; the state is attached here
pub fn create_router(app_state: AppState) -> Router {
    let api_router = Router::new()
        .route("/data/bikes", get(api::get_bikes))
        .route("/data/enriched-bikes", get(api::get_enriched_bikes))
        .route("/data/statistics", get(api::get_statistics))
        .route("/data/bikes.csv", get(api::export_csv))
        .route("/ai-analyze", get(api::analyze_bikes))
        .route("/ai-analyze/progress", get(progress::progress_stream))
        .route("/view", get(api::get_view))
        .with_state(app_state.clone());

    Router::new()
        .route("/", get(static_pages::dashboard_page))
        .nest("/api", api_router)
        .with_state(app_state)
}
