use anyhow::{Context, Result};
use reqwest::Client;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use bikescraper_rust::{AppState, build_app, config::Settings, enrichment::OllamaEnricher};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file first. Ignore errors (e.g., file not found)
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "bikescraper_rust=info,tower_http=info".into()))
        .with(fmt::layer())
        .init();

    tracing::info!("Initializing bike listings server...");

    // Load configuration
    let settings = match Settings::new() {
        Ok(s) => {
            tracing::info!("Configuration loaded successfully.");
            s
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    let http_client = Client::builder()
        .user_agent(concat!("bikescraper_rust/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build shared reqwest client")?;
    let enricher = Arc::new(OllamaEnricher::new(
        http_client,
        settings.ollama_url.clone(),
        settings.ollama_model.clone(),
    ));
    tracing::info!(url = %settings.ollama_url, model = %settings.ollama_model, "Ollama enricher configured.");

    let addr: SocketAddr = settings
        .server_address
        .parse()
        .with_context(|| format!("Invalid server address format: {}", settings.server_address))?;

    let app_state = AppState::new(settings, enricher);
    tracing::info!(data_dir = %app_state.repository.data_dir().display(), "Serving listings");
    let app = build_app(app_state);

    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => {
            tracing::info!("Server listening on {}", addr);
            l
        }
        Err(e) => {
            tracing::error!("Failed to bind to address {}: {}", addr, e);
            return Err(e.into());
        }
    };

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
