use axum::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use bikescraper_rust::{
    AppState, build_app,
    client::{BackendClient, EnrichmentSession, ProgressOutcome},
    config::Settings,
    enrichment::Enricher,
    models::{AiAnalysis, Analyzed, Listing, ParsedDetails},
    progress::{self, ProgressTracker, SseDecoder, TrackerPhase},
    store::{ListingStore, LoadOutcome},
};

// Tags every listing as gravel after a short pause, so runs take observable time
struct SlowGravelEnricher;

#[async_trait]
impl Enricher for SlowGravelEnricher {
    async fn analyze(&self, _listing: &Listing) -> AiAnalysis {
        tokio::time::sleep(Duration::from_millis(50)).await;
        AiAnalysis {
            parsed_details: Some(Analyzed::Ready(ParsedDetails {
                bicycle_type: Some("gravel".into()),
                condition: Some("używany".into()),
                ..Default::default()
            })),
            ..Default::default()
        }
    }
}

struct TestServer {
    base_url: String,
    state: AppState,
    _data_dir: tempfile::TempDir,
}

async fn spawn_server(listings: Option<serde_json::Value>) -> TestServer {
    let data_dir = tempfile::tempdir().unwrap();
    if let Some(listings) = listings {
        std::fs::write(
            data_dir.path().join("gravel_bikes.json"),
            serde_json::to_vec(&listings).unwrap(),
        )
        .unwrap();
    }

    let settings = Settings {
        data_dir: data_dir.path().display().to_string(),
        ..Default::default()
    };
    let state = AppState::new(settings, Arc::new(SlowGravelEnricher));
    let app = build_app(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        state,
        _data_dir: data_dir,
    }
}

fn three_bikes() -> serde_json::Value {
    json!([
        {"title": "Kross Esker 4.0", "price": 4200, "url": "https://olx.pl/1", "brand": "Kross", "description": "Rower gravel"},
        {"title": "Trek Checkpoint", "price": 8900, "url": "https://olx.pl/2", "brand": "Trek", "description": "Carbon"},
        {"title": "Merida Silex", "price": 0, "url": "https://olx.pl/3", "description": "Do negocjacji"}
    ])
}

#[tokio::test]
async fn session_replaces_store_with_enriched_listings() {
    let server = spawn_server(Some(three_bikes())).await;
    let client = BackendClient::new(Arc::new(Client::new()), server.base_url.clone());

    let mut store = ListingStore::new();
    assert_eq!(client.load_into(&mut store).await.unwrap(), LoadOutcome::Loaded(3));
    assert!(store.all().iter().all(|l| l.ai_analysis.is_none()));

    let session = EnrichmentSession::new(client.clone());
    let report = session.run(&mut store).await.unwrap();

    assert_eq!(report.listings, LoadOutcome::Loaded(3));
    // The fetch may resolve before the final frame is read; both are fine
    assert!(matches!(report.progress, ProgressOutcome::Completed | ProgressOutcome::Cancelled));
    assert!(store.all().iter().all(|l| l.ai_analysis.as_ref().and_then(|a| a.details()).is_some()));

    // Persisted and reflected in the statistics
    assert_eq!(client.fetch_enriched().await.unwrap().len(), 3);
    let stats = client.fetch_statistics().await.unwrap();
    assert_eq!(stats.bicycle_type_counts.unwrap()["gravel"], 3);
    assert_eq!(stats.used_vs_new.unwrap().used, 3);
}

#[tokio::test]
async fn progress_stream_reaches_completion() {
    let server = spawn_server(Some(three_bikes())).await;
    let client = BackendClient::new(Arc::new(Client::new()), server.base_url.clone());

    // Subscribed once the response head arrives
    let response = client.open_progress().await.unwrap();
    let fetch = tokio::spawn({
        let client = client.clone();
        async move { client.request_enrichment().await }
    });

    let mut tracker = ProgressTracker::new();
    tracker.start("Connecting...");
    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();
    let mut percentages = Vec::new();

    'stream: while let Some(chunk) = tokio::time::timeout(Duration::from_secs(10), body.next())
        .await
        .expect("progress stream stalled")
    {
        for payload in decoder.push(&chunk.unwrap()) {
            let completed = tracker.apply(&progress::parse_event(&payload).unwrap());
            percentages.push(tracker.state().percentage);
            if completed {
                break 'stream;
            }
        }
    }

    assert_eq!(tracker.phase(), &TrackerPhase::Completed);
    assert_eq!(tracker.state().percentage, 100);
    assert!(tracker.state().done);
    assert!(percentages.windows(2).all(|w| w[0] <= w[1]));

    let enriched = fetch.await.unwrap().unwrap();
    assert_eq!(enriched.len(), 3);
}

#[tokio::test]
async fn second_run_while_busy_is_rejected() {
    let server = spawn_server(Some(three_bikes())).await;
    let http = Client::new();
    let url = format!("{}/api/ai-analyze", server.base_url);

    let first = tokio::spawn({
        let http = http.clone();
        let url = url.clone();
        async move { http.get(url).send().await.unwrap().status() }
    });
    while !server.state.hub.is_running() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let second = http.get(&url).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(first.await.unwrap(), StatusCode::OK);
    assert!(!server.state.hub.is_running());
}

#[tokio::test]
async fn nothing_to_analyze_is_not_found() {
    let server = spawn_server(None).await;
    let response = Client::new()
        .get(format!("{}/api/ai-analyze", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let client = BackendClient::new(Arc::new(Client::new()), server.base_url.clone());
    let mut store = ListingStore::new();
    assert_eq!(client.load_into(&mut store).await.unwrap(), LoadOutcome::Empty);
}

#[tokio::test]
async fn view_endpoint_filters_and_sorts() {
    let server = spawn_server(Some(three_bikes())).await;
    let view: serde_json::Value = Client::new()
        .get(format!("{}/api/view?brand=&price_min=1000&sort=price&direction=desc", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let titles: Vec<&str> = view["listings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Trek Checkpoint", "Kross Esker 4.0"]);
    assert_eq!(view["total"], 3);
    assert_eq!(view["options"]["brands"], json!(["Kross", "Trek"]));
    assert_eq!(view["statistics"]["status"], "sections");
}

// Backend whose enrichment answers normally but whose progress channel is broken.
// `progress_status` 500 fails the subscription; 200 with an empty body closes it early.
async fn spawn_broken_progress_backend(progress_status: StatusCode) -> String {
    use axum::{Json, Router, http::header, response::IntoResponse, routing::get};

    let app = Router::new()
        .route(
            "/api/ai-analyze",
            get(|| async {
                // Outlives the progress failure, so the session sees it before cancelling
                tokio::time::sleep(Duration::from_millis(300)).await;
                Json(json!([{"title": "Kross Esker 4.0", "price": 4200, "ai_analysis": {"error": "No description available"}}]))
            }),
        )
        .route(
            "/api/ai-analyze/progress",
            get(move || async move {
                if progress_status.is_success() {
                    (progress_status, [(header::CONTENT_TYPE, "text/event-stream")], String::new()).into_response()
                } else {
                    (progress_status, Json(json!({"detail": "progress unavailable"}))).into_response()
                }
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn broken_progress_channel_still_replaces_store() {
    for status in [StatusCode::INTERNAL_SERVER_ERROR, StatusCode::OK] {
        let base_url = spawn_broken_progress_backend(status).await;
        let session = EnrichmentSession::new(BackendClient::new(Arc::new(Client::new()), base_url));
        let mut store = ListingStore::new();
        store.replace(vec![
            Listing { title: "Old one".into(), ..Default::default() },
            Listing { title: "Old two".into(), ..Default::default() },
        ]);

        let report = session.run(&mut store).await.unwrap();

        match &report.progress {
            ProgressOutcome::Failed(reason) if status.is_success() => {
                assert!(reason.contains("closed before completion"), "{}", reason)
            }
            ProgressOutcome::Failed(reason) => assert!(reason.contains("progress unavailable"), "{}", reason),
            other => panic!("expected a failed progress channel for {}, got {:?}", status, other),
        }
        assert_eq!(report.listings, LoadOutcome::Loaded(1));
        assert_eq!(store.all().len(), 1);
        assert_eq!(store.all()[0].title, "Kross Esker 4.0");
    }
}
