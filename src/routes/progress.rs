// SSE progress endpoint.
//
// GET /api/ai-analyze/progress
//
// Sends the hub's current snapshot first, then every event published while the
// client stays connected. Frames are plain `data:` messages carrying one
// `ProgressEvent` as JSON. The client closes the stream once it sees
// `current >= total`.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

use crate::AppState;
use crate::models::ProgressEvent;

fn to_event(progress: &ProgressEvent) -> Option<Event> {
    Event::default().json_data(progress).ok()
}

pub async fn progress_stream(
    State(app_state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (snapshot, rx) = app_state.hub.subscribe();
    tracing::debug!(current = snapshot.current, total = snapshot.total, "Progress subscriber connected");

    let initial = stream::iter(to_event(&snapshot).map(Ok::<_, Infallible>));
    let live = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(progress) => to_event(&progress).map(Ok),
            // A slow subscriber skips ahead; the next event carries the full state
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                tracing::debug!(missed, "Progress subscriber lagged");
                None
            }
        }
    });

    Sse::new(initial.chain(live)).keep_alive(KeepAlive::default())
}
