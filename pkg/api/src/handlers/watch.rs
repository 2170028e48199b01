use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WatchQuery {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub seq: Option<u64>,
}

/// GET /api/v1/watch: SSE stream of store mutations under `prefix`,
/// replaying buffered events after `seq` before going live.
pub async fn watch_events(
    State(state): State<AppState>,
    Query(query): Query<WatchQuery>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let prefix = query.prefix.unwrap_or_default();
    let from_seq = query.seq.unwrap_or(0);

    let log = &state.registry.store().event_log;
    info!(
        "Watch subscription: prefix='{}', from_seq={}, head={}",
        prefix,
        from_seq,
        log.current_seq().await
    );

    // Subscribe before reading the buffer so nothing falls in between.
    let rx = log.subscribe();
    let buffered = log.events_since(from_seq, &prefix).await;
    let last_replayed = buffered.last().map(|e| e.seq).unwrap_or(from_seq);

    let buffered_stream = tokio_stream::iter(buffered.into_iter().filter_map(|e| {
        serde_json::to_string(&e)
            .ok()
            .map(|data| Ok::<_, Infallible>(Event::default().data(data)))
    }));

    let live_stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.seq > last_replayed && event.matches(&prefix) => {
            serde_json::to_string(&event)
                .ok()
                .map(|data| Ok::<_, Infallible>(Event::default().data(data)))
        }
        _ => None,
    });

    Sse::new(buffered_stream.chain(live_stream)).keep_alive(KeepAlive::default())
}
