//! Server-sent event stream of broadcast messages.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::Utc;
use futures_util::stream::{self, Stream, StreamExt};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, warn};

use crate::broadcast::Topic;
use crate::dashboard::DashboardMetrics;
use crate::state::AppState;

/// GET /v1/events
///
/// Opens with the current dashboard as a `dashboard_update` event, then each
/// broadcast envelope becomes one event named after its topic.
pub async fn event_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.sink.subscribe();
    debug!(subscribers = state.sink.subscriber_count(), "Event stream opened");

    let initial = match DashboardMetrics::collect(state.repo.as_ref(), Utc::now()).await {
        Ok(dashboard) => encode(Topic::DashboardUpdate, &dashboard),
        Err(e) => {
            warn!(error = %e, "Failed to collect initial dashboard");
            None
        }
    };

    let live = BroadcastStream::new(receiver).filter_map(|message| async move {
        match message {
            Ok(envelope) => encode(envelope.topic, &envelope.payload),
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                warn!(skipped = n, "Event stream lagged, skipping events");
                Some(Ok(Event::default().comment(format!("skipped {n} events"))))
            }
        }
    });

    Sse::new(stream::iter(initial).chain(live)).keep_alive(KeepAlive::default())
}

fn encode<T: serde::Serialize>(topic: Topic, payload: &T) -> Option<Result<Event, Infallible>> {
    match Event::default().event(topic.as_str()).json_data(payload) {
        Ok(event) => Some(Ok(event)),
        Err(e) => {
            warn!(topic = topic.as_str(), error = %e, "Failed to encode event");
            None
        }
    }
}
