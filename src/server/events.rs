//! Server-Sent Events feed of station events.
//!
//! Replays recent events for late joiners, then follows the [`EventBus`]
//! live, optionally filtered by category, with periodic heartbeats.
//!
//! [`EventBus`]: oa_core::events::EventBus

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use oa_core::events::EventCategory;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use super::AppContext;

const REPLAY_EVENTS: usize = 50;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// "admin" or "user"; anything else means no filter.
    pub category: Option<String>,
}

/// GET /api/events
pub async fn events_handler(
    State(ctx): State<AppContext>,
    Query(params): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let filter = params.category.as_deref().and_then(parse_category);
    let recent = ctx.events.recent_events(REPLAY_EVENTS);
    let mut rx = ctx.events.subscribe();

    let stream = async_stream::stream! {
        for event in recent.into_iter().rev() {
            if matches_category(filter, event.category) {
                if let Ok(data) = serde_json::to_string(&event) {
                    yield Ok(Event::default().data(data));
                }
            }
        }

        let mut heartbeat = tokio::time::interval(Duration::from_secs(15));

        loop {
            tokio::select! {
                result = rx.recv() => match result {
                    Ok(event) => {
                        if matches_category(filter, event.category) {
                            if let Ok(data) = serde_json::to_string(&event) {
                                yield Ok(Event::default().data(data));
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => tracing::debug!("SSE client lagged by {n} events"),
                    Err(RecvError::Closed) => break,
                },
                _ = heartbeat.tick() => {
                    yield Ok(Event::default().event("heartbeat").data(r#"{"type":"heartbeat"}"#));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}

fn matches_category(filter: Option<EventCategory>, category: EventCategory) -> bool {
    filter.map_or(true, |f| f == category)
}

fn parse_category(s: &str) -> Option<EventCategory> {
    match s {
        "admin" => Some(EventCategory::Admin),
        "user" => Some(EventCategory::User),
        _ => None,
    }
}
