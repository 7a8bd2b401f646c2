use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::StreamExt as _;
use tracing::info;
use uuid::Uuid;

use super::http::AppState;

// Global event broadcaster
lazy_static::lazy_static! {
    static ref EVENT_BROADCASTER: broadcast::Sender<PlaybackEvent> = {
        let (tx, _) = broadcast::channel(100);
        tx
    };
}

#[derive(Clone, Debug, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackEvent {
    SessionStarted {
        display_id: String,
        media_id: String,
        session_id: String,
    },
    SessionStopped {
        display_id: String,
        session_id: String,
        reason: String,
    },
    ShowStarted {
        room_id: String,
        media_id: String,
        displays: usize,
    },
    ShowStopped {
        room_id: String,
        reason: String,
    },
    ScheduleTriggered {
        room_id: String,
        media_id: String,
    },
    Error {
        message: String,
    },
}

pub async fn sse_handler(
    State(_state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected");

    let rx = EVENT_BROADCASTER.subscribe();

    let stream = tokio_stream::wrappers::BroadcastStream::new(rx).map(|result| {
        match result {
            Ok(event) => {
                let json = serde_json::to_string(&event).unwrap_or_default();
                Ok(Event::default().event("playback-event").data(json))
            }
            Err(_) => {
                // Client lagged, send a sync event
                Ok(Event::default().event("sync-required").data("{}"))
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}

pub fn broadcast_event(event: PlaybackEvent) {
    let _ = EVENT_BROADCASTER.send(event);
}

// Helper functions for common events
pub fn notify_session_started(display_id: &str, media_id: &str, session_id: Uuid) {
    broadcast_event(PlaybackEvent::SessionStarted {
        display_id: display_id.to_string(),
        media_id: media_id.to_string(),
        session_id: session_id.to_string(),
    });
}

pub fn notify_session_stopped(display_id: &str, session_id: Uuid, reason: &str) {
    broadcast_event(PlaybackEvent::SessionStopped {
        display_id: display_id.to_string(),
        session_id: session_id.to_string(),
        reason: reason.to_string(),
    });
}

pub fn notify_show_started(room_id: &str, media_id: &str, displays: usize) {
    broadcast_event(PlaybackEvent::ShowStarted {
        room_id: room_id.to_string(),
        media_id: media_id.to_string(),
        displays,
    });
}

pub fn notify_show_stopped(room_id: &str, reason: &str) {
    broadcast_event(PlaybackEvent::ShowStopped {
        room_id: room_id.to_string(),
        reason: reason.to_string(),
    });
}

pub fn notify_schedule_triggered(room_id: &str, media_id: &str) {
    broadcast_event(PlaybackEvent::ScheduleTriggered {
        room_id: room_id.to_string(),
        media_id: media_id.to_string(),
    });
}

pub fn notify_error(message: String) {
    broadcast_event(PlaybackEvent::Error { message });
}
