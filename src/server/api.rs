use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::http::AppState;
use crate::audience::bundle::DeliveryStatus;
use crate::show::schedule::{RepeatPolicy, ScheduleEntry};
use crate::show::{AudioZone, Room};
use crate::ScalePolicy;

fn ok() -> Json<serde_json::Value> {
    Json(json!({ "success": true }))
}

fn rejected(e: impl ToString) -> Json<serde_json::Value> {
    Json(json!({ "success": false, "error": e.to_string() }))
}

// Display endpoints

pub async fn list_displays(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({ "displays": state.displays.list() })))
}

pub async fn play_display(
    State(state): State<AppState>,
    Path(display_id): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let media_id = payload["media"].as_str().ok_or(StatusCode::BAD_REQUEST)?;
    let allow_audio = payload["allow_audio"].as_bool().unwrap_or(true);

    info!("Playing {} on display {}", media_id, display_id);

    match state.engine.play_display(&display_id, media_id, allow_audio).await {
        Ok(session_id) => Ok(Json(json!({
            "success": true,
            "session_id": session_id,
            "display_id": display_id,
        }))),
        Err(e) => Ok(rejected(e)),
    }
}

pub async fn stop_display(
    State(state): State<AppState>,
    Path(display_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    info!("Stopping playback on display {}", display_id);
    let stopped = state
        .engine
        .stop_display(&display_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(json!({ "success": true, "stopped": stopped })))
}

pub async fn pause_display(
    State(state): State<AppState>,
    Path(display_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let paused = state
        .engine
        .pause_display(&display_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(json!({ "success": true, "paused": paused })))
}

pub async fn resume_display(
    State(state): State<AppState>,
    Path(display_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let resumed = state
        .engine
        .resume_display(&display_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(json!({ "success": true, "resumed": resumed })))
}

pub async fn scale_display(
    State(state): State<AppState>,
    Path(display_id): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let policy = match payload["policy"].as_str() {
        Some("fit") => ScalePolicy::Fit,
        Some("fill") => ScalePolicy::Fill,
        Some("stretch") => ScalePolicy::Stretch,
        _ => return Err(StatusCode::BAD_REQUEST),
    };

    info!("Setting scale policy {:?} on display {}", policy, display_id);

    match state.displays.set_scale_policy(&display_id, policy) {
        Ok(()) => Ok(ok()),
        Err(e) => Ok(rejected(e)),
    }
}

// Media endpoints

pub async fn list_media(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({ "media": state.media.list() })))
}

// Room endpoints

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub displays: Vec<String>,
    #[serde(default)]
    pub audio_zone: Option<AudioZone>,
}

pub async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    info!("Creating room {} with {} displays", req.id, req.displays.len());

    let room = Room {
        name: req.name.unwrap_or_else(|| req.id.clone()),
        id: req.id,
        display_ids: req.displays,
        audio_zone: req.audio_zone,
        schedules: Vec::new(),
    };
    match state.engine.create_room(room).await {
        Ok(()) => Ok(ok()),
        Err(e) => Ok(rejected(e)),
    }
}

pub async fn delete_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    info!("Deleting room {}", room_id);
    let deleted = state
        .engine
        .delete_room(&room_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}

pub async fn list_rooms(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let rooms = state
        .engine
        .list_rooms()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(json!({ "rooms": rooms })))
}

// Show endpoints

pub async fn play_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let media_id = payload["media"].as_str().ok_or(StatusCode::BAD_REQUEST)?;

    info!("Starting show: {} in room {}", media_id, room_id);

    match state.engine.play_room(&room_id, media_id).await {
        Ok(()) => Ok(ok()),
        Err(e) => Ok(rejected(e)),
    }
}

pub async fn stop_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    info!("Stopping show in room {}", room_id);
    let stopped = state
        .engine
        .stop_room(&room_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(json!({ "success": true, "stopped": stopped })))
}

// Schedule endpoints

#[derive(Debug, Deserialize)]
pub struct AddScheduleRequest {
    pub media: String,
    pub next_run: DateTime<Utc>,
    #[serde(default = "default_repeat")]
    pub repeat: RepeatPolicy,
}

fn default_repeat() -> RepeatPolicy {
    RepeatPolicy::None
}

pub async fn add_schedule(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(req): Json<AddScheduleRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    info!("Scheduling {} in room {} at {}", req.media, room_id, req.next_run);

    let entry = ScheduleEntry::new(&room_id, &req.media, req.next_run, req.repeat);
    let entry_id = entry.id;
    match state.engine.add_schedule(entry).await {
        Ok(()) => Ok(Json(json!({ "success": true, "schedule_id": entry_id }))),
        Err(e) => Ok(rejected(e)),
    }
}

pub async fn remove_schedule(
    State(state): State<AppState>,
    Path((room_id, entry_id)): Path<(String, Uuid)>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match state.engine.remove_schedule(&room_id, entry_id).await {
        Ok(removed) => Ok(Json(json!({ "success": true, "removed": removed }))),
        Err(e) => Ok(rejected(e)),
    }
}

pub async fn list_schedules(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match state.engine.list_schedules(&room_id).await {
        Ok(schedules) => Ok(Json(json!({ "schedules": schedules }))),
        Err(e) => Ok(rejected(e)),
    }
}

// Asset bundle acknowledgment callback (client protocol glue posts here)

pub async fn bundle_ack(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let user: Uuid = payload["user"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or(StatusCode::BAD_REQUEST)?;
    let status = match payload["status"].as_str() {
        Some("accepted") => DeliveryStatus::Accepted,
        Some("declined") => DeliveryStatus::Declined,
        Some("failed") => DeliveryStatus::Failed,
        _ => return Err(StatusCode::BAD_REQUEST),
    };

    state.engine.bundle_ack(user, status);
    Ok(ok())
}

// Diagnostics

pub async fn doctor(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let report = state
        .engine
        .doctor()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(json!({ "doctor": report })))
}
