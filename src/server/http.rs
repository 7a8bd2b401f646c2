use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::display::DisplayRegistry;
use crate::media::MediaLibrary;
use crate::playback::engine::{Engine, EngineHandle};
use crate::transport::{BundleHost, ProximitySource, Transport};
use crate::{CastError, Result};

use super::api;
use super::sse::sse_handler;

pub struct HttpServer {
    pub engine: EngineHandle,
    pub displays: Arc<DisplayRegistry>,
    pub media: Arc<MediaLibrary>,
    port: u16,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub displays: Arc<DisplayRegistry>,
    pub media: Arc<MediaLibrary>,
}

impl HttpServer {
    /// Build registries, spawn the playback engine task, and wire the
    /// control surface around its handle.
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        proximity: Arc<dyn ProximitySource>,
        bundle_host: Arc<dyn BundleHost>,
    ) -> Self {
        let port = config.port;
        let displays = Arc::new(DisplayRegistry::new());
        let media = Arc::new(MediaLibrary::new());

        let (engine, handle) = Engine::new(
            config,
            Arc::clone(&displays),
            Arc::clone(&media),
            transport,
            proximity,
            bundle_host,
        );
        tokio::spawn(engine.run());

        Self {
            engine: handle,
            displays,
            media,
            port,
        }
    }

    pub async fn run(self) -> Result<()> {
        let state = AppState {
            engine: self.engine.clone(),
            displays: Arc::clone(&self.displays),
            media: Arc::clone(&self.media),
        };

        let app = Router::new()
            .route("/", get(health_check))
            .route("/health", get(health_check))
            // SSE endpoint for real-time updates
            .route("/events", get(sse_handler))
            // Displays
            .route("/api/displays", get(api::list_displays))
            .route("/api/displays/:id/play", post(api::play_display))
            .route("/api/displays/:id/stop", post(api::stop_display))
            .route("/api/displays/:id/pause", post(api::pause_display))
            .route("/api/displays/:id/resume", post(api::resume_display))
            .route("/api/displays/:id/scale", post(api::scale_display))
            // Media
            .route("/api/media", get(api::list_media))
            // Rooms and shows
            .route("/api/rooms", get(api::list_rooms).post(api::create_room))
            .route("/api/rooms/:id", delete(api::delete_room))
            .route("/api/rooms/:id/play", post(api::play_room))
            .route("/api/rooms/:id/stop", post(api::stop_room))
            // Schedules
            .route(
                "/api/rooms/:id/schedules",
                get(api::list_schedules).post(api::add_schedule),
            )
            .route(
                "/api/rooms/:id/schedules/:entry_id",
                delete(api::remove_schedule),
            )
            // Client protocol callbacks
            .route("/api/bundle-ack", post(api::bundle_ack))
            // Diagnostics
            .route("/api/doctor", get(api::doctor))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http());

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("tilecast HTTP server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| CastError::Unknown(format!("Failed to bind to port {}: {}", self.port, e)))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| CastError::Unknown(format!("Server error: {}", e)))?;

        Ok(())
    }
}

async fn health_check(State(_state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "service": "tilecast",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
