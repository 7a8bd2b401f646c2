pub mod audience;
pub mod config;
pub mod display;
pub mod error;
pub mod media;
pub mod playback;
pub mod render;
pub mod server;
pub mod show;
pub mod transport;

pub use error::{CastError, Result};

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// A connected user in the shared world.
pub type UserId = Uuid;

/// Opaque handle to one tile surface owned by the transport layer.
/// Displays reference surfaces by handle only; the transport owns them.
pub type SurfaceHandle = u32;

/// How a source frame is mapped onto the display's pixel resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalePolicy {
    /// Letterbox: preserve aspect, pad with black.
    Fit,
    /// Crop to fill: preserve aspect, center-crop overflow.
    Fill,
    /// Ignore aspect, resize exactly.
    Stretch,
}

/// A point in a named world/zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldPoint {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A grid of tile surfaces in the world, addressed as one logical screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Display {
    pub id: String,
    pub name: String,
    /// Tile grid dimensions; `surfaces` holds grid_width * grid_height handles
    /// in row-major order.
    pub grid_width: u32,
    pub grid_height: u32,
    pub scale_policy: ScalePolicy,
    pub surfaces: Vec<SurfaceHandle>,
    /// Geometric center of the display face. None when the owning world is gone.
    pub anchor: Option<WorldPoint>,
    /// Audio emission point; falls back to `anchor` when unset.
    pub speaker: Option<WorldPoint>,
    pub viewer_radius: f64,
    pub pickup_radius: f64,
    /// Shown on the tiles whenever nothing is playing.
    #[serde(skip)]
    pub idle_thumbnail: Option<RgbaImage>,
}

impl Display {
    pub fn tile_count(&self) -> usize {
        (self.grid_width * self.grid_height) as usize
    }
}

/// A media item with pre-extracted frames and optional audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaSource {
    pub id: String,
    pub frame_rate: f64,
    pub frame_count: u64,
    pub looped: bool,
    pub has_audio: bool,
    /// Directory of sequentially numbered frame images (000001.<ext>, ...).
    pub frames_dir: PathBuf,
    pub frame_ext: String,
    pub audio_channels: u32,
}

impl MediaSource {
    /// Seconds of playback at the nominal frame rate.
    pub fn duration_secs(&self) -> f64 {
        if self.frame_rate > 0.0 {
            self.frame_count as f64 / self.frame_rate
        } else {
            0.0
        }
    }
}
