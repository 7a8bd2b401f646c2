use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{CastError, Result};

/// Which audio delivery capability the service was initialized with.
///
/// `Bundled` ships chunked audio to clients inside an asset bundle and drives
/// playback with timed chunk cues. `Direct` assumes clients already carry the
/// audio resource under the media id and plays/stops it by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioDelivery {
    Bundled,
    Direct,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP control API port.
    pub port: u16,
    /// Engine tick cadence in Hz.
    pub tick_hz: u32,
    /// Pixel edge length of one tile surface.
    pub tile_unit: u32,
    /// Root directory holding one frame directory per media source.
    pub frames_dir: PathBuf,
    /// Decoded frame images kept in memory.
    pub frame_cache_items: usize,
    pub default_viewer_radius: f64,
    pub default_pickup_radius: f64,
    /// Seconds between asset bundle re-send attempts to the same user.
    pub bundle_cooldown_secs: u64,
    /// Seconds of audio per bundle chunk.
    pub audio_chunk_secs: f64,
    pub max_shows: usize,
    /// Seconds between schedule sweeps.
    pub schedule_sweep_secs: u64,
    pub audio_delivery: AudioDelivery,
}

impl Default for Config {
    fn default() -> Self {
        let frames_dir = directories::ProjectDirs::from("is", "8b", "tilecast")
            .map(|dirs| dirs.data_dir().join("frames"))
            .unwrap_or_else(|| std::env::temp_dir().join("tilecast-frames"));

        Self {
            port: 8430,
            tick_hz: 20,
            tile_unit: 128,
            frames_dir,
            frame_cache_items: 64,
            default_viewer_radius: 48.0,
            default_pickup_radius: 24.0,
            bundle_cooldown_secs: 20,
            audio_chunk_secs: 5.0,
            max_shows: 4,
            schedule_sweep_secs: 10,
            audio_delivery: AudioDelivery::Bundled,
        }
    }
}

impl Config {
    /// Load from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Self::default()),
            Some(p) => {
                let raw = std::fs::read_to_string(p)?;
                toml::from_str(&raw)
                    .map_err(|e| CastError::Config(format!("{}: {}", p.display(), e)))
            }
        }
    }

    pub fn tick_period(&self) -> std::time::Duration {
        std::time::Duration::from_millis(1000 / self.tick_hz.max(1) as u64)
    }
}
