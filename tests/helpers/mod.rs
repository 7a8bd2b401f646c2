// Shared across integration binaries; not every test uses every helper.
#![allow(dead_code)]

use bytes::Bytes;
use image::{Rgba, RgbaImage};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tilecast::config::Config;
use tilecast::transport::{BundleHost, ProximitySource, Transport};
use tilecast::{Display, MediaSource, ScalePolicy, SurfaceHandle, UserId, WorldPoint};

/// Everything the engine pushed through the transport, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Tile {
        user: UserId,
        surface: SurfaceHandle,
        payload: Vec<u8>,
    },
    Sound {
        user: UserId,
        key: String,
    },
    StopSound {
        user: UserId,
        key: String,
    },
    Bundle {
        user: UserId,
        url: String,
    },
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingTransport {
    pub fn events(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sound_keys(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Sent::Sound { key, .. } => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn bundle_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Sent::Bundle { .. }))
            .count()
    }

    /// Distinct first-byte palette indices of pushed tiles. With solid-color
    /// frames each frame has one well-known index.
    pub fn pushed_frame_indices(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Sent::Tile { payload, .. } => payload.first().copied(),
                _ => None,
            })
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn push_tile(&self, user: UserId, surface: SurfaceHandle, pixels: Bytes) {
        self.sent.lock().unwrap().push(Sent::Tile {
            user,
            surface,
            payload: pixels.to_vec(),
        });
    }

    fn play_sound(&self, user: UserId, key: &str, _volume: f32, _pitch: f32) {
        self.sent.lock().unwrap().push(Sent::Sound {
            user,
            key: key.to_string(),
        });
    }

    fn stop_sound(&self, user: UserId, key: &str) {
        self.sent.lock().unwrap().push(Sent::StopSound {
            user,
            key: key.to_string(),
        });
    }

    fn send_asset_bundle(&self, user: UserId, url: &str, _hash: &str) {
        self.sent.lock().unwrap().push(Sent::Bundle {
            user,
            url: url.to_string(),
        });
    }
}

/// A world whose membership the test scripts directly. Walking out of range
/// (`leave`) keeps the user connected; `disconnect` drops them entirely.
#[derive(Default)]
pub struct ScriptedWorld {
    near: Mutex<HashSet<UserId>>,
    online: Mutex<HashSet<UserId>>,
}

impl ScriptedWorld {
    pub fn enter(&self, user: UserId) {
        self.near.lock().unwrap().insert(user);
        self.online.lock().unwrap().insert(user);
    }

    pub fn leave(&self, user: UserId) {
        self.near.lock().unwrap().remove(&user);
    }

    pub fn disconnect(&self, user: UserId) {
        self.near.lock().unwrap().remove(&user);
        self.online.lock().unwrap().remove(&user);
    }
}

impl ProximitySource for ScriptedWorld {
    fn nearby_users(&self, _point: &WorldPoint, _radius: f64) -> Option<HashSet<UserId>> {
        Some(self.near.lock().unwrap().clone())
    }

    fn online_users(&self) -> HashSet<UserId> {
        self.online.lock().unwrap().clone()
    }
}

pub struct TestBundleHost;

impl BundleHost for TestBundleHost {
    fn is_running(&self) -> bool {
        true
    }

    fn public_base_url(&self) -> Option<String> {
        Some("http://bundles.test".to_string())
    }
}

pub fn test_config() -> Config {
    Config {
        tick_hz: 20,
        tile_unit: 8,
        frame_cache_items: 8,
        bundle_cooldown_secs: 0,
        audio_chunk_secs: 2.0,
        max_shows: 4,
        schedule_sweep_secs: 1,
        ..Config::default()
    }
}

pub fn test_display(id: &str) -> Display {
    Display {
        id: id.to_string(),
        name: id.to_string(),
        grid_width: 1,
        grid_height: 1,
        scale_policy: ScalePolicy::Stretch,
        surfaces: vec![0],
        anchor: Some(WorldPoint {
            world: "overworld".into(),
            x: 0.0,
            y: 64.0,
            z: 0.0,
        }),
        speaker: None,
        viewer_radius: 32.0,
        pickup_radius: 16.0,
        idle_thumbnail: None,
    }
}

/// The cube colors at the given ordinal: frame i is a solid color whose
/// quantized palette index is exactly i (for i < 216).
pub fn cube_color(i: u32) -> Rgba<u8> {
    let steps = [0u8, 51, 102, 153, 204, 255];
    let r = steps[(i / 36) as usize % 6];
    let g = steps[(i / 6) as usize % 6];
    let b = steps[(i % 6) as usize];
    Rgba([r, g, b, 255])
}

/// Write `count` solid-color 2x2 frames and return the media record.
pub fn write_media(dir: &Path, id: &str, count: u64, rate: f64, looped: bool, has_audio: bool) -> MediaSource {
    for i in 0..count {
        let img = RgbaImage::from_pixel(2, 2, cube_color(i as u32));
        img.save(dir.join(format!("{:06}.png", i + 1))).unwrap();
    }
    MediaSource {
        id: id.to_string(),
        frame_rate: rate,
        frame_count: count,
        looped,
        has_audio,
        frames_dir: dir.to_path_buf(),
        frame_ext: "png".to_string(),
        audio_channels: if has_audio { 2 } else { 0 },
    }
}

/// Advance virtual time in small steps, yielding so blocking-pool renders
/// and engine ticks interleave, until `done` holds or the budget runs out.
pub async fn settle_until(mut done: impl FnMut() -> bool) {
    for _ in 0..400 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if done() {
            return;
        }
    }
}

pub type SharedTransport = Arc<RecordingTransport>;
pub type SharedWorld = Arc<ScriptedWorld>;
