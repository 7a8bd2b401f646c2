use bytes::Bytes;
use std::collections::HashSet;
use tracing::debug;

use crate::{SurfaceHandle, UserId, WorldPoint};

/// Client delivery capability. Implementations enqueue and return immediately;
/// the engine tick never waits on the wire.
pub trait Transport: Send + Sync {
    /// Replace the contents of one tile surface for one viewer.
    fn push_tile(&self, user: UserId, surface: SurfaceHandle, pixels: Bytes);

    /// Start a named client-side sound for one user.
    fn play_sound(&self, user: UserId, key: &str, volume: f32, pitch: f32);

    /// Stop a named client-side sound for one user.
    fn stop_sound(&self, user: UserId, key: &str);

    /// Offer an asset bundle download; the client acknowledges asynchronously.
    fn send_asset_bundle(&self, user: UserId, url: &str, hash: &str);
}

/// Spatial membership queries against the shared world.
pub trait ProximitySource: Send + Sync {
    /// Users within `radius` of `point`, or None when the point's world
    /// cannot be resolved (recoverable degraded state, not an error).
    fn nearby_users(&self, point: &WorldPoint, radius: f64) -> Option<HashSet<UserId>>;

    /// All currently connected users.
    fn online_users(&self) -> HashSet<UserId>;
}

/// The static HTTP host serving built audio bundles.
pub trait BundleHost: Send + Sync {
    fn is_running(&self) -> bool;
    fn public_base_url(&self) -> Option<String>;
}

/// Transport that only traces, for standalone runs without a connected world.
pub struct LogTransport;

impl Transport for LogTransport {
    fn push_tile(&self, user: UserId, surface: SurfaceHandle, pixels: Bytes) {
        debug!("push_tile user={} surface={} bytes={}", user, surface, pixels.len());
    }

    fn play_sound(&self, user: UserId, key: &str, volume: f32, pitch: f32) {
        debug!("play_sound user={} key={} vol={} pitch={}", user, key, volume, pitch);
    }

    fn stop_sound(&self, user: UserId, key: &str) {
        debug!("stop_sound user={} key={}", user, key);
    }

    fn send_asset_bundle(&self, user: UserId, url: &str, hash: &str) {
        debug!("send_asset_bundle user={} url={} hash={}", user, url, hash);
    }
}

/// Proximity source for a world with nobody in it.
pub struct EmptyWorld;

impl ProximitySource for EmptyWorld {
    fn nearby_users(&self, _point: &WorldPoint, _radius: f64) -> Option<HashSet<UserId>> {
        Some(HashSet::new())
    }

    fn online_users(&self) -> HashSet<UserId> {
        HashSet::new()
    }
}

/// Bundle host with a fixed base URL, assumed always up.
pub struct StaticBundleHost {
    base_url: Option<String>,
}

impl StaticBundleHost {
    pub fn new(base_url: Option<String>) -> Self {
        Self { base_url }
    }
}

impl BundleHost for StaticBundleHost {
    fn is_running(&self) -> bool {
        self.base_url.is_some()
    }

    fn public_base_url(&self) -> Option<String> {
        self.base_url.clone()
    }
}
