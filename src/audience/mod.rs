use std::collections::HashSet;
use std::sync::Arc;

use crate::transport::ProximitySource;
use crate::{Display, UserId};

pub mod bundle;

/// Restricts audio-listener membership beyond raw proximity (a Show scopes
/// audio to its room zone with one of these).
pub type AudienceFilter = Arc<dyn Fn(&UserId) -> bool + Send + Sync>;

/// Join/leave transitions for one tick. Only joins carry side effects;
/// leaves are silent.
#[derive(Debug, Default)]
pub struct AudienceDelta {
    pub joined: Vec<UserId>,
    pub left: Vec<UserId>,
}

/// Tracks who can see a display and who can hear it, recomputed every tick
/// by set difference against the previous tick.
#[derive(Default)]
pub struct AudienceTracker {
    viewers: HashSet<UserId>,
    listeners: HashSet<UserId>,
}

impl AudienceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn viewers(&self) -> &HashSet<UserId> {
        &self.viewers
    }

    pub fn listeners(&self) -> &HashSet<UserId> {
        &self.listeners
    }

    /// Recompute the viewer set from the display anchor. An unresolvable
    /// anchor (world gone) empties the set without raising an error.
    pub fn update_viewers(
        &mut self,
        proximity: &dyn ProximitySource,
        display: &Display,
    ) -> AudienceDelta {
        let current = display
            .anchor
            .as_ref()
            .and_then(|p| proximity.nearby_users(p, display.viewer_radius))
            .unwrap_or_default();
        let delta = diff(&self.viewers, &current);
        self.viewers = current;
        delta
    }

    /// Recompute the audio-listener set from the speaker point (anchor when
    /// no speaker is set), optionally narrowed by a filter predicate.
    pub fn update_audio_listeners(
        &mut self,
        proximity: &dyn ProximitySource,
        display: &Display,
        filter: Option<&AudienceFilter>,
    ) -> AudienceDelta {
        let point = display.speaker.as_ref().or(display.anchor.as_ref());
        let mut current = point
            .and_then(|p| proximity.nearby_users(p, display.pickup_radius))
            .unwrap_or_default();
        if let Some(f) = filter {
            current.retain(|u| f(u));
        }
        let delta = diff(&self.listeners, &current);
        self.listeners = current;
        delta
    }

    pub fn clear(&mut self) {
        self.viewers.clear();
        self.listeners.clear();
    }
}

fn diff(previous: &HashSet<UserId>, current: &HashSet<UserId>) -> AudienceDelta {
    AudienceDelta {
        joined: current.difference(previous).copied().collect(),
        left: previous.difference(current).copied().collect(),
    }
}
