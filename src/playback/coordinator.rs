use std::collections::HashMap;
use uuid::Uuid;

use crate::playback::session::PlaybackSession;

/// Holds the active sessions, one per display. The invariant is structural:
/// the map key is the display id, so a second start for the same display
/// must displace (and stop) the first.
pub struct PlaybackCoordinator {
    sessions: HashMap<String, PlaybackSession>,
}

impl PlaybackCoordinator {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    pub fn register(&mut self, session: PlaybackSession) -> Option<PlaybackSession> {
        self.sessions.insert(session.display_id.clone(), session)
    }

    pub fn remove(&mut self, display_id: &str) -> Option<PlaybackSession> {
        self.sessions.remove(display_id)
    }

    pub fn get(&self, display_id: &str) -> Option<&PlaybackSession> {
        self.sessions.get(display_id)
    }

    pub fn get_mut(&mut self, display_id: &str) -> Option<&mut PlaybackSession> {
        self.sessions.get_mut(display_id)
    }

    pub fn find_by_session(&self, id: Uuid) -> Option<&PlaybackSession> {
        self.sessions.values().find(|s| s.id == id)
    }

    pub fn find_by_session_mut(&mut self, id: Uuid) -> Option<&mut PlaybackSession> {
        self.sessions.values_mut().find(|s| s.id == id)
    }

    pub fn contains_session(&self, id: Uuid) -> bool {
        self.find_by_session(id).is_some()
    }

    pub fn pause(&mut self, display_id: &str) -> bool {
        self.sessions
            .get_mut(display_id)
            .map(|s| s.pause())
            .unwrap_or(false)
    }

    pub fn resume(&mut self, display_id: &str) -> bool {
        self.sessions
            .get_mut(display_id)
            .map(|s| s.resume())
            .unwrap_or(false)
    }

    pub fn display_ids(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    pub fn drain(&mut self) -> Vec<PlaybackSession> {
        self.sessions.drain().map(|(_, s)| s).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for PlaybackCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MediaSource;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn session(display_id: &str) -> PlaybackSession {
        let media = Arc::new(MediaSource {
            id: "clip".into(),
            frame_rate: 24.0,
            frame_count: 10,
            looped: false,
            has_audio: false,
            frames_dir: "/tmp".into(),
            frame_ext: "png".into(),
            audio_channels: 0,
        });
        PlaybackSession::new(display_id, media, false, Instant::now())
    }

    #[test]
    fn one_session_per_display() {
        let mut coord = PlaybackCoordinator::new();
        let first = session("d1");
        let first_id = first.id;
        assert!(coord.register(first).is_none());

        let displaced = coord.register(session("d1")).unwrap();
        assert_eq!(displaced.id, first_id);
        assert_eq!(coord.len(), 1);
    }

    #[test]
    fn commands_are_noops_for_unknown_displays() {
        let mut coord = PlaybackCoordinator::new();
        assert!(!coord.pause("ghost"));
        assert!(!coord.resume("ghost"));
        assert!(coord.remove("ghost").is_none());
    }

    #[test]
    fn lookup_by_session_id() {
        let mut coord = PlaybackCoordinator::new();
        let s = session("d1");
        let id = s.id;
        coord.register(s);
        assert!(coord.contains_session(id));
        assert!(!coord.contains_session(Uuid::new_v4()));
    }
}
