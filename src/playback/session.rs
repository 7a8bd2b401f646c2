use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

use crate::audience::{AudienceFilter, AudienceTracker};
use crate::playback::audio::AudioChunkPlayer;
use crate::{MediaSource, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Preparing,
    Playing,
    Paused,
    Stopping,
    Error,
}

/// What a pacing tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Not enough time elapsed, or not in a playing state.
    NotYet,
    /// A render for this session is still running; skip, never queue.
    InFlight,
    /// Submit this frame for rendering.
    Frame(u64),
    /// The loop wrapped: restart audio and render this frame (0).
    Wrapped(u64),
    /// Frames exhausted and not looping; the session entered Stopping.
    Finished,
}

/// Data the engine needs to apply transport side effects after a stop.
#[derive(Debug)]
pub struct StopEffects {
    pub viewers: Vec<UserId>,
    pub listeners: Vec<UserId>,
    pub direct_audio: bool,
}

/// The per-display playback state machine. Owns pacing and audience state;
/// the engine owns scheduling, rendering, and all transport side effects.
pub struct PlaybackSession {
    pub id: Uuid,
    pub display_id: String,
    pub media: Arc<MediaSource>,
    pub allow_audio: bool,
    /// Set when the engine started a named client-side sound directly
    /// (no bundle mechanism); stop must issue stop-sound to listeners.
    pub direct_audio: bool,
    pub audience: AudienceTracker,
    pub audio: Option<AudioChunkPlayer>,
    pub audio_filter: Option<AudienceFilter>,
    state: SessionState,
    frame_index: u64,
    /// Computed once from the media frame rate, never re-derived mid-session.
    frame_duration: Duration,
    last_frame_at: Instant,
    render_in_flight: Arc<AtomicBool>,
    stopped: bool,
    missing_frame_logged: bool,
}

impl PlaybackSession {
    pub fn new(display_id: &str, media: Arc<MediaSource>, allow_audio: bool, now: Instant) -> Self {
        let frame_duration = Duration::from_secs_f64(1.0 / media.frame_rate);
        Self {
            id: Uuid::new_v4(),
            display_id: display_id.to_string(),
            media,
            allow_audio,
            direct_audio: false,
            audience: AudienceTracker::new(),
            audio: None,
            audio_filter: None,
            state: SessionState::Preparing,
            frame_index: 0,
            frame_duration,
            last_frame_at: now,
            render_in_flight: Arc::new(AtomicBool::new(false)),
            stopped: false,
            missing_frame_logged: false,
        }
    }

    /// PREPARING -> PLAYING, anchoring the pacing clock at `now`.
    pub fn start(&mut self, now: Instant) {
        self.last_frame_at = now;
        self.state = SessionState::Playing;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == SessionState::Paused
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    pub fn pause(&mut self) -> bool {
        if self.state == SessionState::Playing {
            self.state = SessionState::Paused;
            true
        } else {
            false
        }
    }

    pub fn resume(&mut self) -> bool {
        if self.state == SessionState::Paused {
            self.state = SessionState::Playing;
            true
        } else {
            false
        }
    }

    /// Decide whether this tick advances a frame.
    ///
    /// The anchor resets to `now` on every advance rather than stepping by a
    /// fixed increment: under scheduler jitter the session falls behind
    /// instead of piling up a frame backlog.
    pub fn advance(&mut self, now: Instant) -> Advance {
        if self.state != SessionState::Playing {
            return Advance::NotYet;
        }
        if now.duration_since(self.last_frame_at) < self.frame_duration {
            return Advance::NotYet;
        }
        if self.render_in_flight.load(Ordering::Acquire) {
            return Advance::InFlight;
        }

        self.last_frame_at = now;
        let current = self.frame_index;
        self.frame_index += 1;

        if current >= self.media.frame_count {
            if self.media.looped {
                self.frame_index = 1;
                self.render_in_flight.store(true, Ordering::Release);
                Advance::Wrapped(0)
            } else {
                self.state = SessionState::Stopping;
                Advance::Finished
            }
        } else {
            self.render_in_flight.store(true, Ordering::Release);
            Advance::Frame(current)
        }
    }

    pub fn clear_in_flight(&self) {
        self.render_in_flight.store(false, Ordering::Release);
    }

    /// A frame file was absent. Logged once per session; pacing continues.
    pub fn note_missing_frame(&mut self, frame: u64) {
        if !self.missing_frame_logged {
            self.missing_frame_logged = true;
            warn!(
                "media {} frame {} missing on disk; dropping (reported once)",
                self.media.id, frame
            );
        }
    }

    /// Unrecoverable render failure: absorbing state.
    pub fn fail(&mut self) {
        self.state = SessionState::Error;
    }

    /// Tear down session-owned resources. Idempotent: the second and later
    /// calls return None and have no effect.
    pub fn stop(&mut self) -> Option<StopEffects> {
        if self.stopped {
            return None;
        }
        self.stopped = true;

        if let Some(audio) = self.audio.as_mut() {
            audio.stop();
        }
        let effects = StopEffects {
            viewers: self.audience.viewers().iter().copied().collect(),
            listeners: self.audience.listeners().iter().copied().collect(),
            direct_audio: self.direct_audio,
        };
        self.audience.clear();
        self.state = SessionState::Idle;
        Some(effects)
    }
}
