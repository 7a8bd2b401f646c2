use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::MediaSource;

/// One chunked audio resource built for a media source. Immutable; built once
/// per media + audio-config combination and reused across sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub media_id: String,
    pub chunk_count: u32,
    pub chunk_seconds: f64,
    pub bundle_url: String,
    pub content_hash: String,
}

impl AudioTrack {
    pub fn build(media: &MediaSource, chunk_seconds: f64, base_url: &str) -> Self {
        let chunk_count = (media.duration_secs() / chunk_seconds).ceil().max(1.0) as u32;
        let bundle_url = format!("{}/pack.zip", base_url.trim_end_matches('/'));

        let mut hasher = Sha256::new();
        hasher.update(media.id.as_bytes());
        hasher.update(chunk_count.to_le_bytes());
        hasher.update(chunk_seconds.to_le_bytes());
        hasher.update(media.audio_channels.to_le_bytes());
        let content_hash = hex::encode(hasher.finalize());

        Self {
            media_id: media.id.clone(),
            chunk_count,
            chunk_seconds,
            bundle_url,
            content_hash,
        }
    }

    /// Client-side sound key for one chunk.
    pub fn chunk_key(&self, chunk: u32) -> String {
        format!("{}.chunk_{}", self.media_id, chunk)
    }
}

/// Raised by a chunk timer when its offset elapses. The engine applies the
/// actual "play sound" side effect on the tick thread, against the listener
/// set current at fire time.
#[derive(Debug, Clone, Copy)]
pub struct ChunkDue {
    pub session_id: Uuid,
    pub chunk: u32,
}

/// One-shot schedule of delayed chunk triggers, offset `round(chunk_seconds * i)`
/// from session start. Not a loop: a wrapping session restarts the whole
/// schedule from chunk 0.
pub struct AudioChunkPlayer {
    track: AudioTrack,
    active: Arc<AtomicBool>,
    timers: Vec<JoinHandle<()>>,
}

impl AudioChunkPlayer {
    pub fn start(track: AudioTrack, session_id: Uuid, due_tx: UnboundedSender<ChunkDue>) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let mut timers = Vec::with_capacity(track.chunk_count as usize);
        for chunk in 0..track.chunk_count {
            let offset = Duration::from_secs((track.chunk_seconds * chunk as f64).round() as u64);
            let active = Arc::clone(&active);
            let due_tx = due_tx.clone();
            timers.push(tokio::spawn(async move {
                tokio::time::sleep(offset).await;
                if active.load(Ordering::Acquire) {
                    let _ = due_tx.send(ChunkDue { session_id, chunk });
                }
            }));
        }
        Self {
            track,
            active,
            timers,
        }
    }

    pub fn track(&self) -> &AudioTrack {
        &self.track
    }

    /// Cancel every outstanding trigger. Timers that already fired but have
    /// not been applied yet are dropped by the engine's session check.
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }

    /// Re-run the schedule from chunk 0 (loop wrap).
    pub fn restart(&mut self, session_id: Uuid, due_tx: UnboundedSender<ChunkDue>) {
        let track = self.track.clone();
        self.stop();
        *self = Self::start(track, session_id, due_tx);
    }
}

impl Drop for AudioChunkPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn track(chunks: u32, secs: f64) -> AudioTrack {
        AudioTrack {
            media_id: "clip".into(),
            chunk_count: chunks,
            chunk_seconds: secs,
            bundle_url: "http://host/pack.zip".into(),
            content_hash: "abc".into(),
        }
    }

    #[test]
    fn chunk_count_covers_duration() {
        let media = MediaSource {
            id: "m".into(),
            frame_rate: 24.0,
            frame_count: 240, // 10s
            looped: false,
            has_audio: true,
            frames_dir: "/tmp".into(),
            frame_ext: "png".into(),
            audio_channels: 2,
        };
        let t = AudioTrack::build(&media, 4.0, "http://host/");
        assert_eq!(t.chunk_count, 3);
        assert_eq!(t.bundle_url, "http://host/pack.zip");
        assert_eq!(t.chunk_key(2), "m.chunk_2");
    }

    #[test]
    fn same_inputs_same_hash() {
        let media = MediaSource {
            id: "m".into(),
            frame_rate: 30.0,
            frame_count: 90,
            looped: false,
            has_audio: true,
            frames_dir: "/tmp".into(),
            frame_ext: "png".into(),
            audio_channels: 2,
        };
        let a = AudioTrack::build(&media, 5.0, "http://host");
        let b = AudioTrack::build(&media, 5.0, "http://host");
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_fire_at_round_offsets() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sid = Uuid::new_v4();
        let _player = AudioChunkPlayer::start(track(5, 2.0), sid, tx);

        tokio::time::sleep(Duration::from_secs(9)).await;
        let mut fired = Vec::new();
        while let Ok(due) = rx.try_recv() {
            fired.push(due.chunk);
        }
        fired.sort_unstable();
        assert_eq!(fired, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_triggers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sid = Uuid::new_v4();
        let mut player = AudioChunkPlayer::start(track(5, 2.0), sid, tx);

        // t=5s: chunks 0, 1, 2 fired; 3 and 4 still pending.
        tokio::time::sleep(Duration::from_secs(5)).await;
        player.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let mut fired = Vec::new();
        while let Ok(due) = rx.try_recv() {
            fired.push(due.chunk);
        }
        fired.sort_unstable();
        assert_eq!(fired, vec![0, 1, 2]);
    }
}
