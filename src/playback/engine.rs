use bytes::Bytes;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audience::bundle::{AssetBundleTracker, DeliveryStatus};
use crate::audience::AudienceFilter;
use crate::config::{AudioDelivery, Config};
use crate::display::DisplayRegistry;
use crate::media::{FrameStore, MediaLibrary};
use crate::playback::audio::{AudioChunkPlayer, AudioTrack, ChunkDue};
use crate::playback::coordinator::PlaybackCoordinator;
use crate::playback::session::{Advance, PlaybackSession};
use crate::render::RenderPipeline;
use crate::server::sse;
use crate::show::schedule::ScheduleEntry;
use crate::show::{DoctorReport, Room, Show, ShowOrchestrator, ShowState};
use crate::transport::{BundleHost, ProximitySource, Transport};
use crate::{CastError, Display, Result, SurfaceHandle, UserId};

/// Control commands. Callers get replies over oneshots; application is
/// deferred to the next tick boundary so only the engine task ever touches
/// playback state.
pub enum Command {
    PlayDisplay {
        display_id: String,
        media_id: String,
        allow_audio: bool,
        reply: oneshot::Sender<Result<Uuid>>,
    },
    StopDisplay {
        display_id: String,
        reply: oneshot::Sender<bool>,
    },
    PauseDisplay {
        display_id: String,
        reply: oneshot::Sender<bool>,
    },
    ResumeDisplay {
        display_id: String,
        reply: oneshot::Sender<bool>,
    },
    PlayRoom {
        room_id: String,
        media_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    StopRoom {
        room_id: String,
        reply: oneshot::Sender<bool>,
    },
    CreateRoom {
        room: Room,
        reply: oneshot::Sender<Result<()>>,
    },
    DeleteRoom {
        room_id: String,
        reply: oneshot::Sender<bool>,
    },
    ListRooms {
        reply: oneshot::Sender<Vec<Room>>,
    },
    AddSchedule {
        entry: ScheduleEntry,
        reply: oneshot::Sender<Result<()>>,
    },
    RemoveSchedule {
        room_id: String,
        entry_id: Uuid,
        reply: oneshot::Sender<Result<bool>>,
    },
    ListSchedules {
        room_id: String,
        reply: oneshot::Sender<Result<Vec<ScheduleEntry>>>,
    },
    Doctor {
        reply: oneshot::Sender<DoctorReport>,
    },
    BundleAck {
        user: UserId,
        status: DeliveryStatus,
    },
    StopAll {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Cloneable front door to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl EngineHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| CastError::Playback("engine is not running".into()))
    }

    async fn ask<T>(&self, rx: oneshot::Receiver<T>) -> Result<T> {
        rx.await
            .map_err(|_| CastError::Playback("engine dropped the request".into()))
    }

    pub async fn play_display(
        &self,
        display_id: &str,
        media_id: &str,
        allow_audio: bool,
    ) -> Result<Uuid> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::PlayDisplay {
            display_id: display_id.to_string(),
            media_id: media_id.to_string(),
            allow_audio,
            reply,
        })?;
        self.ask(rx).await?
    }

    pub async fn stop_display(&self, display_id: &str) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::StopDisplay {
            display_id: display_id.to_string(),
            reply,
        })?;
        self.ask(rx).await
    }

    pub async fn pause_display(&self, display_id: &str) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::PauseDisplay {
            display_id: display_id.to_string(),
            reply,
        })?;
        self.ask(rx).await
    }

    pub async fn resume_display(&self, display_id: &str) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ResumeDisplay {
            display_id: display_id.to_string(),
            reply,
        })?;
        self.ask(rx).await
    }

    pub async fn play_room(&self, room_id: &str, media_id: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::PlayRoom {
            room_id: room_id.to_string(),
            media_id: media_id.to_string(),
            reply,
        })?;
        self.ask(rx).await?
    }

    pub async fn stop_room(&self, room_id: &str) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::StopRoom {
            room_id: room_id.to_string(),
            reply,
        })?;
        self.ask(rx).await
    }

    pub async fn create_room(&self, room: Room) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::CreateRoom { room, reply })?;
        self.ask(rx).await?
    }

    pub async fn delete_room(&self, room_id: &str) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::DeleteRoom {
            room_id: room_id.to_string(),
            reply,
        })?;
        self.ask(rx).await
    }

    pub async fn list_rooms(&self) -> Result<Vec<Room>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ListRooms { reply })?;
        self.ask(rx).await
    }

    pub async fn add_schedule(&self, entry: ScheduleEntry) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddSchedule { entry, reply })?;
        self.ask(rx).await?
    }

    pub async fn remove_schedule(&self, room_id: &str, entry_id: Uuid) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RemoveSchedule {
            room_id: room_id.to_string(),
            entry_id,
            reply,
        })?;
        self.ask(rx).await?
    }

    pub async fn list_schedules(&self, room_id: &str) -> Result<Vec<ScheduleEntry>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ListSchedules {
            room_id: room_id.to_string(),
            reply,
        })?;
        self.ask(rx).await?
    }

    pub async fn doctor(&self) -> Result<DoctorReport> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Doctor { reply })?;
        self.ask(rx).await
    }

    pub fn bundle_ack(&self, user: UserId, status: DeliveryStatus) {
        let _ = self.send(Command::BundleAck { user, status });
    }

    pub async fn stop_all(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::StopAll { reply })?;
        self.ask(rx).await
    }

    pub fn shutdown(&self) {
        let _ = self.send(Command::Shutdown);
    }
}

/// Result of one off-thread render, posted back to the tick task.
struct RenderOutcome {
    session_id: Uuid,
    display_id: String,
    frame: u64,
    viewers: Vec<UserId>,
    surfaces: Vec<SurfaceHandle>,
    result: Result<Option<Vec<Bytes>>>,
}

/// The single-writer playback engine. One task owns every session, show, and
/// audience structure; workers and timers only post messages back.
pub struct Engine {
    config: Config,
    audio_delivery: AudioDelivery,
    displays: Arc<DisplayRegistry>,
    media: Arc<MediaLibrary>,
    frames: Arc<FrameStore>,
    pipeline: RenderPipeline,
    transport: Arc<dyn Transport>,
    proximity: Arc<dyn ProximitySource>,
    bundle_host: Arc<dyn BundleHost>,

    coordinator: PlaybackCoordinator,
    orchestrator: ShowOrchestrator,
    bundles: AssetBundleTracker,
    audio_tracks: HashMap<String, AudioTrack>,

    command_rx: mpsc::UnboundedReceiver<Command>,
    chunk_tx: mpsc::UnboundedSender<ChunkDue>,
    chunk_rx: mpsc::UnboundedReceiver<ChunkDue>,
    completion_tx: crossbeam_channel::Sender<RenderOutcome>,
    completion_rx: crossbeam_channel::Receiver<RenderOutcome>,

    ticks: u64,
    watchdog_every: u64,
    sweep_every: u64,
    cleanup_every: u64,
    running: bool,
}

impl Engine {
    pub fn new(
        config: Config,
        displays: Arc<DisplayRegistry>,
        media: Arc<MediaLibrary>,
        transport: Arc<dyn Transport>,
        proximity: Arc<dyn ProximitySource>,
        bundle_host: Arc<dyn BundleHost>,
    ) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();

        let tick_hz = config.tick_hz.max(1) as u64;
        let engine = Self {
            audio_delivery: config.audio_delivery,
            frames: Arc::new(FrameStore::new(config.frame_cache_items)),
            pipeline: RenderPipeline::new(config.tile_unit),
            coordinator: PlaybackCoordinator::new(),
            orchestrator: ShowOrchestrator::new(config.max_shows),
            bundles: AssetBundleTracker::new(std::time::Duration::from_secs(
                config.bundle_cooldown_secs,
            )),
            audio_tracks: HashMap::new(),
            command_rx,
            chunk_tx,
            chunk_rx,
            completion_tx,
            completion_rx,
            ticks: 0,
            watchdog_every: tick_hz,
            sweep_every: (tick_hz * config.schedule_sweep_secs).max(1),
            cleanup_every: tick_hz * 5,
            running: true,
            displays,
            media,
            transport,
            proximity,
            bundle_host,
            config,
        };
        (engine, EngineHandle { tx: command_tx })
    }

    pub async fn run(mut self) {
        let mut ticker = time::interval(self.config.tick_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("playback engine ticking at {} Hz", self.config.tick_hz);

        while self.running {
            ticker.tick().await;
            self.cycle(Instant::now());
        }

        info!("playback engine stopped");
    }

    /// One tick: apply queued commands and worker results, then pace sessions
    /// and run the coarser sweeps.
    fn cycle(&mut self, now: Instant) {
        self.ticks += 1;

        while let Ok(command) = self.command_rx.try_recv() {
            self.apply_command(command, now);
            if !self.running {
                return;
            }
        }
        while let Ok(due) = self.chunk_rx.try_recv() {
            self.apply_chunk(due);
        }
        while let Ok(outcome) = self.completion_rx.try_recv() {
            self.apply_render(outcome);
        }

        // Show audiences first so session listener filters see this tick's
        // membership, not last tick's.
        self.refresh_show_audiences();
        for display_id in self.coordinator.display_ids() {
            self.tick_session(&display_id, now);
        }

        if self.ticks % self.watchdog_every == 0 {
            self.run_watchdog();
        }
        if self.ticks % self.sweep_every == 0 {
            self.sweep_schedules();
        }
        if self.ticks % self.cleanup_every == 0 {
            self.bundles.retain_online(&self.proximity.online_users());
        }
    }

    fn apply_command(&mut self, command: Command, now: Instant) {
        match command {
            Command::PlayDisplay {
                display_id,
                media_id,
                allow_audio,
                reply,
            } => {
                let result = self.start_display_inner(&display_id, &media_id, allow_audio, None, now);
                let _ = reply.send(result);
            }
            Command::StopDisplay { display_id, reply } => {
                let _ = reply.send(self.stop_display_inner(&display_id, true, "stopped"));
            }
            Command::PauseDisplay { display_id, reply } => {
                let _ = reply.send(self.coordinator.pause(&display_id));
            }
            Command::ResumeDisplay { display_id, reply } => {
                let _ = reply.send(self.coordinator.resume(&display_id));
            }
            Command::PlayRoom {
                room_id,
                media_id,
                reply,
            } => {
                let _ = reply.send(self.play_room_inner(&room_id, &media_id, now));
            }
            Command::StopRoom { room_id, reply } => {
                let _ = reply.send(self.stop_room_inner(&room_id, "stopped"));
            }
            Command::CreateRoom { room, reply } => {
                let _ = reply.send(self.orchestrator.create_room(room));
            }
            Command::DeleteRoom { room_id, reply } => {
                self.stop_room_inner(&room_id, "room deleted");
                let _ = reply.send(self.orchestrator.delete_room(&room_id).is_some());
            }
            Command::ListRooms { reply } => {
                let _ = reply.send(self.orchestrator.rooms());
            }
            Command::AddSchedule { entry, reply } => {
                let _ = reply.send(self.orchestrator.add_schedule(entry));
            }
            Command::RemoveSchedule {
                room_id,
                entry_id,
                reply,
            } => {
                let _ = reply.send(self.orchestrator.remove_schedule(&room_id, entry_id));
            }
            Command::ListSchedules { room_id, reply } => {
                let _ = reply.send(self.orchestrator.schedules(&room_id));
            }
            Command::Doctor { reply } => {
                let _ = reply.send(self.orchestrator.doctor(&self.displays));
            }
            Command::BundleAck { user, status } => {
                self.bundles.record_status(&user, status);
            }
            Command::StopAll { reply } => {
                self.stop_everything("stopped");
                let _ = reply.send(());
            }
            Command::Shutdown => {
                self.stop_everything("shutdown");
                self.running = false;
            }
        }
    }

    fn stop_everything(&mut self, reason: &str) {
        for room_id in self.orchestrator.show_room_ids() {
            self.stop_room_inner(&room_id, reason);
        }
        for display_id in self.coordinator.display_ids() {
            self.stop_display_inner(&display_id, true, reason);
        }
    }

    // Session lifecycle

    fn start_display_inner(
        &mut self,
        display_id: &str,
        media_id: &str,
        allow_audio: bool,
        audio_filter: Option<AudienceFilter>,
        now: Instant,
    ) -> Result<Uuid> {
        let display = self
            .displays
            .get(display_id)
            .ok_or_else(|| CastError::Display(format!("no such display: {}", display_id)))?;
        let media = self
            .media
            .get(media_id)
            .ok_or_else(|| CastError::Media(format!("unknown media: {}", media_id)))?;
        if media.frame_rate <= 0.0 {
            return Err(CastError::Media(format!(
                "media {} has a non-positive frame rate",
                media_id
            )));
        }
        if media.frame_count == 0 {
            return Err(CastError::Media(format!("media {} has no frames", media_id)));
        }

        // One session per display: displace whatever is playing.
        self.stop_display_inner(display_id, false, "replaced");

        let mut session = PlaybackSession::new(display_id, Arc::clone(&media), allow_audio, now);
        session.audio_filter = audio_filter;

        if allow_audio && media.has_audio {
            match self.audio_delivery {
                AudioDelivery::Bundled => {
                    if self.bundle_host.is_running() {
                        if let Some(base) = self.bundle_host.public_base_url() {
                            let chunk_secs = self.config.audio_chunk_secs;
                            let track = self
                                .audio_tracks
                                .entry(media.id.clone())
                                .or_insert_with(|| AudioTrack::build(&media, chunk_secs, &base))
                                .clone();
                            session.audio =
                                Some(AudioChunkPlayer::start(track, session.id, self.chunk_tx.clone()));
                        }
                    }
                }
                AudioDelivery::Direct => {
                    session.direct_audio = true;
                    let filter = session.audio_filter.clone();
                    session.audience.update_audio_listeners(
                        self.proximity.as_ref(),
                        &display,
                        filter.as_ref(),
                    );
                    for user in session.audience.listeners() {
                        self.transport.play_sound(*user, &media.id, 1.0, 1.0);
                    }
                }
            }
        }

        session.start(now);
        let session_id = session.id;
        self.coordinator.register(session);
        info!("display {} now playing {}", display_id, media_id);
        sse::notify_session_started(display_id, media_id, session_id);
        Ok(session_id)
    }

    /// Stop and unregister a display's session. Returns false when nothing
    /// was playing. The second stop of the same session is a no-op inside
    /// `PlaybackSession::stop`.
    fn stop_display_inner(&mut self, display_id: &str, show_idle: bool, reason: &str) -> bool {
        let Some(mut session) = self.coordinator.remove(display_id) else {
            return false;
        };
        let session_id = session.id;
        let media_id = session.media.id.clone();
        if let Some(effects) = session.stop() {
            if effects.direct_audio {
                for user in &effects.listeners {
                    self.transport.stop_sound(*user, &media_id);
                }
            }
            if show_idle {
                self.push_idle(display_id, &effects.viewers);
            }
        }
        info!("display {} stopped ({})", display_id, reason);
        sse::notify_session_stopped(display_id, session_id, reason);
        true
    }

    /// Restore the idle thumbnail across the display's tiles.
    fn push_idle(&self, display_id: &str, viewers: &[UserId]) {
        let Some(display) = self.displays.get(display_id) else {
            return;
        };
        let Some(thumb) = display.idle_thumbnail.as_ref() else {
            return;
        };
        let frame = image::DynamicImage::ImageRgba8(thumb.clone());
        match self.pipeline.render_frame(
            &frame,
            display.grid_width,
            display.grid_height,
            display.scale_policy,
        ) {
            Ok(tiles) => {
                let online = self.proximity.online_users();
                for user in viewers.iter().filter(|u| online.contains(u)) {
                    for (surface, tile) in display.surfaces.iter().zip(tiles.iter()) {
                        self.transport.push_tile(*user, *surface, tile.clone());
                    }
                }
            }
            Err(e) => warn!("idle thumbnail render failed for {}: {}", display_id, e),
        }
    }

    // Per-tick session work

    fn tick_session(&mut self, display_id: &str, now: Instant) {
        let Some(display) = self.displays.get(display_id) else {
            // The display record is gone; release the session.
            self.stop_display_inner(display_id, false, "display removed");
            return;
        };

        let (joined_viewers, bundle_track) = {
            let Some(session) = self.coordinator.get_mut(display_id) else {
                return;
            };
            if session.is_paused() {
                return;
            }
            let filter = session.audio_filter.clone();
            let viewer_delta = session
                .audience
                .update_viewers(self.proximity.as_ref(), &display);
            session.audience.update_audio_listeners(
                self.proximity.as_ref(),
                &display,
                filter.as_ref(),
            );
            let track = session.audio.as_ref().map(|a| a.track().clone());
            (viewer_delta.joined, track)
        };

        if let Some(track) = bundle_track {
            for user in joined_viewers {
                self.offer_bundle(user, &track, now);
            }
        }

        let advance = match self.coordinator.get_mut(display_id) {
            Some(session) => session.advance(now),
            None => return,
        };

        match advance {
            Advance::NotYet | Advance::InFlight => {}
            Advance::Frame(frame) => self.submit_render(display_id, &display, frame),
            Advance::Wrapped(frame) => {
                // Audio restarts from chunk 0 in lock-step with the wrap.
                let chunk_tx = self.chunk_tx.clone();
                if let Some(session) = self.coordinator.get_mut(display_id) {
                    let session_id = session.id;
                    if let Some(audio) = session.audio.as_mut() {
                        audio.restart(session_id, chunk_tx);
                    }
                }
                self.submit_render(display_id, &display, frame);
            }
            Advance::Finished => {
                info!("display {} reached end of media", display_id);
                self.stop_display_inner(display_id, true, "finished");
            }
        }
    }

    fn offer_bundle(&mut self, user: UserId, track: &AudioTrack, now: Instant) {
        if self.audio_delivery != AudioDelivery::Bundled || !self.bundle_host.is_running() {
            return;
        }
        if self
            .bundles
            .should_send(&user, &track.bundle_url, &track.content_hash, now)
        {
            self.transport
                .send_asset_bundle(user, &track.bundle_url, &track.content_hash);
            self.bundles
                .mark_sent(user, &track.bundle_url, &track.content_hash, now);
        }
    }

    /// Hand the heavy frame work to the blocking pool against a snapshot of
    /// the current viewer set.
    fn submit_render(&self, display_id: &str, display: &Display, frame: u64) {
        let Some(session) = self.coordinator.get(display_id) else {
            return;
        };
        let outcome = RenderOutcome {
            session_id: session.id,
            display_id: display_id.to_string(),
            frame,
            viewers: session.audience.viewers().iter().copied().collect(),
            surfaces: display.surfaces.clone(),
            result: Ok(None),
        };
        let media = Arc::clone(&session.media);
        let frames = Arc::clone(&self.frames);
        let pipeline = self.pipeline;
        let grid_w = display.grid_width;
        let grid_h = display.grid_height;
        let policy = display.scale_policy;
        let tx = self.completion_tx.clone();

        tokio::task::spawn_blocking(move || {
            let result = frames.load(&media, frame).and_then(|loaded| match loaded {
                None => Ok(None),
                Some(img) => pipeline
                    .render_frame(&img, grid_w, grid_h, policy)
                    .map(Some),
            });
            let _ = tx.send(RenderOutcome { result, ..outcome });
        });
    }

    fn apply_render(&mut self, outcome: RenderOutcome) {
        enum Next {
            Push(Vec<Bytes>),
            Drop,
            Fail(String),
        }

        let next = match self.coordinator.find_by_session_mut(outcome.session_id) {
            // The session ended while the render ran; discard the result.
            None => return,
            Some(session) => {
                session.clear_in_flight();
                match outcome.result {
                    Ok(Some(tiles)) => Next::Push(tiles),
                    Ok(None) => {
                        session.note_missing_frame(outcome.frame);
                        Next::Drop
                    }
                    Err(e) => {
                        session.fail();
                        Next::Fail(e.to_string())
                    }
                }
            }
        };

        match next {
            Next::Push(tiles) => {
                let online = self.proximity.online_users();
                for user in outcome.viewers.iter().filter(|u| online.contains(u)) {
                    for (surface, tile) in outcome.surfaces.iter().zip(tiles.iter()) {
                        self.transport.push_tile(*user, *surface, tile.clone());
                    }
                }
            }
            Next::Drop => {}
            Next::Fail(message) => {
                error!(
                    "render failed on display {} frame {}: {}",
                    outcome.display_id, outcome.frame, message
                );
                sse::notify_error(format!(
                    "render failed on display {}: {}",
                    outcome.display_id, message
                ));
                self.stop_display_inner(&outcome.display_id, true, "render error");
            }
        }
    }

    /// Play a chunk cue against the listener set current right now, not the
    /// one from schedule time.
    fn apply_chunk(&mut self, due: ChunkDue) {
        let Some(session) = self.coordinator.find_by_session(due.session_id) else {
            return;
        };
        let Some(audio) = session.audio.as_ref() else {
            return;
        };
        let key = audio.track().chunk_key(due.chunk);
        for user in session.audience.listeners() {
            self.transport.play_sound(*user, &key, 1.0, 1.0);
        }
    }

    // Shows

    fn play_room_inner(&mut self, room_id: &str, media_id: &str, now: Instant) -> Result<()> {
        self.orchestrator.ensure_can_start(room_id)?;
        let room = self
            .orchestrator
            .room(room_id)
            .cloned()
            .expect("checked by ensure_can_start");

        let display_ids: Vec<String> = room
            .display_ids
            .iter()
            .filter(|id| self.displays.contains(id))
            .cloned()
            .collect();
        if display_ids.is_empty() {
            return Err(CastError::Show(format!(
                "room {} has no resolvable displays",
                room_id
            )));
        }
        if self.media.get(media_id).is_none() {
            return Err(CastError::Media(format!("unknown media: {}", media_id)));
        }

        // Seeded now so the audio session's listener filter is live from the
        // very first tick.
        let audience: Arc<Mutex<HashSet<UserId>>> = Arc::new(Mutex::new(self.room_audience(&room)));
        let mut session_ids = Vec::with_capacity(display_ids.len());
        for (i, display_id) in display_ids.iter().enumerate() {
            // Only the first display carries audio; the rest stay muted so the
            // room never hears overlapping copies.
            let allow_audio = i == 0;
            let filter: Option<AudienceFilter> = if allow_audio {
                let audience = Arc::clone(&audience);
                Some(Arc::new(move |user: &UserId| {
                    audience.lock().unwrap().contains(user)
                }))
            } else {
                None
            };
            match self.start_display_inner(display_id, media_id, allow_audio, filter, now) {
                Ok(id) => session_ids.push(id),
                Err(e) => {
                    // All-or-nothing: unwind what already started.
                    let started = session_ids.len();
                    for display_id in &display_ids[..started] {
                        self.stop_display_inner(display_id, true, "show start aborted");
                    }
                    return Err(e);
                }
            }
        }

        let shown = display_ids.len();
        self.orchestrator.register_show(Show {
            room_id: room_id.to_string(),
            media_id: media_id.to_string(),
            display_ids,
            session_ids,
            audience,
            state: ShowState::Running,
            started_at: Utc::now(),
        });
        info!("show started in room {} across {} displays", room_id, shown);
        sse::notify_show_started(room_id, media_id, shown);
        Ok(())
    }

    fn stop_room_inner(&mut self, room_id: &str, reason: &str) -> bool {
        let Some(show) = self.orchestrator.remove_show(room_id) else {
            return false;
        };
        for (display_id, session_id) in show.display_ids.iter().zip(show.session_ids.iter()) {
            // A replacement session may own the display by now; only stop our own.
            if self.coordinator.get(display_id).map(|s| s.id) == Some(*session_id) {
                self.stop_display_inner(display_id, true, reason);
            }
        }
        show.audience.lock().unwrap().clear();
        info!("show in room {} stopped ({})", room_id, reason);
        sse::notify_show_stopped(room_id, reason);
        true
    }

    /// Users in the room's audio zone, or (with no explicit zone) the union
    /// of its displays' pickup zones.
    fn room_audience(&self, room: &Room) -> HashSet<UserId> {
        match &room.audio_zone {
            Some(zone) => self
                .proximity
                .nearby_users(&zone.center, zone.radius)
                .unwrap_or_default(),
            None => {
                let mut users = HashSet::new();
                for display_id in &room.display_ids {
                    if let Some(display) = self.displays.get(display_id) {
                        let point = display.speaker.as_ref().or(display.anchor.as_ref());
                        if let Some(found) =
                            point.and_then(|p| self.proximity.nearby_users(p, display.pickup_radius))
                        {
                            users.extend(found);
                        }
                    }
                }
                users
            }
        }
    }

    /// Keep each show's room-zone audience current; the audio session's
    /// listener filter reads it through the shared handle.
    fn refresh_show_audiences(&mut self) {
        for room_id in self.orchestrator.show_room_ids() {
            let Some(room) = self.orchestrator.room(&room_id) else {
                continue;
            };
            let users = self.room_audience(room);
            self.orchestrator.set_show_audience(&room_id, users);
        }
    }

    /// A show whose sessions are all gone ended naturally or was torn down
    /// elsewhere; clear it rather than leaving orphaned state behind.
    fn run_watchdog(&mut self) {
        for room_id in self.orchestrator.orphaned_shows(&self.coordinator) {
            self.stop_room_inner(&room_id, "no sessions remain");
        }
    }

    fn sweep_schedules(&mut self) {
        let now = Utc::now();
        for (room_id, media_id, entry_id) in self.orchestrator.due_entries(now) {
            match self.play_room_inner(&room_id, &media_id, Instant::now()) {
                Ok(()) => {
                    info!("schedule started {} in room {}", media_id, room_id);
                    sse::notify_schedule_triggered(&room_id, &media_id);
                }
                Err(e) => {
                    warn!("scheduled show for room {} failed to start: {}", room_id, e);
                    sse::notify_error(format!("scheduled show in {} failed: {}", room_id, e));
                }
            }
            // Advance even on failure so a broken entry cannot spin the sweep.
            self.orchestrator.mark_triggered(&room_id, entry_id, now);
        }
    }
}
