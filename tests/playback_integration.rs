mod helpers;

use helpers::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use tilecast::audience::bundle::DeliveryStatus;
use tilecast::config::{AudioDelivery, Config};
use tilecast::display::DisplayRegistry;
use tilecast::media::MediaLibrary;
use tilecast::playback::engine::{Engine, EngineHandle};
use tilecast::transport::{BundleHost, ProximitySource, Transport};

struct Harness {
    engine: EngineHandle,
    transport: SharedTransport,
    world: SharedWorld,
    displays: Arc<DisplayRegistry>,
    media: Arc<MediaLibrary>,
    _tmp: tempfile::TempDir,
}

fn harness() -> Harness {
    harness_with(test_config())
}

fn harness_with(config: Config) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let world = Arc::new(ScriptedWorld::default());
    let displays = Arc::new(DisplayRegistry::new());
    let media = Arc::new(MediaLibrary::new());

    let (engine, handle) = Engine::new(
        config,
        Arc::clone(&displays),
        Arc::clone(&media),
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::clone(&world) as Arc<dyn ProximitySource>,
        Arc::new(TestBundleHost) as Arc<dyn BundleHost>,
    );
    tokio::spawn(engine.run());

    Harness {
        engine: handle,
        transport,
        world,
        displays,
        media,
        _tmp: tmp,
    }
}

#[tokio::test(start_paused = true)]
async fn full_run_pushes_every_frame_exactly_once() {
    let h = harness();
    let viewer = Uuid::new_v4();
    h.world.enter(viewer);

    h.displays.insert(test_display("screen")).unwrap();
    h.media
        .insert(write_media(h._tmp.path(), "clip", 48, 24.0, false, false));

    h.engine.play_display("screen", "clip", true).await.unwrap();

    let transport = Arc::clone(&h.transport);
    settle_until(move || transport.pushed_frame_indices().len() >= 48).await;
    // Let the natural end land as well.
    tokio::time::sleep(Duration::from_secs(1)).await;

    let indices = h.transport.pushed_frame_indices();
    assert_eq!(indices.len(), 48, "one push per frame, no duplicates");
    let distinct: HashSet<u8> = indices.iter().copied().collect();
    assert_eq!(distinct.len(), 48, "every frame value distinct");
    let expected: HashSet<u8> = (0..48).collect();
    assert_eq!(distinct, expected, "no gaps in the frame sequence");

    // Natural end released the session.
    assert!(!h.engine.stop_display("screen").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn starting_twice_replaces_the_first_session() {
    let h = harness();
    h.displays.insert(test_display("screen")).unwrap();
    h.media
        .insert(write_media(h._tmp.path(), "clip", 600, 24.0, false, false));

    let first = h.engine.play_display("screen", "clip", true).await.unwrap();
    let second = h.engine.play_display("screen", "clip", true).await.unwrap();
    assert_ne!(first, second);

    // Only one session exists: one stop succeeds, the next finds nothing.
    assert!(h.engine.stop_display("screen").await.unwrap());
    assert!(!h.engine.stop_display("screen").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn audio_chunks_fire_until_cancelled() {
    let h = harness();
    let listener = Uuid::new_v4();
    h.world.enter(listener);

    h.displays.insert(test_display("screen")).unwrap();
    // 10s of media at 2s per chunk: chunks 0..4 scheduled at 0,2,4,6,8s.
    h.media
        .insert(write_media(h._tmp.path(), "clip", 240, 24.0, false, true));

    h.engine.play_display("screen", "clip", true).await.unwrap();

    // Cancel mid-run at ~5s: chunks 3 and 4 must never sound.
    tokio::time::sleep(Duration::from_secs(5)).await;
    h.engine.stop_display("screen").await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let keys = h.transport.sound_keys();
    assert!(keys.contains(&"clip.chunk_0".to_string()));
    assert!(keys.contains(&"clip.chunk_1".to_string()));
    assert!(keys.contains(&"clip.chunk_2".to_string()));
    assert!(!keys.iter().any(|k| k == "clip.chunk_3" || k == "clip.chunk_4"));
}

#[tokio::test(start_paused = true)]
async fn declined_bundle_is_never_reoffered() {
    let h = harness();
    let viewer = Uuid::new_v4();

    h.displays.insert(test_display("screen")).unwrap();
    h.media
        .insert(write_media(h._tmp.path(), "clip", 600, 24.0, true, true));

    h.engine.play_display("screen", "clip", true).await.unwrap();

    // Walk up: the join offers the bundle once.
    h.world.enter(viewer);
    let transport = Arc::clone(&h.transport);
    settle_until(move || transport.bundle_count() >= 1).await;
    assert_eq!(h.transport.bundle_count(), 1);

    h.engine.bundle_ack(viewer, DeliveryStatus::Declined);
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Walk away and come back: still declined, no re-offer.
    h.world.leave(viewer);
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.world.enter(viewer);
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(h.transport.bundle_count(), 1);

    // A real disconnect clears the decline; the next join offers again.
    h.world.disconnect(viewer);
    tokio::time::sleep(Duration::from_secs(6)).await;
    h.world.enter(viewer);
    let transport = Arc::clone(&h.transport);
    settle_until(move || transport.bundle_count() >= 2).await;
    assert_eq!(h.transport.bundle_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn direct_audio_plays_and_stops_by_name() {
    let mut config = test_config();
    config.audio_delivery = AudioDelivery::Direct;
    let h = harness_with(config);
    let listener = Uuid::new_v4();
    h.world.enter(listener);

    h.displays.insert(test_display("screen")).unwrap();
    h.media
        .insert(write_media(h._tmp.path(), "clip", 600, 24.0, false, true));

    h.engine.play_display("screen", "clip", true).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(
        h.transport.sound_keys().contains(&"clip".to_string()),
        "named sound started for the listener"
    );

    h.engine.stop_display("screen").await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    let stops = h
        .transport
        .events()
        .into_iter()
        .filter(|e| matches!(e, Sent::StopSound { key, .. } if key == "clip"))
        .count();
    assert_eq!(stops, 1, "stop-sound issued to the recorded listener");
}

#[tokio::test(start_paused = true)]
async fn pause_freezes_frames_and_resume_continues() {
    let h = harness();
    let viewer = Uuid::new_v4();
    h.world.enter(viewer);

    h.displays.insert(test_display("screen")).unwrap();
    h.media
        .insert(write_media(h._tmp.path(), "clip", 100, 24.0, false, false));

    h.engine.play_display("screen", "clip", true).await.unwrap();
    let transport = Arc::clone(&h.transport);
    settle_until(move || !transport.pushed_frame_indices().is_empty()).await;

    assert!(h.engine.pause_display("screen").await.unwrap());
    // Let any in-flight render drain, then confirm the count holds still.
    let mut frozen = h.transport.pushed_frame_indices().len();
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let len = h.transport.pushed_frame_indices().len();
        if len == frozen {
            break;
        }
        frozen = len;
    }
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.transport.pushed_frame_indices().len(), frozen);

    assert!(h.engine.resume_display("screen").await.unwrap());
    let transport = Arc::clone(&h.transport);
    settle_until(move || transport.pushed_frame_indices().len() > frozen).await;
    assert!(h.transport.pushed_frame_indices().len() > frozen);
}

#[tokio::test(start_paused = true)]
async fn missing_frames_are_dropped_silently() {
    let h = harness();
    let viewer = Uuid::new_v4();
    h.world.enter(viewer);

    h.displays.insert(test_display("screen")).unwrap();
    let mut media = write_media(h._tmp.path(), "clip", 10, 24.0, false, false);
    media.frame_count = 20; // frames 10..19 have no files on disk
    h.media.insert(media);

    h.engine.play_display("screen", "clip", true).await.unwrap();

    // The session survives the gap and ends naturally.
    let transport = Arc::clone(&h.transport);
    settle_until(move || transport.pushed_frame_indices().len() >= 10).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let indices = h.transport.pushed_frame_indices();
    assert_eq!(indices.len(), 10, "only frames with files were pushed");
    assert!(
        !h.engine.stop_display("screen").await.unwrap(),
        "session already ended on its own"
    );
}
