//! End-to-end sessions driven by a manual scheduler, a mock camera and a stub model

mod common;

use common::{frontal_face, synthetic_face, test_config, MockCamera, StubModel};
use opencv::prelude::*;
use std::{sync::atomic::Ordering, time::Duration};
use virtual_try_on::{
    capture::PlaybackStatus,
    config::{Config, ModelLifetime},
    detector::ModelStatus,
    engine::{SessionPhase, TryOnEngine},
    geometry::LipRegion,
    overlay::AnchorHandle,
    scheduler::{ManualScheduler, TickId},
};

const PRODUCT: &str = "file:///nonexistent/earring.png";
const LOAD_TIMEOUT: Duration = Duration::from_secs(5);

fn engine_with(stub: &StubModel) -> TryOnEngine<MockCamera, ManualScheduler> {
    TryOnEngine::new(test_config(), MockCamera::new(640, 480), ManualScheduler::new(), stub.factory()).unwrap()
}

fn run_ticks(engine: &mut TryOnEngine<MockCamera, ManualScheduler>, count: usize) {
    for _ in 0..count {
        assert!(engine.pump(), "render loop stopped scheduling ticks");
    }
}

#[test]
fn test_face_session_shows_overlays() {
    let stub = StubModel::with_face(frontal_face());
    let mut engine = engine_with(&stub);

    engine.open(PRODUCT).unwrap();
    assert_eq!(engine.wait_for_model(LOAD_TIMEOUT), ModelStatus::Ready);
    assert_eq!(engine.status().phase, SessionPhase::Ready);

    let bounds = Config::default().earrings;
    let mut first = None;
    for _ in 0..30 {
        run_ticks(&mut engine, 1);
        let scene = engine.scene().unwrap();
        let placements = (scene.left_ear.placement().unwrap(), scene.right_ear.placement().unwrap());
        for placement in [placements.0, placements.1] {
            assert!(placement.scale >= bounds.min_scale && placement.scale <= bounds.max_scale);
            assert!((0.0..=100.0).contains(&placement.x_pct));
        }
        // A still face keeps the earrings exactly where they were
        assert_eq!(*first.get_or_insert(placements), placements);
    }

    let status = engine.status();
    assert_eq!(status.phase, SessionPhase::Detecting);
    assert_eq!(status.playback, Some(PlaybackStatus::Playing));
    assert_eq!(status.error, None);
    assert_eq!(engine.frames_processed(), 30);
    assert_eq!(stub.calls(), 30);

    let scene = engine.scene().unwrap();
    assert!(scene.left_ear.is_visible());
    assert!(scene.right_ear.is_visible());
    assert!(scene.lips.coverage().unwrap() > 0);

    // Mirrored view puts the camera-left anchor on the right of the screen
    let left = scene.left_ear.placement().unwrap();
    let right = scene.right_ear.placement().unwrap();
    assert!(left.x_pct > right.x_pct);
    assert!(left.rotation_deg.abs() < 1e-6);

    let frame = engine.render().unwrap().unwrap();
    assert_eq!((frame.cols(), frame.rows()), (640, 480));
}

#[test]
fn test_face_lost_hides_overlays() {
    let stub = StubModel::with_face(frontal_face());
    let mut engine = engine_with(&stub);
    engine.open(PRODUCT).unwrap();
    engine.wait_for_model(LOAD_TIMEOUT);

    stub.set_face(Some(synthetic_face(0.4, 0.45, 0.35)));
    run_ticks(&mut engine, 5);
    assert!(!engine.scene().unwrap().is_hidden());

    stub.set_face(None);
    run_ticks(&mut engine, 1);

    let scene = engine.scene().unwrap();
    assert!(scene.is_hidden());
    assert_eq!(scene.lips.coverage().unwrap(), 0);
    assert!(scene.lips.region().is_none());
    assert_eq!(engine.frames_processed(), 5);

    // Coming back starts from unsmoothed geometry
    stub.set_face(Some(frontal_face()));
    run_ticks(&mut engine, 1);
    let scene = engine.scene().unwrap();
    assert!(!scene.is_hidden());
    let raw = LipRegion::from_landmarks(&frontal_face(), 640, 480, true).unwrap();
    assert_eq!(scene.lips.region(), Some(&raw));
}

#[test]
fn test_moving_face_without_gap_is_smoothed() {
    let stub = StubModel::with_face(synthetic_face(0.4, 0.45, 0.35));
    let mut engine = engine_with(&stub);
    engine.open(PRODUCT).unwrap();
    engine.wait_for_model(LOAD_TIMEOUT);
    run_ticks(&mut engine, 5);

    stub.set_face(Some(frontal_face()));
    run_ticks(&mut engine, 1);
    let raw = LipRegion::from_landmarks(&frontal_face(), 640, 480, true).unwrap();
    let lips = engine.scene().unwrap().lips.region().unwrap().clone();
    assert_ne!(lips, raw);
    // Pulled from the old position toward the new one, not all the way
    let previous = LipRegion::from_landmarks(&synthetic_face(0.4, 0.45, 0.35), 640, 480, true).unwrap();
    let (old_x, new_x) = (previous.outer[0].x, raw.outer[0].x);
    assert!(lips.outer[0].x > old_x.min(new_x) && lips.outer[0].x < old_x.max(new_x));
}

#[test]
fn test_detection_starts_once_stream_size_is_known() {
    let stub = StubModel::with_face(frontal_face());
    let camera = MockCamera::new(640, 480);
    camera.controls.warmup_polls.store(3, Ordering::SeqCst);
    let mut engine = TryOnEngine::new(test_config(), camera, ManualScheduler::new(), stub.factory()).unwrap();

    engine.open(PRODUCT).unwrap();
    engine.wait_for_model(LOAD_TIMEOUT);

    // Playing with an unknown size stalls without touching the model
    run_ticks(&mut engine, 2);
    assert_eq!(engine.status().phase, SessionPhase::Detecting);
    assert_eq!(stub.calls(), 0);
    assert!(engine.render().unwrap().is_none());

    run_ticks(&mut engine, 1);
    assert_eq!(stub.calls(), 1);
    assert_eq!(engine.frames_processed(), 1);
    assert!(!engine.scene().unwrap().is_hidden());
    let frame = engine.render().unwrap().unwrap();
    assert_eq!((frame.cols(), frame.rows()), (640, 480));
}

#[test]
fn test_transient_model_error_hides_and_recovers() {
    let stub = StubModel::with_face(frontal_face());
    let mut engine = engine_with(&stub);
    engine.open(PRODUCT).unwrap();
    engine.wait_for_model(LOAD_TIMEOUT);
    run_ticks(&mut engine, 3);

    stub.fail.store(true, Ordering::SeqCst);
    run_ticks(&mut engine, 2);
    assert!(engine.scene().unwrap().is_hidden());
    assert_eq!(engine.status().phase, SessionPhase::Detecting);
    assert_eq!(engine.status().error, None);

    stub.fail.store(false, Ordering::SeqCst);
    run_ticks(&mut engine, 1);
    assert!(!engine.scene().unwrap().is_hidden());
}

#[test]
fn test_close_releases_camera_once_and_cancels_tick() {
    let stub = StubModel::with_face(frontal_face());
    let mut engine = engine_with(&stub);
    let controls = engine.device().controls.clone();

    engine.open(PRODUCT).unwrap();
    engine.wait_for_model(LOAD_TIMEOUT);
    run_ticks(&mut engine, 10);
    assert_eq!(engine.scheduler().pending(), 1);

    engine.close();

    assert_eq!(controls.stops(), 1);
    assert_eq!(engine.scheduler().pending(), 0);
    assert_eq!(engine.scheduler().cancelled(), 1);
    assert_eq!(engine.status().phase, SessionPhase::Stopped);
    assert!(engine.scene().is_none());
    assert!(engine.render().unwrap().is_none());
    assert!(!engine.pump());

    // Closing twice, then dropping, never stops the camera again
    engine.close();
    drop(engine);
    assert_eq!(controls.stops(), 1);
}

#[test]
fn test_drop_releases_camera() {
    let stub = StubModel::with_face(frontal_face());
    let mut engine = engine_with(&stub);
    let controls = engine.device().controls.clone();
    engine.open(PRODUCT).unwrap();
    run_ticks(&mut engine, 2);

    drop(engine);
    assert_eq!(controls.stops(), 1);
}

#[test]
fn test_stale_tick_ignored() {
    let stub = StubModel::with_face(frontal_face());
    let mut engine = engine_with(&stub);
    engine.open(PRODUCT).unwrap();
    engine.wait_for_model(LOAD_TIMEOUT);

    let stale = TickId(9999);
    engine.tick(stale);
    assert_eq!(stub.calls(), 0);
    assert_eq!(engine.scheduler().pending(), 1);
}

#[test]
fn test_reopen_same_product_is_noop() {
    let stub = StubModel::with_face(frontal_face());
    let mut engine = engine_with(&stub);
    let controls = engine.device().controls.clone();

    engine.open(PRODUCT).unwrap();
    engine.open(PRODUCT).unwrap();

    assert_eq!(controls.starts(), 1);
    assert_eq!(engine.scheduler().requested(), 1);
    assert_eq!(stub.loads(), 1);
}

#[test]
fn test_new_product_swaps_without_restarting_camera() {
    let stub = StubModel::with_face(frontal_face());
    let mut engine = engine_with(&stub);
    let controls = engine.device().controls.clone();

    engine.open(PRODUCT).unwrap();
    engine.wait_for_model(LOAD_TIMEOUT);
    run_ticks(&mut engine, 3);

    engine.open("file:///nonexistent/hoops.png").unwrap();

    assert_eq!(controls.starts(), 1);
    assert_eq!(controls.stops(), 0);
    assert_eq!(engine.status().asset_url.as_deref(), Some("file:///nonexistent/hoops.png"));
    assert_eq!(engine.status().phase, SessionPhase::Detecting);
    run_ticks(&mut engine, 1);
    assert_eq!(engine.frames_processed(), 4);
}

#[test]
fn test_unchanged_timestamp_runs_model_once() {
    let stub = StubModel::with_face(frontal_face());
    let mut engine = engine_with(&stub);
    let controls = engine.device().controls.clone();
    engine.open(PRODUCT).unwrap();
    engine.wait_for_model(LOAD_TIMEOUT);

    run_ticks(&mut engine, 1);
    controls.frozen.store(true, Ordering::SeqCst);
    run_ticks(&mut engine, 10);

    assert_eq!(stub.calls(), 1);
    assert_eq!(engine.model_invocations(), 1);
    assert_eq!(engine.frames_processed(), 1);
    // Overlays stay up on repeated frames
    assert!(!engine.scene().unwrap().is_hidden());
}

#[test]
fn test_paused_stream_is_not_processed() {
    let stub = StubModel::with_face(frontal_face());
    let mut engine = engine_with(&stub);
    let controls = engine.device().controls.clone();
    engine.open(PRODUCT).unwrap();
    engine.wait_for_model(LOAD_TIMEOUT);

    controls.paused.store(true, Ordering::SeqCst);
    run_ticks(&mut engine, 5);
    assert_eq!(stub.calls(), 0);
    assert_eq!(engine.scheduler().pending(), 1);

    controls.paused.store(false, Ordering::SeqCst);
    run_ticks(&mut engine, 1);
    assert_eq!(stub.calls(), 1);
}

#[test]
fn test_retained_model_survives_close() {
    let stub = StubModel::with_face(frontal_face());
    let mut engine = engine_with(&stub);
    assert_eq!(engine.config().detector.lifetime, ModelLifetime::Retain);

    engine.open(PRODUCT).unwrap();
    engine.wait_for_model(LOAD_TIMEOUT);
    run_ticks(&mut engine, 3);
    engine.close();
    assert_eq!(engine.status().model, ModelStatus::Ready);

    // Media time restarts with the new stream and must still be processed
    engine.open(PRODUCT).unwrap();
    run_ticks(&mut engine, 2);
    assert_eq!(stub.loads(), 1);
    assert_eq!(stub.calls(), 5);
    assert_eq!(engine.frames_processed(), 2);
}

#[test]
fn test_per_session_model_is_released() {
    let stub = StubModel::with_face(frontal_face());
    let mut config = test_config();
    config.detector.lifetime = ModelLifetime::PerSession;
    let mut engine = TryOnEngine::new(config, MockCamera::new(640, 480), ManualScheduler::new(), stub.factory()).unwrap();

    engine.open(PRODUCT).unwrap();
    engine.wait_for_model(LOAD_TIMEOUT);
    run_ticks(&mut engine, 2);
    engine.close();
    assert_eq!(engine.status().model, ModelStatus::NotLoaded);

    engine.open(PRODUCT).unwrap();
    assert_eq!(engine.wait_for_model(LOAD_TIMEOUT), ModelStatus::Ready);
    assert_eq!(stub.loads(), 2);
}

#[test]
fn test_landmark_debug_layer() {
    let stub = StubModel::with_face(frontal_face());
    let mut config = test_config();
    config.display.show_landmarks = true;
    let mut engine = TryOnEngine::new(config, MockCamera::new(320, 240), ManualScheduler::new(), stub.factory()).unwrap();

    engine.open(PRODUCT).unwrap();
    engine.wait_for_model(LOAD_TIMEOUT);
    run_ticks(&mut engine, 1);

    let canvas = engine.scene().unwrap().landmarks.as_ref().unwrap();
    assert!(!canvas.is_clear());

    stub.set_face(None);
    run_ticks(&mut engine, 1);
    assert!(engine.scene().unwrap().landmarks.as_ref().unwrap().is_clear());
}

#[test]
fn test_manual_scheduler_drives_one_tick_at_a_time() {
    let stub = StubModel::with_face(frontal_face());
    let mut engine = engine_with(&stub);
    engine.open(PRODUCT).unwrap();
    engine.wait_for_model(LOAD_TIMEOUT);

    for _ in 0..4 {
        assert_eq!(engine.scheduler().pending(), 1);
        run_ticks(&mut engine, 1);
    }
    assert_eq!(engine.scheduler().requested(), 5);
}
