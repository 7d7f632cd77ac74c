//! Shared fixtures: a scriptable camera, a stub landmark model and synthetic faces.

#![allow(dead_code)]

use opencv::core::{Mat, Scalar, CV_8UC3};
use opencv::prelude::*;
use rand::Rng;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use virtual_try_on::{
    capture::{CaptureDevice, CaptureRequest, CaptureStream, PlaybackStatus, VideoFrame},
    config::{Config, DetectorConfig},
    constants::{INNER_MOUTH, LEFT_EAR_ANCHOR, NUM_FACE_MESH_LANDMARKS, OUTER_LIPS, RIGHT_EAR_ANCHOR},
    detector::{LandmarkModel, ModelFactory},
    landmarks::{FaceLandmarks, Landmark},
    Error, Result,
};

/// Frame interval of the mock camera in milliseconds
pub const FRAME_INTERVAL_MS: f64 = 1000.0 / 30.0;

/// How a mock camera refuses to start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFailure {
    Permission,
    Unavailable,
}

/// Knobs shared between a test and the streams its camera hands out
#[derive(Clone, Default)]
pub struct StreamControls {
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    /// Media time stops advancing
    pub frozen: Arc<AtomicBool>,
    /// Stream reports itself paused
    pub paused: Arc<AtomicBool>,
    /// `play()` fails
    pub refuse_play: Arc<AtomicBool>,
    /// Readiness polls a playing stream needs before its size is known
    pub warmup_polls: Arc<AtomicUsize>,
}

impl StreamControls {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }
}

/// Camera producing flat gray frames
pub struct MockCamera {
    pub controls: StreamControls,
    pub size: (i32, i32),
    pub failure: Option<StartFailure>,
}

impl MockCamera {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            controls: StreamControls::default(),
            size: (width, height),
            failure: None,
        }
    }

    pub fn failing(failure: StartFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::new(640, 480)
        }
    }
}

impl CaptureDevice for MockCamera {
    fn start(&mut self, _request: &CaptureRequest) -> Result<Box<dyn CaptureStream>> {
        match self.failure {
            Some(StartFailure::Permission) => Err(Error::PermissionDenied("Camera access denied".into())),
            Some(StartFailure::Unavailable) => Err(Error::DeviceUnavailable("No camera found".into())),
            None => {
                self.controls.starts.fetch_add(1, Ordering::SeqCst);
                let size_known = self.controls.warmup_polls.load(Ordering::SeqCst) == 0;
                Ok(Box::new(MockStream {
                    controls: self.controls.clone(),
                    size: self.size,
                    size_known,
                    status: PlaybackStatus::Loading,
                    media_time_ms: 0.0,
                    stopped: false,
                }))
            }
        }
    }
}

pub struct MockStream {
    controls: StreamControls,
    size: (i32, i32),
    size_known: bool,
    status: PlaybackStatus,
    media_time_ms: f64,
    stopped: bool,
}

impl CaptureStream for MockStream {
    fn play(&mut self) -> Result<()> {
        if self.controls.refuse_play.load(Ordering::SeqCst) {
            return Err(Error::PlaybackStartFailed("Autoplay blocked".into()));
        }
        self.status = PlaybackStatus::Playing;
        Ok(())
    }

    fn status(&self) -> PlaybackStatus {
        if self.controls.paused.load(Ordering::SeqCst) {
            PlaybackStatus::Paused
        } else {
            self.status
        }
    }

    fn has_current_data(&self) -> bool {
        !self.stopped
    }

    fn video_size(&self) -> (i32, i32) {
        if self.size_known {
            self.size
        } else {
            (0, 0)
        }
    }

    fn poll_ready(&mut self) -> Result<()> {
        if self.size_known || self.stopped || self.status() != PlaybackStatus::Playing {
            return Ok(());
        }
        let remaining = self.controls.warmup_polls.load(Ordering::SeqCst).saturating_sub(1);
        self.controls.warmup_polls.store(remaining, Ordering::SeqCst);
        self.size_known = remaining == 0;
        Ok(())
    }

    fn current_frame(&mut self) -> Result<Option<VideoFrame>> {
        if self.stopped || !self.size_known || self.status() != PlaybackStatus::Playing {
            return Ok(None);
        }
        if !self.controls.frozen.load(Ordering::SeqCst) {
            self.media_time_ms += FRAME_INTERVAL_MS;
        }
        let image = Mat::new_rows_cols_with_default(self.size.1, self.size.0, CV_8UC3, Scalar::all(128.0))?;
        Ok(Some(VideoFrame {
            image,
            media_time_ms: self.media_time_ms,
        }))
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.controls.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// Shared handle scripting what the stub model returns
#[derive(Clone, Default)]
pub struct StubModel {
    pub face: Arc<Mutex<Option<FaceLandmarks>>>,
    pub calls: Arc<AtomicUsize>,
    pub fail: Arc<AtomicBool>,
    pub loads: Arc<AtomicUsize>,
}

impl StubModel {
    pub fn with_face(face: FaceLandmarks) -> Self {
        let stub = Self::default();
        stub.set_face(Some(face));
        stub
    }

    pub fn set_face(&self, face: Option<FaceLandmarks>) {
        *self.face.lock().unwrap() = face;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn factory(&self) -> ModelFactory {
        let stub = self.clone();
        Arc::new(move |_config: &DetectorConfig| -> Result<Box<dyn LandmarkModel>> {
            stub.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(stub.clone()))
        })
    }
}

impl LandmarkModel for StubModel {
    fn detect_faces(&mut self, _frame: &Mat, _timestamp_ms: f64) -> Result<Vec<FaceLandmarks>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::ModelOutputError("Corrupt output tensor".into()));
        }
        Ok(self.face.lock().unwrap().iter().cloned().collect())
    }

    fn name(&self) -> &str {
        "StubModel"
    }
}

/// Factory whose model never loads
pub fn failing_factory() -> ModelFactory {
    Arc::new(|_config: &DetectorConfig| -> Result<Box<dyn LandmarkModel>> {
        Err(Error::ModelLoadFailed("face_landmark.onnx not found".into()))
    })
}

fn ring(cx: f32, cy: f32, rx: f32, ry: f32, count: usize, k: usize) -> Landmark {
    #[allow(clippy::cast_precision_loss)]
    let theta = std::f32::consts::PI - k as f32 * std::f32::consts::TAU / count as f32;
    Landmark::new(cx + rx * theta.cos(), cy + ry * theta.sin(), 0.0)
}

/// A frontal face centered at `(cx, cy)` whose ear anchors are `width` apart
pub fn synthetic_face(cx: f32, cy: f32, width: f32) -> FaceLandmarks {
    let mut points: Vec<Landmark> = (0..NUM_FACE_MESH_LANDMARKS)
        .map(|i| ring(cx, cy, width * 0.5, width * 0.65, NUM_FACE_MESH_LANDMARKS, i))
        .collect();

    points[LEFT_EAR_ANCHOR] = Landmark::new(cx - width / 2.0, cy, 0.0);
    points[RIGHT_EAR_ANCHOR] = Landmark::new(cx + width / 2.0, cy, 0.0);

    let mouth_y = cy + width * 0.4;
    for (k, &idx) in OUTER_LIPS.iter().enumerate() {
        points[idx] = ring(cx, mouth_y, width * 0.22, width * 0.09, OUTER_LIPS.len(), k);
    }
    for (k, &idx) in INNER_MOUTH.iter().enumerate() {
        points[idx] = ring(cx, mouth_y, width * 0.15, width * 0.03, INNER_MOUTH.len(), k);
    }

    FaceLandmarks::new(points).unwrap()
}

/// The default test face
pub fn frontal_face() -> FaceLandmarks {
    synthetic_face(0.5, 0.45, 0.35)
}

/// A face with uniform noise of up to `amplitude` on every coordinate
pub fn jittered_face(rng: &mut impl Rng, amplitude: f32) -> FaceLandmarks {
    let points = frontal_face()
        .points()
        .iter()
        .map(|p| {
            Landmark::new(
                p.x + rng.gen_range(-amplitude..=amplitude),
                p.y + rng.gen_range(-amplitude..=amplitude),
                p.z,
            )
        })
        .collect();
    FaceLandmarks::new(points).unwrap()
}

/// Defaults with an asset-free, landmark-free display
pub fn test_config() -> Config {
    Config::default()
}
