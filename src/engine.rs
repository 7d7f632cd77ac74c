//! The try-on engine: session lifecycle and the per-frame render loop.
//!
//! One session at a time. [`TryOnEngine::open`] acquires the camera and
//! requests the first tick; every tick processes at most one frame and
//! requests the next. [`TryOnEngine::close`] cancels the pending tick and
//! releases the camera before returning. The landmark model loads on a
//! background thread and is polled from the tick, so the loop never waits
//! for it.

use crate::{
    asset::AccessoryAsset,
    capture::{CaptureDevice, CaptureRequest, CaptureStream, PlaybackStatus, VideoFrame},
    compositor::FrameCompositor,
    config::{Config, ModelLifetime},
    detector::{DetectorSlot, LandmarkDetector, ModelFactory, ModelLoader, ModelStatus},
    geometry::GeometryResolver,
    overlay::OverlayScene,
    scheduler::{FrameScheduler, TickId},
    Result,
};
use log::{debug, error, info, trace, warn};
use opencv::core::Mat;
use std::time::Duration;

/// Lifecycle phase of the try-on overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session has been opened
    Idle,
    /// Starting the camera
    Initializing,
    /// Camera started, waiting for the first decodable frame
    Ready,
    /// Frames are flowing through the pipeline
    Detecting,
    /// The camera could not be started; close to retry
    Failed,
    /// The last session was closed
    Stopped,
}

/// Snapshot of engine state for the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub phase: SessionPhase,
    pub model: ModelStatus,
    /// User-visible error of the current session
    pub error: Option<String>,
    /// Accessory the session shows
    pub asset_url: Option<String>,
    /// Playback state of the session's stream
    pub playback: Option<PlaybackStatus>,
}

struct Session {
    asset_url: String,
    asset: Option<AccessoryAsset>,
    stream: Option<Box<dyn CaptureStream>>,
    phase: SessionPhase,
    error: Option<String>,
    last_media_time: Option<f64>,
    resolver: GeometryResolver,
    scene: OverlayScene,
    pending_tick: Option<TickId>,
    last_frame: Option<VideoFrame>,
    frames_processed: u64,
}

impl Session {
    fn new(asset_url: &str, config: &Config) -> Result<Self> {
        Ok(Self {
            asset_url: asset_url.to_string(),
            asset: load_asset(asset_url),
            stream: None,
            phase: SessionPhase::Initializing,
            error: None,
            last_media_time: None,
            resolver: GeometryResolver::new(config)?,
            scene: OverlayScene::new(config),
            pending_tick: None,
            last_frame: None,
            frames_processed: 0,
        })
    }

    const fn is_active(&self) -> bool {
        matches!(self.phase, SessionPhase::Initializing | SessionPhase::Ready | SessionPhase::Detecting)
    }

    /// Drop every overlay and all smoothing history
    fn clear_overlays(&mut self) {
        self.resolver.reset();
        self.scene.hide_all();
    }

    fn run_detection(&mut self, detector: &mut LandmarkDetector, frame: &VideoFrame) {
        let (width, height) = frame.size();
        match detector.detect(&frame.image, frame.media_time_ms) {
            Ok(Some(landmarks)) => {
                let applied = self
                    .resolver
                    .resolve(&landmarks, width, height)
                    .and_then(|geometry| self.scene.apply(&geometry, &landmarks));
                match applied {
                    Ok(()) => self.frames_processed += 1,
                    Err(e) => {
                        warn!("Failed to apply overlay geometry: {e}");
                        self.clear_overlays();
                    }
                }
            }
            Ok(None) => {
                trace!("No face at {:.1}ms", frame.media_time_ms);
                self.clear_overlays();
            }
            Err(e) => {
                debug!("{e}");
                self.clear_overlays();
            }
        }
    }
}

fn load_asset(url: &str) -> Option<AccessoryAsset> {
    match AccessoryAsset::load(url) {
        Ok(asset) => Some(asset),
        Err(e) => {
            warn!("Accessory unavailable, showing lipstick only: {e}");
            None
        }
    }
}

/// Live AR overlay engine
pub struct TryOnEngine<C: CaptureDevice, S: FrameScheduler> {
    config: Config,
    device: C,
    scheduler: S,
    factory: ModelFactory,
    detector: DetectorSlot,
    compositor: FrameCompositor,
    session: Option<Session>,
    closed: bool,
}

impl<C: CaptureDevice, S: FrameScheduler> TryOnEngine<C, S> {
    /// Create an idle engine
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn new(config: Config, device: C, scheduler: S, factory: ModelFactory) -> Result<Self> {
        config.validate()?;
        let compositor = FrameCompositor::new(
            config.display.mirrored,
            config.lipstick.layer_opacity,
            config.earrings.width_fraction,
        );
        Ok(Self {
            config,
            device,
            scheduler,
            factory,
            detector: DetectorSlot::Empty,
            compositor,
            session: None,
            closed: false,
        })
    }

    /// Open the overlay for a product.
    ///
    /// Opening the asset already shown is a no-op. Opening a different asset
    /// while a session runs swaps the sprite and keeps the camera.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::PermissionDenied`] or
    /// [`crate::Error::DeviceUnavailable`] if the camera cannot be started.
    /// The session stays open in the [`SessionPhase::Failed`] phase so the
    /// error can be shown.
    pub fn open(&mut self, product_image_url: &str) -> Result<()> {
        if let Some(session) = &mut self.session {
            if session.is_active() {
                if session.asset_url == product_image_url {
                    debug!("Session already showing {product_image_url}");
                } else {
                    info!("Swapping accessory to {product_image_url}");
                    session.asset = load_asset(product_image_url);
                    session.asset_url = product_image_url.to_string();
                }
                return Ok(());
            }
            self.close();
        }

        info!("Opening try-on session for {product_image_url}");
        self.ensure_model_loading();

        let mut session = Session::new(product_image_url, &self.config)?;
        let request = CaptureRequest::from_config(&self.config.camera);

        match self.device.start(&request) {
            Ok(mut stream) => {
                if let Err(e) = stream.play() {
                    warn!("{e}; waiting for the stream to start on its own");
                }
                session.stream = Some(stream);
                session.phase = SessionPhase::Ready;
                session.pending_tick = Some(self.scheduler.request_tick());
                info!("Camera started");
                self.session = Some(session);
                Ok(())
            }
            Err(e) => {
                error!("Failed to start camera: {e}");
                session.phase = SessionPhase::Failed;
                session.error = Some(e.to_string());
                self.session = Some(session);
                Err(e)
            }
        }
    }

    fn ensure_model_loading(&mut self) {
        if !matches!(self.detector, DetectorSlot::Empty | DetectorSlot::Failed(_)) {
            return;
        }
        self.detector = match ModelLoader::spawn(self.factory.clone(), self.config.detector.clone()) {
            Ok(loader) => DetectorSlot::Loading(loader),
            Err(e) => {
                error!("{e}");
                DetectorSlot::Failed(e.to_string())
            }
        };
    }

    /// Wait for the next scheduled tick and run it.
    ///
    /// Returns `false` when nothing is scheduled.
    pub fn pump(&mut self) -> bool {
        match self.scheduler.next_tick() {
            Some(id) => {
                self.tick(id);
                true
            }
            None => false,
        }
    }

    /// Run one tick of the render loop. Never fails: frame-level errors are
    /// logged and the overlays hidden.
    pub fn tick(&mut self, id: TickId) {
        if let Some(e) = self.detector.poll() {
            warn!("Continuing without overlays: {e}");
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.pending_tick != Some(id) {
            trace!("Ignoring stale tick {}", id.0);
            return;
        }
        session.pending_tick = None;
        if !session.is_active() {
            return;
        }
        let Some(stream) = session.stream.as_mut() else {
            return;
        };

        if session.phase == SessionPhase::Ready && stream.has_current_data() {
            info!("First frame available, starting detection");
            session.phase = SessionPhase::Detecting;
        }

        if let Err(e) = stream.poll_ready() {
            warn!("Failed to read frame: {e}");
        }

        if session.phase == SessionPhase::Detecting && stream.is_playable() {
            match stream.current_frame() {
                Ok(Some(frame)) => {
                    let advanced = session.last_media_time.map_or(true, |last| frame.media_time_ms > last);
                    if advanced {
                        session.last_media_time = Some(frame.media_time_ms);
                        if let Some(detector) = self.detector.detector_mut() {
                            session.run_detection(detector, &frame);
                        }
                    }
                    session.last_frame = Some(frame);
                }
                Ok(None) => trace!("No frame this tick"),
                Err(e) => warn!("Failed to read frame: {e}"),
            }
        }

        session.pending_tick = Some(self.scheduler.request_tick());
    }

    /// End the session. The camera is released before this returns.
    pub fn close(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        info!("Closing try-on session for {}", session.asset_url);

        if let Some(id) = session.pending_tick.take() {
            self.scheduler.cancel_tick(id);
        }
        if let Some(mut stream) = session.stream.take() {
            stream.stop();
        }
        session.scene.detach();
        session.phase = SessionPhase::Stopped;
        self.closed = true;

        match self.config.detector.lifetime {
            ModelLifetime::PerSession => {
                debug!("Releasing landmark model");
                self.detector = DetectorSlot::Empty;
            }
            ModelLifetime::Retain => {
                if let Some(detector) = self.detector.detector_mut() {
                    detector.reset_timeline();
                }
            }
        }
    }

    /// Compose the current output frame, if the session has one
    ///
    /// # Errors
    ///
    /// Returns an error if compositing fails.
    pub fn render(&self) -> Result<Option<Mat>> {
        let Some(session) = self.session.as_ref().filter(|s| s.is_active()) else {
            return Ok(None);
        };
        let Some(frame) = &session.last_frame else {
            return Ok(None);
        };
        self.compositor
            .compose(&frame.image, &session.scene, session.asset.as_ref())
            .map(Some)
    }

    #[must_use]
    pub fn status(&self) -> EngineStatus {
        let phase = match &self.session {
            Some(session) => session.phase,
            None if self.closed => SessionPhase::Stopped,
            None => SessionPhase::Idle,
        };
        EngineStatus {
            phase,
            model: self.detector.status(),
            error: self.session.as_ref().and_then(|s| s.error.clone()),
            asset_url: self.session.as_ref().map(|s| s.asset_url.clone()),
            playback: self
                .session
                .as_ref()
                .and_then(|s| s.stream.as_ref())
                .map(|stream| stream.status()),
        }
    }

    /// Block until the model finishes loading or `timeout` expires
    pub fn wait_for_model(&mut self, timeout: Duration) -> ModelStatus {
        if let Some(e) = self.detector.wait(timeout) {
            warn!("Continuing without overlays: {e}");
        }
        self.detector.status()
    }

    /// Overlay layers of the open session
    #[must_use]
    pub fn scene(&self) -> Option<&OverlayScene> {
        self.session.as_ref().map(|s| &s.scene)
    }

    /// Frames whose overlays were updated from a detected face
    #[must_use]
    pub fn frames_processed(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.frames_processed)
    }

    /// Model runs since the detector was created
    #[must_use]
    pub fn model_invocations(&self) -> u64 {
        self.detector.detector().map_or(0, LandmarkDetector::invocations)
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    #[must_use]
    pub fn device(&self) -> &C {
        &self.device
    }
}

impl<C: CaptureDevice, S: FrameScheduler> Drop for TryOnEngine<C, S> {
    fn drop(&mut self) {
        self.close();
    }
}
