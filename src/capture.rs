//! Camera acquisition and teardown.
//!
//! A [`CaptureDevice`] hands out one [`CaptureStream`] per session. Streams are
//! never shared: reopening always starts a new one, and [`CaptureStream::stop`]
//! releases the hardware before it returns.

use crate::{config::CameraConfig, Error, Result};
use log::{debug, info, warn};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, CAP_PROP_BUFFERSIZE, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH, CAP_PROP_POS_MSEC},
};
use std::{path::PathBuf, time::Instant};

/// Video source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    /// Webcam index
    Camera(i32),
    /// Video file path
    File(PathBuf),
}

/// What a session asks the capture device for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub source: VideoSource,
    /// Preferred frame width; the device may deliver something else
    pub preferred_width: i32,
    /// Preferred frame height; the device may deliver something else
    pub preferred_height: i32,
}

impl CaptureRequest {
    #[must_use]
    pub fn from_config(config: &CameraConfig) -> Self {
        let source = config
            .video_file
            .clone()
            .map_or(VideoSource::Camera(config.index), VideoSource::File);
        Self {
            source,
            preferred_width: config.preferred_width,
            preferred_height: config.preferred_height,
        }
    }
}

/// Playback state of an acquired stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// Acquired but not yet started
    Loading,
    Playing,
    Paused,
    /// The source ran out of frames
    Ended,
}

/// One decoded frame and its media timestamp
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// BGR frame, camera-native orientation
    pub image: Mat,
    /// Monotonic media time in milliseconds
    pub media_time_ms: f64,
}

impl VideoFrame {
    /// Frame size as `(width, height)`
    #[must_use]
    pub fn size(&self) -> (i32, i32) {
        (self.image.cols(), self.image.rows())
    }
}

/// Source of capture streams
pub trait CaptureDevice {
    /// Acquire a new stream
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if access was refused and
    /// [`Error::DeviceUnavailable`] if no matching device could be opened.
    fn start(&mut self, request: &CaptureRequest) -> Result<Box<dyn CaptureStream>>;
}

/// An acquired video stream bound to one session
pub trait CaptureStream {
    /// Start playback
    ///
    /// # Errors
    ///
    /// Returns [`Error::PlaybackStartFailed`] if the stream refuses to play.
    fn play(&mut self) -> Result<()>;

    fn status(&self) -> PlaybackStatus;

    /// Whether a decodable frame is available
    fn has_current_data(&self) -> bool;

    /// Intrinsic video size as `(width, height)`; zero until known
    fn video_size(&self) -> (i32, i32);

    /// Give a stream whose size is still unknown another chance to decode a
    /// frame. Called every tick before [`CaptureStream::is_playable`].
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails while decoding.
    fn poll_ready(&mut self) -> Result<()> {
        Ok(())
    }

    /// The frame currently on display, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails while decoding.
    fn current_frame(&mut self) -> Result<Option<VideoFrame>>;

    /// Release the device. Calling this more than once is a no-op.
    fn stop(&mut self);

    fn is_stopped(&self) -> bool;

    /// Playing with a known, non-zero size
    fn is_playable(&self) -> bool {
        let (width, height) = self.video_size();
        self.status() == PlaybackStatus::Playing && width > 0 && height > 0
    }
}

/// Map a backend open failure onto the session error taxonomy
#[must_use]
pub fn classify_open_failure(message: &str) -> Error {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("not authorized") || lower.contains("access denied") {
        Error::PermissionDenied(message.to_string())
    } else {
        Error::DeviceUnavailable(message.to_string())
    }
}

/// Capture device backed by `OpenCV` `VideoCapture`
#[derive(Debug, Default)]
pub struct OpenCvCamera;

impl OpenCvCamera {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CaptureDevice for OpenCvCamera {
    fn start(&mut self, request: &CaptureRequest) -> Result<Box<dyn CaptureStream>> {
        Ok(Box::new(OpenCvStream::open(request)?))
    }
}

/// Stream over an opened `VideoCapture`
pub struct OpenCvStream {
    capture: VideoCapture,
    is_file: bool,
    started: Instant,
    status: PlaybackStatus,
    pending: Option<VideoFrame>,
    size: (i32, i32),
    stopped: bool,
}

impl OpenCvStream {
    /// Open a camera or video file
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] or [`Error::DeviceUnavailable`]
    /// if the source cannot be opened.
    pub fn open(request: &CaptureRequest) -> Result<Self> {
        let (capture, is_file) = match &request.source {
            VideoSource::Camera(index) => {
                info!("Opening camera {index}");
                let mut cap = VideoCapture::new(*index, videoio::CAP_ANY)
                    .map_err(|e| classify_open_failure(&e.to_string()))?;
                // Keep latency low: always hand out the newest frame
                if let Err(e) = cap.set(CAP_PROP_BUFFERSIZE, 1.0) {
                    debug!("Camera ignored buffer size hint: {e}");
                }
                (cap, false)
            }
            VideoSource::File(path) => {
                info!("Opening video file: {}", path.display());
                let cap = VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)
                    .map_err(|e| classify_open_failure(&e.to_string()))?;
                (cap, true)
            }
        };

        let opened = capture
            .is_opened()
            .map_err(|e| classify_open_failure(&e.to_string()))?;
        if !opened {
            return Err(classify_open_failure(&format!("Failed to open video source {:?}", request.source)));
        }

        let mut stream = Self {
            capture,
            is_file,
            started: Instant::now(),
            status: PlaybackStatus::Loading,
            pending: None,
            size: (0, 0),
            stopped: false,
        };

        if !is_file {
            stream.apply_preferred_size(request.preferred_width, request.preferred_height);
        }

        // Decode one frame so readiness and the real size are known up front
        stream.pending = stream.read_frame()?;
        if let Some(frame) = &stream.pending {
            stream.size = frame.size();
            info!("Video source delivers {}x{}", stream.size.0, stream.size.1);
        } else {
            warn!("Video source opened but produced no initial frame");
        }

        Ok(stream)
    }

    fn apply_preferred_size(&mut self, width: i32, height: i32) {
        if width <= 0 || height <= 0 {
            return;
        }
        let set = self
            .capture
            .set(CAP_PROP_FRAME_WIDTH, f64::from(width))
            .and_then(|_| self.capture.set(CAP_PROP_FRAME_HEIGHT, f64::from(height)));
        if let Err(e) = set {
            debug!("Camera rejected preferred size {width}x{height}: {e}");
        }
    }

    fn read_frame(&mut self) -> Result<Option<VideoFrame>> {
        let mut image = Mat::default();
        if !self.capture.read(&mut image)? || image.empty() {
            return Ok(None);
        }

        let media_time_ms = if self.is_file {
            self.capture.get(CAP_PROP_POS_MSEC)?
        } else {
            self.started.elapsed().as_secs_f64() * 1000.0
        };

        Ok(Some(VideoFrame { image, media_time_ms }))
    }
}

impl CaptureStream for OpenCvStream {
    fn play(&mut self) -> Result<()> {
        if self.stopped {
            return Err(Error::PlaybackStartFailed("Stream already stopped".to_string()));
        }
        if self.status == PlaybackStatus::Ended {
            return Err(Error::PlaybackStartFailed("Video source has ended".to_string()));
        }
        self.status = PlaybackStatus::Playing;
        Ok(())
    }

    fn status(&self) -> PlaybackStatus {
        self.status
    }

    fn has_current_data(&self) -> bool {
        !self.stopped && (self.pending.is_some() || self.status == PlaybackStatus::Playing)
    }

    fn video_size(&self) -> (i32, i32) {
        self.size
    }

    fn poll_ready(&mut self) -> Result<()> {
        let (width, height) = self.size;
        if self.stopped || self.status != PlaybackStatus::Playing || (width > 0 && height > 0) {
            return Ok(());
        }

        match self.read_frame()? {
            Some(frame) => {
                self.size = frame.size();
                info!("Video source delivers {}x{}", self.size.0, self.size.1);
                self.pending = Some(frame);
            }
            None if self.is_file => {
                warn!("Video file produced no decodable frame");
                self.status = PlaybackStatus::Ended;
            }
            None => debug!("Camera still warming up"),
        }
        Ok(())
    }

    fn current_frame(&mut self) -> Result<Option<VideoFrame>> {
        if self.stopped || self.status != PlaybackStatus::Playing {
            return Ok(None);
        }

        let frame = match self.pending.take() {
            Some(frame) => Some(frame),
            None => self.read_frame()?,
        };

        match frame {
            Some(frame) => {
                self.size = frame.size();
                Ok(Some(frame))
            }
            None => {
                if self.is_file {
                    info!("End of video file reached");
                    self.status = PlaybackStatus::Ended;
                } else {
                    warn!("Failed to read frame from camera");
                }
                Ok(None)
            }
        }
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.status = PlaybackStatus::Paused;
        self.pending = None;
        if let Err(e) = self.capture.release() {
            warn!("Failed to release video source: {e}");
        }
        info!("Video source released");
    }

    fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl Drop for OpenCvStream {
    fn drop(&mut self) {
        self.stop();
    }
}
