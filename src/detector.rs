//! Landmark detection in video mode.
//!
//! [`LandmarkDetector`] wraps any [`LandmarkModel`] with the per-session
//! contract the render loop relies on: frames whose timestamp has not advanced
//! are answered from cache, only the primary face is returned, and no model
//! error or panic ever reaches the caller as anything but
//! [`Error::DetectionTransient`].
//!
//! Models are heavyweight, so [`ModelLoader`] builds them on a background
//! thread while the camera starts.

use crate::{config::DetectorConfig, landmarks::FaceLandmarks, Error, Result};
use log::{debug, error, info, trace};
use opencv::core::Mat;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, TryRecvError},
        Arc,
    },
    thread,
    time::Duration,
};

/// A face-landmark model
pub trait LandmarkModel: Send {
    /// Landmarks for every face found in a frame, most prominent first
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    fn detect_faces(&mut self, frame: &Mat, timestamp_ms: f64) -> Result<Vec<FaceLandmarks>>;

    /// Forget any temporal tracking state
    fn reset(&mut self) {}

    /// Get model name
    fn name(&self) -> &str;
}

/// Builds a model from configuration
pub type ModelFactory = Arc<dyn Fn(&DetectorConfig) -> Result<Box<dyn LandmarkModel>> + Send + Sync>;

/// Video-mode detector for one face
pub struct LandmarkDetector {
    model: Box<dyn LandmarkModel>,
    num_faces: usize,
    last_timestamp_ms: Option<f64>,
    last_result: Option<FaceLandmarks>,
    invocations: u64,
}

impl LandmarkDetector {
    #[must_use]
    pub fn new(model: Box<dyn LandmarkModel>, num_faces: usize) -> Self {
        Self {
            model,
            num_faces: num_faces.max(1),
            last_timestamp_ms: None,
            last_result: None,
            invocations: 0,
        }
    }

    /// Landmarks of the primary face, or `None` when no face is visible.
    ///
    /// A timestamp that does not advance past the previous call returns the
    /// previous result without running the model.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DetectionTransient`] if the model fails or panics on
    /// this frame. The cached result is cleared in that case.
    pub fn detect(&mut self, frame: &Mat, timestamp_ms: f64) -> Result<Option<FaceLandmarks>> {
        if self.last_timestamp_ms.is_some_and(|last| timestamp_ms <= last) {
            trace!("Frame at {timestamp_ms:.1}ms already processed");
            return Ok(self.last_result.clone());
        }
        self.last_timestamp_ms = Some(timestamp_ms);
        self.invocations += 1;

        let model = &mut self.model;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| model.detect_faces(frame, timestamp_ms)));

        let faces = match outcome {
            Ok(Ok(faces)) => faces,
            Ok(Err(e)) => {
                self.last_result = None;
                return Err(Error::DetectionTransient(e.to_string()));
            }
            Err(payload) => {
                self.last_result = None;
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Landmark model panicked: {reason}");
                return Err(Error::DetectionTransient(format!("Model panicked: {reason}")));
            }
        };

        if faces.len() > self.num_faces {
            debug!("Ignoring {} extra faces", faces.len() - self.num_faces);
        }

        // Only the primary face is ever used
        self.last_result = faces.into_iter().next();
        Ok(self.last_result.clone())
    }

    /// Start a new timeline; the next frame is always processed
    pub fn reset_timeline(&mut self) {
        self.last_timestamp_ms = None;
        self.last_result = None;
        self.model.reset();
    }

    /// Number of times the model has actually been run
    #[must_use]
    pub const fn invocations(&self) -> u64 {
        self.invocations
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model.name()
    }
}

/// Loading state of the landmark model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStatus {
    NotLoaded,
    Loading,
    Ready,
    Failed(String),
}

/// Result of polling a [`ModelLoader`]
pub enum LoadPoll {
    Pending,
    Ready(LandmarkDetector),
    Failed(Error),
}

/// Background model initialization
pub struct ModelLoader {
    receiver: Receiver<Result<Box<dyn LandmarkModel>>>,
    num_faces: usize,
}

impl ModelLoader {
    /// Start building a model on a background thread
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelLoadFailed`] if the loader thread cannot be spawned.
    pub fn spawn(factory: ModelFactory, config: DetectorConfig) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let num_faces = config.num_faces;

        thread::Builder::new()
            .name("landmark-model-loader".to_string())
            .spawn(move || {
                info!("Loading landmark model from {}", config.model_path.display());
                let result = panic::catch_unwind(AssertUnwindSafe(|| factory(&config))).unwrap_or_else(|_| {
                    Err(Error::ModelLoadFailed("Model factory panicked".to_string()))
                });
                // The receiver is gone if the engine was dropped mid-load
                let _ = sender.send(result);
            })
            .map_err(|e| Error::ModelLoadFailed(format!("Failed to spawn loader thread: {e}")))?;

        Ok(Self { receiver, num_faces })
    }

    /// Check for completion without blocking
    pub fn poll(&self) -> LoadPoll {
        match self.receiver.try_recv() {
            Ok(result) => self.finish(result),
            Err(TryRecvError::Empty) => LoadPoll::Pending,
            Err(TryRecvError::Disconnected) => {
                LoadPoll::Failed(Error::ModelLoadFailed("Loader thread exited without a result".to_string()))
            }
        }
    }

    /// Block for up to `timeout` waiting for completion
    pub fn wait(&self, timeout: Duration) -> LoadPoll {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => self.finish(result),
            Err(RecvTimeoutError::Timeout) => LoadPoll::Pending,
            Err(RecvTimeoutError::Disconnected) => {
                LoadPoll::Failed(Error::ModelLoadFailed("Loader thread exited without a result".to_string()))
            }
        }
    }

    fn finish(&self, result: Result<Box<dyn LandmarkModel>>) -> LoadPoll {
        match result {
            Ok(model) => {
                info!("Landmark model '{}' ready", model.name());
                LoadPoll::Ready(LandmarkDetector::new(model, self.num_faces))
            }
            Err(Error::ModelLoadFailed(msg)) => LoadPoll::Failed(Error::ModelLoadFailed(msg)),
            Err(e) => LoadPoll::Failed(Error::ModelLoadFailed(e.to_string())),
        }
    }
}

/// Where a session's detector currently stands
#[derive(Default)]
pub enum DetectorSlot {
    #[default]
    Empty,
    Loading(ModelLoader),
    Ready(LandmarkDetector),
    Failed(String),
}

impl DetectorSlot {
    #[must_use]
    pub fn status(&self) -> ModelStatus {
        match self {
            Self::Empty => ModelStatus::NotLoaded,
            Self::Loading(_) => ModelStatus::Loading,
            Self::Ready(_) => ModelStatus::Ready,
            Self::Failed(msg) => ModelStatus::Failed(msg.clone()),
        }
    }

    /// Move a finished load into place; returns the load error if it failed
    pub fn poll(&mut self) -> Option<Error> {
        self.settle(|loader| loader.poll())
    }

    /// Block until the load finishes or `timeout` expires
    pub fn wait(&mut self, timeout: Duration) -> Option<Error> {
        self.settle(|loader| loader.wait(timeout))
    }

    fn settle(&mut self, check: impl FnOnce(&ModelLoader) -> LoadPoll) -> Option<Error> {
        let Self::Loading(loader) = self else {
            return None;
        };
        match check(loader) {
            LoadPoll::Pending => None,
            LoadPoll::Ready(detector) => {
                *self = Self::Ready(detector);
                None
            }
            LoadPoll::Failed(e) => {
                error!("{e}");
                *self = Self::Failed(e.to_string());
                Some(e)
            }
        }
    }

    #[must_use]
    pub const fn detector(&self) -> Option<&LandmarkDetector> {
        match self {
            Self::Ready(detector) => Some(detector),
            _ => None,
        }
    }

    pub fn detector_mut(&mut self) -> Option<&mut LandmarkDetector> {
        match self {
            Self::Ready(detector) => Some(detector),
            _ => None,
        }
    }
}
