//! Error types for the virtual try-on engine.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// `OpenCV` operation failed
    #[error("OpenCV error: {0}")]
    OpenCV(#[from] opencv::Error),

    /// `ONNX` Runtime inference failed
    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(#[from] ort::OrtError),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding failed
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// The user or the platform refused camera access
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    /// No usable camera could be opened
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// Video playback could not be started on the acquired stream
    #[error("Playback start failed: {0}")]
    PlaybackStartFailed(String),

    /// The landmark model could not be created
    #[error("Landmark model failed to load: {0}")]
    ModelLoadFailed(String),

    /// A single detection call failed; the next frame may succeed
    #[error("Detection failed for this frame: {0}")]
    DetectionTransient(String),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model input configuration error
    #[error("Model input error: {0}")]
    ModelInputError(String),

    /// Model output processing error
    #[error("Model output error: {0}")]
    ModelOutputError(String),

    /// Model data shape or format error
    #[error("Model data format error: {0}")]
    ModelDataFormatError(String),

    /// Model validation error (wrong number of points, etc.)
    #[error("Model validation error: {0}")]
    ModelValidationError(String),

    /// Accessory asset could not be resolved or decoded
    #[error("Asset error: {0}")]
    AssetError(String),

    /// Point filter initialization error
    #[error("Filter error: {0}")]
    FilterError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic I/O error with description
    #[error("I/O error: {0}")]
    IoError(String),
}

impl Error {
    /// Whether the error ends the try-on session it occurred in.
    ///
    /// Camera failures are terminal: the user has to close and reopen the
    /// overlay to retry. Everything else degrades the session instead.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::PermissionDenied(_) | Self::DeviceUnavailable(_))
    }
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
