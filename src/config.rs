//! Configuration management for the try-on engine

use crate::{constants::*, Error, Result};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
};

/// Engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera acquisition
    pub camera: CameraConfig,

    /// Landmark model
    pub detector: DetectorConfig,

    /// Earring anchor calibration
    pub earrings: EarringConfig,

    /// Lipstick compositing
    pub lipstick: LipstickConfig,

    /// Output layers
    pub display: DisplayConfig,
}

/// Camera acquisition parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Camera index (the front-facing camera on most laptops is 0)
    pub index: i32,

    /// Play a video file instead of opening a camera
    pub video_file: Option<PathBuf>,

    /// Preferred capture width; not a hard requirement
    pub preferred_width: i32,

    /// Preferred capture height; not a hard requirement
    pub preferred_height: i32,
}

/// What happens to the landmark model when a session closes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelLifetime {
    /// Keep the model loaded for the engine lifetime
    #[default]
    Retain,
    /// Drop the model on close and load it again on the next open
    PerSession,
}

/// Landmark model parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Path to the face-mesh ONNX model
    pub model_path: PathBuf,

    /// Distribution endpoint the model is provisioned from
    pub model_url: String,

    /// SCRFD face detector that finds the face when none is tracked
    pub face_detector_path: PathBuf,

    /// Minimum face detector score (0.0-1.0)
    pub detection_confidence: f32,

    /// Face detector non-maximum suppression overlap (0.0-1.0)
    pub nms_threshold: f32,

    /// Faces to track; only the primary face is ever used
    pub num_faces: usize,

    /// Minimum face presence score (0.0-1.0)
    pub min_face_presence: f32,

    /// Growth of the tracking region around the previous landmarks
    pub roi_expansion: f32,

    /// Model resource lifetime policy
    pub lifetime: ModelLifetime,
}

/// Earring anchor calibration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EarringConfig {
    /// Show earrings at all
    pub enabled: bool,

    /// Face-mesh vertex anchoring the left earring
    pub left_index: usize,

    /// Face-mesh vertex anchoring the right earring
    pub right_index: usize,

    /// Anchor distance (normalized) that maps to scale 1.0
    pub face_width_calibration: f64,

    /// Lower scale clamp
    pub min_scale: f64,

    /// Upper scale clamp
    pub max_scale: f64,

    /// Vertical lift as a fraction of the anchor distance
    pub y_offset_factor: f64,

    /// Left element translation (fractions of element width/height)
    pub left_translate: (f64, f64),

    /// Right element translation (fractions of element width/height)
    pub right_translate: (f64, f64),

    /// Element width at scale 1.0, as a fraction of the frame width
    pub width_fraction: f64,
}

/// Lipstick compositing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LipstickConfig {
    /// Paint the lips at all
    pub enabled: bool,

    /// Shade as `#rrggbb`
    pub color: HexColor,

    /// Paint alpha (0.0-1.0)
    pub intensity: f64,

    /// Blend factor of the new measurement (0.0-1.0]
    pub smoothing: f64,

    /// Gaussian sigma for mask feathering, pixels
    pub feather_sigma: f64,

    /// Segments per quadratic lip curve
    pub curve_segments: usize,

    /// Opacity of the lip layer over the video
    pub layer_opacity: f64,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Show the video selfie-style
    pub mirrored: bool,

    /// Refresh pacing of the render loop
    pub target_fps: u32,

    /// Draw every landmark on a debug layer
    pub show_landmarks: bool,

    /// Window title used by the demo binary
    pub window_title: String,
}

/// An RGB color parsed from `#rrggbb`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl HexColor {
    /// Parse `#rrggbb` (the leading `#` is optional)
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not six hex digits.
    pub fn parse(value: &str) -> Result<Self> {
        let hex = value.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::ConfigError(format!("Invalid color '{value}', expected #rrggbb")));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| Error::ConfigError(format!("Invalid color '{value}': {e}")))
        };
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl TryFrom<String> for HexColor {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<HexColor> for String {
    fn from(color: HexColor) -> Self {
        color.to_string()
    }
}

impl Default for HexColor {
    fn default() -> Self {
        let (r, g, b) = DEFAULT_LIPSTICK_RGB;
        Self { r, g, b }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            video_file: None,
            preferred_width: PREFERRED_CAPTURE_WIDTH,
            preferred_height: PREFERRED_CAPTURE_HEIGHT,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("assets/face_landmark.onnx"),
            model_url: FACE_LANDMARKER_MODEL_URL.to_string(),
            face_detector_path: PathBuf::from("assets/face_detector.onnx"),
            detection_confidence: DEFAULT_DETECTION_CONFIDENCE,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
            num_faces: 1,
            min_face_presence: DEFAULT_MIN_FACE_PRESENCE,
            roi_expansion: DEFAULT_ROI_EXPANSION,
            lifetime: ModelLifetime::Retain,
        }
    }
}

impl Default for EarringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            left_index: LEFT_EAR_ANCHOR,
            right_index: RIGHT_EAR_ANCHOR,
            face_width_calibration: DEFAULT_FACE_WIDTH_CALIBRATION,
            min_scale: MIN_ACCESSORY_SCALE,
            max_scale: MAX_ACCESSORY_SCALE,
            y_offset_factor: EAR_Y_OFFSET_FACTOR,
            left_translate: LEFT_EAR_TRANSLATE,
            right_translate: RIGHT_EAR_TRANSLATE,
            width_fraction: DEFAULT_ACCESSORY_WIDTH_FRACTION,
        }
    }
}

impl Default for LipstickConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            color: HexColor::default(),
            intensity: DEFAULT_LIPSTICK_INTENSITY,
            smoothing: DEFAULT_LIP_SMOOTHING,
            feather_sigma: DEFAULT_FEATHER_SIGMA,
            curve_segments: DEFAULT_CURVE_SEGMENTS,
            layer_opacity: DEFAULT_LIP_LAYER_OPACITY,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            mirrored: true,
            target_fps: DEFAULT_TARGET_FPS,
            show_landmarks: false,
            window_title: "Virtual Try-On".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::IoError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| Error::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    ///
    /// Model and asset paths are not checked here: a missing model only
    /// degrades a session to passthrough.
    pub fn validate(&self) -> Result<()> {
        if self.camera.preferred_width <= 0 || self.camera.preferred_height <= 0 {
            return Err(Error::ConfigError("Preferred capture size must be positive".to_string()));
        }

        if self.detector.num_faces == 0 {
            return Err(Error::ConfigError("Detector must track at least one face".to_string()));
        }
        if !(0.0..=1.0).contains(&self.detector.min_face_presence) {
            return Err(Error::ConfigError(
                "Minimum face presence must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.detector.detection_confidence) {
            return Err(Error::ConfigError(
                "Detection confidence must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.detector.nms_threshold) {
            return Err(Error::ConfigError("NMS threshold must be between 0.0 and 1.0".to_string()));
        }
        if !(0.0..=2.0).contains(&self.detector.roi_expansion) {
            return Err(Error::ConfigError("ROI expansion must be between 0.0 and 2.0".to_string()));
        }

        let ears = &self.earrings;
        if ears.left_index >= NUM_FACE_MESH_LANDMARKS || ears.right_index >= NUM_FACE_MESH_LANDMARKS {
            return Err(Error::ConfigError(format!(
                "Earring anchors must be face-mesh vertices below {NUM_FACE_MESH_LANDMARKS}"
            )));
        }
        if ears.left_index == ears.right_index {
            return Err(Error::ConfigError("Earring anchors must be distinct vertices".to_string()));
        }
        if ears.face_width_calibration <= 0.0 {
            return Err(Error::ConfigError("Face width calibration must be positive".to_string()));
        }
        if ears.min_scale <= 0.0 || ears.min_scale > ears.max_scale {
            return Err(Error::ConfigError(
                "Scale bounds must satisfy 0 < min_scale <= max_scale".to_string(),
            ));
        }
        if ears.width_fraction <= 0.0 || ears.width_fraction > 1.0 {
            return Err(Error::ConfigError("Earring width fraction must be in (0, 1]".to_string()));
        }

        let lips = &self.lipstick;
        if !(0.0..=1.0).contains(&lips.intensity) {
            return Err(Error::ConfigError("Lipstick intensity must be between 0.0 and 1.0".to_string()));
        }
        if lips.smoothing <= 0.0 || lips.smoothing > 1.0 {
            return Err(Error::ConfigError("Lip smoothing must be in (0, 1]".to_string()));
        }
        if lips.feather_sigma < 0.0 {
            return Err(Error::ConfigError("Feather sigma must not be negative".to_string()));
        }
        if lips.curve_segments == 0 {
            return Err(Error::ConfigError("Curve segments must be greater than 0".to_string()));
        }
        if !(0.0..=1.0).contains(&lips.layer_opacity) {
            return Err(Error::ConfigError("Lip layer opacity must be between 0.0 and 1.0".to_string()));
        }

        if self.display.target_fps == 0 {
            return Err(Error::ConfigError("Target FPS must be greater than 0".to_string()));
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r##"# Virtual Try-On Configuration

camera:
  index: 0
  preferred_width: 1280
  preferred_height: 720

detector:
  model_path: "assets/face_landmark.onnx"
  face_detector_path: "assets/face_detector.onnx"
  detection_confidence: 0.5
  nms_threshold: 0.4
  num_faces: 1
  min_face_presence: 0.5
  roi_expansion: 0.25
  lifetime: retain

earrings:
  enabled: true
  left_index: 177
  right_index: 361
  face_width_calibration: 0.35
  min_scale: 0.1
  max_scale: 2.5
  y_offset_factor: 0.03
  left_translate: [-0.35, 0.01]
  right_translate: [-0.6, 0.01]
  width_fraction: 0.08

lipstick:
  enabled: true
  color: "#c2185b"
  intensity: 0.45
  smoothing: 0.35
  feather_sigma: 2.0
  curve_segments: 8
  layer_opacity: 0.9

display:
  mirrored: true
  target_fps: 60
  show_landmarks: false
  window_title: "Virtual Try-On"
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = serde_yaml::from_str(EXAMPLE_CONFIG).unwrap();
        config.validate().unwrap();
        assert_eq!(config.lipstick.color, HexColor::parse("#c2185b").unwrap());
        assert_eq!(config.detector.lifetime, ModelLifetime::Retain);
        assert_eq!(config.earrings.right_translate, (-0.6, 0.01));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("lipstick:\n  intensity: 0.7\n").unwrap();
        assert_eq!(config.lipstick.intensity, 0.7);
        assert_eq!(config.lipstick.smoothing, DEFAULT_LIP_SMOOTHING);
        assert_eq!(config.camera.preferred_width, PREFERRED_CAPTURE_WIDTH);
    }

    #[test]
    fn test_hex_color_parsing() {
        assert_eq!(HexColor::parse("#d81b60").unwrap(), HexColor { r: 0xd8, g: 0x1b, b: 0x60 });
        assert_eq!(HexColor::parse("FFFFFF").unwrap(), HexColor { r: 255, g: 255, b: 255 });
        assert!(HexColor::parse("#fff").is_err());
        assert!(HexColor::parse("#gg0000").is_err());
        assert_eq!(HexColor::default().to_string(), "#c2185b");
        let (r, g, b) = DEFAULT_LIPSTICK_RGB;
        assert_eq!(HexColor::default(), HexColor { r, g, b });
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.lipstick.smoothing = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.earrings.min_scale = 3.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.earrings.right_index = config.earrings.left_index;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.display.target_fps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_color_in_yaml() {
        let result: std::result::Result<Config, _> = serde_yaml::from_str("lipstick:\n  color: \"pink\"\n");
        assert!(result.is_err());
    }
}
