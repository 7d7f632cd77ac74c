//! Earring anchor placement from a pair of face-mesh vertices.

use crate::{
    config::EarringConfig,
    landmarks::{FaceLandmarks, Landmark},
    Result,
};

/// Calibration for one pair of accessory anchors
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorCalibration {
    pub left_index: usize,
    pub right_index: usize,
    pub face_width_calibration: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    pub y_offset_factor: f64,
    pub left_translate: (f64, f64),
    pub right_translate: (f64, f64),
    pub mirrored: bool,
}

impl AnchorCalibration {
    #[must_use]
    pub fn from_config(config: &EarringConfig, mirrored: bool) -> Self {
        Self {
            left_index: config.left_index,
            right_index: config.right_index,
            face_width_calibration: config.face_width_calibration,
            min_scale: config.min_scale,
            max_scale: config.max_scale,
            y_offset_factor: config.y_offset_factor,
            left_translate: config.left_translate,
            right_translate: config.right_translate,
            mirrored,
        }
    }
}

impl Default for AnchorCalibration {
    fn default() -> Self {
        Self::from_config(&EarringConfig::default(), true)
    }
}

/// Placement of one overlay element for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorPlacement {
    /// Element origin, percent of frame width
    pub x_pct: f64,
    /// Element origin, percent of frame height
    pub y_pct: f64,
    /// Element translation, fractions of the element's own width/height
    pub translate: (f64, f64),
    /// Clockwise rotation in screen space
    pub rotation_deg: f64,
    /// Uniform scale
    pub scale: f64,
}

/// Both earring placements for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarPlacements {
    pub left: AnchorPlacement,
    pub right: AnchorPlacement,
    /// Normalized distance between the two anchors
    pub face_width: f64,
}

/// Normalized Euclidean distance between two landmarks
#[must_use]
pub fn anchor_distance(a: Landmark, b: Landmark) -> f64 {
    let dx = f64::from(a.x) - f64::from(b.x);
    let dy = f64::from(a.y) - f64::from(b.y);
    dx.hypot(dy)
}

/// Scale factor for an anchor distance, clamped to the calibration bounds
#[must_use]
pub fn accessory_scale(face_width: f64, calibration: &AnchorCalibration) -> f64 {
    let scale = face_width / calibration.face_width_calibration;
    if scale.is_finite() {
        scale.clamp(calibration.min_scale, calibration.max_scale)
    } else {
        calibration.min_scale
    }
}

/// Screen-space roll of the anchor pair in degrees.
///
/// Landmarks are camera-native. On a mirrored view the pair swaps sides, which
/// inverts the y component of the left-to-right vector.
#[must_use]
pub fn roll_angle_deg(left: Landmark, right: Landmark, mirrored: bool) -> f64 {
    let dx = f64::from(right.x) - f64::from(left.x);
    let dy = f64::from(right.y) - f64::from(left.y);
    let dy = if mirrored { -dy } else { dy };
    dy.atan2(dx).to_degrees()
}

/// Resolve both earring placements for a face
///
/// # Errors
///
/// Returns an error if an anchor index is outside the landmark set.
pub fn resolve_ear_anchors(landmarks: &FaceLandmarks, calibration: &AnchorCalibration) -> Result<EarPlacements> {
    let left = landmarks.get(calibration.left_index)?;
    let right = landmarks.get(calibration.right_index)?;

    let face_width = anchor_distance(left, right);
    let scale = accessory_scale(face_width, calibration);
    let rotation_deg = roll_angle_deg(left, right, calibration.mirrored);
    let lift = face_width * calibration.y_offset_factor;

    let place = |anchor: Landmark, translate: (f64, f64)| {
        let x = f64::from(anchor.x);
        let x = if calibration.mirrored { 1.0 - x } else { x };
        AnchorPlacement {
            x_pct: x * 100.0,
            y_pct: (f64::from(anchor.y) - lift) * 100.0,
            translate,
            rotation_deg,
            scale,
        }
    };

    Ok(EarPlacements {
        left: place(left, calibration.left_translate),
        right: place(right, calibration.right_translate),
        face_width,
    })
}
