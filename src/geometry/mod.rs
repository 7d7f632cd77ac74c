//! Geometry resolution: landmarks in, overlay placements out.
//!
//! Two derivations share one landmark set. Earring anchors are stateless and
//! deterministic. Lip outlines are smoothed over time, so the resolver keeps
//! per-session filter state that must be reset between sessions and after any
//! frame without a face.

/// Earring anchor placement
pub mod anchors;

/// Lip outlines and curve flattening
pub mod lips;

pub use anchors::{resolve_ear_anchors, AnchorCalibration, AnchorPlacement, EarPlacements};
pub use lips::{smooth_closed_path, LipRegion};

use crate::{
    config::Config,
    filters::{exponential::ExponentialFilter, PointFilter},
    landmarks::FaceLandmarks,
    Error, Result,
};
use log::trace;

/// Everything the compositor needs for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameGeometry {
    /// Earring placements, when earrings are enabled
    pub earrings: Option<EarPlacements>,
    /// Smoothed lip outlines in pixels, when lipstick is enabled
    pub lips: Option<LipRegion>,
    /// Frame size the pixel coordinates refer to
    pub frame_size: (i32, i32),
}

/// Per-session geometry state
pub struct GeometryResolver {
    calibration: AnchorCalibration,
    earrings_enabled: bool,
    lips_enabled: bool,
    mirrored: bool,
    outer_filter: Box<dyn PointFilter>,
    inner_filter: Box<dyn PointFilter>,
    frame_size: Option<(i32, i32)>,
    primed: bool,
}

impl GeometryResolver {
    /// Create a resolver with fresh smoothing state
    ///
    /// # Errors
    ///
    /// Returns an error if the lip smoothing factor is outside (0, 1].
    pub fn new(config: &Config) -> Result<Self> {
        let smoothing = config.lipstick.smoothing;
        Ok(Self::with_filters(
            config,
            Box::new(ExponentialFilter::try_new(smoothing)?),
            Box::new(ExponentialFilter::try_new(smoothing)?),
        ))
    }

    /// Create a resolver with custom lip filters
    #[must_use]
    pub fn with_filters(config: &Config, outer_filter: Box<dyn PointFilter>, inner_filter: Box<dyn PointFilter>) -> Self {
        Self {
            calibration: AnchorCalibration::from_config(&config.earrings, config.display.mirrored),
            earrings_enabled: config.earrings.enabled,
            lips_enabled: config.lipstick.enabled,
            mirrored: config.display.mirrored,
            outer_filter,
            inner_filter,
            frame_size: None,
            primed: false,
        }
    }

    /// Resolve overlay geometry for a detected face
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The frame size is not positive
    /// - A configured vertex index is outside the landmark set
    pub fn resolve(&mut self, landmarks: &FaceLandmarks, width: i32, height: i32) -> Result<FrameGeometry> {
        if width <= 0 || height <= 0 {
            return Err(Error::InvalidInput(format!("Invalid frame size: {width}x{height}")));
        }

        // Pixel-space history is meaningless once the resolution changes
        if self.frame_size.is_some_and(|size| size != (width, height)) {
            trace!("Frame size changed to {width}x{height}, resetting lip smoothing");
            self.reset();
        }
        self.frame_size = Some((width, height));

        let earrings = if self.earrings_enabled {
            Some(resolve_ear_anchors(landmarks, &self.calibration)?)
        } else {
            None
        };

        let lips = if self.lips_enabled {
            let raw = LipRegion::from_landmarks(landmarks, width, height, self.mirrored)?;
            let smoothed = LipRegion {
                outer: self.outer_filter.apply(&raw.outer),
                inner: self.inner_filter.apply(&raw.inner),
            };
            self.primed = true;
            Some(smoothed)
        } else {
            None
        };

        Ok(FrameGeometry {
            earrings,
            lips,
            frame_size: (width, height),
        })
    }

    /// Drop all smoothing history
    pub fn reset(&mut self) {
        self.outer_filter.reset();
        self.inner_filter.reset();
        self.frame_size = None;
        self.primed = false;
    }

    /// Whether smoothing history from a previous frame is held
    #[must_use]
    pub fn is_primed(&self) -> bool {
        self.primed
    }

    #[must_use]
    pub fn calibration(&self) -> &AnchorCalibration {
        &self.calibration
    }
}
