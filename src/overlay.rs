//! Overlay targets the render loop drives each frame.

use crate::{
    compositor::{LandmarkCanvas, LipCanvas},
    config::{Config, LipstickConfig},
    geometry::{AnchorPlacement, FrameGeometry},
    landmarks::FaceLandmarks,
    Result,
};
use log::warn;

/// A positioned overlay element
pub trait AnchorHandle {
    /// Place and show the element
    fn apply(&mut self, placement: &AnchorPlacement);

    /// Hide the element
    fn hide(&mut self);

    fn is_visible(&self) -> bool;
}

/// One accessory sprite (an earring)
#[derive(Debug, Clone, Default)]
pub struct AccessorySprite {
    placement: Option<AnchorPlacement>,
    detached: bool,
}

impl AccessorySprite {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the sprite is shown, if visible
    #[must_use]
    pub const fn placement(&self) -> Option<AnchorPlacement> {
        self.placement
    }

    /// Tear down the sprite; later updates are ignored
    pub fn detach(&mut self) {
        self.placement = None;
        self.detached = true;
    }
}

impl AnchorHandle for AccessorySprite {
    fn apply(&mut self, placement: &AnchorPlacement) {
        if !self.detached {
            self.placement = Some(*placement);
        }
    }

    fn hide(&mut self) {
        self.placement = None;
    }

    fn is_visible(&self) -> bool {
        self.placement.is_some()
    }
}

/// All overlay layers of one session
pub struct OverlayScene {
    pub left_ear: AccessorySprite,
    pub right_ear: AccessorySprite,
    pub lips: LipCanvas,
    pub landmarks: Option<LandmarkCanvas>,
    lipstick: LipstickConfig,
    mirrored: bool,
}

impl OverlayScene {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            left_ear: AccessorySprite::new(),
            right_ear: AccessorySprite::new(),
            lips: LipCanvas::new(),
            landmarks: config.display.show_landmarks.then(LandmarkCanvas::new),
            lipstick: config.lipstick.clone(),
            mirrored: config.display.mirrored,
        }
    }

    /// Show the layers for a detected face
    ///
    /// # Errors
    ///
    /// Returns an error if the lip layer cannot be painted. Sprites are
    /// already placed when that happens.
    pub fn apply(&mut self, geometry: &FrameGeometry, landmarks: &FaceLandmarks) -> Result<()> {
        match &geometry.earrings {
            Some(ears) => {
                self.left_ear.apply(&ears.left);
                self.right_ear.apply(&ears.right);
            }
            None => {
                self.left_ear.hide();
                self.right_ear.hide();
            }
        }

        let (width, height) = geometry.frame_size;
        if let Some(canvas) = &mut self.landmarks {
            canvas.update(landmarks, width, height, self.mirrored);
        }

        match &geometry.lips {
            Some(region) => self.lips.paint(region, width, height, &self.lipstick),
            None => self.lips.clear(),
        }
    }

    /// Hide every layer. Never fails: a lip layer that cannot be cleared is
    /// dropped instead.
    pub fn hide_all(&mut self) {
        self.left_ear.hide();
        self.right_ear.hide();
        if let Some(canvas) = &mut self.landmarks {
            canvas.clear();
        }
        if let Err(e) = self.lips.clear() {
            warn!("Failed to clear lip layer: {e}");
            self.lips.clear_or_drop();
        }
    }

    /// Hide everything and ignore later sprite updates
    pub fn detach(&mut self) {
        self.hide_all();
        self.left_ear.detach();
        self.right_ear.detach();
    }

    /// Whether no layer would draw anything
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        !self.left_ear.is_visible()
            && !self.right_ear.is_visible()
            && self.lips.is_clear()
            && self.landmarks.as_ref().map_or(true, LandmarkCanvas::is_clear)
    }
}
