//! Normalized face-mesh landmarks.
//!
//! Coordinates are relative to the camera-native (unmirrored) frame: `x` and
//! `y` lie in `[0, 1]`, `z` is relative depth in the same units as `x`.

use crate::{
    constants::{NUM_FACE_MESH_LANDMARKS, NUM_FACE_MESH_LANDMARKS_WITH_IRIS},
    Error, Result,
};
use opencv::core::Point2f;

/// One normalized landmark
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Convert to pixel space for a frame of the given size.
    ///
    /// `mirrored` flips x so the point lands on the selfie-style view.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Frame sizes fit comfortably in f32
    pub fn to_pixel(&self, width: i32, height: i32, mirrored: bool) -> Point2f {
        let x = if mirrored { 1.0 - self.x } else { self.x };
        Point2f::new(x * width as f32, self.y * height as f32)
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Landmarks for a single detected face
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarks {
    points: Vec<Landmark>,
}

impl FaceLandmarks {
    /// Build a landmark set, clamping x/y into `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The point count is not a face-mesh cardinality (468 or 478)
    /// - Any coordinate is NaN or infinite
    pub fn new(points: Vec<Landmark>) -> Result<Self> {
        if points.len() != NUM_FACE_MESH_LANDMARKS && points.len() != NUM_FACE_MESH_LANDMARKS_WITH_IRIS {
            return Err(Error::ModelValidationError(format!(
                "Expected {NUM_FACE_MESH_LANDMARKS} or {NUM_FACE_MESH_LANDMARKS_WITH_IRIS} landmarks, got {}",
                points.len()
            )));
        }
        if let Some(idx) = points.iter().position(|p| !p.is_finite()) {
            return Err(Error::ModelValidationError(format!("Landmark {idx} is not finite")));
        }

        let points = points
            .into_iter()
            .map(|p| Landmark::new(p.x.clamp(0.0, 1.0), p.y.clamp(0.0, 1.0), p.z))
            .collect();

        Ok(Self { points })
    }

    /// Build from pixel coordinates of a frame of the given size
    ///
    /// # Errors
    ///
    /// Returns an error if the frame size is not positive or [`FaceLandmarks::new`] rejects the points.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_pixels(points: &[(f32, f32, f32)], width: i32, height: i32) -> Result<Self> {
        if width <= 0 || height <= 0 {
            return Err(Error::InvalidInput(format!("Invalid frame size: {width}x{height}")));
        }
        let (w, h) = (width as f32, height as f32);
        Self::new(points.iter().map(|&(x, y, z)| Landmark::new(x / w, y / h, z / w)).collect())
    }

    /// Landmark at a face-mesh vertex index
    ///
    /// # Errors
    ///
    /// Returns an error if the index is outside the mesh.
    pub fn get(&self, index: usize) -> Result<Landmark> {
        self.points
            .get(index)
            .copied()
            .ok_or_else(|| Error::InvalidInput(format!("Landmark index {index} out of range ({})", self.points.len())))
    }

    /// Pixel positions of an ordered index loop
    ///
    /// # Errors
    ///
    /// Returns an error if any index is outside the mesh.
    pub fn pixel_loop(&self, indices: &[usize], width: i32, height: i32, mirrored: bool) -> Result<Vec<Point2f>> {
        indices
            .iter()
            .map(|&i| self.get(i).map(|p| p.to_pixel(width, height, mirrored)))
            .collect()
    }

    /// Normalized bounding box `(min_x, min_y, max_x, max_y)`
    #[must_use]
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        self.points.iter().fold((1.0, 1.0, 0.0, 0.0), |(x0, y0, x1, y1), p| {
            (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y))
        })
    }

    #[must_use]
    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
