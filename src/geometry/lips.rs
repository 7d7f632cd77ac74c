//! Lip-region outlines in pixel space.

use crate::{
    constants::{INNER_MOUTH, OUTER_LIPS},
    landmarks::FaceLandmarks,
    Result,
};
use opencv::core::Point2f;

/// Outer lip boundary and inner mouth opening, pixel coordinates
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LipRegion {
    pub outer: Vec<Point2f>,
    pub inner: Vec<Point2f>,
}

impl LipRegion {
    /// Unsmoothed lip loops for a frame of the given size
    ///
    /// # Errors
    ///
    /// Returns an error if a lip vertex is outside the landmark set.
    pub fn from_landmarks(landmarks: &FaceLandmarks, width: i32, height: i32, mirrored: bool) -> Result<Self> {
        Ok(Self {
            outer: landmarks.pixel_loop(&OUTER_LIPS, width, height, mirrored)?,
            inner: landmarks.pixel_loop(&INNER_MOUTH, width, height, mirrored)?,
        })
    }
}

fn midpoint(a: Point2f, b: Point2f) -> Point2f {
    Point2f::new((a.x + b.x) * 0.5, (a.y + b.y) * 0.5)
}

/// Flatten a smooth closed curve through a point loop.
///
/// The curve runs through the midpoints of consecutive points, using each
/// point as the control of a quadratic segment. Loops shorter than three points
/// produce an empty outline.
#[must_use]
#[allow(clippy::cast_precision_loss)] // Segment counts are small
pub fn smooth_closed_path(points: &[Point2f], segments: usize) -> Vec<Point2f> {
    let n = points.len();
    if n < 3 || segments == 0 {
        return Vec::new();
    }

    let mut path = Vec::with_capacity(n * segments);
    let mut start = midpoint(points[n - 1], points[0]);
    path.push(start);

    for i in 0..n {
        let control = points[i];
        let end = midpoint(control, points[(i + 1) % n]);
        for step in 1..=segments {
            let t = step as f32 / segments as f32;
            let u = 1.0 - t;
            let x = u * u * start.x + 2.0 * u * t * control.x + t * t * end.x;
            let y = u * u * start.y + 2.0 * u * t * control.y + t * t * end.y;
            path.push(Point2f::new(x, y));
        }
        start = end;
    }

    // The final segment closes back onto the first point
    path.pop();
    path
}
