//! Utility functions for region-of-interest handling and coordinate conversion.

pub mod image_conversion;
pub mod safe_cast;

use crate::landmarks::FaceLandmarks;
use opencv::core::Rect;
use safe_cast::f32_to_i32_clamp;

/// Expand a box by `shift` of its size on every side, make it square, and
/// keep it inside a `max_width`×`max_height` frame.
#[must_use]
#[allow(clippy::cast_precision_loss)] // Precision loss acceptable for box dimensions
pub fn expand_to_square(bbox: Rect, max_width: i32, max_height: i32, shift: f32) -> Rect {
    let x_shift = f32_to_i32_clamp(bbox.width as f32 * shift, 0, max_width);
    let y_shift = f32_to_i32_clamp(bbox.height as f32 * shift, 0, max_height);

    let width = bbox.width + 2 * x_shift;
    let height = bbox.height + 2 * y_shift;

    // Square around the original center, no larger than the frame allows
    let side = width.max(height).min(max_width).min(max_height).max(1);
    let center_x = bbox.x + bbox.width / 2;
    let center_y = bbox.y + bbox.height / 2;

    let x = (center_x - side / 2).clamp(0, (max_width - side).max(0));
    let y = (center_y - side / 2).clamp(0, (max_height - side).max(0));

    Rect::new(x, y, side, side)
}

/// Largest square centered in the frame
#[must_use]
pub fn centered_square(width: i32, height: i32) -> Rect {
    let side = width.min(height).max(0);
    Rect::new((width - side) / 2, (height - side) / 2, side, side)
}

/// Tracking region for the next frame, derived from this frame's landmarks.
///
/// Returns `None` when the landmarks collapse to less than a pixel.
#[must_use]
#[allow(clippy::cast_precision_loss)] // Frame sizes fit comfortably in f32
pub fn landmark_roi(landmarks: &FaceLandmarks, width: i32, height: i32, expansion: f32) -> Option<Rect> {
    let (min_x, min_y, max_x, max_y) = landmarks.bounds();
    let (w, h) = (width as f32, height as f32);

    let x0 = f32_to_i32_clamp(min_x * w, 0, width);
    let y0 = f32_to_i32_clamp(min_y * h, 0, height);
    let x1 = f32_to_i32_clamp(max_x * w, 0, width);
    let y1 = f32_to_i32_clamp(max_y * h, 0, height);

    if x1 - x0 < 1 || y1 - y0 < 1 {
        return None;
    }

    Some(expand_to_square(Rect::new(x0, y0, x1 - x0, y1 - y0), width, height, expansion))
}
