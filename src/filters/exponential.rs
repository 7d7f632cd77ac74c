use super::PointFilter;
use crate::{Error, Result};
use opencv::core::Point2f;

/// Exponential smoothing over a fixed-length point set.
///
/// Each output point is `prev + (raw - prev) * alpha`, so the blend compounds
/// across frames. A length change between frames restarts the history.
pub struct ExponentialFilter {
    alpha: f32,
    last: Option<Vec<Point2f>>,
}

impl ExponentialFilter {
    /// Create a new exponential filter
    ///
    /// # Panics
    ///
    /// Panics if alpha is not in the range (0, 1]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Alpha is validated to (0, 1]
    pub fn new(alpha: f64) -> Self {
        assert!(alpha > 0.0 && alpha <= 1.0, "Alpha must be in (0, 1]");
        Self {
            alpha: alpha as f32,
            last: None,
        }
    }

    /// Create a new exponential filter, rejecting an out-of-range alpha
    ///
    /// # Errors
    ///
    /// Returns an error if alpha is not in the range (0, 1]
    pub fn try_new(alpha: f64) -> Result<Self> {
        if alpha > 0.0 && alpha <= 1.0 {
            Ok(Self::new(alpha))
        } else {
            Err(Error::FilterError(format!("Alpha must be in (0, 1], got {alpha}")))
        }
    }

    /// Whether a previous frame is held
    #[must_use]
    pub fn is_primed(&self) -> bool {
        self.last.is_some()
    }
}

impl PointFilter for ExponentialFilter {
    fn apply(&mut self, points: &[Point2f]) -> Vec<Point2f> {
        let filtered: Vec<Point2f> = match &self.last {
            Some(prev) if prev.len() == points.len() => prev
                .iter()
                .zip(points)
                .map(|(p, n)| {
                    Point2f::new(
                        self.alpha.mul_add(n.x - p.x, p.x),
                        self.alpha.mul_add(n.y - p.y, p.y),
                    )
                })
                .collect(),
            _ => points.to_vec(),
        };

        self.last = Some(filtered.clone());
        filtered
    }

    fn reset(&mut self) {
        self.last = None;
    }

    fn name(&self) -> &str {
        "ExponentialFilter"
    }
}
