//! Temporal filters for landmark-derived point sets.
//!
//! Lip outlines jitter by a pixel or two between frames even when the face is
//! still. These filters blend each frame's raw points with the previous output.

/// Exponential moving average over point sets
pub mod exponential;

use crate::{Error, Result};
use opencv::core::Point2f;

/// Trait for all point-set filters
pub trait PointFilter: Send {
    /// Filter one frame's points, returning the smoothed set
    fn apply(&mut self, points: &[Point2f]) -> Vec<Point2f>;

    /// Forget all history; the next frame passes through unchanged
    fn reset(&mut self);

    /// Get filter name
    fn name(&self) -> &str;
}

/// No-op filter that passes points through unchanged
pub struct NoFilter;

impl PointFilter for NoFilter {
    fn apply(&mut self, points: &[Point2f]) -> Vec<Point2f> {
        points.to_vec()
    }

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "NoFilter"
    }
}

/// Create a point filter from a spec string.
///
/// Accepted forms: `none`, `exponential`, `exponential:<alpha>`.
pub fn create_filter(spec: &str) -> Result<Box<dyn PointFilter>> {
    let spec = spec.trim().to_lowercase();
    let mut parts = spec.splitn(2, ':');
    let kind = parts.next().unwrap_or_default();
    let param = parts.next();

    match kind {
        "none" | "nofilter" => Ok(Box::new(NoFilter)),
        "exponential" | "ema" => {
            let alpha = match param {
                Some(raw) => raw
                    .parse::<f64>()
                    .map_err(|e| Error::FilterError(format!("Alpha '{raw}' is not a number: {e}")))?,
                None => crate::constants::DEFAULT_LIP_SMOOTHING,
            };
            Ok(Box::new(exponential::ExponentialFilter::try_new(alpha)?))
        }
        _ => Err(Error::FilterError(format!("Unknown filter type: {spec}"))),
    }
}
