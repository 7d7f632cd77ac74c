//! Per-frame compositing: the lip paint layer and the final output image.
//!
//! The lip layer is a BGRA image the size of the video, rebuilt from scratch
//! every frame. It is blended over the mirrored video with a multiply blend,
//! and accessory sprites are warped on top.

use crate::{
    asset::AccessoryAsset,
    config::{HexColor, LipstickConfig},
    constants::LANDMARK_DOT_RADIUS,
    geometry::{smooth_closed_path, AnchorPlacement, LipRegion},
    landmarks::FaceLandmarks,
    overlay::OverlayScene,
    utils::safe_cast::{f32_to_i32_clamp, f64_to_u8_clamp},
    Error, Result,
};
use log::trace;
use opencv::{
    core::{self, Mat, Point, Point2f, Rect, Scalar, Size, Vec3b, Vec4b, Vector, BORDER_CONSTANT, BORDER_DEFAULT, CV_64F, CV_8U, CV_8UC1, CV_8UC4},
    imgproc::{self, LINE_8, LINE_AA},
    prelude::*,
};

fn to_polygon(points: &[Point2f], width: i32, height: i32) -> Vector<Point> {
    points
        .iter()
        .map(|p| Point::new(f32_to_i32_clamp(p.x.round(), 0, width), f32_to_i32_clamp(p.y.round(), 0, height)))
        .collect()
}

/// Feathered lipstick layer
pub struct LipCanvas {
    layer: Mat,
    region: Option<LipRegion>,
}

impl Default for LipCanvas {
    fn default() -> Self {
        Self::new()
    }
}

impl LipCanvas {
    #[must_use]
    pub fn new() -> Self {
        Self {
            layer: Mat::default(),
            region: None,
        }
    }

    /// Lip outline the layer was last painted from; `None` while clear
    #[must_use]
    pub const fn region(&self) -> Option<&LipRegion> {
        self.region.as_ref()
    }

    /// Current layer size as `(width, height)`
    #[must_use]
    pub fn size(&self) -> (i32, i32) {
        (self.layer.cols(), self.layer.rows())
    }

    /// The BGRA layer
    #[must_use]
    pub fn layer(&self) -> &Mat {
        &self.layer
    }

    /// Repaint the layer for one frame.
    ///
    /// The outer lip path is filled, the inner mouth path is cut back out, the
    /// mask is feathered, and the color is applied at `intensity` alpha.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame size is not positive or an `OpenCV`
    /// operation fails.
    pub fn paint(&mut self, region: &LipRegion, width: i32, height: i32, style: &LipstickConfig) -> Result<()> {
        if width <= 0 || height <= 0 {
            return Err(Error::InvalidInput(format!("Invalid frame size: {width}x{height}")));
        }

        let outer = smooth_closed_path(&region.outer, style.curve_segments);
        if outer.len() < 3 {
            return self.clear();
        }
        let inner = smooth_closed_path(&region.inner, style.curve_segments);

        let mut mask = Mat::new_rows_cols_with_default(height, width, CV_8UC1, Scalar::all(0.0))?;
        let mut outer_poly = Vector::<Vector<Point>>::new();
        outer_poly.push(to_polygon(&outer, width, height));
        imgproc::fill_poly(&mut mask, &outer_poly, Scalar::all(255.0), LINE_AA, 0, Point::default())?;

        if inner.len() >= 3 {
            let mut inner_poly = Vector::<Vector<Point>>::new();
            inner_poly.push(to_polygon(&inner, width, height));
            imgproc::fill_poly(&mut mask, &inner_poly, Scalar::all(0.0), LINE_AA, 0, Point::default())?;
        }

        let mask = if style.feather_sigma > 0.0 {
            let mut blurred = Mat::default();
            imgproc::gaussian_blur(
                &mask,
                &mut blurred,
                Size::new(0, 0),
                style.feather_sigma,
                style.feather_sigma,
                BORDER_DEFAULT,
            )?;
            blurred
        } else {
            mask
        };

        let mut alpha = Mat::default();
        mask.convert_to(&mut alpha, CV_8U, style.intensity, 0.0)?;

        let HexColor { r, g, b } = style.color;
        let mut channels = Vector::<Mat>::new();
        for value in [b, g, r] {
            channels.push(Mat::new_rows_cols_with_default(height, width, CV_8UC1, Scalar::all(f64::from(value)))?);
        }
        channels.push(alpha);

        let mut layer = Mat::default();
        core::merge(&channels, &mut layer)?;
        self.layer = layer;
        self.region = Some(region.clone());
        trace!("Lip layer repainted, {} pixels covered", self.coverage()?);
        Ok(())
    }

    /// Make the layer fully transparent, keeping its size
    ///
    /// # Errors
    ///
    /// Returns an error if the layer cannot be reset.
    pub fn clear(&mut self) -> Result<()> {
        self.region = None;
        if !self.layer.empty() {
            self.layer.set_to(&Scalar::all(0.0), &core::no_array())?;
        }
        Ok(())
    }

    /// Clear the layer, falling back to dropping it if clearing fails
    pub fn clear_or_drop(&mut self) {
        if self.clear().is_err() {
            self.layer = Mat::default();
            self.region = None;
        }
    }

    /// Number of pixels with any paint on them
    ///
    /// # Errors
    ///
    /// Returns an error if the alpha channel cannot be read.
    pub fn coverage(&self) -> Result<usize> {
        if self.layer.empty() {
            return Ok(0);
        }
        let mut alpha = Mat::default();
        core::extract_channel(&self.layer, &mut alpha, 3)?;
        Ok(usize::try_from(core::count_non_zero(&alpha)?).unwrap_or_default())
    }

    /// Whether nothing would be painted over the video
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.coverage().map_or(true, |covered| covered == 0)
    }
}

/// Debug layer with one dot per landmark
#[derive(Debug, Default)]
pub struct LandmarkCanvas {
    points: Vec<Point2f>,
}

impl LandmarkCanvas {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, landmarks: &FaceLandmarks, width: i32, height: i32, mirrored: bool) {
        self.points = landmarks
            .points()
            .iter()
            .map(|p| p.to_pixel(width, height, mirrored))
            .collect();
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.points.is_empty()
    }

    /// Draw the dots onto an output frame
    ///
    /// # Errors
    ///
    /// Returns an error if drawing fails.
    pub fn draw_onto(&self, frame: &mut Mat) -> Result<()> {
        let (width, height) = (frame.cols(), frame.rows());
        for p in &self.points {
            let center = Point::new(f32_to_i32_clamp(p.x, 0, width), f32_to_i32_clamp(p.y, 0, height));
            imgproc::circle(frame, center, LANDMARK_DOT_RADIUS, Scalar::new(0.0, 255.0, 0.0, 0.0), -1, LINE_8, 0)?;
        }
        Ok(())
    }
}

/// 2×3 affine transform placing a sprite on the frame.
///
/// The sprite's top-left corner lands at the placement's percentage position,
/// then it is translated by a fraction of its own size, rotated and scaled
/// about its center.
#[must_use]
pub fn sprite_transform(
    placement: &AnchorPlacement,
    sprite_size: (i32, i32),
    frame_size: (i32, i32),
    width_fraction: f64,
) -> [[f64; 3]; 2] {
    let (sprite_w, sprite_h) = (f64::from(sprite_size.0.max(1)), f64::from(sprite_size.1.max(1)));
    let (frame_w, frame_h) = (f64::from(frame_size.0), f64::from(frame_size.1));

    let element_w = frame_w * width_fraction;
    let element_h = element_w * sprite_h / sprite_w;
    let fit = element_w / sprite_w;

    let (sin, cos) = placement.rotation_deg.to_radians().sin_cos();
    let s = placement.scale;

    let center = (element_w / 2.0, element_h / 2.0);
    let origin = (
        placement.x_pct / 100.0 * frame_w + placement.translate.0 * element_w + center.0,
        placement.y_pct / 100.0 * frame_h + placement.translate.1 * element_h + center.1,
    );

    let (a, b) = (cos * s, -sin * s);
    let (c, d) = (sin * s, cos * s);

    [
        [a * fit, b * fit, origin.0 - (a * center.0 + b * center.1)],
        [c * fit, d * fit, origin.1 - (c * center.0 + d * center.1)],
    ]
}

/// Builds the output frame from the video and the overlay scene
#[derive(Debug, Clone)]
pub struct FrameCompositor {
    mirrored: bool,
    layer_opacity: f64,
    sprite_width_fraction: f64,
}

impl FrameCompositor {
    #[must_use]
    pub const fn new(mirrored: bool, layer_opacity: f64, sprite_width_fraction: f64) -> Self {
        Self {
            mirrored,
            layer_opacity,
            sprite_width_fraction,
        }
    }

    /// Compose one output frame
    ///
    /// # Errors
    ///
    /// Returns an error if an `OpenCV` operation fails.
    pub fn compose(&self, frame: &Mat, scene: &OverlayScene, asset: Option<&AccessoryAsset>) -> Result<Mat> {
        let mut output = Mat::default();
        if self.mirrored {
            core::flip(frame, &mut output, 1)?;
        } else {
            frame.copy_to(&mut output)?;
        }
        let frame_size = (output.cols(), output.rows());

        if scene.lips.size() == frame_size && !scene.lips.is_clear() {
            multiply_blend(&mut output, scene.lips.layer(), self.layer_opacity)?;
        }

        if let Some(asset) = asset {
            for sprite in [&scene.left_ear, &scene.right_ear] {
                if let Some(placement) = sprite.placement() {
                    let transform =
                        sprite_transform(&placement, asset.size(), frame_size, self.sprite_width_fraction);
                    draw_sprite(&mut output, asset.image(), &transform)?;
                }
            }
        }

        if let Some(landmarks) = &scene.landmarks {
            landmarks.draw_onto(&mut output)?;
        }

        Ok(output)
    }
}

/// Region of a single-channel image with non-zero pixels
fn painted_rect(alpha: &Mat) -> Result<Option<Rect>> {
    if core::count_non_zero(alpha)? == 0 {
        return Ok(None);
    }
    Ok(Some(imgproc::bounding_rect(alpha)?))
}

/// Multiply-blend a BGRA layer onto a BGR frame of the same size
///
/// # Errors
///
/// Returns an error if the sizes differ or pixel access fails.
pub fn multiply_blend(frame: &mut Mat, layer: &Mat, opacity: f64) -> Result<()> {
    if frame.size()? != layer.size()? || layer.typ() != CV_8UC4 {
        return Err(Error::InvalidInput("Lip layer does not match the frame".to_string()));
    }

    let mut alpha = Mat::default();
    core::extract_channel(layer, &mut alpha, 3)?;
    let Some(rect) = painted_rect(&alpha)? else {
        return Ok(());
    };

    for row in rect.y..rect.y + rect.height {
        for col in rect.x..rect.x + rect.width {
            let paint = *layer.at_2d::<Vec4b>(row, col)?;
            if paint[3] == 0 {
                continue;
            }
            let a = f64::from(paint[3]) / 255.0 * opacity;
            let pixel = frame.at_2d_mut::<Vec3b>(row, col)?;
            for ch in 0..3 {
                let base = f64::from(pixel[ch]);
                let multiplied = base * f64::from(paint[ch]) / 255.0;
                pixel[ch] = f64_to_u8_clamp(base + (multiplied - base) * a);
            }
        }
    }

    Ok(())
}

/// Warp a BGRA sprite onto a BGR frame with alpha-over blending
///
/// # Errors
///
/// Returns an error if the warp or pixel access fails.
pub fn draw_sprite(frame: &mut Mat, sprite: &Mat, transform: &[[f64; 3]; 2]) -> Result<()> {
    let mut matrix = Mat::new_rows_cols_with_default(2, 3, CV_64F, Scalar::all(0.0))?;
    for (row, values) in (0..).zip(transform) {
        for (col, &value) in (0..).zip(values) {
            *matrix.at_2d_mut::<f64>(row, col)? = value;
        }
    }

    let mut warped = Mat::default();
    imgproc::warp_affine(
        sprite,
        &mut warped,
        &matrix,
        Size::new(frame.cols(), frame.rows()),
        imgproc::INTER_LINEAR,
        BORDER_CONSTANT,
        Scalar::all(0.0),
    )?;

    let mut alpha = Mat::default();
    core::extract_channel(&warped, &mut alpha, 3)?;
    let Some(rect) = painted_rect(&alpha)? else {
        return Ok(());
    };

    for row in rect.y..rect.y + rect.height {
        for col in rect.x..rect.x + rect.width {
            let src = *warped.at_2d::<Vec4b>(row, col)?;
            if src[3] == 0 {
                continue;
            }
            let a = f64::from(src[3]) / 255.0;
            let pixel = frame.at_2d_mut::<Vec3b>(row, col)?;
            for ch in 0..3 {
                let base = f64::from(pixel[ch]);
                pixel[ch] = f64_to_u8_clamp(base + (f64::from(src[ch]) - base) * a);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::CV_8UC3;

    fn lip_region() -> LipRegion {
        let ring = |radius: f32| {
            (0..20)
                .map(|i| {
                    #[allow(clippy::cast_precision_loss)]
                    let t = i as f32 / 20.0 * std::f32::consts::TAU;
                    Point2f::new(100.0 + radius * 2.0 * t.cos(), 80.0 + radius * t.sin())
                })
                .collect()
        };
        LipRegion {
            outer: ring(20.0),
            inner: ring(8.0),
        }
    }

    #[test]
    fn test_paint_fills_ring_and_cuts_mouth() {
        let mut canvas = LipCanvas::new();
        canvas.paint(&lip_region(), 200, 160, &LipstickConfig::default()).unwrap();
        assert_eq!(canvas.size(), (200, 160));
        assert!(!canvas.is_clear());

        let alpha_at = |x, y| canvas.layer().at_2d::<Vec4b>(y, x).unwrap()[3];
        // Lip band is painted near the configured intensity
        assert!(alpha_at(100, 66) > 80);
        // Mouth opening and far background stay clear
        assert_eq!(alpha_at(100, 80), 0);
        assert_eq!(alpha_at(5, 5), 0);
    }

    #[test]
    fn test_clear_keeps_size() {
        let mut canvas = LipCanvas::new();
        canvas.paint(&lip_region(), 200, 160, &LipstickConfig::default()).unwrap();
        canvas.clear().unwrap();
        assert!(canvas.is_clear());
        assert_eq!(canvas.size(), (200, 160));
    }

    #[test]
    fn test_degenerate_region_clears() {
        let mut canvas = LipCanvas::new();
        canvas.paint(&lip_region(), 200, 160, &LipstickConfig::default()).unwrap();
        canvas.paint(&LipRegion::default(), 200, 160, &LipstickConfig::default()).unwrap();
        assert!(canvas.is_clear());
    }

    #[test]
    fn test_multiply_blend_darkens() {
        let mut frame = Mat::new_rows_cols_with_default(4, 4, CV_8UC3, Scalar::all(200.0)).unwrap();
        let layer = Mat::new_rows_cols_with_default(4, 4, CV_8UC4, Scalar::new(0.0, 0.0, 255.0, 255.0)).unwrap();
        multiply_blend(&mut frame, &layer, 1.0).unwrap();
        let pixel = *frame.at_2d::<Vec3b>(1, 1).unwrap();
        assert_eq!(pixel, Vec3b::from([0, 0, 200]));
    }

    #[test]
    fn test_sprite_transform_identity() {
        let placement = AnchorPlacement {
            x_pct: 10.0,
            y_pct: 20.0,
            translate: (0.0, 0.0),
            rotation_deg: 0.0,
            scale: 1.0,
        };
        // Sprite maps 1:1 when the element is as wide as the sprite
        let m = sprite_transform(&placement, (50, 50), (500, 400), 0.1);
        assert!((m[0][0] - 1.0).abs() < 1e-9);
        assert!((m[0][2] - 50.0).abs() < 1e-9);
        assert!((m[1][2] - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_sprite_transform_translate_and_scale() {
        let placement = AnchorPlacement {
            x_pct: 50.0,
            y_pct: 50.0,
            translate: (-0.5, 0.0),
            rotation_deg: 0.0,
            scale: 2.0,
        };
        let m = sprite_transform(&placement, (100, 100), (1000, 1000), 0.1);
        // Element is 100px wide, shifted left by half, then doubled about its center
        assert!((m[0][0] - 2.0).abs() < 1e-9);
        assert!((m[0][2] - (450.0 + 50.0 - 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_draw_sprite_opaque() {
        let mut frame = Mat::new_rows_cols_with_default(20, 20, CV_8UC3, Scalar::all(0.0)).unwrap();
        let sprite = Mat::new_rows_cols_with_default(4, 4, CV_8UC4, Scalar::new(255.0, 255.0, 255.0, 255.0)).unwrap();
        let transform = [[1.0, 0.0, 5.0], [0.0, 1.0, 5.0]];
        draw_sprite(&mut frame, &sprite, &transform).unwrap();
        assert_eq!(*frame.at_2d::<Vec3b>(6, 6).unwrap(), Vec3b::from([255, 255, 255]));
        assert_eq!(*frame.at_2d::<Vec3b>(15, 15).unwrap(), Vec3b::from([0, 0, 0]));
    }
}
