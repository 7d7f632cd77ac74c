//! Image conversion utilities between `image`, `OpenCV` Mat and ndarray.

use super::safe_cast::{u32_to_i32, usize_to_i32};
use crate::{Error, Result};
use image::RgbaImage;
use ndarray::Array4;
use opencv::core::{Mat, MatTraitConst, Scalar, Vec3f, Vec4b, CV_32FC3, CV_8UC4};
use opencv::prelude::MatTrait;

/// Convert a decoded RGBA image into a BGRA Mat
///
/// # Errors
///
/// Returns an error if the image is empty or the Mat cannot be allocated.
pub fn rgba_to_bgra_mat(image: &RgbaImage) -> Result<Mat> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::InvalidInput(format!("Invalid image dimensions: {width}x{height}")));
    }

    let mut mat = Mat::new_rows_cols_with_default(u32_to_i32(height)?, u32_to_i32(width)?, CV_8UC4, Scalar::default())?;
    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        *mat.at_2d_mut::<Vec4b>(u32_to_i32(y)?, u32_to_i32(x)?)? = Vec4b::from([b, g, r, a]);
    }

    Ok(mat)
}

/// Convert a `CV_32FC3` Mat into a single-image NHWC tensor
///
/// # Errors
///
/// Returns an error if the Mat is empty or not three-channel float.
#[allow(clippy::cast_sign_loss)] // Dimensions are checked positive
pub fn mat_to_nhwc_tensor(mat: &Mat) -> Result<Array4<f32>> {
    let rows = mat.rows();
    let cols = mat.cols();
    if rows <= 0 || cols <= 0 {
        return Err(Error::InvalidInput(format!("Invalid Mat dimensions: {rows}x{cols}")));
    }
    if mat.typ() != CV_32FC3 {
        return Err(Error::ModelDataFormatError(format!(
            "Expected a CV_32FC3 image, got type {}",
            mat.typ()
        )));
    }

    let (height, width) = (rows as usize, cols as usize);
    let mut tensor = Array4::<f32>::zeros((1, height, width, 3));
    for row in 0..height {
        for col in 0..width {
            let pixel = mat.at_2d::<Vec3f>(usize_to_i32(row)?, usize_to_i32(col)?)?;
            for ch in 0..3 {
                tensor[[0, row, col, ch]] = pixel[ch];
            }
        }
    }

    Ok(tensor)
}
