//! Face localization that seeds the face-mesh region of interest.
//!
//! The mesh model only sees a square crop. While a face is tracked that crop
//! comes from the previous landmarks; otherwise a [`FaceLocator`] has to find
//! the face in the whole frame first.

use crate::{
    config::DetectorConfig,
    utils::{centered_square, expand_to_square, image_conversion::mat_to_nhwc_tensor, safe_cast::f32_to_i32_clamp},
    Error, Result,
};
use log::{debug, info, trace, warn};
use ndarray::CowArray;
use opencv::core::{self, Mat, Rect, Scalar, Size, BORDER_CONSTANT, CV_32F};
use opencv::imgproc::{self, InterpolationFlags};
use opencv::prelude::*;
use ort::{Environment, Session, Value};
use std::path::Path;
use std::sync::Arc;

/// SCRFD input edge length when the model does not fix one
const DEFAULT_DETECTOR_INPUT_SIZE: i32 = 640;

/// Finds the region the face-mesh model should look at
pub trait FaceLocator: Send {
    /// Square search region around the most prominent face, or `None` when
    /// the frame has no face
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    fn locate(&mut self, frame: &Mat) -> Result<Option<Rect>>;

    fn name(&self) -> &str;
}

/// Largest centered square, used when no detector model is available
#[derive(Debug, Default, Clone, Copy)]
pub struct CenteredCrop;

impl FaceLocator for CenteredCrop {
    fn locate(&mut self, frame: &Mat) -> Result<Option<Rect>> {
        let rect = centered_square(frame.cols(), frame.rows());
        Ok((rect.width > 0).then_some(rect))
    }

    fn name(&self) -> &str {
        "CenteredCrop"
    }
}

/// Face detection result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceDetection {
    /// Bounding box in frame pixels
    pub bbox: Rect,
    pub score: f32,
}

/// Decoded box before suppression, corners in frame pixels
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    corners: [f32; 4],
    score: f32,
}

/// Anchor centers of one feature map, `num_anchors` per cell, row-major
#[must_use]
#[allow(clippy::cast_precision_loss)] // Feature maps are small
pub fn anchor_centers(height: i32, width: i32, stride: i32, num_anchors: usize) -> Vec<(f32, f32)> {
    let mut centers = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let center = ((x * stride) as f32, (y * stride) as f32);
            centers.extend(std::iter::repeat(center).take(num_anchors.max(1)));
        }
    }
    centers
}

/// Corners `[x1, y1, x2, y2]` from an anchor center and left/top/right/bottom distances
#[must_use]
pub fn distance_to_bbox(center: (f32, f32), distance: &[f32; 4]) -> [f32; 4] {
    let (cx, cy) = center;
    [cx - distance[0], cy - distance[1], cx + distance[2], cy + distance[3]]
}

/// Intersection over union of two corner boxes
#[must_use]
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let area = |r: &[f32; 4]| (r[2] - r[0] + 1.0).max(0.0) * (r[3] - r[1] + 1.0).max(0.0);
    let w = (a[2].min(b[2]) - a[0].max(b[0]) + 1.0).max(0.0);
    let h = (a[3].min(b[3]) - a[1].max(b[1]) + 1.0).max(0.0);
    let inter = w * h;
    let union = area(a) + area(b) - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Greedy non-maximum suppression; the result is sorted by descending score
fn non_max_suppression(mut candidates: Vec<Candidate>, threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if keep.iter().all(|kept| iou(&kept.corners, &candidate.corners) <= threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Clamp corner coordinates into a frame-sized [`Rect`]
fn corners_to_rect(corners: &[f32; 4], width: i32, height: i32) -> Rect {
    let x1 = f32_to_i32_clamp(corners[0], 0, width);
    let y1 = f32_to_i32_clamp(corners[1], 0, height);
    let x2 = f32_to_i32_clamp(corners[2], 0, width);
    let y2 = f32_to_i32_clamp(corners[3], 0, height);
    Rect::new(x1, y1, (x2 - x1).max(0), (y2 - y1).max(0))
}

/// SCRFD face detector using ONNX Runtime
pub struct FaceDetector {
    session: Session,
    input_size: (i32, i32),
    conf_threshold: f32,
    nms_threshold: f32,
    roi_expansion: f32,
    num_anchors: usize,
    strides: Vec<i32>,
    /// Distance between a stride's score output and its box output
    offset: usize,
}

impl FaceDetector {
    /// Load an SCRFD model from an `ONNX` file
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelLoadFailed`] if the file is missing and an
    /// `ONNX` Runtime error if the session cannot be built.
    pub fn new<P: AsRef<Path>>(model_path: P, conf_threshold: f32, nms_threshold: f32, roi_expansion: f32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(Error::ModelLoadFailed(format!(
                "Face detector not found: {}",
                model_path.display()
            )));
        }
        info!("Initializing face detector with model: {}", model_path.display());

        let environment = Arc::new(
            Environment::builder()
                .with_name("face_detector")
                .with_log_level(ort::LoggingLevel::Warning)
                .build()?,
        );

        let session = ort::SessionBuilder::new(&environment)?
            .with_optimization_level(ort::GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| Error::ModelInputError("Face detector has no inputs".to_string()))?;
        // [batch, channels, height, width]; dynamic axes fall back to 640
        let dim = |i: usize| {
            input
                .dimensions
                .get(i)
                .copied()
                .flatten()
                .and_then(|d| i32::try_from(d).ok())
                .filter(|&d| d > 0)
                .unwrap_or(DEFAULT_DETECTOR_INPUT_SIZE)
        };
        let input_size = (dim(3), dim(2));

        let (offset, strides, num_anchors) = match session.outputs.len() {
            6 | 9 => (3, vec![8, 16, 32], 2),
            10 | 15 => (5, vec![8, 16, 32, 64, 128], 1),
            n => {
                warn!("Unknown face detector layout with {n} outputs, assuming three strides");
                (3, vec![8, 16, 32], 2)
            }
        };
        debug!(
            "Face detector input {}x{}, strides {strides:?}",
            input_size.0, input_size.1
        );

        Ok(Self {
            session,
            input_size,
            conf_threshold,
            nms_threshold,
            roi_expansion,
            num_anchors,
            strides,
            offset,
        })
    }

    /// Load using detector configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelLoadFailed`] if the model cannot be loaded.
    pub fn from_config(config: &DetectorConfig) -> Result<Self> {
        Self::new(
            &config.face_detector_path,
            config.detection_confidence,
            config.nms_threshold,
            config.roi_expansion,
        )
        .map_err(|e| match e {
            Error::ModelLoadFailed(msg) => Error::ModelLoadFailed(msg),
            other => Error::ModelLoadFailed(other.to_string()),
        })
    }

    /// Detect faces, best first
    ///
    /// # Errors
    ///
    /// Returns an error if preprocessing or inference fails or the outputs
    /// have an unexpected shape.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)] // Pixel sizes
    pub fn detect(&mut self, image: &Mat) -> Result<Vec<FaceDetection>> {
        let (img_width, img_height) = (image.cols(), image.rows());
        if img_width <= 0 || img_height <= 0 {
            return Err(Error::InvalidInput(format!("Invalid frame size: {img_width}x{img_height}")));
        }

        // Letterbox into the model input, padding right and bottom
        let (input_width, input_height) = self.input_size;
        let ratio_img = img_height as f32 / img_width as f32;
        let ratio_model = input_height as f32 / input_width as f32;
        let (new_width, new_height) = if ratio_img > ratio_model {
            ((input_height as f32 / ratio_img) as i32, input_height)
        } else {
            (input_width, (input_width as f32 * ratio_img) as i32)
        };
        let (new_width, new_height) = (new_width.clamp(1, input_width), new_height.clamp(1, input_height));
        let det_scale = new_height as f32 / img_height as f32;

        let mut resized = Mat::default();
        imgproc::resize(
            image,
            &mut resized,
            Size::new(new_width, new_height),
            0.0,
            0.0,
            InterpolationFlags::INTER_LINEAR as i32,
        )?;
        let mut det_img = Mat::default();
        core::copy_make_border(
            &resized,
            &mut det_img,
            0,
            input_height - new_height,
            0,
            input_width - new_width,
            BORDER_CONSTANT,
            Scalar::all(0.0),
        )?;

        let candidates = self.forward(&det_img)?;
        let detections: Vec<FaceDetection> = non_max_suppression(candidates, self.nms_threshold)
            .into_iter()
            .map(|c| FaceDetection {
                bbox: corners_to_rect(&c.corners.map(|v| v / det_scale), img_width, img_height),
                score: c.score,
            })
            .filter(|d| d.bbox.width > 0 && d.bbox.height > 0)
            .collect();

        trace!("Face detector found {} candidate(s)", detections.len());
        Ok(detections)
    }

    /// Normalize to `(x - 127.5) / 128`, NCHW
    fn preprocess(image: &Mat) -> Result<ndarray::Array4<f32>> {
        let mut rgb_image = Mat::default();
        imgproc::cvt_color(image, &mut rgb_image, imgproc::COLOR_BGR2RGB, 0)?;

        let mut float_image = Mat::default();
        rgb_image.convert_to(&mut float_image, CV_32F, 1.0 / 128.0, -127.5 / 128.0)?;

        let nhwc = mat_to_nhwc_tensor(&float_image)?;
        Ok(nhwc.permuted_axes([0, 3, 1, 2]).as_standard_layout().into_owned())
    }

    /// Run the model and decode every box above the confidence threshold, in
    /// letterboxed input pixels
    #[allow(clippy::cast_precision_loss)]
    fn forward(&self, det_img: &Mat) -> Result<Vec<Candidate>> {
        let (input_width, input_height) = self.input_size;
        let cow_array = CowArray::from(Self::preprocess(det_img)?.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let mut candidates = Vec::new();
        for (idx, &stride) in self.strides.iter().enumerate() {
            let missing = || Error::ModelOutputError(format!("Face detector is missing outputs for stride {stride}"));
            let scores_tensor = outputs.get(idx).ok_or_else(missing)?.try_extract::<f32>()?;
            let scores: Vec<f32> = scores_tensor.view().iter().copied().collect();
            let bbox_tensor = outputs.get(idx + self.offset).ok_or_else(missing)?.try_extract::<f32>()?;
            let distances: Vec<f32> = bbox_tensor.view().iter().map(|&d| d * stride as f32).collect();

            let centers = anchor_centers(input_height / stride, input_width / stride, stride, self.num_anchors);
            if scores.len() < centers.len() || distances.len() < centers.len() * 4 {
                return Err(Error::ModelOutputError(format!(
                    "Stride {stride}: {} scores and {} distances for {} anchors",
                    scores.len(),
                    distances.len(),
                    centers.len()
                )));
            }

            for (i, &center) in centers.iter().enumerate() {
                if scores[i] < self.conf_threshold {
                    continue;
                }
                let d = [distances[i * 4], distances[i * 4 + 1], distances[i * 4 + 2], distances[i * 4 + 3]];
                candidates.push(Candidate {
                    corners: distance_to_bbox(center, &d),
                    score: scores[i],
                });
            }
        }

        Ok(candidates)
    }
}

impl FaceLocator for FaceDetector {
    fn locate(&mut self, frame: &Mat) -> Result<Option<Rect>> {
        let best = self.detect(frame)?.into_iter().next();
        Ok(best.map(|face| {
            trace!("Seeding face mesh from {:?} (score {:.2})", face.bbox, face.score);
            expand_to_square(face.bbox, frame.cols(), frame.rows(), self.roi_expansion)
        }))
    }

    fn name(&self) -> &str {
        "FaceDetector"
    }
}

/// Locator for a detector configuration: the SCRFD detector when its model
/// loads, otherwise the centered crop
#[must_use]
pub fn locator_from_config(config: &DetectorConfig) -> Box<dyn FaceLocator> {
    match FaceDetector::from_config(config) {
        Ok(detector) => Box::new(detector),
        Err(e) => {
            warn!("{e}; searching the centered square for faces");
            Box::new(CenteredCrop)
        }
    }
}
