//! Face-mesh landmark model on ONNX Runtime.

use crate::{
    config::DetectorConfig,
    constants::{FACE_MESH_INPUT_SIZE, NUM_FACE_MESH_LANDMARKS},
    detector::{LandmarkModel, ModelFactory},
    face_detection::{locator_from_config, CenteredCrop, FaceLocator},
    landmarks::FaceLandmarks,
    utils::{image_conversion::mat_to_nhwc_tensor, landmark_roi},
    Error, Result,
};
use log::{debug, info, trace};
use ndarray::{Array4, CowArray};
use opencv::core::{Mat, Rect, Size, CV_32F};
use opencv::imgproc::{self, InterpolationFlags};
use opencv::prelude::*;
use ort::{Environment, Session, Value};
use std::path::Path;
use std::sync::Arc;

/// Number of floats in the landmark output tensor
const LANDMARK_OUTPUT_LEN: usize = NUM_FACE_MESH_LANDMARKS * 3;

/// Channel order the model expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TensorLayout {
    Nchw,
    Nhwc,
}

/// Logistic function
#[must_use]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Region to run the mesh on: the tracked region while it still fits the
/// frame, otherwise whatever `locator` finds. `None` means no face.
///
/// # Errors
///
/// Returns an error if the locator fails.
pub fn search_region(tracked: Option<Rect>, locator: &mut dyn FaceLocator, frame: &Mat) -> Result<Option<Rect>> {
    let (width, height) = (frame.cols(), frame.rows());
    // A region tracked at another resolution no longer fits the frame
    let fits = |r: &Rect| r.width > 0 && r.x >= 0 && r.y >= 0 && r.x + r.width <= width && r.y + r.height <= height;
    match tracked.filter(fits) {
        Some(roi) => Ok(Some(roi)),
        None => locator.locate(frame),
    }
}

/// Single-face mesh detector with region-of-interest tracking
pub struct OnnxFaceMesh {
    session: Session,
    layout: TensorLayout,
    input_size: i32,
    min_face_presence: f32,
    roi_expansion: f32,
    tracked_roi: Option<Rect>,
    locator: Box<dyn FaceLocator>,
}

impl OnnxFaceMesh {
    /// Load a face-mesh model from an `ONNX` file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The ONNX model file cannot be loaded
    /// - The model has no inputs or fewer than two outputs
    /// - The ONNX runtime environment cannot be created
    pub fn new<P: AsRef<Path>>(model_path: P, min_face_presence: f32, roi_expansion: f32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(Error::ModelLoadFailed(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }
        info!("Initializing face mesh with model: {}", model_path.display());

        let environment = Arc::new(
            Environment::builder()
                .with_name("face_mesh")
                .with_log_level(ort::LoggingLevel::Warning)
                .build()?,
        );

        let session = ort::SessionBuilder::new(&environment)?
            .with_optimization_level(ort::GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| Error::ModelInputError("Model has no inputs".to_string()))?;
        if session.outputs.len() < 2 {
            return Err(Error::ModelOutputError(format!(
                "Expected landmark and face-flag outputs, model has {}",
                session.outputs.len()
            )));
        }

        // MediaPipe exports are NHWC; converted models are often NCHW
        let layout = if input.dimensions.get(1) == Some(&Some(3)) {
            TensorLayout::Nchw
        } else {
            TensorLayout::Nhwc
        };
        debug!("Face mesh input '{}' uses {layout:?} layout", input.name);

        Ok(Self {
            session,
            layout,
            input_size: FACE_MESH_INPUT_SIZE,
            min_face_presence,
            roi_expansion,
            tracked_roi: None,
            locator: Box::new(CenteredCrop),
        })
    }

    /// Use `locator` to find the face whenever nothing is tracked
    #[must_use]
    pub fn with_locator(mut self, locator: Box<dyn FaceLocator>) -> Self {
        self.locator = locator;
        self
    }

    /// Load using detector configuration. The face detector is optional: when
    /// it fails to load the mesh searches the centered square instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelLoadFailed`] if the model cannot be loaded.
    pub fn from_config(config: &DetectorConfig) -> Result<Self> {
        let mesh = Self::new(&config.model_path, config.min_face_presence, config.roi_expansion).map_err(|e| match e {
            Error::ModelLoadFailed(msg) => Error::ModelLoadFailed(msg),
            other => Error::ModelLoadFailed(other.to_string()),
        })?;
        Ok(mesh.with_locator(locator_from_config(config)))
    }

    /// Detect the face inside the tracked region, or wherever the locator
    /// finds one when nothing is tracked
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Image preprocessing fails
    /// - The ONNX model inference fails
    /// - The output tensors have an unexpected shape
    pub fn detect(&mut self, frame: &Mat) -> Result<Option<FaceLandmarks>> {
        let (width, height) = (frame.cols(), frame.rows());
        if width <= 0 || height <= 0 {
            return Err(Error::InvalidInput(format!("Invalid frame size: {width}x{height}")));
        }

        let Some(roi) = search_region(self.tracked_roi, self.locator.as_mut(), frame)? else {
            trace!("{} found no face", self.locator.name());
            self.tracked_roi = None;
            return Ok(None);
        };
        let crop = Mat::roi(frame, roi)?.try_clone()?;

        let input = self.preprocess(&crop)?;
        let (marks, face_flag) = self.forward(input)?;

        let presence = sigmoid(face_flag);
        trace!("Face presence {presence:.3} in {roi:?}");
        if presence < self.min_face_presence {
            self.tracked_roi = None;
            return Ok(None);
        }

        let landmarks = self.postprocess(&marks, roi, width, height)?;
        self.tracked_roi = landmark_roi(&landmarks, width, height, self.roi_expansion);
        Ok(Some(landmarks))
    }

    /// Resize, convert to RGB and scale into [-1, 1]
    fn preprocess(&self, crop: &Mat) -> Result<Array4<f32>> {
        let mut resized = Mat::default();
        imgproc::resize(
            crop,
            &mut resized,
            Size::new(self.input_size, self.input_size),
            0.0,
            0.0,
            InterpolationFlags::INTER_LINEAR as i32,
        )?;

        let mut rgb_image = Mat::default();
        imgproc::cvt_color(&resized, &mut rgb_image, imgproc::COLOR_BGR2RGB, 0)?;

        let mut float_image = Mat::default();
        rgb_image.convert_to(&mut float_image, CV_32F, 2.0 / 255.0, -1.0)?;

        let nhwc = mat_to_nhwc_tensor(&float_image)?;
        Ok(match self.layout {
            TensorLayout::Nhwc => nhwc,
            TensorLayout::Nchw => nhwc.permuted_axes([0, 3, 1, 2]).as_standard_layout().into_owned(),
        })
    }

    /// Run the model, returning the raw landmark tensor and the face-flag logit
    fn forward(&self, input: Array4<f32>) -> Result<(Vec<f32>, f32)> {
        let cow_array = CowArray::from(input.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;

        let outputs = self.session.run(vec![input_tensor])?;
        let mut outputs = outputs.into_iter();

        let marks_output = outputs
            .next()
            .ok_or_else(|| Error::ModelOutputError("No landmark output from model".to_string()))?;
        let marks_tensor = marks_output.try_extract::<f32>()?;
        let marks: Vec<f32> = marks_tensor.view().iter().copied().collect();

        let flag_output = outputs
            .next()
            .ok_or_else(|| Error::ModelOutputError("No face-flag output from model".to_string()))?;
        let flag_tensor = flag_output.try_extract::<f32>()?;
        let face_flag = flag_tensor
            .view()
            .iter()
            .next()
            .copied()
            .ok_or_else(|| Error::ModelOutputError("Empty face-flag output".to_string()))?;

        Ok((marks, face_flag))
    }

    /// Map model-space vertices back into the full frame
    #[allow(clippy::cast_precision_loss)] // Precision loss acceptable for pixel coordinates
    fn postprocess(&self, marks: &[f32], roi: Rect, width: i32, height: i32) -> Result<FaceLandmarks> {
        if marks.len() < LANDMARK_OUTPUT_LEN {
            return Err(Error::ModelOutputError(format!(
                "Expected {LANDMARK_OUTPUT_LEN} landmark values, got {}",
                marks.len()
            )));
        }

        let scale_x = roi.width as f32 / self.input_size as f32;
        let scale_y = roi.height as f32 / self.input_size as f32;

        let points: Vec<(f32, f32, f32)> = marks[..LANDMARK_OUTPUT_LEN]
            .chunks_exact(3)
            .map(|v| {
                (
                    roi.x as f32 + v[0] * scale_x,
                    roi.y as f32 + v[1] * scale_y,
                    v[2] * scale_x,
                )
            })
            .collect();

        FaceLandmarks::from_pixels(&points, width, height)
    }
}

/// Factory building [`OnnxFaceMesh`] models from detector configuration
#[must_use]
pub fn onnx_model_factory() -> ModelFactory {
    Arc::new(|config: &DetectorConfig| -> Result<Box<dyn LandmarkModel>> {
        Ok(Box::new(OnnxFaceMesh::from_config(config)?))
    })
}

impl LandmarkModel for OnnxFaceMesh {
    fn detect_faces(&mut self, frame: &Mat, _timestamp_ms: f64) -> Result<Vec<FaceLandmarks>> {
        Ok(self.detect(frame)?.into_iter().collect())
    }

    fn reset(&mut self) {
        self.tracked_roi = None;
    }

    fn name(&self) -> &str {
        "OnnxFaceMesh"
    }
}
