//! Constants used throughout the engine

/// Number of vertices produced by the face-mesh landmark model
pub const NUM_FACE_MESH_LANDMARKS: usize = 468;

/// Vertex count when the model also refines the irises
pub const NUM_FACE_MESH_LANDMARKS_WITH_IRIS: usize = 478;

/// Face-mesh vertex used as the left earring anchor
pub const LEFT_EAR_ANCHOR: usize = 177;

/// Face-mesh vertex used as the right earring anchor
pub const RIGHT_EAR_ANCHOR: usize = 361;

/// Outer lip boundary, closed loop
pub const OUTER_LIPS: [usize; 20] = [
    61, 146, 91, 181, 84, 17, 314, 405, 321, 375, 291, 409, 270, 269, 267, 0, 37, 39, 40, 185,
];

/// Inner mouth opening, closed loop punched out of the outer lip fill
pub const INNER_MOUTH: [usize; 20] = [
    78, 95, 88, 178, 87, 14, 317, 402, 318, 324, 308, 415, 310, 311, 312, 13, 82, 81, 80, 191,
];

/// Anchor distance that maps to an earring scale of 1.0
pub const DEFAULT_FACE_WIDTH_CALIBRATION: f64 = 0.35;

/// Earring scale bounds
pub const MIN_ACCESSORY_SCALE: f64 = 0.1;
pub const MAX_ACCESSORY_SCALE: f64 = 2.5;

/// Vertical lift of the earring anchor, as a fraction of the anchor distance
pub const EAR_Y_OFFSET_FACTOR: f64 = 0.03;

/// Element translation offsets, as fractions of the element size
pub const LEFT_EAR_TRANSLATE: (f64, f64) = (-0.35, 0.01);
pub const RIGHT_EAR_TRANSLATE: (f64, f64) = (-0.60, 0.01);

/// Earring sprite width as a fraction of the frame width at scale 1.0
pub const DEFAULT_ACCESSORY_WIDTH_FRACTION: f64 = 0.08;

/// Lip smoothing blend factor (weight of the new measurement)
pub const DEFAULT_LIP_SMOOTHING: f64 = 0.35;

/// Default lipstick shade, `#c2185b`
pub const DEFAULT_LIPSTICK_RGB: (u8, u8, u8) = (0xc2, 0x18, 0x5b);

/// Default lipstick paint alpha
pub const DEFAULT_LIPSTICK_INTENSITY: f64 = 0.45;

/// Gaussian sigma used to feather the lip mask, in pixels
pub const DEFAULT_FEATHER_SIGMA: f64 = 2.0;

/// Opacity of the whole lip layer when blended over the video
pub const DEFAULT_LIP_LAYER_OPACITY: f64 = 0.9;

/// Line segments used to flatten each quadratic lip curve
pub const DEFAULT_CURVE_SEGMENTS: usize = 8;

/// Preferred capture resolution
pub const PREFERRED_CAPTURE_WIDTH: i32 = 1280;
pub const PREFERRED_CAPTURE_HEIGHT: i32 = 720;

/// Face-mesh model input edge length in pixels
pub const FACE_MESH_INPUT_SIZE: i32 = 192;

/// Minimum face presence score for a mesh to count as a face
pub const DEFAULT_MIN_FACE_PRESENCE: f32 = 0.5;

/// Minimum face detector score for a box to seed the face mesh
pub const DEFAULT_DETECTION_CONFIDENCE: f32 = 0.5;

/// Overlap above which weaker face detector boxes are suppressed
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;

/// Region-of-interest growth around the previous frame's landmarks
pub const DEFAULT_ROI_EXPANSION: f32 = 0.25;

/// Where the face landmarker model is distributed from
pub const FACE_LANDMARKER_MODEL_URL: &str =
    "https://storage.googleapis.com/mediapipe-models/face_landmarker/face_landmarker/float16/1/face_landmarker.task";

/// Default display refresh pacing
pub const DEFAULT_TARGET_FPS: u32 = 60;

/// Debug landmark dot radius in pixels
pub const LANDMARK_DOT_RADIUS: i32 = 2;
