//! Live camera virtual try-on: earring and lipstick overlays on a mirrored
//! video feed.
//!
//! This library provides:
//! - ONNX Runtime face-mesh inference for 468 facial landmarks
//! - `OpenCV` camera capture and compositing
//! - Temporal smoothing of landmark-derived lip outlines
//!
//! Each frame flows one way through the pipeline:
//! 1. The capture stream hands out the current frame
//! 2. The landmark detector finds the primary face, seeded by a face detector
//!    until the mesh is tracking
//! 3. The geometry resolver turns landmarks into earring placements and lip outlines
//! 4. The overlay scene and compositor draw them over the mirrored video
//!
//! # Examples
//!
//! ## Running a session
//!
//! ```no_run
//! use virtual_try_on::{
//!     capture::OpenCvCamera, config::Config, engine::TryOnEngine,
//!     mark_detection::onnx_model_factory, scheduler::RefreshScheduler,
//! };
//! use opencv::highgui;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let scheduler = RefreshScheduler::new(config.display.target_fps);
//! let mut engine = TryOnEngine::new(config, OpenCvCamera::new(), scheduler, onnx_model_factory())?;
//!
//! engine.open("assets/earring.png")?;
//! while engine.pump() {
//!     if let Some(frame) = engine.render()? {
//!         highgui::imshow("Virtual Try-On", &frame)?;
//!     }
//!     if highgui::wait_key(1)? == i32::from(b'q') {
//!         break;
//!     }
//! }
//! engine.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Geometry only
//!
//! ```no_run
//! use virtual_try_on::{config::Config, geometry::GeometryResolver, landmarks::FaceLandmarks};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let landmarks: FaceLandmarks = unimplemented!();
//! let mut resolver = GeometryResolver::new(&Config::default())?;
//! let geometry = resolver.resolve(&landmarks, 1280, 720)?;
//! if let Some(ears) = geometry.earrings {
//!     println!("Left earring at {:.1}% / {:.1}%", ears.left.x_pct, ears.left.y_pct);
//! }
//! # Ok(())
//! # }
//! ```

/// Accessory image loading
pub mod asset;

/// Camera acquisition and teardown
pub mod capture;

/// Lip layer and output compositing
pub mod compositor;

/// Configuration management
pub mod config;

/// Constants used throughout the engine
pub mod constants;

/// Video-mode landmark detection and background model loading
pub mod detector;

/// Session lifecycle and render loop
pub mod engine;

/// Error types and result handling
pub mod error;

/// SCRFD face detection seeding the face-mesh crop
pub mod face_detection;

/// Temporal filters for point sets
pub mod filters;

/// Earring anchors and lip outlines
pub mod geometry;

/// Normalized face-mesh landmarks
pub mod landmarks;

/// ONNX face-mesh landmark model
pub mod mark_detection;

/// Overlay targets
pub mod overlay;

/// Render loop scheduling
pub mod scheduler;

/// Utility functions for regions of interest and image conversion
pub mod utils;

pub use error::{Error, Result};
