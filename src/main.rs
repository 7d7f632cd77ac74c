//! Virtual try-on demo: live camera with earring and lipstick overlays.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use opencv::{highgui, prelude::*};
use std::{path::PathBuf, time::Duration};
use virtual_try_on::{
    capture::{OpenCvCamera, PlaybackStatus},
    config::{Config, HexColor},
    detector::ModelStatus,
    engine::{SessionPhase, TryOnEngine},
    mark_detection::onnx_model_factory,
    scheduler::RefreshScheduler,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Camera index to use
    #[arg(long)]
    cam: Option<i32>,

    /// Video file to play instead of a camera
    #[arg(short, long)]
    video: Option<PathBuf>,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Product image shown as earrings (path or file:// URL)
    #[arg(short, long, default_value = "assets/earring.png")]
    product: String,

    /// Draw every detected landmark
    #[arg(short, long)]
    landmarks: bool,

    /// Lipstick shade as #rrggbb
    #[arg(long)]
    lipstick: Option<String>,

    /// Lipstick intensity (0.0-1.0)
    #[arg(long)]
    intensity: Option<f64>,

    /// Write the example configuration to this path and exit
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

fn build_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::from_file(path).with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => Config::default(),
    };

    if let Some(cam) = args.cam {
        config.camera.index = cam;
    }
    if let Some(video) = &args.video {
        config.camera.video_file = Some(video.clone());
    }
    if args.landmarks {
        config.display.show_landmarks = true;
    }
    if let Some(shade) = &args.lipstick {
        config.lipstick.color = HexColor::parse(shade)?;
    }
    if let Some(intensity) = args.intensity {
        config.lipstick.intensity = intensity;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    info!("Virtual Try-On");

    if let Some(path) = &args.write_config {
        std::fs::write(path, virtual_try_on::config::EXAMPLE_CONFIG)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Example configuration written to {}", path.display());
        return Ok(());
    }

    let config = build_config(&args)?;
    let title = config.display.window_title.clone();
    let scheduler = RefreshScheduler::new(config.display.target_fps);
    let mut engine = TryOnEngine::new(config, OpenCvCamera::new(), scheduler, onnx_model_factory())?;

    engine
        .open(&args.product)
        .context("Could not start the camera. Check that it is connected and that camera access is allowed")?;

    if engine.wait_for_model(Duration::from_millis(50)) == ModelStatus::Loading {
        info!("Initializing model...");
    }

    highgui::named_window(&title, highgui::WINDOW_NORMAL)?;
    let mut model_reported = false;

    while engine.pump() {
        let status = engine.status();
        if !model_reported {
            if let ModelStatus::Failed(reason) = &status.model {
                warn!("Landmark model unavailable ({reason}); showing plain video");
                model_reported = true;
            }
        }
        if status.phase != SessionPhase::Detecting && status.phase != SessionPhase::Ready {
            break;
        }
        if status.playback == Some(PlaybackStatus::Ended) {
            info!("Video finished");
            break;
        }

        if let Some(frame) = engine.render()? {
            if frame.cols() > 0 && frame.rows() > 0 {
                highgui::imshow(&title, &frame)?;
            }
        }

        let key = highgui::wait_key(1)?;
        if key == i32::from(b'q') || key == 27 {
            info!("Exit requested by user");
            break;
        }
    }

    let processed = engine.frames_processed();
    engine.close();
    highgui::destroy_all_windows()?;
    info!("Try-on closed after {processed} overlay updates");
    Ok(())
}
