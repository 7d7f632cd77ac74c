//! Build script checking native dependencies and the landmark model asset.
//!
//! Nothing here fails the build; missing pieces are reported as warnings with
//! installation hints.

use std::env;
use std::path::Path;
use std::process::Command;

const MODEL_ASSET: &str = "assets/face_landmark.onnx";

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed={MODEL_ASSET}");

    check_opencv();
    check_onnxruntime();
    check_model_asset();

    println!(
        "cargo:rustc-env=BUILD_TARGET={}",
        env::var("TARGET").unwrap_or_default()
    );
}

fn pkg_config_version(package: &str) -> Option<String> {
    let output = Command::new("pkg-config").args(["--modversion", package]).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn check_opencv() {
    println!("cargo:rerun-if-env-changed=PKG_CONFIG_PATH");
    println!("cargo:rerun-if-env-changed=OPENCV_LINK_PATHS");
    println!("cargo:rerun-if-env-changed=OPENCV_INCLUDE_PATHS");

    match pkg_config_version("opencv4").or_else(|| pkg_config_version("opencv")) {
        Some(version) => println!("cargo:warning=Found OpenCV version: {version}"),
        None => {
            println!("cargo:warning=OpenCV not found via pkg-config. Make sure OpenCV is installed.");
            println!("cargo:warning=On Ubuntu: sudo apt-get install libopencv-dev clang libclang-dev");
            println!("cargo:warning=On macOS: brew install opencv");
        }
    }
}

fn check_onnxruntime() {
    println!("cargo:rerun-if-env-changed=ORT_STRATEGY");
    println!("cargo:rerun-if-env-changed=ORT_LIB_LOCATION");

    // ort downloads its own runtime unless told to use a system copy
    if env::var("ORT_STRATEGY").is_ok_and(|s| s == "system") {
        match env::var("ORT_LIB_LOCATION") {
            Ok(location) => println!("cargo:warning=Using system ONNX Runtime from {location}"),
            Err(_) => println!("cargo:warning=ORT_STRATEGY=system requires ORT_LIB_LOCATION to point at libonnxruntime"),
        }
    }
}

fn check_model_asset() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_default();
    if !Path::new(&manifest_dir).join(MODEL_ASSET).exists() {
        println!("cargo:warning=Landmark model not found at {MODEL_ASSET}. Overlays stay hidden until it is provisioned.");
        println!("cargo:warning=Convert the MediaPipe face landmark model to ONNX and place it there, or set detector.model_path in the config.");
    }
}
