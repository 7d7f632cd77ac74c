//! Accessory images referenced by product URL.

use crate::{utils::image_conversion::rgba_to_bgra_mat, Error, Result};
use log::info;
use opencv::{core::Mat, prelude::*};
use std::path::{Path, PathBuf};

/// Resolve a product image reference to a local path.
///
/// Accepts plain paths and `file://` URLs. Remote URLs are rejected since the
/// engine never fetches anything over the network.
///
/// # Errors
///
/// Returns [`Error::AssetError`] for empty or remote references.
pub fn resolve_asset_path(url: &str) -> Result<PathBuf> {
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::AssetError("Empty asset reference".to_string()));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return Err(Error::AssetError(format!("Remote assets must be provisioned locally: {url}")));
    }
    Ok(PathBuf::from(url.strip_prefix("file://").unwrap_or(url)))
}

/// A decoded accessory sprite
#[derive(Debug, Clone)]
pub struct AccessoryAsset {
    url: String,
    image: Mat,
}

impl AccessoryAsset {
    /// Load and decode the image behind a product URL
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved or the image
    /// cannot be decoded.
    pub fn load(url: &str) -> Result<Self> {
        let path = resolve_asset_path(url)?;
        let image = Self::decode(&path)?;
        info!("Loaded accessory {} ({}x{})", path.display(), image.cols(), image.rows());
        Ok(Self {
            url: url.to_string(),
            image,
        })
    }

    fn decode(path: &Path) -> Result<Mat> {
        if !path.exists() {
            return Err(Error::AssetError(format!("Asset not found: {}", path.display())));
        }
        let rgba = image::open(path)?.to_rgba8();
        rgba_to_bgra_mat(&rgba)
    }

    /// Wrap an already decoded BGRA image
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssetError`] if the image is empty or not BGRA.
    pub fn from_mat(url: &str, image: Mat) -> Result<Self> {
        if image.empty() || image.channels() != 4 {
            return Err(Error::AssetError(format!(
                "Accessory image must be non-empty BGRA, got {} channels",
                image.channels()
            )));
        }
        Ok(Self {
            url: url.to_string(),
            image,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// BGRA sprite pixels
    #[must_use]
    pub fn image(&self) -> &Mat {
        &self.image
    }

    /// Sprite size as `(width, height)`
    #[must_use]
    pub fn size(&self) -> (i32, i32) {
        (self.image.cols(), self.image.rows())
    }
}
