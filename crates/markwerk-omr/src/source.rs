// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Source images handed to the grader, and their SHA-256 fingerprint.

use image::{ColorType, DynamicImage, GrayImage};
use markwerk_core::error::{MarkwerkError, Result};
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

/// A decoded answer-sheet photo or scan. The grader only reads it.
#[derive(Debug, Clone)]
pub struct SourceImage {
    image: DynamicImage,
}

impl SourceImage {
    // -- Construction ---------------------------------------------------------

    /// Decode from raw image bytes (JPEG, PNG, TIFF, etc.).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(data)
            .map_err(|err| MarkwerkError::ImageDecode(format!("failed to decode sheet image: {}", err)))?;
        info!(
            width = image.width(),
            height = image.height(),
            "Sheet image loaded"
        );
        Ok(Self { image })
    }

    /// Decode from a file path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let image = image::open(path.as_ref()).map_err(|err| match err {
            image::ImageError::IoError(io) => MarkwerkError::Io(io),
            other => MarkwerkError::ImageDecode(format!(
                "failed to open sheet image {}: {}",
                path.as_ref().display(),
                other
            )),
        })?;
        Ok(Self { image })
    }

    /// Wrap an already decoded image.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn color_type(&self) -> ColorType {
        self.image.color()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    /// Luminance copy used by every later stage.
    pub fn to_gray(&self) -> GrayImage {
        self.image.to_luma8()
    }

    /// SHA-256 over the dimensions, colour type and decoded pixel bytes, as
    /// lowercase hex. Two encodings of the same pixels share a digest.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.width().to_le_bytes());
        hasher.update(self.height().to_le_bytes());
        hasher.update(format!("{:?}", self.color_type()).as_bytes());
        hasher.update(self.image.as_bytes());
        hex::encode(hasher.finalize())
    }
}
