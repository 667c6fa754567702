// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective rectification: warps one detected block onto an axis-aligned
// canvas and turns it upright.

use image::{GrayImage, Luma, imageops};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use markwerk_core::error::{MarkwerkError, Result};
use tracing::{debug, instrument};

use crate::geometry::Quadrilateral;
use crate::preprocess::Preprocessor;

/// One answer block after warping, rotation and region preprocessing.
#[derive(Debug, Clone)]
pub struct RectifiedGrid {
    /// Position in question order.
    pub index: usize,
    /// Corners in the source image.
    pub quad: Quadrilateral,
    /// Enhanced grayscale at canonical size.
    pub gray: GrayImage,
    /// Ink mask of `gray` (ink = 255).
    pub binary: GrayImage,
}

impl RectifiedGrid {
    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    pub fn height(&self) -> u32 {
        self.gray.height()
    }
}

/// Maps detected quadrilaterals to upright canonical rectangles.
#[derive(Debug, Clone)]
pub struct PerspectiveRectifier {
    canonical_width: u32,
    canonical_height: u32,
}

impl PerspectiveRectifier {
    /// `canonical_width` x `canonical_height` is the size of the region once
    /// upright. Blocks are printed rotated a quarter turn, so the warp target
    /// is the transposed size.
    pub fn new(canonical_width: u32, canonical_height: u32) -> Self {
        Self {
            canonical_width,
            canonical_height,
        }
    }

    /// Warp `quad` out of `gray` without rotating it.
    #[instrument(skip(self, gray), fields(region = index))]
    pub fn warp(&self, gray: &GrayImage, quad: &Quadrilateral, index: usize) -> Result<GrayImage> {
        let (out_w, out_h) = (self.canonical_height, self.canonical_width);
        let src = quad.corners().map(|p| (p.x, p.y));
        let right = (out_w - 1) as f32;
        let bottom = (out_h - 1) as f32;
        let dest = [(0.0, 0.0), (right, 0.0), (right, bottom), (0.0, bottom)];

        let projection =
            Projection::from_control_points(src, dest).ok_or_else(|| MarkwerkError::MalformedQuadrilateral {
                region: Some(index),
                reason: "corners do not define a projective transform".into(),
            })?;

        let mut output = GrayImage::new(out_w, out_h);
        warp_into(gray, &projection, Interpolation::Bilinear, Luma([255u8]), &mut output);
        debug!(out_w, out_h, "Region warped");
        Ok(output)
    }

    /// Warp, rotate upright, then run the region preprocessing pass.
    pub fn rectify(
        &self,
        gray: &GrayImage,
        quad: &Quadrilateral,
        index: usize,
        preprocessor: &Preprocessor,
    ) -> Result<RectifiedGrid> {
        let warped = self.warp(gray, quad, index)?;
        let upright = normalize_orientation(&warped);
        let processed = preprocessor.process(&upright);
        Ok(RectifiedGrid {
            index,
            quad: *quad,
            gray: processed.gray,
            binary: processed.binary,
        })
    }
}

/// Rotate a warped block 90 degrees counter-clockwise into reading orientation.
pub fn normalize_orientation(warped: &GrayImage) -> GrayImage {
    imageops::rotate270(warped)
}
