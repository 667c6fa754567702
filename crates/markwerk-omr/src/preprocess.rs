// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image normalisation: input validation, local contrast equalisation
// (CLAHE), edge-preserving smoothing and ink-mask binarization.

use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::filter::{bilateral_filter, gaussian_blur_f32};
use markwerk_core::config::{Binarization, PreprocessConfig};
use markwerk_core::error::{MarkwerkError, Result};
use tracing::{debug, instrument};

/// Enhanced grayscale image plus its ink mask (ink = 255, paper = 0).
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub gray: GrayImage,
    pub binary: GrayImage,
}

/// Normalises sheet and region images before detection and scoring.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    // -- Validation -----------------------------------------------------------

    /// Reject images that cannot be graded: empty, too small, or without
    /// enough contrast to separate ink from paper.
    #[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
    pub fn validate(&self, gray: &GrayImage) -> Result<()> {
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Err(MarkwerkError::Preprocess {
                reason: "image is empty".into(),
            });
        }
        let min = self.config.min_dimension;
        if width < min || height < min {
            return Err(MarkwerkError::Preprocess {
                reason: format!("image is {width}x{height}, smaller than {min}px on a side"),
            });
        }

        let (low, high) = intensity_percentiles(gray, 0.01, 0.99);
        let range = high.saturating_sub(low);
        debug!(low, high, range, "Dynamic range measured");
        if range < self.config.min_dynamic_range {
            return Err(MarkwerkError::Preprocess {
                reason: format!(
                    "dynamic range {range} is below {} (intensities {low}..{high})",
                    self.config.min_dynamic_range
                ),
            });
        }
        Ok(())
    }

    // -- Pipelines ------------------------------------------------------------

    /// Full region pass: CLAHE, bilateral smoothing, then binarization.
    #[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
    pub fn process(&self, gray: &GrayImage) -> Preprocessed {
        let cfg = &self.config;
        let equalised = clahe(gray, cfg.clahe_tiles, cfg.clahe_clip_limit);
        let smoothed = bilateral_smooth(
            &equalised,
            cfg.bilateral_radius,
            cfg.bilateral_sigma_color,
            cfg.bilateral_sigma_space,
        );
        let binary = self.binarize(&smoothed);
        Preprocessed {
            gray: smoothed,
            binary,
        }
    }

    /// Cheap sheet pass used only to find region outlines.
    #[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
    pub fn detection_mask(&self, gray: &GrayImage) -> GrayImage {
        let blurred = if self.config.detection_blur_sigma > 0.0 {
            gaussian_blur_f32(gray, self.config.detection_blur_sigma)
        } else {
            gray.clone()
        };
        self.binarize(&blurred)
    }

    /// Ink mask of `gray` using the configured method.
    pub fn binarize(&self, gray: &GrayImage) -> GrayImage {
        match self.config.binarization {
            Binarization::AdaptiveMean => {
                adaptive_ink_mask(gray, self.config.block_radius, self.config.threshold_offset)
            }
            Binarization::Otsu => {
                let threshold = otsu_level(gray);
                debug!(threshold, "Otsu threshold computed");
                threshold_ink_mask(gray, threshold)
            }
        }
    }
}

// -- Contrast equalisation ----------------------------------------------------

/// Contrast-limited adaptive histogram equalisation.
///
/// The image is split into roughly `tiles` x `tiles` blocks. Each block's
/// histogram is clipped at `clip_limit` times the mean bin height, the excess
/// spread evenly over all bins, and the resulting mappings are bilinearly
/// blended between neighbouring block centres.
pub fn clahe(gray: &GrayImage, tiles: u32, clip_limit: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }
    let tiles = tiles.max(1);
    let tile_w = width.div_ceil(tiles);
    let tile_h = height.div_ceil(tiles);
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts.push(tile_mapping(gray, x0, y0, x1, y1, clip_limit));
        }
    }

    let axis = |pos: u32, tile: u32, count: u32| -> (usize, usize, f32) {
        let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
        let i0 = f.floor().clamp(0.0, (count - 1) as f32) as u32;
        let i1 = (i0 + 1).min(count - 1);
        let t = (f - i0 as f32).clamp(0.0, 1.0);
        (i0 as usize, i1 as usize, t)
    };

    let stride = tiles_x as usize;
    let mut output = GrayImage::new(width, height);
    for y in 0..height {
        let (ty0, ty1, wy) = axis(y, tile_h, tiles_y);
        for x in 0..width {
            let (tx0, tx1, wx) = axis(x, tile_w, tiles_x);
            let v = gray.get_pixel(x, y).0[0] as usize;
            let top = luts[ty0 * stride + tx0][v] * (1.0 - wx) + luts[ty0 * stride + tx1][v] * wx;
            let bottom = luts[ty1 * stride + tx0][v] * (1.0 - wx) + luts[ty1 * stride + tx1][v] * wx;
            let value = top * (1.0 - wy) + bottom * wy;
            output.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }
    output
}

/// Clipped-histogram equalisation mapping for one tile.
fn tile_mapping(gray: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [f32; 256] {
    let mut histogram = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            histogram[gray.get_pixel(x, y).0[0] as usize] += 1;
        }
    }
    let pixels = (x1 - x0) * (y1 - y0);
    let mut lut = [0.0f32; 256];
    if pixels == 0 {
        for (v, slot) in lut.iter_mut().enumerate() {
            *slot = v as f32;
        }
        return lut;
    }

    let clip = ((clip_limit * pixels as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for count in histogram.iter_mut() {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }
    let share = excess / 256;
    for count in histogram.iter_mut() {
        *count += share;
    }
    // Leftover counts go to every `step`-th bin from the bottom.
    let mut remainder = (excess % 256) as usize;
    if remainder > 0 {
        let step = (256 / remainder).max(1);
        let mut i = 0;
        while i < 256 && remainder > 0 {
            histogram[i] += 1;
            i += step;
            remainder -= 1;
        }
    }

    let mut cdf = 0u32;
    for (v, count) in histogram.iter().enumerate() {
        cdf += count;
        lut[v] = cdf as f32 * 255.0 / pixels as f32;
    }
    lut
}

// -- Edge-preserving smoothing ------------------------------------------------

/// Bilateral smoothing over a `2 * radius + 1` window: flat paper noise is
/// averaged away while bubble outlines stay sharp.
pub fn bilateral_smooth(gray: &GrayImage, radius: u32, sigma_color: f32, sigma_space: f32) -> GrayImage {
    if radius == 0 || gray.width() == 0 || gray.height() == 0 {
        return gray.clone();
    }
    bilateral_filter(gray, 2 * radius + 1, sigma_color, sigma_space)
}

// -- Binarization -------------------------------------------------------------

/// Adaptive local-mean threshold. Pixels darker than the mean of their
/// `block_radius` neighbourhood minus `offset` become ink (255).
pub fn adaptive_ink_mask(gray: &GrayImage, block_radius: u32, offset: i32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let integral = compute_integral_image(gray);
    let mut output = GrayImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let local_mean = region_mean(&integral, width, height, x, y, block_radius);
            let threshold = (local_mean.round() as i32 - offset).clamp(0, 255);
            let value = gray.get_pixel(x, y).0[0] as i32;
            let ink = if value < threshold { 255u8 } else { 0u8 };
            output.put_pixel(x, y, Luma([ink]));
        }
    }
    output
}

/// Global threshold: pixels at or below `threshold` become ink (255).
pub fn threshold_ink_mask(gray: &GrayImage, threshold: u8) -> GrayImage {
    let (width, height) = gray.dimensions();
    let mut output = GrayImage::new(width, height);
    for (x, y, pixel) in gray.enumerate_pixels() {
        let ink = if pixel.0[0] <= threshold { 255u8 } else { 0u8 };
        output.put_pixel(x, y, Luma([ink]));
    }
    output
}

/// Summed-area table with a zero first row and column:
/// `integral[y * (width + 1) + x]` is the sum over `[0, x) x [0, y)`.
fn compute_integral_image(gray: &GrayImage) -> Vec<u64> {
    let (w, h) = gray.dimensions();
    let stride = (w + 1) as usize;
    let mut table = vec![0u64; stride * (h + 1) as usize];

    for y in 0..h {
        let mut row_sum: u64 = 0;
        for x in 0..w {
            row_sum += gray.get_pixel(x, y).0[0] as u64;
            let idx = (y + 1) as usize * stride + (x + 1) as usize;
            let above = y as usize * stride + (x + 1) as usize;
            table[idx] = row_sum + table[above];
        }
    }
    table
}

/// Mean over the square of `radius` around (cx, cy), clipped to the image.
fn region_mean(integral: &[u64], img_width: u32, img_height: u32, cx: u32, cy: u32, radius: u32) -> f64 {
    let stride = (img_width + 1) as usize;
    let x1 = cx.saturating_sub(radius) as usize;
    let y1 = cy.saturating_sub(radius) as usize;
    let x2 = ((cx + radius + 1) as usize).min(img_width as usize);
    let y2 = ((cy + radius + 1) as usize).min(img_height as usize);

    let area = ((x2 - x1) * (y2 - y1)) as f64;
    if area == 0.0 {
        return 128.0;
    }
    let sum = integral[y2 * stride + x2] as f64 - integral[y1 * stride + x2] as f64
        - integral[y2 * stride + x1] as f64
        + integral[y1 * stride + x1] as f64;
    sum / area
}

fn histogram(gray: &GrayImage) -> [u64; 256] {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }
    histogram
}

/// Intensities at the `low` and `high` quantiles of the histogram.
fn intensity_percentiles(gray: &GrayImage, low: f32, high: f32) -> (u8, u8) {
    let histogram = histogram(gray);
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return (0, 0);
    }
    let quantile = |q: f32| -> u8 {
        let target = ((total as f64) * q as f64).ceil().max(1.0) as u64;
        let mut cumulative = 0u64;
        for (v, &count) in histogram.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return v as u8;
            }
        }
        255
    };
    (quantile(low), quantile(high))
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn preprocessor() -> Preprocessor {
        Preprocessor::new(PreprocessConfig::default())
    }

    /// Paper with a dark square in the middle.
    fn marked_page(size: u32) -> GrayImage {
        let mut img = GrayImage::from_pixel(size, size, Luma([235u8]));
        for y in size / 3..2 * size / 3 {
            for x in size / 3..2 * size / 3 {
                img.put_pixel(x, y, Luma([30u8]));
            }
        }
        img
    }

    #[test]
    fn validate_rejects_empty_image() {
        let err = preprocessor().validate(&GrayImage::new(0, 0)).expect_err("empty");
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn validate_rejects_tiny_image() {
        let err = preprocessor()
            .validate(&GrayImage::from_pixel(10, 200, Luma([128u8])))
            .expect_err("too narrow");
        assert!(matches!(err, MarkwerkError::Preprocess { .. }));
    }

    /// A flat grey frame has nothing to threshold.
    #[test]
    fn validate_rejects_flat_image() {
        let err = preprocessor()
            .validate(&GrayImage::from_pixel(120, 120, Luma([180u8])))
            .expect_err("no contrast");
        assert!(err.to_string().contains("dynamic range"));
    }

    #[test]
    fn validate_accepts_marked_page() {
        assert!(preprocessor().validate(&marked_page(120)).is_ok());
    }

    /// CLAHE must not invent structure in a uniform image.
    #[test]
    fn clahe_keeps_uniform_image_uniform() {
        let img = GrayImage::from_pixel(256, 256, Luma([200u8]));
        let out = clahe(&img, 4, 2.5);
        let first = out.get_pixel(0, 0).0[0];
        assert!(out.pixels().all(|p| p.0[0] == first));
        assert!(first.abs_diff(200) <= 8, "uniform level drifted to {first}");
    }

    #[test]
    fn clahe_preserves_ink_order() {
        let out = clahe(&marked_page(96), 4, 2.5);
        let ink = out.get_pixel(48, 48).0[0];
        let paper = out.get_pixel(5, 5).0[0];
        assert!(ink < paper, "ink {ink} should stay darker than paper {paper}");
    }

    /// A sharp step survives bilateral smoothing while isolated noise fades.
    #[test]
    fn bilateral_preserves_edges_and_smooths_noise() {
        let mut img = GrayImage::from_pixel(40, 20, Luma([230u8]));
        for y in 0..20 {
            for x in 20..40 {
                img.put_pixel(x, y, Luma([40u8]));
            }
        }
        img.put_pixel(8, 10, Luma([200u8]));

        let out = bilateral_smooth(&img, 3, 50.0, 50.0);
        assert!(out.get_pixel(19, 10).0[0] > 200, "bright side bled");
        assert!(out.get_pixel(20, 10).0[0] < 70, "dark side bled");
        assert!(out.get_pixel(8, 10).0[0] > 215, "noise pixel not smoothed");
    }

    #[test]
    fn adaptive_mask_marks_ink_only() {
        let mask = adaptive_ink_mask(&marked_page(90), 15, 10);
        assert_eq!(mask.get_pixel(31, 31).0[0], 255, "edge of the square is ink");
        assert_eq!(mask.get_pixel(4, 4).0[0], 0, "flat paper is not ink");
    }

    #[test]
    fn otsu_splits_bimodal_histogram() {
        let threshold = otsu_level(&marked_page(90));
        assert!((30..235).contains(&threshold), "threshold {threshold}");
        let mask = threshold_ink_mask(&marked_page(90), threshold);
        assert_eq!(mask.get_pixel(45, 45).0[0], 255);
        assert_eq!(mask.get_pixel(2, 2).0[0], 0);
    }

    #[test]
    fn process_produces_matching_sizes() {
        let out = preprocessor().process(&marked_page(64));
        assert_eq!(out.gray.dimensions(), (64, 64));
        assert_eq!(out.binary.dimensions(), (64, 64));
    }

    #[test]
    fn detection_mask_uses_configured_method() {
        let config = PreprocessConfig {
            binarization: Binarization::Otsu,
            ..PreprocessConfig::default()
        };
        let mask = Preprocessor::new(config).detection_mask(&marked_page(90));
        assert_eq!(mask.get_pixel(45, 45).0[0], 255, "square interior is ink globally");
    }

    #[test]
    fn percentiles_bracket_the_histogram() {
        let (low, high) = intensity_percentiles(&marked_page(90), 0.01, 0.99);
        assert_eq!((low, high), (30, 235));
    }
}
