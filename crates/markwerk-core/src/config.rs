// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Grading configuration. Every empirically tuned constant of the pipeline
// lives here so it can be calibrated against reference sheets without a
// rebuild. Partial JSON files override only the fields they name.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MarkwerkError, Result};
use crate::types::{GridTopology, Layout};

/// Complete grading configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GradingConfig {
    pub preprocess: PreprocessConfig,
    pub detection: DetectionConfig,
    pub alignment: AlignmentConfig,
    pub sampling: SamplingConfig,
    pub scoring: ScoringConfig,
    /// Multiple-choice section.
    pub p1: MultipleChoiceConfig,
    /// True/false section.
    pub p2: TrueFalseConfig,
    /// Decimal-entry section.
    pub p3: NumericConfig,
}

/// Contrast enhancement, smoothing and binarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// CLAHE clip limit, as a multiple of the mean histogram bin height.
    pub clahe_clip_limit: f32,
    /// CLAHE tiles along each axis.
    pub clahe_tiles: u32,
    /// Bilateral filter radius in pixels (kernel is `2r + 1` wide).
    pub bilateral_radius: u32,
    /// Bilateral intensity sigma.
    pub bilateral_sigma_color: f32,
    /// Bilateral spatial sigma.
    pub bilateral_sigma_space: f32,
    /// How the ink mask is thresholded.
    pub binarization: Binarization,
    /// Adaptive threshold neighbourhood radius.
    pub block_radius: u32,
    /// Offset subtracted from the local mean before thresholding.
    pub threshold_offset: i32,
    /// Gaussian sigma for the sheet-level detection pass.
    pub detection_blur_sigma: f32,
    /// Smallest accepted image side in pixels.
    pub min_dimension: u32,
    /// Smallest accepted spread between the 1st and 99th intensity percentiles.
    pub min_dynamic_range: u8,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            clahe_clip_limit: 2.5,
            clahe_tiles: 8,
            bilateral_radius: 3,
            bilateral_sigma_color: 50.0,
            bilateral_sigma_space: 50.0,
            binarization: Binarization::AdaptiveMean,
            block_radius: 15,
            threshold_offset: 10,
            detection_blur_sigma: 1.0,
            min_dimension: 32,
            min_dynamic_range: 24,
        }
    }
}

/// Thresholding method for the ink mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Binarization {
    /// Local mean over `block_radius`, minus `threshold_offset`.
    AdaptiveMean,
    /// One global threshold from the histogram (Otsu).
    Otsu,
}

/// Contour filtering for region detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Douglas-Peucker tolerance as a fraction of the contour perimeter.
    pub approx_epsilon: f32,
    /// Smallest quadrilateral area in pixels accepted as non-degenerate.
    pub min_quad_area: f32,
    /// Rows of regions whose centres lie within this fraction of the median
    /// region height are treated as one row.
    pub row_tolerance: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            approx_epsilon: 0.02,
            min_quad_area: 400.0,
            row_tolerance: 0.5,
        }
    }
}

/// Drift correction parameters shared by all layouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Anchor search half-window as a fraction of the pitch.
    pub search_window: f32,
    /// Largest accepted deviation of a band's spacing factor from 1.
    pub max_correction: f32,
    /// Minimum ridge height (ink fraction) for a printed grid line.
    pub min_ridge: f32,
    /// Ridge comparison offset as a fraction of the pitch (at least 3 px).
    pub ridge_gap: f32,
    /// Confidence multiplier for cells in a band that fell back to uniform
    /// spacing.
    pub degraded_penalty: f32,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            search_window: 0.3,
            max_correction: 0.15,
            min_ridge: 0.4,
            ridge_gap: 0.15,
            degraded_penalty: 0.9,
        }
    }
}

/// Patch extraction margins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Inset on each side as a fraction of the cell size.
    pub margin_fraction: f32,
    /// Minimum inset in pixels.
    pub min_margin_px: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            margin_fraction: 0.08,
            min_margin_px: 2,
        }
    }
}

/// Mark scoring and answer acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight of the darkness signal in the blended confidence.
    pub darkness_weight: f32,
    /// Weight of the fill signal in the blended confidence.
    pub fill_weight: f32,
    /// Percentile of cell means taken as the region's paper background. The
    /// complementary percentile of cell fills is the unmarked baseline.
    pub background_percentile: f32,
    /// Patches with fewer pixels score zero.
    pub min_patch_pixels: u32,
    /// Minimum blended confidence for a cell to count as marked.
    pub confidence_floor: f32,
    /// Runner-up within this distance of the winner flags the entry ambiguous.
    pub ambiguity_margin: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            darkness_weight: 0.5,
            fill_weight: 0.5,
            background_percentile: 0.75,
            min_patch_pixels: 9,
            confidence_floor: 0.10,
            ambiguity_margin: 0.05,
        }
    }
}

/// Accepted region area as fractions of the source image area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaBand {
    pub min_fraction: f32,
    pub max_fraction: f32,
}

impl AreaBand {
    pub fn contains(&self, area: f32, image_area: f32) -> bool {
        let fraction = area / image_area.max(1.0);
        fraction >= self.min_fraction && fraction <= self.max_fraction
    }
}

/// Calibrated shortening of rows from a given grid line onward, as a fraction
/// of the pitch per row. Seeds the expected positions before anchors refine
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorShift {
    pub from_line: usize,
    pub per_line: f32,
}

/// Geometry of one grid axis inside a rectified region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Leading fraction of the axis without answers (header or label column).
    pub lead_fraction: f32,
    /// Cells per drift-correction band. Zero keeps uniform spacing.
    pub band_size: usize,
    #[serde(default)]
    pub prior_shift: Option<PriorShift>,
}

/// Detection and canonical geometry of a layout's regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Area band for every region of the layout.
    pub area_band: AreaBand,
    /// Optional per-region bands, checked after ordering.
    #[serde(default)]
    pub region_bands: Vec<AreaBand>,
    /// Rectified width after rotation.
    pub canonical_width: u32,
    /// Rectified height after rotation.
    pub canonical_height: u32,
}

/// Multiple-choice section (four blocks of ten questions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultipleChoiceConfig {
    pub region: RegionConfig,
    pub rows: AxisConfig,
    pub columns: AxisConfig,
    /// Per-region map from printed column to option index.
    pub column_remap: Vec<[usize; 4]>,
}

impl Default for MultipleChoiceConfig {
    fn default() -> Self {
        Self {
            region: RegionConfig {
                area_band: AreaBand {
                    min_fraction: 0.02,
                    max_fraction: 0.30,
                },
                region_bands: Vec::new(),
                canonical_width: 300,
                canonical_height: 440,
            },
            rows: AxisConfig {
                lead_fraction: 0.09,
                band_size: 2,
                prior_shift: Some(PriorShift {
                    from_line: 5,
                    per_line: 0.025,
                }),
            },
            columns: AxisConfig {
                lead_fraction: 0.15,
                band_size: 2,
                prior_shift: None,
            },
            // Blocks two and three are printed with their options reflected.
            column_remap: vec![[0, 1, 2, 3], [3, 2, 1, 0], [3, 2, 1, 0], [0, 1, 2, 3]],
        }
    }
}

/// True/false section (eight cells of four sub-parts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrueFalseConfig {
    pub region: RegionConfig,
    pub rows: AxisConfig,
    pub columns: AxisConfig,
}

impl Default for TrueFalseConfig {
    fn default() -> Self {
        Self {
            region: RegionConfig {
                area_band: AreaBand {
                    min_fraction: 0.01,
                    max_fraction: 0.20,
                },
                region_bands: Vec::new(),
                canonical_width: 200,
                canonical_height: 240,
            },
            rows: AxisConfig {
                lead_fraction: 0.32,
                band_size: 0,
                prior_shift: None,
            },
            columns: AxisConfig {
                lead_fraction: 0.15,
                band_size: 0,
                prior_shift: None,
            },
        }
    }
}

/// Decimal-entry section (one block of digit ladders).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericConfig {
    pub region: RegionConfig,
    pub rows: AxisConfig,
    pub columns: AxisConfig,
    /// Digit positions (ladder columns) per question.
    pub positions: usize,
}

impl Default for NumericConfig {
    fn default() -> Self {
        Self {
            region: RegionConfig {
                area_band: AreaBand {
                    min_fraction: 0.10,
                    max_fraction: 0.95,
                },
                region_bands: Vec::new(),
                canonical_width: 1000,
                canonical_height: 420,
            },
            rows: AxisConfig {
                lead_fraction: 0.08,
                band_size: 3,
                prior_shift: None,
            },
            columns: AxisConfig {
                lead_fraction: 0.15,
                band_size: 4,
                prior_shift: None,
            },
            positions: 4,
        }
    }
}

/// Questions in the decimal-entry section.
pub const NUMERIC_QUESTIONS: usize = 8;

impl GradingConfig {
    /// Parse a (possibly partial) JSON configuration and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Region detection and canonical geometry for `layout`.
    pub fn region(&self, layout: Layout) -> &RegionConfig {
        match layout {
            Layout::P1 => &self.p1.region,
            Layout::P2 => &self.p2.region,
            Layout::P3 => &self.p3.region,
        }
    }

    /// Row and column axis geometry for `layout`.
    pub fn axes(&self, layout: Layout) -> (AxisConfig, AxisConfig) {
        match layout {
            Layout::P1 => (self.p1.rows, self.p1.columns),
            Layout::P2 => (self.p2.rows, self.p2.columns),
            Layout::P3 => (self.p3.rows, self.p3.columns),
        }
    }

    pub fn topology(&self, layout: Layout) -> GridTopology {
        let columns = match layout {
            Layout::P1 => 4,
            Layout::P2 => 2,
            Layout::P3 => NUMERIC_QUESTIONS * self.p3.positions,
        };
        GridTopology {
            layout,
            regions: layout.region_count(),
            rows: layout.rows_per_region(),
            columns,
        }
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(MarkwerkError::InvalidConfig(msg));

        let scoring = &self.scoring;
        if scoring.darkness_weight < 0.0 || scoring.fill_weight < 0.0 {
            return invalid("blend weights must be non-negative".into());
        }
        if scoring.darkness_weight + scoring.fill_weight <= 0.0 {
            return invalid("blend weights must not both be zero".into());
        }
        if !(0.0..=1.0).contains(&scoring.confidence_floor) {
            return invalid(format!(
                "confidence floor {} outside [0, 1]",
                scoring.confidence_floor
            ));
        }
        if !(0.5..=1.0).contains(&scoring.background_percentile) {
            return invalid(format!(
                "background percentile {} outside [0.5, 1]",
                scoring.background_percentile
            ));
        }
        if self.preprocess.clahe_tiles == 0 {
            return invalid("CLAHE needs at least one tile".into());
        }
        if self.preprocess.block_radius == 0 {
            return invalid("binarization block radius must be positive".into());
        }
        if !(0.0..0.5).contains(&self.sampling.margin_fraction) {
            return invalid("sampling margin must be below half a cell".into());
        }
        if !(0.0..1.0).contains(&self.alignment.max_correction) {
            return invalid("max correction must lie in [0, 1)".into());
        }
        if self.p3.positions == 0 {
            return invalid("decimal entry needs at least one position".into());
        }
        if self.p1.column_remap.len() != Layout::P1.region_count() {
            return invalid(format!(
                "column remap needs {} rows, got {}",
                Layout::P1.region_count(),
                self.p1.column_remap.len()
            ));
        }
        for (region, map) in self.p1.column_remap.iter().enumerate() {
            let mut seen = [false; 4];
            for &option in map {
                if option >= 4 || seen[option] {
                    return invalid(format!("column remap for region {region} is not a permutation"));
                }
                seen[option] = true;
            }
        }

        for layout in Layout::ALL {
            let region = self.region(layout);
            if region.canonical_width < 16 || region.canonical_height < 16 {
                return invalid(format!("{layout} canonical size is too small"));
            }
            let band = region.area_band;
            if band.min_fraction < 0.0 || band.min_fraction >= band.max_fraction {
                return invalid(format!("{layout} area band is empty"));
            }
            if !region.region_bands.is_empty() && region.region_bands.len() != layout.region_count() {
                return invalid(format!(
                    "{layout} needs {} per-region bands, got {}",
                    layout.region_count(),
                    region.region_bands.len()
                ));
            }
            let (rows, columns) = self.axes(layout);
            for axis in [rows, columns] {
                if !(0.0..0.9).contains(&axis.lead_fraction) {
                    return invalid(format!("{layout} lead fraction {} outside [0, 0.9)", axis.lead_fraction));
                }
            }
        }

        Ok(())
    }
}
