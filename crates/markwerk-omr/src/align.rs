// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Grid alignment: places row and column lines on a rectified region,
// correcting print drift band by band against printed grid lines.
//
// A nominal layout says where lines *should* be. Printing and paper stretch
// move them. For each band of a few cells the aligner looks for the printed
// line that closes the band, rescales the band to end there, and starts the
// next band from the corrected position. Bands whose closing line cannot be
// found keep nominal spacing and are reported as degraded.

use std::fmt;
use std::sync::Arc;

use image::GrayImage;
use markwerk_core::config::{AlignmentConfig, AxisConfig, PriorShift};
use markwerk_core::{Axis, QualityWarning};
use tracing::{debug, instrument};

use crate::layout::GridGeometry;
use crate::rectify::RectifiedGrid;

// -- Anchor strategies --------------------------------------------------------

/// Finds a printed grid line in an ink-density projection.
pub trait AnchorLocator: Send + Sync + fmt::Debug {
    /// Position of the line closest to `expected`, or `None` if there is no
    /// convincing line nearby. `pitch` is the nominal cell size on this axis.
    fn locate(&self, profile: &[f32], expected: f32, pitch: f32) -> Option<f32>;
}

/// Looks for narrow peaks ("ridges") in the projection: a grid line is
/// dense where it is and empty a little way either side, while marks and
/// labels are wide and cancel out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionRidgeLocator {
    /// Half-width of the search window as a fraction of pitch.
    pub search_window: f32,
    /// Distance to the comparison samples as a fraction of pitch.
    pub ridge_gap: f32,
    /// Smallest ridge height accepted as a line.
    pub min_ridge: f32,
}

/// Ridges within this share of the strongest count as candidates.
const STRONG_RIDGE: f32 = 0.75;

/// A located line spans the samples whose ridge is at least this share of
/// the peak.
const RUN_SHARE: f32 = 0.5;

impl ProjectionRidgeLocator {
    pub fn from_config(config: &AlignmentConfig) -> Self {
        Self {
            search_window: config.search_window,
            ridge_gap: config.ridge_gap,
            min_ridge: config.min_ridge,
        }
    }

    fn ridge(profile: &[f32], i: usize, gap: usize) -> f32 {
        let before = i.checked_sub(gap).map_or(0.0, |j| profile[j]);
        let after = profile.get(i + gap).copied().unwrap_or(0.0);
        profile[i] - before.max(after)
    }
}

impl AnchorLocator for ProjectionRidgeLocator {
    fn locate(&self, profile: &[f32], expected: f32, pitch: f32) -> Option<f32> {
        if profile.is_empty() || pitch <= 0.0 {
            return None;
        }
        let gap = ((self.ridge_gap * pitch).round() as usize).max(3);
        let window = self.search_window * pitch;
        let last = profile.len() - 1;
        let lo = (expected - window).floor().max(0.0) as usize;
        let hi = ((expected + window).ceil().max(0.0) as usize).min(last);
        if lo > hi {
            return None;
        }

        let ridges: Vec<f32> = (lo..=hi).map(|i| Self::ridge(profile, i, gap)).collect();
        let best = ridges.iter().copied().fold(f32::MIN, f32::max);
        if best < self.min_ridge {
            return None;
        }

        // Nearest strong ridge to the expected position.
        let peak = ridges
            .iter()
            .enumerate()
            .filter(|&(_, &r)| r >= best * STRONG_RIDGE)
            .map(|(k, _)| lo + k)
            .min_by(|&a, &b| (a as f32 - expected).abs().total_cmp(&(b as f32 - expected).abs()))?;

        let floor = Self::ridge(profile, peak, gap) * RUN_SHARE;
        let mut first = peak;
        while first > 0 && Self::ridge(profile, first - 1, gap) >= floor {
            first -= 1;
        }
        let mut end = peak;
        while end < last && Self::ridge(profile, end + 1, gap) >= floor {
            end += 1;
        }
        Some((first + end + 1) as f32 / 2.0)
    }
}

/// Never finds anything; every band keeps nominal spacing.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformLocator;

impl AnchorLocator for UniformLocator {
    fn locate(&self, _profile: &[f32], _expected: f32, _pitch: f32) -> Option<f32> {
        None
    }
}

// -- Axis planning ------------------------------------------------------------

/// Nominal line placement along one axis of a rectified region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisPlan {
    /// Region size along the axis.
    pub extent: f32,
    /// Header or label space before the first line.
    pub lead: f32,
    pub cells: usize,
    /// Cells per correction band; zero means uniform spacing throughout.
    pub band_size: usize,
    pub prior_shift: Option<PriorShift>,
}

impl AxisPlan {
    pub fn from_config(extent: f32, cells: usize, axis: &AxisConfig) -> Self {
        Self {
            extent,
            lead: axis.lead_fraction * extent,
            cells,
            band_size: axis.band_size,
            prior_shift: axis.prior_shift,
        }
    }

    /// Nominal cell size.
    pub fn pitch(&self) -> f32 {
        if self.cells == 0 {
            return 0.0;
        }
        (self.extent - self.lead) / self.cells as f32
    }

    /// Nominal size of each cell, including any known print shift.
    pub fn spans(&self) -> Vec<f32> {
        let pitch = self.pitch();
        (0..self.cells)
            .map(|cell| match self.prior_shift {
                Some(shift) if cell + 1 >= shift.from_line => pitch * (1.0 - shift.per_line),
                _ => pitch,
            })
            .collect()
    }

    /// Nominal line positions (`cells + 1` of them).
    pub fn nominal_lines(&self) -> Vec<f32> {
        cumulative(self.lead, &self.spans(), 1.0)
    }
}

fn cumulative(origin: f32, spans: &[f32], factor: f32) -> Vec<f32> {
    let mut lines = Vec::with_capacity(spans.len() + 1);
    let mut at = origin;
    lines.push(at);
    for span in spans {
        at += span * factor;
        lines.push(at);
    }
    lines
}

/// Line positions along one axis after drift correction.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedAxis {
    /// `cells + 1` ascending boundaries.
    pub lines: Vec<f32>,
    pub band_size: usize,
    /// Bands that fell back to nominal spacing.
    pub degraded_bands: Vec<usize>,
}

impl AlignedAxis {
    pub fn cells(&self) -> usize {
        self.lines.len().saturating_sub(1)
    }

    /// `[start, end)` of `cell`.
    pub fn span(&self, cell: usize) -> (f32, f32) {
        (self.lines[cell], self.lines[cell + 1])
    }

    pub fn is_degraded(&self, cell: usize) -> bool {
        self.band_size > 0 && self.degraded_bands.contains(&(cell / self.band_size))
    }
}

// -- Projections --------------------------------------------------------------

/// Ink share of every row, counted over columns `[x0, x1)`.
pub fn row_profile(binary: &GrayImage, x0: u32, x1: u32) -> Vec<f32> {
    let (width, height) = binary.dimensions();
    let x1 = x1.min(width);
    if x0 >= x1 {
        return vec![0.0; height as usize];
    }
    let span = (x1 - x0) as f32;
    (0..height)
        .map(|y| (x0..x1).filter(|&x| binary.get_pixel(x, y).0[0] > 0).count() as f32 / span)
        .collect()
}

/// Ink share of every column, counted over rows `[y0, y1)`.
pub fn column_profile(binary: &GrayImage, y0: u32, y1: u32) -> Vec<f32> {
    let (width, height) = binary.dimensions();
    let y1 = y1.min(height);
    if y0 >= y1 {
        return vec![0.0; width as usize];
    }
    let span = (y1 - y0) as f32;
    (0..width)
        .map(|x| (y0..y1).filter(|&y| binary.get_pixel(x, y).0[0] > 0).count() as f32 / span)
        .collect()
}

// -- Aligned grid -------------------------------------------------------------

/// Pixel rectangle of one cell, `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl CellRect {
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

/// Aligned cell boundaries for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct CellGrid {
    pub region: usize,
    pub columns: AlignedAxis,
    /// One row axis for the whole region, or one per column.
    pub rows: Vec<AlignedAxis>,
    pub warnings: Vec<QualityWarning>,
}

impl CellGrid {
    pub fn row_count(&self) -> usize {
        self.rows.first().map_or(0, AlignedAxis::cells)
    }

    pub fn column_count(&self) -> usize {
        self.columns.cells()
    }

    fn rows_for(&self, column: usize) -> &AlignedAxis {
        if self.rows.len() == 1 {
            &self.rows[0]
        } else {
            &self.rows[column]
        }
    }

    pub fn cell_rect(&self, row: usize, column: usize) -> CellRect {
        let (x0, x1) = self.columns.span(column);
        let (y0, y1) = self.rows_for(column).span(row);
        CellRect { x0, y0, x1, y1 }
    }

    /// True when either line pair bounding the cell came from a degraded band.
    pub fn is_degraded(&self, row: usize, column: usize) -> bool {
        self.columns.is_degraded(column) || self.rows_for(column).is_degraded(row)
    }
}

/// Band-wise drift correction with a pluggable anchor strategy.
#[derive(Debug, Clone)]
pub struct GridAligner {
    locator: Arc<dyn AnchorLocator>,
    max_correction: f32,
}

impl GridAligner {
    pub fn new(locator: Arc<dyn AnchorLocator>, max_correction: f32) -> Self {
        Self {
            locator,
            max_correction,
        }
    }

    /// Ridge-based aligner built from the alignment settings.
    pub fn from_config(config: &AlignmentConfig) -> Self {
        Self::new(
            Arc::new(ProjectionRidgeLocator::from_config(config)),
            config.max_correction,
        )
    }

    /// Place the lines of one axis against `profile`.
    pub fn align_axis(&self, profile: &[f32], plan: &AxisPlan) -> AlignedAxis {
        let pitch = plan.pitch();
        let spans = plan.spans();
        // A missing origin line is not a drift problem; keep the nominal lead.
        let origin = self.locator.locate(profile, plan.lead, pitch).unwrap_or(plan.lead);

        if plan.band_size == 0 {
            return AlignedAxis {
                lines: cumulative(origin, &spans, 1.0),
                band_size: 0,
                degraded_bands: Vec::new(),
            };
        }

        let mut lines = Vec::with_capacity(spans.len() + 1);
        lines.push(origin);
        let mut degraded_bands = Vec::new();
        let mut start = origin;

        for (band, chunk) in spans.chunks(plan.band_size).enumerate() {
            let expected: f32 = chunk.iter().sum();
            let factor = match self.locator.locate(profile, start + expected, pitch) {
                Some(found) if expected > 0.0 => {
                    ((found - start) / expected).clamp(1.0 - self.max_correction, 1.0 + self.max_correction)
                }
                _ => {
                    degraded_bands.push(band);
                    1.0
                }
            };
            let band_lines = cumulative(start, chunk, factor);
            lines.extend_from_slice(&band_lines[1..]);
            start = band_lines[band_lines.len() - 1];
        }

        AlignedAxis {
            lines,
            band_size: plan.band_size,
            degraded_bands,
        }
    }

    /// Align the full grid of one rectified region.
    #[instrument(skip_all, fields(region = grid.index))]
    pub fn align(&self, grid: &RectifiedGrid, geometry: &GridGeometry) -> CellGrid {
        let width = grid.width();
        let height = grid.height();
        let column_plan = AxisPlan::from_config(width as f32, geometry.column_cells, &geometry.columns);
        let row_plan = AxisPlan::from_config(height as f32, geometry.row_cells, &geometry.rows);

        let below_header = row_plan.lead.round().max(0.0) as u32;
        let columns = self.align_axis(&column_profile(&grid.binary, below_header, height), &column_plan);

        let mut warnings: Vec<QualityWarning> = columns
            .degraded_bands
            .iter()
            .map(|&band| QualityWarning::AlignmentDegraded {
                region: grid.index,
                axis: Axis::Columns,
                band,
                ladder: None,
            })
            .collect();

        let rows = if geometry.rows_per_column {
            (0..columns.cells())
                .map(|ladder| {
                    let (x0, x1) = columns.span(ladder);
                    let profile = row_profile(&grid.binary, pixel(x0), pixel(x1));
                    let axis = self.align_axis(&profile, &row_plan);
                    warnings.extend(axis.degraded_bands.iter().map(|&band| {
                        QualityWarning::AlignmentDegraded {
                            region: grid.index,
                            axis: Axis::Rows,
                            band,
                            ladder: Some(ladder),
                        }
                    }));
                    axis
                })
                .collect()
        } else {
            let x0 = columns.lines[0];
            let x1 = columns.lines[columns.cells()];
            let axis = self.align_axis(&row_profile(&grid.binary, pixel(x0), pixel(x1)), &row_plan);
            warnings.extend(axis.degraded_bands.iter().map(|&band| QualityWarning::AlignmentDegraded {
                region: grid.index,
                axis: Axis::Rows,
                band,
                ladder: None,
            }));
            vec![axis]
        };

        debug!(warnings = warnings.len(), "Grid aligned");
        CellGrid {
            region: grid.index,
            columns,
            rows,
            warnings,
        }
    }
}

fn pixel(at: f32) -> u32 {
    at.round().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    const EXTENT: f32 = 450.0;
    const CELLS: usize = 10;

    fn drift_plan() -> AxisPlan {
        AxisPlan {
            extent: EXTENT,
            lead: 0.2 * EXTENT,
            cells: CELLS,
            band_size: 2,
            prior_shift: None,
        }
    }

    fn ridge_aligner() -> GridAligner {
        GridAligner::from_config(&AlignmentConfig::default())
    }

    /// Printed line positions with a bowed drift of strength `s`: zero at
    /// both ends, largest mid-grid.
    fn drifted_lines(s: f32) -> Vec<f32> {
        let pitch = drift_plan().pitch();
        (0..=CELLS)
            .map(|k| {
                let k = k as f32;
                90.0 + pitch * k + (s * pitch * k * (k - CELLS as f32) / CELLS as f32).round()
            })
            .collect()
    }

    /// Two-pixel full-width lines centred on each boundary.
    fn lined_image(lines: &[f32]) -> GrayImage {
        let mut img = GrayImage::new(100, 480);
        for &line in lines {
            let y = line.round() as u32;
            for row in [y - 1, y] {
                for x in 0..100 {
                    img.put_pixel(x, row, Luma([255u8]));
                }
            }
        }
        img
    }

    fn total_error(found: &[f32], truth: &[f32]) -> f32 {
        found.iter().zip(truth).map(|(a, b)| (a - b).abs()).sum()
    }

    #[test]
    fn pitch_accounts_for_lead() {
        let plan = drift_plan();
        assert!((plan.pitch() - 36.0).abs() < 1e-4);
        let lines = plan.nominal_lines();
        assert_eq!(lines.len(), 11);
        assert!((lines[10] - EXTENT).abs() < 1e-3);
    }

    #[test]
    fn prior_shift_shortens_later_cells() {
        let plan = AxisPlan {
            prior_shift: Some(PriorShift {
                from_line: 5,
                per_line: 0.025,
            }),
            ..drift_plan()
        };
        let spans = plan.spans();
        assert!((spans[3] - 36.0).abs() < 1e-4);
        assert!((spans[4] - 36.0 * 0.975).abs() < 1e-4, "cell ending on line 5 is shifted");
        assert!(plan.nominal_lines()[10] < EXTENT);
    }

    /// Drift correction is never worse than uniform spacing, and strictly
    /// better once the drift is visible.
    #[test]
    fn drift_correction_beats_uniform_spacing() {
        let plan = drift_plan();
        let uniform = GridAligner::new(Arc::new(UniformLocator), 0.15);
        for s in [0.0f32, 0.01, -0.01, 0.02, -0.02, 0.03, -0.03, 0.04, -0.04] {
            let truth = drifted_lines(s);
            let profile = row_profile(&lined_image(&truth), 0, 100);

            let corrected = ridge_aligner().align_axis(&profile, &plan);
            let nominal = uniform.align_axis(&profile, &plan);
            let corrected_err = total_error(&corrected.lines, &truth);
            let uniform_err = total_error(&nominal.lines, &truth);

            assert!(
                corrected_err <= uniform_err + 1e-3,
                "s = {s}: corrected {corrected_err} vs uniform {uniform_err}"
            );
            if s.abs() >= 0.02 {
                assert!(corrected_err < uniform_err, "s = {s}: no improvement");
            }
            assert!(corrected.degraded_bands.is_empty(), "s = {s}: lines should be found");
        }
    }

    /// A uniformly stretched print (linear skew) is absorbed band by band.
    #[test]
    fn linear_skew_is_absorbed() {
        let plan = drift_plan();
        let uniform = GridAligner::new(Arc::new(UniformLocator), 0.15);
        for s in [0.01f32, -0.01, 0.02, -0.02, 0.04, -0.04] {
            let truth: Vec<f32> = (0..=CELLS)
                .map(|k| (90.0 + plan.pitch() * k as f32 * (1.0 + s)).round())
                .collect();
            let profile = row_profile(&lined_image(&truth), 0, 100);

            let corrected = total_error(&ridge_aligner().align_axis(&profile, &plan).lines, &truth);
            let nominal = total_error(&uniform.align_axis(&profile, &plan).lines, &truth);
            assert!(corrected < nominal, "s = {s}: corrected {corrected} vs uniform {nominal}");
            assert!(corrected <= CELLS as f32 * 0.5, "s = {s}: residual {corrected}");
        }
    }

    #[test]
    fn missing_band_line_falls_back_and_is_reported() {
        let plan = drift_plan();
        let mut truth = drifted_lines(0.0);
        // Drop the line closing band 2 (boundary 6).
        truth.remove(6);
        let profile = row_profile(&lined_image(&truth), 0, 100);
        let axis = ridge_aligner().align_axis(&profile, &plan);
        assert_eq!(axis.degraded_bands, vec![2]);
        assert!(axis.is_degraded(4) && axis.is_degraded(5));
        assert!(!axis.is_degraded(6));
        assert!((axis.lines[6] - 306.0).abs() < 1e-3, "band keeps nominal spacing");
    }

    #[test]
    fn uniform_bands_never_degrade() {
        let plan = AxisPlan {
            band_size: 0,
            ..drift_plan()
        };
        let axis = ridge_aligner().align_axis(&vec![0.0; 460], &plan);
        assert!(axis.degraded_bands.is_empty());
        assert_eq!(axis.lines, plan.nominal_lines());
    }

    /// A wide dark block (a filled bubble or label) is not mistaken for a
    /// line.
    #[test]
    fn wide_blocks_are_not_ridges() {
        let mut profile = vec![0.0f32; 200];
        for p in &mut profile[80..120] {
            *p = 0.9;
        }
        let locator = ProjectionRidgeLocator::from_config(&AlignmentConfig::default());
        assert_eq!(locator.locate(&profile, 100.0, 40.0), None);

        profile[60] = 1.0;
        profile[61] = 1.0;
        assert_eq!(locator.locate(&profile, 65.0, 40.0), Some(61.0));
    }

    #[test]
    fn nearest_strong_ridge_wins() {
        let mut profile = vec![0.0f32; 100];
        profile[40] = 0.95;
        profile[50] = 1.0;
        let locator = ProjectionRidgeLocator {
            search_window: 0.5,
            ridge_gap: 0.1,
            min_ridge: 0.4,
        };
        assert_eq!(locator.locate(&profile, 42.0, 40.0), Some(40.5));
    }

    #[test]
    fn profiles_measure_ink_share() {
        let mut img = GrayImage::new(10, 4);
        for x in 0..5 {
            img.put_pixel(x, 1, Luma([255u8]));
        }
        let rows = row_profile(&img, 0, 10);
        assert_eq!(rows, vec![0.0, 0.5, 0.0, 0.0]);
        let cols = column_profile(&img, 0, 4);
        assert_eq!(cols[0], 0.25);
        assert_eq!(cols[9], 0.0);
        assert_eq!(row_profile(&img, 6, 6), vec![0.0; 4]);
    }
}
