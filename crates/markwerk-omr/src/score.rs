// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bubble scoring: turns sampled cell patches into mark confidences relative
// to the region's own paper and ink levels.

use markwerk_core::config::ScoringConfig;
use markwerk_core::{CellCoordinate, CellScore};
use tracing::{debug, instrument};

use crate::sample::CellPatch;

/// A scored cell with its position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCell {
    pub coordinate: CellCoordinate,
    pub score: CellScore,
    pub degraded: bool,
}

/// Every cell of one region, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRegion {
    pub index: usize,
    pub rows: usize,
    pub columns: usize,
    pub cells: Vec<ScoredCell>,
}

impl ScoredRegion {
    pub fn cell(&self, row: usize, column: usize) -> &ScoredCell {
        &self.cells[row * self.columns + column]
    }

    /// Confidences along one row.
    pub fn row_confidences(&self, row: usize) -> Vec<f32> {
        (0..self.columns).map(|c| self.cell(row, c).score.confidence).collect()
    }

    /// Confidences down one column.
    pub fn column_confidences(&self, column: usize) -> Vec<f32> {
        (0..self.rows).map(|r| self.cell(r, column).score.confidence).collect()
    }
}

/// Raw patch measurements before normalisation.
#[derive(Debug, Clone, Copy)]
struct Measurement {
    mean: f32,
    fill: f32,
    degenerate: bool,
}

/// Blends relative darkness and ink fill into one confidence per cell.
#[derive(Debug, Clone)]
pub struct BubbleScorer {
    config: ScoringConfig,
    degraded_penalty: f32,
}

impl BubbleScorer {
    pub fn new(config: ScoringConfig, degraded_penalty: f32) -> Self {
        Self {
            config,
            degraded_penalty,
        }
    }

    /// Score `patches` (row-major, `rows` x `columns`) of region `index`.
    ///
    /// The paper level is a high percentile of cell means and the unmarked
    /// ink level a low percentile of cell fills, so both adapt to lighting
    /// and print weight of the region at hand.
    #[instrument(skip(self, patches), fields(cells = patches.len()))]
    pub fn score(&self, index: usize, rows: usize, columns: usize, patches: &[CellPatch]) -> ScoredRegion {
        let measurements: Vec<Measurement> = patches.iter().map(|p| self.measure(p)).collect();

        let mut means: Vec<f32> = measurements.iter().filter(|m| !m.degenerate).map(|m| m.mean).collect();
        let mut fills: Vec<f32> = measurements.iter().filter(|m| !m.degenerate).map(|m| m.fill).collect();
        let background = percentile(&mut means, self.config.background_percentile).unwrap_or(255.0);
        let baseline = percentile(&mut fills, 1.0 - self.config.background_percentile).unwrap_or(0.0);
        debug!(background, baseline, "Region levels");

        let total = self.config.darkness_weight + self.config.fill_weight;
        let (wd, wf) = if total > 0.0 {
            (self.config.darkness_weight / total, self.config.fill_weight / total)
        } else {
            (0.5, 0.5)
        };

        let cells = patches
            .iter()
            .zip(&measurements)
            .map(|(patch, m)| {
                let score = if m.degenerate {
                    CellScore {
                        degenerate: true,
                        ..CellScore::default()
                    }
                } else {
                    let darkness = if background > 0.0 {
                        ((background - m.mean) / background).clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    let fill = if baseline < 1.0 {
                        ((m.fill - baseline) / (1.0 - baseline)).clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    let mut confidence = wd * darkness + wf * fill;
                    if patch.degraded {
                        confidence *= self.degraded_penalty;
                    }
                    CellScore {
                        darkness,
                        fill,
                        confidence,
                        degenerate: false,
                    }
                };
                ScoredCell {
                    coordinate: patch.coordinate,
                    score,
                    degraded: patch.degraded,
                }
            })
            .collect();

        ScoredRegion {
            index,
            rows,
            columns,
            cells,
        }
    }

    fn measure(&self, patch: &CellPatch) -> Measurement {
        let count = patch.pixel_count();
        if count < self.config.min_patch_pixels.max(1) {
            return Measurement {
                mean: 0.0,
                fill: 0.0,
                degenerate: true,
            };
        }
        let sum: u64 = patch.gray.pixels().map(|p| p.0[0] as u64).sum();
        let ink = patch.binary.pixels().filter(|p| p.0[0] > 0).count();
        Measurement {
            mean: sum as f32 / count as f32,
            fill: ink as f32 / count as f32,
            degenerate: false,
        }
    }
}

/// Linear-interpolated percentile (`q` in `[0, 1]`). Sorts `values` in place.
pub fn percentile(values: &mut [f32], q: f32) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f32::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (values.len() - 1) as f32;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let t = pos - lo as f32;
    Some(values[lo] + (values[hi] - values[lo]) * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn patch(column: usize, gray: u8, ink_pixels: u32, degraded: bool) -> CellPatch {
        let mut binary = GrayImage::new(10, 10);
        for i in 0..ink_pixels {
            binary.put_pixel(i % 10, i / 10, Luma([255u8]));
        }
        CellPatch {
            coordinate: CellCoordinate {
                region: 0,
                row: 0,
                column,
            },
            gray: GrayImage::from_pixel(10, 10, Luma([gray])),
            binary,
            degraded,
        }
    }

    fn scorer() -> BubbleScorer {
        BubbleScorer::new(ScoringConfig::default(), 0.9)
    }

    #[test]
    fn percentile_interpolates() {
        let mut v = vec![4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&mut v, 0.0), Some(1.0));
        assert_eq!(percentile(&mut v, 1.0), Some(4.0));
        assert_eq!(percentile(&mut v, 0.5), Some(2.5));
        assert_eq!(percentile(&mut [], 0.5), None);
    }

    /// One dark, well-filled cell among plain ones scores clearly higher;
    /// plain cells score zero.
    #[test]
    fn marked_cell_stands_out() {
        let patches = vec![
            patch(0, 240, 8, false),
            patch(1, 120, 60, false),
            patch(2, 240, 8, false),
            patch(3, 240, 8, false),
        ];
        let region = scorer().score(0, 1, 4, &patches);
        let conf = region.row_confidences(0);
        assert!(conf[1] > 0.4, "marked confidence {}", conf[1]);
        assert_eq!(conf[0], 0.0);
        assert_eq!(conf[3], 0.0);
        assert!(region.cell(0, 1).score.darkness > 0.45);
    }

    #[test]
    fn degraded_cells_are_penalised() {
        let clean = scorer().score(0, 1, 4, &[
            patch(0, 240, 8, false),
            patch(1, 120, 60, false),
            patch(2, 240, 8, false),
            patch(3, 240, 8, false),
        ]);
        let degraded = scorer().score(0, 1, 4, &[
            patch(0, 240, 8, false),
            patch(1, 120, 60, true),
            patch(2, 240, 8, false),
            patch(3, 240, 8, false),
        ]);
        let a = clean.cell(0, 1).score.confidence;
        let b = degraded.cell(0, 1).score.confidence;
        assert!((b - a * 0.9).abs() < 1e-6);
        assert!(degraded.cell(0, 1).degraded);
    }

    #[test]
    fn tiny_patches_are_degenerate() {
        let mut tiny = patch(1, 0, 0, false);
        tiny.gray = GrayImage::new(2, 2);
        tiny.binary = GrayImage::new(2, 2);
        let region = scorer().score(0, 1, 2, &[patch(0, 240, 0, false), tiny]);
        let cell = region.cell(0, 1);
        assert!(cell.score.degenerate);
        assert_eq!(cell.score.confidence, 0.0);
    }

    #[test]
    fn column_confidences_walk_down() {
        let patches: Vec<CellPatch> = (0..3)
            .map(|row| {
                let mut p = patch(0, if row == 2 { 100 } else { 240 }, 0, false);
                p.coordinate.row = row;
                p
            })
            .collect();
        let region = scorer().score(0, 3, 1, &patches);
        let col = region.column_confidences(0);
        assert_eq!(col.len(), 3);
        assert!(col[2] > col[0]);
    }
}
