// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cell sampling: cuts the interior of every aligned cell out of a rectified
// region, clear of the printed grid lines.

use image::{GrayImage, imageops};
use markwerk_core::CellCoordinate;
use markwerk_core::config::SamplingConfig;

use crate::align::{CellGrid, CellRect};
use crate::rectify::RectifiedGrid;

/// Interior pixels of one cell.
#[derive(Debug, Clone)]
pub struct CellPatch {
    pub coordinate: CellCoordinate,
    pub gray: GrayImage,
    pub binary: GrayImage,
    /// The cell's boundaries came from a band without a located anchor.
    pub degraded: bool,
}

impl CellPatch {
    pub fn pixel_count(&self) -> u32 {
        self.gray.width() * self.gray.height()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CellSampler {
    margin_fraction: f32,
    min_margin_px: u32,
}

impl CellSampler {
    pub fn new(config: &SamplingConfig) -> Self {
        Self {
            margin_fraction: config.margin_fraction,
            min_margin_px: config.min_margin_px,
        }
    }

    /// Patches for every cell of `cells`, row-major.
    pub fn sample(&self, grid: &RectifiedGrid, cells: &CellGrid) -> Vec<CellPatch> {
        let mut patches = Vec::with_capacity(cells.row_count() * cells.column_count());
        for row in 0..cells.row_count() {
            for column in 0..cells.column_count() {
                let (x, y, w, h) = self.window(cells.cell_rect(row, column), grid.width(), grid.height());
                patches.push(CellPatch {
                    coordinate: CellCoordinate {
                        region: grid.index,
                        row,
                        column,
                    },
                    gray: imageops::crop_imm(&grid.gray, x, y, w, h).to_image(),
                    binary: imageops::crop_imm(&grid.binary, x, y, w, h).to_image(),
                    degraded: cells.is_degraded(row, column),
                });
            }
        }
        patches
    }

    /// Shrink `rect` by the margin on every side and clamp it to the image.
    /// Returns `(x, y, width, height)`; empty when nothing is left.
    pub fn window(&self, rect: CellRect, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let mx = self.margin(rect.width());
        let my = self.margin(rect.height());
        let x0 = (rect.x0 + mx).ceil().clamp(0.0, width as f32) as u32;
        let x1 = (rect.x1 - mx).floor().clamp(0.0, width as f32) as u32;
        let y0 = (rect.y0 + my).ceil().clamp(0.0, height as f32) as u32;
        let y1 = (rect.y1 - my).floor().clamp(0.0, height as f32) as u32;
        (x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }

    fn margin(&self, size: f32) -> f32 {
        (self.margin_fraction * size).max(self.min_margin_px as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler() -> CellSampler {
        CellSampler::new(&SamplingConfig::default())
    }

    #[test]
    fn window_shrinks_by_margin() {
        let rect = CellRect {
            x0: 100.0,
            y0: 40.0,
            x1: 150.0,
            y1: 80.0,
        };
        // 8% of 50 = 4px, 8% of 40 = 3.2px.
        assert_eq!(sampler().window(rect, 300, 300), (104, 44, 42, 32));
    }

    /// Small cells still lose at least the minimum margin.
    #[test]
    fn minimum_margin_applies_to_small_cells() {
        let rect = CellRect {
            x0: 0.0,
            y0: 0.0,
            x1: 10.0,
            y1: 10.0,
        };
        assert_eq!(sampler().window(rect, 50, 50), (2, 2, 6, 6));
    }

    #[test]
    fn window_is_clamped_and_may_be_empty() {
        let outside = CellRect {
            x0: 290.0,
            y0: 10.0,
            x1: 340.0,
            y1: 40.0,
        };
        let (x, _, w, _) = sampler().window(outside, 300, 300);
        assert_eq!(x + w, 300);

        let sliver = CellRect {
            x0: 10.0,
            y0: 10.0,
            x1: 13.0,
            y1: 40.0,
        };
        let (_, _, w, _) = sampler().window(sliver, 300, 300);
        assert_eq!(w, 0);
    }
}
