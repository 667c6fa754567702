// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reference sheet rendering: draws clean answer sheets with a known answer
// key, for tests, benchmarks and calibrating a deployment.

use image::{GrayImage, Luma, imageops};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut};
use imageproc::rect::Rect;
use markwerk_core::config::{GradingConfig, NUMERIC_QUESTIONS};
use markwerk_core::error::{MarkwerkError, Result};
use markwerk_core::{CellCoordinate, Layout};
use serde::{Deserialize, Serialize};

use crate::align::AxisPlan;
use crate::assemble::LADDER_SYMBOLS;
use crate::layout::LayoutProfile;

const PAPER: Luma<u8> = Luma([255u8]);
const INK: Luma<u8> = Luma([30u8]);
const BORDER_PX: u32 = 3;
const BUBBLE_RADIUS: f32 = 0.34;
const STRAY_RADIUS: i32 = 2;

const OPTIONS: [char; 4] = ['A', 'B', 'C', 'D'];

/// What a rendered sheet should read as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entries", rename_all = "snake_case")]
pub enum AnswerKey {
    /// One entry per question, `None` left blank.
    MultipleChoice(Vec<Option<char>>),
    /// Cell-major: entry `4 * cell + sub_part`.
    TrueFalse(Vec<Option<bool>>),
    /// One string per question; a space leaves that ladder blank.
    Numeric(Vec<String>),
}

impl AnswerKey {
    pub fn layout(&self) -> Layout {
        match self {
            Self::MultipleChoice(_) => Layout::P1,
            Self::TrueFalse(_) => Layout::P2,
            Self::Numeric(_) => Layout::P3,
        }
    }

    /// A fixed key exercising every option, blanks included.
    pub fn sample(layout: Layout) -> Self {
        match layout {
            Layout::P1 => Self::MultipleChoice(
                (0..40)
                    .map(|q| match (q * 7 + 3) % 5 {
                        4 => None,
                        o => Some(OPTIONS[o]),
                    })
                    .collect(),
            ),
            Layout::P2 => Self::TrueFalse(
                (0..32)
                    .map(|i| match (i * 5 + 1) % 3 {
                        0 => Some(true),
                        1 => Some(false),
                        _ => None,
                    })
                    .collect(),
            ),
            Layout::P3 => Self::Numeric(
                ["-1,5", "42", "2,75", "", "0,5", "-7", "2024", "1,25"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
        }
    }
}

/// Draws sheets in the printed form the grader expects: outlined blocks,
/// turned a quarter clockwise, laid out on a white page.
#[derive(Debug, Clone)]
pub struct SheetRenderer {
    config: GradingConfig,
    profile: LayoutProfile,
    strays: Vec<CellCoordinate>,
    row_drift: f32,
}

impl SheetRenderer {
    pub fn new(config: &GradingConfig, layout: Layout) -> Self {
        Self {
            config: config.clone(),
            profile: LayoutProfile::from_config(config, layout),
            strays: Vec::new(),
            row_drift: 0.0,
        }
    }

    /// Add small specks (too little ink to count as a mark) in the given
    /// printed cells.
    pub fn with_stray_marks(mut self, cells: impl IntoIterator<Item = CellCoordinate>) -> Self {
        self.strays.extend(cells);
        self
    }

    /// Print row lines with drifting spacing: cells near the header are
    /// stretched by `amount` (0.06 = 6%), cells near the bottom squeezed by
    /// the same share, and the first and last lines stay put.
    pub fn with_row_drift(mut self, amount: f32) -> Self {
        self.row_drift = amount;
        self
    }

    /// Printed block size before rotation, `(width, height)`.
    pub fn block_size(&self) -> (u32, u32) {
        let (w, h) = self.profile.canonical_size();
        (h, w)
    }

    fn arrangement(&self) -> (u32, u32) {
        match self.profile.layout {
            Layout::P1 => (1, 40),
            Layout::P2 => (4, 30),
            Layout::P3 => (1, 50),
        }
    }

    pub fn sheet_size(&self) -> (u32, u32) {
        let (columns, gap) = self.arrangement();
        let rows = (self.profile.topology.regions as u32).div_ceil(columns);
        let (w, h) = self.block_size();
        (columns * w + (columns + 1) * gap, rows * h + (rows + 1) * gap)
    }

    /// Top-left corner of block `index` on the sheet.
    pub fn block_origin(&self, index: usize) -> (u32, u32) {
        let (columns, gap) = self.arrangement();
        let (w, h) = self.block_size();
        let col = index as u32 % columns;
        let row = index as u32 / columns;
        (gap + col * (w + gap), gap + row * (h + gap))
    }

    /// Render a sheet marked according to `key`.
    pub fn render(&self, key: &AnswerKey) -> Result<GrayImage> {
        if key.layout() != self.profile.layout {
            return Err(MarkwerkError::InvalidConfig(format!(
                "answer key is for {} but the renderer draws {}",
                key.layout(),
                self.profile.layout
            )));
        }
        let marks = self.marked_cells(key)?;

        let (width, height) = self.sheet_size();
        let mut sheet = GrayImage::from_pixel(width, height, PAPER);
        for index in 0..self.profile.topology.regions {
            let filled: Vec<CellCoordinate> = marks.iter().copied().filter(|c| c.region == index).collect();
            let block = imageops::rotate90(&self.render_block(index, &filled));
            let (x, y) = self.block_origin(index);
            imageops::overlay(&mut sheet, &block, i64::from(x), i64::from(y));
        }
        Ok(sheet)
    }

    /// Printed cells to fill for `key`.
    fn marked_cells(&self, key: &AnswerKey) -> Result<Vec<CellCoordinate>> {
        let rows = self.profile.topology.rows;
        let invalid = |msg: String| MarkwerkError::InvalidConfig(msg);
        let mut cells = Vec::new();
        match key {
            AnswerKey::MultipleChoice(entries) => {
                for (q, entry) in entries.iter().enumerate() {
                    let Some(option) = entry else { continue };
                    let logical = OPTIONS
                        .iter()
                        .position(|o| o == option)
                        .ok_or_else(|| invalid(format!("unknown option '{option}'")))?;
                    let region = q / rows;
                    let remap = self.config.p1.column_remap.get(region).copied().unwrap_or([0, 1, 2, 3]);
                    let column = remap
                        .iter()
                        .position(|&o| o == logical)
                        .ok_or_else(|| invalid(format!("option {option} not printed in block {region}")))?;
                    cells.push(CellCoordinate {
                        region,
                        row: q % rows,
                        column,
                    });
                }
            }
            AnswerKey::TrueFalse(entries) => {
                for (i, entry) in entries.iter().enumerate() {
                    let Some(value) = entry else { continue };
                    cells.push(CellCoordinate {
                        region: i / rows,
                        row: i % rows,
                        column: if *value { 0 } else { 1 },
                    });
                }
            }
            AnswerKey::Numeric(entries) => {
                let positions = self.config.p3.positions;
                for (q, entry) in entries.iter().enumerate().take(NUMERIC_QUESTIONS) {
                    if entry.chars().count() > positions {
                        return Err(invalid(format!("entry '{entry}' has more than {positions} symbols")));
                    }
                    for (p, symbol) in entry.chars().enumerate() {
                        if symbol == ' ' {
                            continue;
                        }
                        let row = LADDER_SYMBOLS
                            .iter()
                            .position(|&s| s == symbol)
                            .ok_or_else(|| invalid(format!("symbol '{symbol}' is not on the ladder")))?;
                        cells.push(CellCoordinate {
                            region: 0,
                            row,
                            column: q * positions + p,
                        });
                    }
                }
            }
        }
        Ok(cells)
    }

    /// One block, upright, at canonical size.
    fn render_block(&self, index: usize, filled: &[CellCoordinate]) -> GrayImage {
        let (width, height) = self.profile.canonical_size();
        let geometry = &self.profile.geometry;
        let mut canvas = GrayImage::from_pixel(width, height, PAPER);

        let cols = AxisPlan::from_config(width as f32, geometry.column_cells, &geometry.columns).nominal_lines();
        let nominal = AxisPlan::from_config(height as f32, geometry.row_cells, &geometry.rows).nominal_lines();
        let (left, right) = (cols[0], cols[cols.len() - 1]);
        let (top, bottom) = (nominal[0], nominal[nominal.len() - 1]);
        let drift = self.row_drift;
        let rows: Vec<f32> = nominal
            .iter()
            .map(|&y| y + drift * (y - top) * (bottom - y) / (bottom - top))
            .collect();

        // Outline.
        for inset in 0..BORDER_PX {
            fill(&mut canvas, inset as f32, 0.0, 1.0, height as f32);
            fill(&mut canvas, (width - 1 - inset) as f32, 0.0, 1.0, height as f32);
            fill(&mut canvas, 0.0, inset as f32, width as f32, 1.0);
            fill(&mut canvas, 0.0, (height - 1 - inset) as f32, width as f32, 1.0);
        }

        // Grid lines, two pixels wide, centred on each boundary.
        for &y in &rows {
            fill(&mut canvas, left - 1.0, y.round() - 1.0, right - left + 2.0, 2.0);
        }
        for &x in &cols {
            fill(&mut canvas, x.round() - 1.0, top - 1.0, 2.0, bottom - top + 2.0);
        }

        // Label blocks in the header and the left margin.
        for pair in cols.windows(2) {
            let w = 0.3 * (pair[1] - pair[0]);
            let h = 0.4 * top;
            fill(&mut canvas, (pair[0] + pair[1] - w) / 2.0, (top - h) / 2.0, w, h);
        }
        for pair in rows.windows(2) {
            let w = 0.4 * left;
            let h = 0.3 * (pair[1] - pair[0]);
            fill(&mut canvas, (left - w) / 2.0, (pair[0] + pair[1] - h) / 2.0, w, h);
        }

        // Bubbles.
        for (r, ry) in rows.windows(2).enumerate() {
            for (c, cx) in cols.windows(2).enumerate() {
                let centre = (
                    ((cx[0] + cx[1]) / 2.0).round() as i32,
                    ((ry[0] + ry[1]) / 2.0).round() as i32,
                );
                let radius = (BUBBLE_RADIUS * (cx[1] - cx[0]).min(ry[1] - ry[0])).round() as i32;
                let here = CellCoordinate {
                    region: index,
                    row: r,
                    column: c,
                };
                draw_hollow_circle_mut(&mut canvas, centre, radius, INK);
                if filled.contains(&here) {
                    draw_filled_circle_mut(&mut canvas, centre, radius, INK);
                }
                if self.strays.contains(&here) {
                    draw_filled_circle_mut(&mut canvas, centre, STRAY_RADIUS, INK);
                }
            }
        }
        canvas
    }
}

/// Fill an ink rectangle, clipped to the canvas.
fn fill(canvas: &mut GrayImage, x: f32, y: f32, w: f32, h: f32) {
    let (x0, y0) = (x.round().max(0.0), y.round().max(0.0));
    let x1 = (x + w).round().min(canvas.width() as f32);
    let y1 = (y + h).round().min(canvas.height() as f32);
    if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
        return;
    }
    draw_filled_rect_mut(
        canvas,
        Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0) as u32, (y1 - y0) as u32),
        INK,
    );
}
