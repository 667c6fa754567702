// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Debug image output: optional intermediate images (ink mask, detected
// regions, aligned grids) for diagnosing a bad read.

use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use markwerk_core::error::{MarkwerkError, Result};
use tracing::{debug, warn};

use crate::align::CellGrid;
use crate::geometry::Quadrilateral;
use crate::rectify::RectifiedGrid;
use crate::score::ScoredRegion;

const REGION_COLOUR: Rgb<u8> = Rgb([220, 30, 30]);
const LINE_COLOUR: Rgb<u8> = Rgb([30, 120, 220]);
const DEGRADED_COLOUR: Rgb<u8> = Rgb([240, 160, 0]);
const MARK_COLOUR: Rgb<u8> = Rgb([20, 170, 60]);

/// Receives named intermediate images while a sheet is graded.
pub trait DebugSink: Send + Sync {
    /// Skip building images nobody will look at.
    fn is_enabled(&self) -> bool {
        true
    }

    fn write_image(&self, name: &str, image: &DynamicImage) -> Result<()>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DebugSink for NullSink {
    fn is_enabled(&self) -> bool {
        false
    }

    fn write_image(&self, _name: &str, _image: &DynamicImage) -> Result<()> {
        Ok(())
    }
}

/// Writes each image as `<dir>/<name>.png`.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Create the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DebugSink for DirectorySink {
    fn write_image(&self, name: &str, image: &DynamicImage) -> Result<()> {
        let path = self.dir.join(format!("{name}.png"));
        image.save(&path).map_err(|err| match err {
            image::ImageError::IoError(io) => MarkwerkError::Io(io),
            other => MarkwerkError::ImageDecode(format!("failed to encode {}: {}", path.display(), other)),
        })?;
        debug!(path = %path.display(), "Debug image written");
        Ok(())
    }
}

/// Hand an image to `sink`. Failures are logged, never fatal.
pub(crate) fn emit(sink: &dyn DebugSink, name: &str, image: DynamicImage) {
    if let Err(err) = sink.write_image(name, &image) {
        warn!(name, %err, "Could not write debug image");
    }
}

// -- Overlays -----------------------------------------------------------------

/// The sheet with every detected region outlined and its corners boxed.
pub fn region_overlay(gray: &GrayImage, regions: &[Quadrilateral]) -> RgbImage {
    let mut canvas = DynamicImage::ImageLuma8(gray.clone()).to_rgb8();
    for quad in regions {
        let corners = quad.corners();
        for i in 0..4 {
            let a = corners[i];
            let b = corners[(i + 1) % 4];
            draw_line_segment_mut(&mut canvas, (a.x, a.y), (b.x, b.y), REGION_COLOUR);
            draw_hollow_rect_mut(
                &mut canvas,
                Rect::at(a.x as i32 - 4, a.y as i32 - 4).of_size(9, 9),
                REGION_COLOUR,
            );
        }
    }
    canvas
}

/// A rectified region with aligned lines drawn over it. Degraded cells are
/// outlined in amber and accepted-strength marks boxed in green.
pub fn grid_overlay(grid: &RectifiedGrid, cells: &CellGrid, scored: &ScoredRegion, floor: f32) -> RgbImage {
    let mut canvas = DynamicImage::ImageLuma8(grid.gray.clone()).to_rgb8();
    for row in 0..cells.row_count() {
        for column in 0..cells.column_count() {
            let rect = cells.cell_rect(row, column);
            let Some(outline) = pixel_rect(rect.x0, rect.y0, rect.width(), rect.height()) else {
                continue;
            };
            let colour = if cells.is_degraded(row, column) {
                DEGRADED_COLOUR
            } else {
                LINE_COLOUR
            };
            draw_hollow_rect_mut(&mut canvas, outline, colour);

            if scored.cell(row, column).score.confidence > floor {
                if let Some(inner) = pixel_rect(rect.x0 + 3.0, rect.y0 + 3.0, rect.width() - 6.0, rect.height() - 6.0) {
                    draw_hollow_rect_mut(&mut canvas, inner, MARK_COLOUR);
                }
            }
        }
    }
    canvas
}

fn pixel_rect(x: f32, y: f32, w: f32, h: f32) -> Option<Rect> {
    let (w, h) = (w.round(), h.round());
    if w < 1.0 || h < 1.0 {
        return None;
    }
    Some(Rect::at(x.round() as i32, y.round() as i32).of_size(w as u32, h as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::point::Point;

    #[test]
    fn directory_sink_writes_png() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = DirectorySink::new(dir.path().join("debug")).expect("sink");
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([128u8])));
        sink.write_image("mask", &img).expect("write");
        assert!(sink.dir().join("mask.png").exists());
    }

    #[test]
    fn null_sink_is_disabled() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(1, 1));
        assert!(!NullSink.is_enabled());
        assert!(NullSink.write_image("x", &img).is_ok());
    }

    #[test]
    fn region_overlay_marks_outline() {
        let gray = GrayImage::from_pixel(100, 100, Luma([255u8]));
        let quad = Quadrilateral::new(
            [
                Point::new(20.0, 20.0),
                Point::new(80.0, 20.0),
                Point::new(80.0, 80.0),
                Point::new(20.0, 80.0),
            ],
            1.0,
        )
        .expect("quad");
        let overlay = region_overlay(&gray, &[quad]);
        assert_eq!(*overlay.get_pixel(50, 20), REGION_COLOUR);
        assert_eq!(*overlay.get_pixel(50, 50), Rgb([255, 255, 255]));
    }
}
